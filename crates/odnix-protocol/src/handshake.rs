//! Odnix Handshake Protocol
//!
//! Unauthenticated finite-field Diffie-Hellman carried as JSON text records.
//!
//! ## Handshake Flow
//!
//! ```text
//! Client                                              Server
//!   |                                                   |
//!   |--- req_dh_params {nonce} ------------------------>|
//!   |                                                   |
//!   |<-- res_dh_params {nonce, server_nonce, p, g} -----|
//!   |                                                   |
//!   |--- set_client_dh_params {nonce, server_nonce, gb}>|
//!   |                                                   |
//!   |<-- dh_gen_ok {nonce, server_nonce, ga} -----------|
//!   |                                                   |
//!   |========= AuthKey established on both sides ======|
//! ```
//!
//! ## Failure Handling
//!
//! - Input that is not a recognized handshake record is dropped silently
//! - A recognized record that is malformed or out of order is answered with
//!   an `error` record on the server; the stage does not change
//! - Any handshake record after establishment is a hard error
//!
//! The exchange protects against passive observers only. There is no server
//! authentication.

use odnix_core::{bigint, DhParameters, CLIENT_PRIVATE_BITS, NONCE_SIZE};
use odnix_crypto::{AuthKey, DhKeyPair};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::errors::{ProtocolError, ProtocolResult};

/// Handshake record, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeMessage {
    /// Client opens the handshake
    ReqDhParams { nonce: Vec<u8> },
    /// Server publishes the group and its nonce
    ResDhParams {
        nonce: Vec<u8>,
        server_nonce: Vec<u8>,
        p: String,
        g: u32,
    },
    /// Client public value, hex
    SetClientDhParams {
        nonce: Vec<u8>,
        server_nonce: Vec<u8>,
        #[serde(deserialize_with = "public_value")]
        gb: String,
    },
    /// Server public value, hex
    DhGenOk {
        nonce: Vec<u8>,
        server_nonce: Vec<u8>,
        #[serde(deserialize_with = "public_value")]
        ga: String,
    },
    /// Handshake rejected
    Error { message: String },
}

/// DH public value on the wire: hex string or big-endian byte list
#[derive(Deserialize)]
#[serde(untagged)]
enum PublicValue {
    Hex(String),
    Bytes(Vec<u8>),
}

/// Normalizes either public value form to hex.
fn public_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match PublicValue::deserialize(deserializer)? {
        PublicValue::Hex(text) => text,
        PublicValue::Bytes(bytes) => hex::encode(bytes),
    })
}

/// Record type names accepted as handshake messages
const HANDSHAKE_TYPES: [&str; 5] = [
    "req_dh_params",
    "res_dh_params",
    "set_client_dh_params",
    "dh_gen_ok",
    "error",
];

/// Result of decoding an inbound text record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Well-formed handshake record
    Message(HandshakeMessage),
    /// Known `type` whose fields did not parse
    Malformed { kind: String, reason: String },
    /// Not a handshake record at all
    Unrecognized,
}

impl HandshakeMessage {
    /// Decode raw bytes once at the boundary.
    pub fn classify(data: &[u8]) -> Inbound {
        let value: serde_json::Value = match serde_json::from_slice(data) {
            Ok(v) => v,
            Err(_) => return Inbound::Unrecognized,
        };

        let kind = match value.get("type").and_then(|t| t.as_str()) {
            Some(kind) if HANDSHAKE_TYPES.contains(&kind) => kind.to_string(),
            _ => return Inbound::Unrecognized,
        };

        match serde_json::from_value::<HandshakeMessage>(value) {
            Ok(msg) => Inbound::Message(msg),
            Err(e) => Inbound::Malformed {
                kind,
                reason: e.to_string(),
            },
        }
    }

    /// Record type name
    pub fn kind(&self) -> &'static str {
        match self {
            HandshakeMessage::ReqDhParams { .. } => "req_dh_params",
            HandshakeMessage::ResDhParams { .. } => "res_dh_params",
            HandshakeMessage::SetClientDhParams { .. } => "set_client_dh_params",
            HandshakeMessage::DhGenOk { .. } => "dh_gen_ok",
            HandshakeMessage::Error { .. } => "error",
        }
    }

    /// Serialize to JSON bytes
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Build an error record
    pub fn error(reason: impl std::fmt::Display) -> Self {
        HandshakeMessage::Error {
            message: format!("Handshake error: {}", reason),
        }
    }
}

/// What a handshake step produced
#[derive(Debug)]
pub struct HandshakeOutcome {
    /// Record to send back, if any
    pub reply: Option<HandshakeMessage>,
    /// AuthKey, present once the exchange completes
    pub auth_key: Option<AuthKey>,
}

impl HandshakeOutcome {
    fn reply(msg: HandshakeMessage) -> Self {
        Self {
            reply: Some(msg),
            auth_key: None,
        }
    }
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

fn nonce_from(bytes: &[u8], field: &str) -> Result<[u8; NONCE_SIZE], String> {
    <[u8; NONCE_SIZE]>::try_from(bytes)
        .map_err(|_| format!("{} must be {} bytes, got {}", field, NONCE_SIZE, bytes.len()))
}

// =============================================================================
// SERVER
// =============================================================================

/// Server handshake stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStage {
    /// Waiting for `req_dh_params`
    Init,
    /// `res_dh_params` sent, waiting for `set_client_dh_params`
    AwaitingClientPublic,
    /// AuthKey derived
    Established,
}

/// Server-side handshake state machine
pub struct ServerHandshake {
    params: &'static DhParameters,
    stage: ServerStage,
    client_nonce: Option<[u8; NONCE_SIZE]>,
    server_nonce: Option<[u8; NONCE_SIZE]>,
}

impl ServerHandshake {
    /// Create a new server handshake over the standard group
    pub fn new() -> Self {
        Self {
            params: DhParameters::standard(),
            stage: ServerStage::Init,
            client_nonce: None,
            server_nonce: None,
        }
    }

    /// Current stage
    pub fn stage(&self) -> ServerStage {
        self.stage
    }

    /// Feed one inbound text record.
    ///
    /// `Ok(None)` means drop silently.
    pub fn process(&mut self, data: &[u8]) -> ProtocolResult<Option<HandshakeOutcome>> {
        let msg = match HandshakeMessage::classify(data) {
            Inbound::Unrecognized => {
                debug!("Dropping non-handshake record ({} bytes)", data.len());
                return Ok(None);
            }
            Inbound::Malformed { kind, reason } => {
                if self.stage == ServerStage::Established {
                    return Err(ProtocolError::HandshakeProtocol(format!(
                        "{} received after handshake completed",
                        kind
                    )));
                }
                warn!("Malformed {} record: {}", kind, reason);
                return Ok(Some(HandshakeOutcome::reply(HandshakeMessage::error(
                    format!("malformed {}", kind),
                ))));
            }
            Inbound::Message(msg) => msg,
        };

        self.handle(msg)
    }

    /// Apply a decoded record to the state machine
    pub fn handle(&mut self, msg: HandshakeMessage) -> ProtocolResult<Option<HandshakeOutcome>> {
        match (self.stage, msg) {
            (ServerStage::Established, msg) => Err(ProtocolError::HandshakeProtocol(format!(
                "{} received after handshake completed",
                msg.kind()
            ))),

            (_, HandshakeMessage::Error { message }) => {
                warn!("Client reported handshake error: {}", message);
                Ok(None)
            }

            (ServerStage::Init, HandshakeMessage::ReqDhParams { nonce }) => {
                let client_nonce = match nonce_from(&nonce, "nonce") {
                    Ok(n) => n,
                    Err(reason) => return Ok(Some(self.reject(reason))),
                };
                let server_nonce = random_nonce();

                self.client_nonce = Some(client_nonce);
                self.server_nonce = Some(server_nonce);
                self.stage = ServerStage::AwaitingClientPublic;
                debug!("Sending res_dh_params");

                Ok(Some(HandshakeOutcome::reply(HandshakeMessage::ResDhParams {
                    nonce: client_nonce.to_vec(),
                    server_nonce: server_nonce.to_vec(),
                    p: self.params.prime_decimal(),
                    g: odnix_core::DH_GENERATOR,
                })))
            }

            (
                ServerStage::AwaitingClientPublic,
                HandshakeMessage::SetClientDhParams {
                    nonce,
                    server_nonce,
                    gb,
                },
            ) => Ok(Some(self.complete(&nonce, &server_nonce, &gb))),

            (stage, msg) => Ok(Some(self.reject(format!(
                "unexpected {} in stage {:?}",
                msg.kind(),
                stage
            )))),
        }
    }

    fn complete(&mut self, nonce: &[u8], server_nonce: &[u8], gb: &str) -> HandshakeOutcome {
        if self.client_nonce.as_ref().map(|n| n.as_slice()) != Some(nonce) {
            return self.reject("nonce mismatch");
        }
        if self.server_nonce.as_ref().map(|n| n.as_slice()) != Some(server_nonce) {
            return self.reject("server_nonce mismatch");
        }

        let client_public = match bigint::parse_hex(gb) {
            Some(v) if self.params.is_valid_public(&v) => v,
            Some(_) => return self.reject("gb out of range"),
            None => return self.reject("gb is not valid hex"),
        };

        let key_pair = DhKeyPair::generate(self.params);
        let ga = key_pair.public_hex();
        let auth_key = match key_pair.agree(self.params, &client_public) {
            Ok(key) => key,
            Err(e) => return self.reject(e),
        };

        self.stage = ServerStage::Established;
        let client_nonce = self.client_nonce.take().unwrap_or_default();
        let server_nonce = self.server_nonce.take().unwrap_or_default();
        debug!("Sending dh_gen_ok");

        HandshakeOutcome {
            reply: Some(HandshakeMessage::DhGenOk {
                nonce: client_nonce.to_vec(),
                server_nonce: server_nonce.to_vec(),
                ga,
            }),
            auth_key: Some(auth_key),
        }
    }

    fn reject(&self, reason: impl std::fmt::Display) -> HandshakeOutcome {
        warn!("Rejecting handshake record in stage {:?}: {}", self.stage, reason);
        HandshakeOutcome::reply(HandshakeMessage::error(reason))
    }
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Client handshake stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStage {
    /// Nothing sent yet
    Init,
    /// `req_dh_params` sent
    AwaitingDhParams,
    /// `set_client_dh_params` sent
    AwaitingDhGenOk,
    /// AuthKey derived
    Established,
    /// Aborted
    Failed,
}

/// Client-side handshake state machine
pub struct ClientHandshake {
    params: &'static DhParameters,
    stage: ClientStage,
    nonce: [u8; NONCE_SIZE],
    server_nonce: Option<[u8; NONCE_SIZE]>,
    key_pair: Option<DhKeyPair>,
}

impl ClientHandshake {
    /// Create a new client handshake over the standard group
    pub fn new() -> Self {
        Self {
            params: DhParameters::standard(),
            stage: ClientStage::Init,
            nonce: random_nonce(),
            server_nonce: None,
            key_pair: None,
        }
    }

    /// Current stage
    pub fn stage(&self) -> ClientStage {
        self.stage
    }

    /// Emit `req_dh_params`
    pub fn start(&mut self) -> ProtocolResult<HandshakeMessage> {
        if self.stage != ClientStage::Init {
            return Err(ProtocolError::HandshakeProtocol(format!(
                "handshake already started (stage {:?})",
                self.stage
            )));
        }
        self.stage = ClientStage::AwaitingDhParams;
        Ok(HandshakeMessage::ReqDhParams {
            nonce: self.nonce.to_vec(),
        })
    }

    /// Feed one inbound text record.
    ///
    /// `Ok(None)` means drop silently. Any protocol violation aborts the
    /// handshake.
    pub fn process(&mut self, data: &[u8]) -> ProtocolResult<Option<HandshakeOutcome>> {
        match HandshakeMessage::classify(data) {
            Inbound::Unrecognized => {
                debug!("Dropping non-handshake record ({} bytes)", data.len());
                Ok(None)
            }
            Inbound::Malformed { kind, reason } => {
                Err(self.fail(format!("malformed {}: {}", kind, reason)))
            }
            Inbound::Message(msg) => self.handle(msg).map(Some),
        }
    }

    /// Apply a decoded record to the state machine
    pub fn handle(&mut self, msg: HandshakeMessage) -> ProtocolResult<HandshakeOutcome> {
        match (self.stage, msg) {
            (ClientStage::Established, msg) => Err(ProtocolError::HandshakeProtocol(format!(
                "{} received after handshake completed",
                msg.kind()
            ))),

            (_, HandshakeMessage::Error { message }) => {
                Err(self.fail(format!("server rejected handshake: {}", message)))
            }

            (
                ClientStage::AwaitingDhParams,
                HandshakeMessage::ResDhParams {
                    nonce,
                    server_nonce,
                    p,
                    g,
                },
            ) => self.on_dh_params(&nonce, &server_nonce, &p, g),

            (
                ClientStage::AwaitingDhGenOk,
                HandshakeMessage::DhGenOk {
                    nonce,
                    server_nonce,
                    ga,
                },
            ) => self.on_dh_gen_ok(&nonce, &server_nonce, &ga),

            (stage, msg) => Err(self.fail(format!(
                "unexpected {} in stage {:?}",
                msg.kind(),
                stage
            ))),
        }
    }

    fn on_dh_params(
        &mut self,
        nonce: &[u8],
        server_nonce: &[u8],
        p: &str,
        g: u32,
    ) -> ProtocolResult<HandshakeOutcome> {
        if nonce != self.nonce.as_slice() {
            return Err(self.fail("nonce mismatch"));
        }
        let server_nonce = nonce_from(server_nonce, "server_nonce").map_err(|e| self.fail(e))?;

        let prime = bigint::parse_decimal(p).ok_or_else(|| self.fail("p is not a decimal integer"))?;
        if !self.params.matches(&prime, &g.into()) {
            return Err(self.fail("server offered unknown DH parameters"));
        }

        let key_pair = DhKeyPair::generate_short(self.params, CLIENT_PRIVATE_BITS);
        let gb = key_pair.public_hex();

        self.server_nonce = Some(server_nonce);
        self.key_pair = Some(key_pair);
        self.stage = ClientStage::AwaitingDhGenOk;
        debug!("Sending set_client_dh_params");

        Ok(HandshakeOutcome::reply(HandshakeMessage::SetClientDhParams {
            nonce: self.nonce.to_vec(),
            server_nonce: server_nonce.to_vec(),
            gb,
        }))
    }

    fn on_dh_gen_ok(
        &mut self,
        nonce: &[u8],
        server_nonce: &[u8],
        ga: &str,
    ) -> ProtocolResult<HandshakeOutcome> {
        if nonce != self.nonce.as_slice() {
            return Err(self.fail("nonce mismatch"));
        }
        if self.server_nonce.as_ref().map(|n| n.as_slice()) != Some(server_nonce) {
            return Err(self.fail("server_nonce mismatch"));
        }

        let key_pair = self
            .key_pair
            .take()
            .ok_or_else(|| self.fail("no key pair for dh_gen_ok"))?;
        let auth_key = key_pair
            .agree_hex(self.params, ga)
            .map_err(|e| self.fail(format!("bad ga: {}", e)))?;

        self.stage = ClientStage::Established;
        self.server_nonce = None;

        Ok(HandshakeOutcome {
            reply: None,
            auth_key: Some(auth_key),
        })
    }

    fn fail(&mut self, reason: impl std::fmt::Display) -> ProtocolError {
        warn!("Client handshake failed in stage {:?}: {}", self.stage, reason);
        self.stage = ClientStage::Failed;
        self.key_pair = None;
        ProtocolError::HandshakeProtocol(reason.to_string())
    }
}

impl Default for ClientHandshake {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(msg: &HandshakeMessage) -> Vec<u8> {
        msg.to_json().unwrap()
    }

    fn reply_of(outcome: Option<HandshakeOutcome>) -> HandshakeMessage {
        outcome.unwrap().reply.unwrap()
    }

    #[test]
    fn test_message_wire_shape() {
        let msg = HandshakeMessage::ReqDhParams {
            nonce: vec![1, 2, 3],
        };
        let value: serde_json::Value = serde_json::from_slice(&json(&msg)).unwrap();
        assert_eq!(value["type"], "req_dh_params");
        assert_eq!(value["nonce"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_classify_ignores_extra_fields() {
        let raw = br#"{"type":"req_dh_params","nonce":[0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15],"p":"x","q":"y","fingerprint":"z"}"#;
        match HandshakeMessage::classify(raw) {
            Inbound::Message(HandshakeMessage::ReqDhParams { nonce }) => assert_eq!(nonce.len(), 16),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_unrecognized() {
        assert_eq!(HandshakeMessage::classify(b"not json"), Inbound::Unrecognized);
        assert_eq!(HandshakeMessage::classify(b"[1,2,3]"), Inbound::Unrecognized);
        assert_eq!(
            HandshakeMessage::classify(br#"{"type":"webrtc.offer"}"#),
            Inbound::Unrecognized
        );
        assert_eq!(HandshakeMessage::classify(br#"{"nonce":[1]}"#), Inbound::Unrecognized);
    }

    #[test]
    fn test_classify_malformed() {
        let result = HandshakeMessage::classify(br#"{"type":"set_client_dh_params","nonce":[1]}"#);
        assert!(matches!(result, Inbound::Malformed { ref kind, .. } if kind == "set_client_dh_params"));
    }

    #[test]
    fn test_full_handshake() {
        let mut client = ClientHandshake::new();
        let mut server = ServerHandshake::new();

        let req = client.start().unwrap();
        assert_eq!(client.stage(), ClientStage::AwaitingDhParams);

        let res = reply_of(server.process(&json(&req)).unwrap());
        assert_eq!(server.stage(), ServerStage::AwaitingClientPublic);
        match &res {
            HandshakeMessage::ResDhParams { p, g, .. } => {
                assert_eq!(p, &DhParameters::standard().prime_decimal());
                assert_eq!(*g, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let set = reply_of(client.process(&json(&res)).unwrap());
        assert_eq!(client.stage(), ClientStage::AwaitingDhGenOk);

        let server_done = server.process(&json(&set)).unwrap().unwrap();
        assert_eq!(server.stage(), ServerStage::Established);
        let server_key = server_done.auth_key.unwrap();
        let ok = server_done.reply.unwrap();
        assert_eq!(ok.kind(), "dh_gen_ok");

        let client_done = client.process(&json(&ok)).unwrap().unwrap();
        assert_eq!(client.stage(), ClientStage::Established);
        assert!(client_done.reply.is_none());
        assert_eq!(client_done.auth_key.unwrap(), server_key);
    }

    #[test]
    fn test_public_value_as_byte_list() {
        let mut client = ClientHandshake::new();
        let mut server = ServerHandshake::new();

        let req = client.start().unwrap();
        let res = reply_of(server.process(&json(&req)).unwrap());
        let set = reply_of(client.process(&json(&res)).unwrap());

        // Re-encode gb as big-endian bytes
        let mut value: serde_json::Value = serde_json::from_slice(&json(&set)).unwrap();
        let gb = bigint::parse_hex(value["gb"].as_str().unwrap()).unwrap();
        value["gb"] = serde_json::json!(gb.to_bytes_be());
        let raw = serde_json::to_vec(&value).unwrap();

        match HandshakeMessage::classify(&raw) {
            Inbound::Message(HandshakeMessage::SetClientDhParams { gb: parsed, .. }) => {
                assert_eq!(bigint::parse_hex(&parsed).unwrap(), gb);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let done = server.process(&raw).unwrap().unwrap();
        assert_eq!(server.stage(), ServerStage::Established);
        let ok = done.reply.unwrap();
        let client_done = client.process(&json(&ok)).unwrap().unwrap();
        assert_eq!(client_done.auth_key.unwrap(), done.auth_key.unwrap());
    }

    #[test]
    fn test_public_value_rejects_other_shapes() {
        let raw = br#"{"type":"dh_gen_ok","nonce":[1],"server_nonce":[2],"ga":{"x":1}}"#;
        assert!(matches!(
            HandshakeMessage::classify(raw),
            Inbound::Malformed { ref kind, .. } if kind == "dh_gen_ok"
        ));
    }

    #[test]
    fn test_server_rejects_short_nonce() {
        let mut server = ServerHandshake::new();
        let req = HandshakeMessage::ReqDhParams { nonce: vec![1, 2, 3] };
        let reply = reply_of(server.process(&json(&req)).unwrap());

        assert_eq!(reply.kind(), "error");
        assert_eq!(server.stage(), ServerStage::Init);
    }

    #[test]
    fn test_server_drops_unrecognized() {
        let mut server = ServerHandshake::new();
        assert!(server.process(br#"{"type":"ping"}"#).unwrap().is_none());
        assert!(server.process(b"\x00\x01garbage").unwrap().is_none());
        assert_eq!(server.stage(), ServerStage::Init);
    }

    #[test]
    fn test_server_out_of_order() {
        let mut server = ServerHandshake::new();
        let set = HandshakeMessage::SetClientDhParams {
            nonce: vec![0; 16],
            server_nonce: vec![0; 16],
            gb: "02".into(),
        };
        let reply = reply_of(server.process(&json(&set)).unwrap());
        assert_eq!(reply.kind(), "error");
        assert_eq!(server.stage(), ServerStage::Init);
    }

    #[test]
    fn test_server_rejects_nonce_mismatch_and_bad_gb() {
        let mut server = ServerHandshake::new();
        let nonce = vec![9u8; 16];
        let res = reply_of(
            server
                .process(&json(&HandshakeMessage::ReqDhParams { nonce: nonce.clone() }))
                .unwrap(),
        );
        let server_nonce = match res {
            HandshakeMessage::ResDhParams { server_nonce, .. } => server_nonce,
            other => panic!("unexpected: {:?}", other),
        };

        let wrong_nonce = HandshakeMessage::SetClientDhParams {
            nonce: vec![8u8; 16],
            server_nonce: server_nonce.clone(),
            gb: "05".into(),
        };
        assert_eq!(reply_of(server.process(&json(&wrong_nonce)).unwrap()).kind(), "error");

        let trivial_gb = HandshakeMessage::SetClientDhParams {
            nonce: nonce.clone(),
            server_nonce: server_nonce.clone(),
            gb: "1".into(),
        };
        assert_eq!(reply_of(server.process(&json(&trivial_gb)).unwrap()).kind(), "error");

        let not_hex = HandshakeMessage::SetClientDhParams {
            nonce,
            server_nonce,
            gb: "zz".into(),
        };
        assert_eq!(reply_of(server.process(&json(&not_hex)).unwrap()).kind(), "error");

        assert_eq!(server.stage(), ServerStage::AwaitingClientPublic);
    }

    #[test]
    fn test_server_rejects_rehandshake() {
        let mut client = ClientHandshake::new();
        let mut server = ServerHandshake::new();

        let req = client.start().unwrap();
        let res = reply_of(server.process(&json(&req)).unwrap());
        let set = reply_of(client.process(&json(&res)).unwrap());
        server.process(&json(&set)).unwrap();

        let again = server.process(&json(&req));
        assert!(matches!(again, Err(ProtocolError::HandshakeProtocol(_))));
        // Non-handshake traffic is still just dropped
        assert!(server.process(br#"{"type":"ping"}"#).unwrap().is_none());
    }

    #[test]
    fn test_client_rejects_foreign_group() {
        let mut client = ClientHandshake::new();
        let req = client.start().unwrap();
        let nonce = match req {
            HandshakeMessage::ReqDhParams { nonce } => nonce,
            other => panic!("unexpected: {:?}", other),
        };

        let res = HandshakeMessage::ResDhParams {
            nonce,
            server_nonce: vec![0; 16],
            p: "23".into(),
            g: 5,
        };
        assert!(matches!(
            client.process(&json(&res)),
            Err(ProtocolError::HandshakeProtocol(_))
        ));
        assert_eq!(client.stage(), ClientStage::Failed);
    }

    #[test]
    fn test_client_aborts_on_error_record() {
        let mut client = ClientHandshake::new();
        client.start().unwrap();
        let err = HandshakeMessage::error("nope");
        assert!(client.process(&json(&err)).is_err());
        assert_eq!(client.stage(), ClientStage::Failed);
    }

    #[test]
    fn test_client_start_twice() {
        let mut client = ClientHandshake::new();
        client.start().unwrap();
        assert!(client.start().is_err());
    }
}
