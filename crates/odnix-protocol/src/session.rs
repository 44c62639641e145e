//! Connection Session
//!
//! One [`ConnectionSession`] per connection, owned by that connection's task.
//! It drives the handshake until an AuthKey exists, then wraps outgoing
//! payloads into wire frames and unwraps incoming ones.
//!
//! ```text
//!             begin_handshake()                close()
//! Handshaking ─────────────────► Established ─────────► Closed
//!      │                                                  ▲
//!      └──────────────────────── close() ─────────────────┘
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use odnix_core::{AUTH_KEY_ID_SIZE, SALT_SIZE, SESSION_ID_SIZE};
use odnix_crypto::{AuthKey, CryptoError, IgeCipher, OdnixKdf};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::constants::*;
use crate::errors::{ProtocolError, ProtocolResult};
use crate::handshake::{
    ClientHandshake, HandshakeMessage, HandshakeOutcome, Inbound, ServerHandshake,
};
use crate::packet::{InnerPayload, WireFrame};

/// Per-session identifier chosen by the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_SIZE]);

impl SessionId {
    /// Generate a random session ID
    pub fn generate() -> Self {
        let mut id = [0u8; SESSION_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut id);
        Self(id)
    }

    /// Create from bytes
    pub fn from_bytes(bytes: [u8; SESSION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.0
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> ProtocolResult<Self> {
        let id = <[u8; SESSION_ID_SIZE]>::try_from(slice).map_err(|_| {
            ProtocolError::MalformedFrame(format!(
                "Invalid session ID length: {} (expected {})",
                slice.len(),
                SESSION_ID_SIZE
            ))
        })?;
        Ok(Self(id))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4])) // Show first 4 bytes
    }
}

/// Per-session server salt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generate a random salt
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes
    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> ProtocolResult<Self> {
        let salt = <[u8; SALT_SIZE]>::try_from(slice).map_err(|_| {
            ProtocolError::MalformedFrame(format!(
                "Invalid salt length: {} (expected {})",
                slice.len(),
                SALT_SIZE
            ))
        })?;
        Ok(Self(salt))
    }
}

/// Session tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inner payload header layout
    pub layout: PayloadLayout,
    /// Recompute and compare the message key on every received frame
    pub verify_message_key: bool,
    /// Largest application payload accepted by `wrap`
    pub max_payload_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            layout: PayloadLayout::Sequenced,
            verify_message_key: true,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Which end of the connection this session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Answers the handshake
    Server,
    /// Opens the handshake
    Client,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No AuthKey yet
    Handshaking,
    /// AuthKey present, payloads flow
    Established,
    /// Key wiped, nothing more allowed
    Closed,
}

enum Handshake {
    Server(ServerHandshake),
    Client(ClientHandshake),
}

/// Per-connection protocol state
pub struct ConnectionSession {
    id: SessionId,
    salt: Salt,
    role: Role,
    state: SessionState,
    config: SessionConfig,
    handshake: Option<Handshake>,
    auth_key: Option<AuthKey>,
    auth_key_id: Option<[u8; AUTH_KEY_ID_SIZE]>,
    last_msg_id: u64,
    next_seq_no: u32,
    frames_sent: u64,
    frames_received: u64,
    bytes_sent: u64,
    bytes_received: u64,
    created_at: Instant,
    last_activity: Instant,
}

impl ConnectionSession {
    /// Server-side session
    pub fn server(config: SessionConfig) -> Self {
        Self::new(Role::Server, config)
    }

    /// Client-side session
    pub fn client(config: SessionConfig) -> Self {
        Self::new(Role::Client, config)
    }

    fn new(role: Role, config: SessionConfig) -> Self {
        if !config.verify_message_key {
            warn!("Message key verification disabled; tampered frames will not be detected");
        }
        let handshake = match role {
            Role::Server => Handshake::Server(ServerHandshake::new()),
            Role::Client => Handshake::Client(ClientHandshake::new()),
        };
        let now = Instant::now();

        Self {
            id: SessionId::generate(),
            salt: Salt::generate(),
            role,
            state: SessionState::Handshaking,
            config,
            handshake: Some(handshake),
            auth_key: None,
            auth_key_id: None,
            last_msg_id: 0,
            next_seq_no: 0,
            frames_sent: 0,
            frames_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get session salt
    pub fn salt(&self) -> Salt {
        self.salt
    }

    /// Get role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get config
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Check if session is established
    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// Auth key id, once established
    pub fn auth_key_id(&self) -> Option<[u8; AUTH_KEY_ID_SIZE]> {
        self.auth_key_id
    }

    // -------------------------------------------------------------------------
    // Handshake
    // -------------------------------------------------------------------------

    /// First handshake record for a client session.
    pub fn start_handshake(&mut self) -> ProtocolResult<Vec<u8>> {
        self.ensure_open()?;
        match self.handshake.as_mut() {
            Some(Handshake::Client(hs)) => {
                let msg = hs.start()?;
                self.touch();
                msg.to_json()
            }
            Some(Handshake::Server(_)) => Err(ProtocolError::HandshakeProtocol(
                "server sessions wait for req_dh_params".into(),
            )),
            None => Err(ProtocolError::HandshakeProtocol(
                "handshake already completed".into(),
            )),
        }
    }

    /// Feed one inbound handshake record.
    ///
    /// Returns the reply to send, or `None` to drop silently.
    pub fn begin_handshake(&mut self, incoming: &[u8]) -> ProtocolResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.touch();

        let outcome = match self.handshake.as_mut() {
            Some(Handshake::Server(hs)) => hs.process(incoming)?,
            Some(Handshake::Client(hs)) => hs.process(incoming)?,
            None => {
                // Established: handshake records are a protocol error, the
                // rest is not ours to answer.
                return match HandshakeMessage::classify(incoming) {
                    Inbound::Unrecognized => Ok(None),
                    _ => Err(ProtocolError::HandshakeProtocol(
                        "handshake record after establishment".into(),
                    )),
                };
            }
        };

        let Some(HandshakeOutcome { reply, auth_key }) = outcome else {
            return Ok(None);
        };

        let reply = reply.map(|msg| msg.to_json()).transpose()?;

        if let Some(auth_key) = auth_key {
            self.establish(auth_key);
        }

        Ok(reply)
    }

    /// Adopt a key negotiated outside the DH handshake.
    #[cfg(feature = "insecure-nonce-handshake")]
    pub(crate) fn install_auth_key(&mut self, auth_key: AuthKey) {
        self.establish(auth_key);
    }

    fn establish(&mut self, auth_key: AuthKey) {
        let key_id = auth_key.id();
        self.auth_key = Some(auth_key);
        self.auth_key_id = Some(key_id);
        self.handshake = None;
        self.state = SessionState::Established;
        info!(
            "Session {} established ({:?}, auth key id {})",
            self.id,
            self.role,
            hex::encode(key_id)
        );
    }

    // -------------------------------------------------------------------------
    // Payloads
    // -------------------------------------------------------------------------

    /// Encrypt an application payload into wire bytes.
    pub fn wrap(&mut self, payload: &[u8]) -> ProtocolResult<Vec<u8>> {
        self.wrap_with_id(payload).map(|(_, frame)| frame)
    }

    /// Like [`wrap`](Self::wrap), also returning the assigned `msg_id`.
    pub fn wrap_with_id(&mut self, payload: &[u8]) -> ProtocolResult<(u64, Vec<u8>)> {
        self.ensure_established()?;
        if payload.len() > self.config.max_payload_size {
            return Err(ProtocolError::PayloadTooLarge {
                got: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let msg_id = self.next_msg_id();
        let seq_no = self.next_seq_no;
        self.next_seq_no = self.next_seq_no.wrapping_add(1);

        let inner = InnerPayload::new(self.salt, self.id, msg_id, seq_no, payload.to_vec())
            .encode(self.config.layout)?;

        let auth_key = self.auth_key.as_ref().ok_or(ProtocolError::NotEstablished)?;
        let keys = OdnixKdf::for_plaintext(auth_key.as_bytes(), &inner);
        let ciphertext = IgeCipher::new(keys.cipher_key()).encrypt(&inner, keys.iv());

        let frame = WireFrame::new(auth_key.id(), *keys.message_key(), ciphertext).to_bytes();
        self.record_sent(frame.len());
        Ok((msg_id, frame))
    }

    /// Decrypt wire bytes and return the application payload.
    pub fn unwrap(&mut self, wire: &[u8]) -> ProtocolResult<Vec<u8>> {
        Ok(self.unwrap_envelope(wire)?.data)
    }

    /// Decrypt wire bytes and return the full inner payload.
    pub fn unwrap_envelope(&mut self, wire: &[u8]) -> ProtocolResult<InnerPayload> {
        self.ensure_established()?;
        let auth_key = self.auth_key.as_ref().ok_or(ProtocolError::NotEstablished)?;

        let frame = WireFrame::from_bytes(wire)?;
        if Some(frame.auth_key_id) != self.auth_key_id {
            return Err(ProtocolError::UnknownAuthKey(hex::encode(frame.auth_key_id)));
        }

        let keys = OdnixKdf::derive(auth_key.as_bytes(), &frame.message_key);
        let inner = match IgeCipher::new(keys.cipher_key()).decrypt(&frame.ciphertext, keys.iv()) {
            Ok(inner) => inner,
            // Only a wrong key or altered ciphertext breaks the padding here
            Err(CryptoError::InvalidPadding) if self.config.verify_message_key => {
                return Err(ProtocolError::IntegrityMismatch)
            }
            Err(e) => return Err(ProtocolError::MalformedFrame(e.to_string())),
        };

        if self.config.verify_message_key
            && !OdnixKdf::verify_message_key(auth_key.as_bytes(), &inner, &frame.message_key)
        {
            return Err(ProtocolError::IntegrityMismatch);
        }

        let payload = InnerPayload::decode(&inner, self.config.layout)?;
        self.record_received(wire.len());
        Ok(payload)
    }

    /// Serialize a record as JSON and wrap it.
    pub fn wrap_json<T: Serialize>(&mut self, value: &T) -> ProtocolResult<Vec<u8>> {
        let bytes = serde_json::to_vec(value)?;
        self.wrap(&bytes)
    }

    /// Unwrap and parse the payload as JSON.
    pub fn unwrap_json<T: DeserializeOwned>(&mut self, wire: &[u8]) -> ProtocolResult<T> {
        let bytes = self.unwrap(wire)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Wrap for a text-only channel (base64 of the wire bytes).
    pub fn wrap_text(&mut self, payload: &[u8]) -> ProtocolResult<String> {
        Ok(BASE64.encode(self.wrap(payload)?))
    }

    /// Unwrap a base64 text frame.
    pub fn unwrap_text(&mut self, text: &str) -> ProtocolResult<Vec<u8>> {
        Ok(self.unwrap_text_envelope(text)?.data)
    }

    /// Unwrap a base64 text frame, keeping the envelope.
    pub fn unwrap_text_envelope(&mut self, text: &str) -> ProtocolResult<InnerPayload> {
        self.ensure_established()?;
        let wire = BASE64
            .decode(text.trim())
            .map_err(|e| ProtocolError::MalformedFrame(format!("invalid base64: {}", e)))?;
        self.unwrap_envelope(&wire)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Wipe the AuthKey and handshake state. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        // AuthKey zeroizes on drop
        self.auth_key = None;
        self.handshake = None;
        self.state = SessionState::Closed;
        debug!("Session {} closed", self.id);
    }

    /// Still handshaking after `timeout`
    pub fn handshake_expired(&self, timeout: Duration) -> bool {
        self.state == SessionState::Handshaking && self.created_at.elapsed() > timeout
    }

    /// No traffic for `timeout`
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    /// Get session age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Get idle time
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Update activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Snapshot of counters
    pub fn stats(&self) -> SessionStats {
        SessionStats::from(self)
    }

    fn record_sent(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
        self.touch();
    }

    fn record_received(&mut self, bytes: usize) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
        self.touch();
    }

    fn ensure_open(&self) -> ProtocolResult<()> {
        if self.state == SessionState::Closed {
            return Err(ProtocolError::SessionClosed);
        }
        Ok(())
    }

    fn ensure_established(&self) -> ProtocolResult<()> {
        match self.state {
            SessionState::Established => Ok(()),
            SessionState::Handshaking => Err(ProtocolError::NotEstablished),
            SessionState::Closed => Err(ProtocolError::SessionClosed),
        }
    }

    /// `unix_time * 2^32`, forced strictly increasing
    fn next_msg_id(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let fraction = ((now.subsec_nanos() as u64) << 32) / 1_000_000_000;
        let candidate = (now.as_secs() << 32) | fraction;

        let msg_id = candidate.max(self.last_msg_id.wrapping_add(1));
        self.last_msg_id = msg_id;
        msg_id
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("frames_sent", &self.frames_sent)
            .field("frames_received", &self.frames_received)
            .field("bytes_sent", &self.bytes_sent)
            .field("bytes_received", &self.bytes_received)
            .finish()
    }
}

/// Session statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub id: SessionId,
    pub role: Role,
    pub state: SessionState,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub age_secs: u64,
    pub idle_secs: u64,
}

impl From<&ConnectionSession> for SessionStats {
    fn from(session: &ConnectionSession) -> Self {
        Self {
            id: session.id,
            role: session.role,
            state: session.state,
            frames_sent: session.frames_sent,
            frames_received: session.frames_received,
            bytes_sent: session.bytes_sent,
            bytes_received: session.bytes_received,
            age_secs: session.age().as_secs(),
            idle_secs: session.idle_time().as_secs(),
        }
    }
}
