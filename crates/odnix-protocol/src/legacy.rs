//! Nonce-Only Handshake
//!
//! Binary shortcut spoken by early clients:
//!
//! ```text
//! client: 0x01 | client_nonce (16)
//! server: 0x02 | client_nonce (16) | server_nonce (16)
//!
//! auth_key = SHA-256(client_nonce || server_nonce)
//! ```
//!
//! Both nonces cross the wire in clear, so anyone who sees the exchange can
//! compute the AuthKey. Only compiled with the `insecure-nonce-handshake`
//! feature and never reachable from the Diffie-Hellman path.

use odnix_core::NONCE_SIZE;
use odnix_crypto::{AuthKey, OdnixHash};
use rand::RngCore;
use tracing::warn;

use crate::errors::{ProtocolError, ProtocolResult};
use crate::session::{ConnectionSession, SessionConfig};

/// Client request opcode
pub const OP_REQUEST: u8 = 0x01;

/// Server reply opcode
pub const OP_REPLY: u8 = 0x02;

const REQUEST_SIZE: usize = 1 + NONCE_SIZE;
const REPLY_SIZE: usize = 1 + 2 * NONCE_SIZE;

fn derive(client_nonce: &[u8], server_nonce: &[u8]) -> AuthKey {
    AuthKey::from_bytes(OdnixHash::sha256_many(&[client_nonce, server_nonce]))
}

/// Answer a nonce-only request.
///
/// Returns the reply bytes and an established server session.
pub fn accept(request: &[u8], config: SessionConfig) -> ProtocolResult<(Vec<u8>, ConnectionSession)> {
    if request.len() < REQUEST_SIZE || request[0] != OP_REQUEST {
        return Err(ProtocolError::HandshakeProtocol(
            "not a nonce-only request".into(),
        ));
    }
    warn!("Accepting insecure nonce-only handshake; the AuthKey is recoverable by observers");

    let client_nonce = &request[1..REQUEST_SIZE];
    let mut server_nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut server_nonce);

    let mut reply = Vec::with_capacity(REPLY_SIZE);
    reply.push(OP_REPLY);
    reply.extend_from_slice(client_nonce);
    reply.extend_from_slice(&server_nonce);

    let mut session = ConnectionSession::server(config);
    session.install_auth_key(derive(client_nonce, &server_nonce));
    Ok((reply, session))
}

/// Client side of the nonce-only exchange
pub struct LegacyClient {
    nonce: [u8; NONCE_SIZE],
}

impl LegacyClient {
    pub fn new() -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self { nonce }
    }

    /// Request bytes
    pub fn request(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REQUEST_SIZE);
        buf.push(OP_REQUEST);
        buf.extend_from_slice(&self.nonce);
        buf
    }

    /// Consume the server reply and return an established client session.
    pub fn finish(self, reply: &[u8], config: SessionConfig) -> ProtocolResult<ConnectionSession> {
        if reply.len() < REPLY_SIZE || reply[0] != OP_REPLY {
            return Err(ProtocolError::HandshakeProtocol(
                "not a nonce-only reply".into(),
            ));
        }
        if reply[1..1 + NONCE_SIZE] != self.nonce {
            return Err(ProtocolError::HandshakeProtocol("nonce mismatch".into()));
        }
        warn!("Completing insecure nonce-only handshake");

        let mut session = ConnectionSession::client(config);
        session.install_auth_key(derive(&self.nonce, &reply[1 + NONCE_SIZE..REPLY_SIZE]));
        Ok(session)
    }
}

impl Default for LegacyClient {
    fn default() -> Self {
        Self::new()
    }
}
