//! Protocol Error Types

use thiserror::Error;

use crate::constants::ErrorCode;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Malformed or out-of-order handshake message
    #[error("Handshake protocol error: {0}")]
    HandshakeProtocol(String),

    /// Payload operation before the AuthKey exists
    #[error("Session not established")]
    NotEstablished,

    /// Frame too short, inconsistent length, or bad padding
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Recomputed message key differs from the received one
    #[error("Message key mismatch")]
    IntegrityMismatch,

    /// Frame auth key id does not belong to this session
    #[error("Unknown auth key id: {0}")]
    UnknownAuthKey(String),

    /// Session was closed and its key wiped
    #[error("Session closed")]
    SessionClosed,

    /// Handshake did not finish in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Payload or frame above the configured limit
    #[error("Payload too large: got {got} bytes, max is {max}")]
    PayloadTooLarge { got: usize, max: usize },

    /// Unknown channel frame kind
    #[error("Unknown frame kind: 0x{0:02x}")]
    UnknownFrameKind(u8),

    /// Invalid TL-encoded service message
    #[error("Invalid TL object: {0}")]
    InvalidTl(String),

    /// Crypto error from odnix-crypto
    #[error("Crypto error: {0}")]
    Crypto(#[from] odnix_crypto::CryptoError),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Stable error code for logging
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            ProtocolError::HandshakeProtocol(_) => ErrorCode::HandshakeFailed,
            ProtocolError::NotEstablished => ErrorCode::NotEstablished,
            ProtocolError::MalformedFrame(_) => ErrorCode::MalformedFrame,
            ProtocolError::IntegrityMismatch => ErrorCode::IntegrityMismatch,
            ProtocolError::UnknownAuthKey(_) => ErrorCode::UnknownAuthKey,
            ProtocolError::SessionClosed => ErrorCode::SessionClosed,
            ProtocolError::HandshakeTimeout => ErrorCode::HandshakeTimeout,
            ProtocolError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            ProtocolError::UnknownFrameKind(_) => ErrorCode::MalformedFrame,
            ProtocolError::InvalidTl(_) => ErrorCode::MalformedFrame,
            _ => ErrorCode::Unknown,
        }
    }

    /// Whether the frame can be discarded and the connection kept open
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedFrame(_)
                | ProtocolError::IntegrityMismatch
                | ProtocolError::UnknownAuthKey(_)
                | ProtocolError::InvalidTl(_)
                | ProtocolError::Json(_)
        )
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
