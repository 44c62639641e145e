//! Gateway Errors
//!
//! Error types for the gateway.

use odnix_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Gateway is already running
    #[error("Gateway is already running")]
    AlreadyRunning,

    /// Failed to bind to address
    #[error("Failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error from odnix-protocol
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Handshake did not complete before the deadline
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// No traffic before the idle deadline
    #[error("Connection idle for too long")]
    IdleTimeout,

    /// Connection limit reached
    #[error("Maximum connections ({max}) reached")]
    ConnectionLimitReached { max: usize },

    /// Peer kept sending undecodable frames
    #[error("Too many malformed frames ({0})")]
    TooManyMalformedFrames(u32),

    /// Peer went away before the handshake finished
    #[error("Connection closed during handshake")]
    ClosedDuringHandshake,

    /// Application handler failure
    #[error("Handler error: {0}")]
    Handler(String),
}

impl GatewayError {
    /// Stable error code for logging
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            GatewayError::Protocol(e) => e.to_error_code(),
            GatewayError::HandshakeTimeout => ErrorCode::HandshakeTimeout,
            GatewayError::ConnectionLimitReached { .. } => ErrorCode::ServerFull,
            GatewayError::TooManyMalformedFrames(_) => ErrorCode::MalformedFrame,
            GatewayError::ClosedDuringHandshake => ErrorCode::HandshakeFailed,
            _ => ErrorCode::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_conversion() {
        let err: GatewayError = ProtocolError::IntegrityMismatch.into();
        assert!(matches!(err, GatewayError::Protocol(ProtocolError::IntegrityMismatch)));
        assert_eq!(err.to_error_code(), ErrorCode::IntegrityMismatch);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GatewayError::HandshakeTimeout.to_error_code(),
            ErrorCode::HandshakeTimeout
        );
        assert_eq!(
            GatewayError::ConnectionLimitReached { max: 1 }.to_error_code(),
            ErrorCode::ServerFull
        );
    }
}
