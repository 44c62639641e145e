//! Client Errors
//!
//! Error types for the client.

use odnix_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Not connected
    #[error("Not connected to server")]
    NotConnected,

    /// Connection failed
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// Handshake timeout
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error from odnix-protocol
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid server address
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    /// DNS resolution failed
    #[error("DNS resolution failed for {host}: {reason}")]
    DnsResolutionFailed { host: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Gateway answered with an error record
    #[error("Server rejected connection: {0}")]
    Rejected(String),

    /// Gateway closed the channel
    #[error("Server closed the connection")]
    Disconnected,

    /// Frame that makes no sense at this point
    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// Timeout
    #[error("Operation timed out")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_conversion() {
        let err: ClientError = ProtocolError::NotEstablished.into();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::NotEstablished)));
        assert_eq!(err.to_string(), "Protocol error: Session not established");
    }
}
