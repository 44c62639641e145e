//! Client Configuration
//!
//! Configuration types and defaults for the client.

use crate::errors::ClientError;
use odnix_protocol::{SessionConfig, DEFAULT_MAX_FRAME_SIZE, HANDSHAKE_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Gateway address (host:port)
    pub server_address: String,

    /// Maximum channel frame size
    pub max_frame_size: usize,

    /// TCP connect timeout in seconds
    pub connection_timeout_secs: u64,

    /// Handshake timeout in seconds
    pub handshake_timeout_secs: u64,

    /// How long `call` waits for its result, in seconds
    pub request_timeout_secs: u64,

    /// Per-session protocol settings
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:7443".to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connection_timeout_secs: 10,
            handshake_timeout_secs: HANDSHAKE_TIMEOUT_SECS,
            request_timeout_secs: 30,
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Resolve the server address to a SocketAddr
    pub fn resolve_server_address(&self) -> Result<SocketAddr, ClientError> {
        self.server_address
            .to_socket_addrs()
            .map_err(|e| ClientError::DnsResolutionFailed {
                host: self.server_address.clone(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| ClientError::InvalidAddress(self.server_address.clone()))
    }

    /// Connect deadline
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Handshake deadline
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// RPC deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.server_address.is_empty() {
            return Err(ClientError::Config("Server address is required".into()));
        }

        if self.max_frame_size < 64 {
            return Err(ClientError::Config(
                "Max frame size must be at least 64".into(),
            ));
        }

        if self.handshake_timeout_secs == 0 {
            return Err(ClientError::Config("Handshake timeout cannot be 0".into()));
        }

        if self.connection_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "Connection and request timeouts cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Configuration builder
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set server address
    pub fn server_address(mut self, addr: impl Into<String>) -> Self {
        self.config.server_address = addr.into();
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, secs: u64) -> Self {
        self.config.connection_timeout_secs = secs;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, secs: u64) -> Self {
        self.config.handshake_timeout_secs = secs;
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set session settings
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_address, "127.0.0.1:7443");
        assert!(config.session.verify_message_key);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .server_address("10.0.0.1:8080")
            .handshake_timeout(3)
            .request_timeout(4)
            .build()
            .unwrap();

        assert_eq!(config.server_address, "10.0.0.1:8080");
        assert_eq!(config.handshake_timeout(), Duration::from_secs(3));
        assert_eq!(config.request_timeout(), Duration::from_secs(4));
    }

    #[test]
    fn test_config_validation() {
        assert!(ClientConfig::builder().server_address("").build().is_err());
        assert!(ClientConfig::builder().handshake_timeout(0).build().is_err());
        assert!(ClientConfig::builder().max_frame_size(10).build().is_err());
    }

    #[test]
    fn test_resolve_address() {
        let config = ClientConfig::builder()
            .server_address("127.0.0.1:7443")
            .build()
            .unwrap();

        let addr = config.resolve_server_address().unwrap();
        assert_eq!(addr.port(), 7443);
    }

    #[test]
    fn test_resolve_invalid_address() {
        let config = ClientConfig::builder()
            .server_address("no-port-here")
            .build()
            .unwrap();
        assert!(config.resolve_server_address().is_err());
    }
}
