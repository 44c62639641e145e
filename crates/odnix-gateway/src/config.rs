//! Gateway Configuration
//!
//! Configuration types and defaults for the gateway.

use odnix_protocol::{
    SessionConfig, DEFAULT_MAX_FRAME_SIZE, HANDSHAKE_TIMEOUT_SECS, SESSION_IDLE_TIMEOUT_SECS,
    WIRE_HEADER_SIZE,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address
    pub bind_address: String,

    /// Bind port (0 lets the OS pick one)
    pub bind_port: u16,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Maximum channel frame size
    pub max_frame_size: usize,

    /// Handshake timeout in seconds
    pub handshake_timeout_secs: u64,

    /// Idle timeout in seconds for established sessions
    pub idle_timeout_secs: u64,

    /// Undecodable frames tolerated before the connection is dropped
    pub max_malformed_frames: u32,

    /// Log level
    pub log_level: String,

    /// Per-session protocol settings
    pub session: SessionConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 7443,
            max_connections: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            handshake_timeout_secs: HANDSHAKE_TIMEOUT_SECS,
            idle_timeout_secs: SESSION_IDLE_TIMEOUT_SECS,
            max_malformed_frames: 8,
            log_level: "info".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Get the bind socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_address, self.bind_port)
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "invalid bind address {}:{}",
                    self.bind_address, self.bind_port
                ))
            })
    }

    /// Handshake deadline
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Idle deadline
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "max_connections cannot be 0".into(),
            ));
        }

        // Kind byte, wire header and one cipher block
        let min_frame = 1 + WIRE_HEADER_SIZE + 16;
        if self.max_frame_size < min_frame {
            return Err(ConfigError::InvalidValue(format!(
                "max_frame_size must be at least {}",
                min_frame
            )));
        }

        if self.handshake_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "handshake_timeout_secs cannot be 0".into(),
            ));
        }

        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "idle_timeout_secs cannot be 0".into(),
            ));
        }

        if self.session.max_payload_size == 0 {
            return Err(ConfigError::InvalidValue(
                "session.max_payload_size cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Configuration builder
#[derive(Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_address = addr.into();
        self
    }

    /// Set bind port
    pub fn bind_port(mut self, port: u16) -> Self {
        self.config.bind_port = port;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, secs: u64) -> Self {
        self.config.handshake_timeout_secs = secs;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, secs: u64) -> Self {
        self.config.idle_timeout_secs = secs;
        self
    }

    /// Set malformed-frame budget
    pub fn max_malformed_frames(mut self, max: u32) -> Self {
        self.config.max_malformed_frames = max;
        self
    }

    /// Set session settings
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<GatewayConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
