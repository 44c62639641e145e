//! # Odnix Gateway
//!
//! TCP gateway terminating Odnix secure transport connections.
//!
//! ## Features
//!
//! - socket2-tuned TCP listener
//! - Diffie-Hellman handshake under a deadline
//! - AES-256-IGE wire frames with message key verification
//! - Connection limit, idle timeout and malformed-frame budget
//! - Pluggable [`PayloadHandler`] for application records
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Odnix Gateway                        │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ TCP Listener│──│  Registry    │──│ PayloadHandler  │  │
//! │  └─────────────┘  └──────────────┘  └─────────────────┘  │
//! │         │                                    ▲           │
//! │         ▼                                    │           │
//! │  ┌──────────────────────────────────────────────────┐   │
//! │  │ Connection task: frames → ConnectionSession       │   │
//! │  │ (handshake, unwrap, wrap)                         │   │
//! │  └──────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod connection;
pub mod errors;
pub mod handler;
pub mod listener;
pub mod registry;
pub mod transport;

pub use config::*;
pub use connection::*;
pub use errors::*;
pub use handler::*;
pub use listener::*;
pub use registry::*;
pub use transport::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::connection::*;
    pub use crate::errors::*;
    pub use crate::handler::*;
    pub use crate::listener::*;
    pub use crate::registry::*;
    pub use crate::transport::*;
}

use odnix_protocol::{ChannelFrame, HandshakeMessage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Gateway server
#[derive(Clone)]
pub struct OdnixGateway {
    /// Gateway configuration
    config: Arc<GatewayConfig>,
    /// Live connections
    registry: SharedRegistry,
    /// Application handler
    handler: Arc<dyn PayloadHandler>,
    /// Running state
    running: Arc<AtomicBool>,
    /// Wakes the accept loop on stop
    shutdown: Arc<Notify>,
    /// Tells live connections to close on stop
    stop_connections: Arc<watch::Sender<bool>>,
    /// Construction time
    started_at: Instant,
}

impl OdnixGateway {
    /// Create a gateway with the built-in echo handler
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_handler(config, Arc::new(EchoHandler))
    }

    /// Create a gateway with a custom handler
    pub fn with_handler(config: GatewayConfig, handler: Arc<dyn PayloadHandler>) -> Self {
        let registry = ConnectionRegistry::shared(config.max_connections);

        Self {
            config: Arc::new(config),
            registry,
            handler,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            stop_connections: Arc::new(watch::channel(false).0),
            started_at: Instant::now(),
        }
    }

    /// Create gateway with default configuration
    pub fn with_defaults() -> Self {
        Self::new(GatewayConfig::default())
    }

    /// Get gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Check if gateway is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the configured address
    pub async fn bind(&self) -> GatewayResult<GatewayListener> {
        GatewayListener::bind(&self.config).await
    }

    /// Bind and serve until stopped
    pub async fn start(&self) -> GatewayResult<()> {
        let listener = self.bind().await?;
        self.run(listener).await
    }

    /// Serve connections from an already bound listener until stopped
    pub async fn run(&self, listener: GatewayListener) -> GatewayResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::AlreadyRunning);
        }
        self.stop_connections.send_replace(false);

        info!("Gateway listening on {}", listener.local_addr());

        while self.is_running() {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = self.shutdown.notified() => break,
            };

            match accepted {
                Ok((stream, addr)) => {
                    let transport = TcpConnection::from_tcp(stream, self.config.max_frame_size);
                    let gateway = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = gateway.serve(transport, addr).await {
                            debug!("Connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Gateway stopped");
        Ok(())
    }

    /// Serve one connection over any frame transport.
    ///
    /// Registers the connection, runs it to completion and deregisters it.
    /// Over the connection limit the peer gets an error record and a close.
    pub async fn serve<T>(&self, mut transport: T, remote_addr: SocketAddr) -> GatewayResult<()>
    where
        T: FrameTransport + 'static,
    {
        let registered = self.registry.write().await.register(remote_addr);
        let id = match registered {
            Ok(id) => id,
            Err(e) => {
                warn!("Rejecting {}: {}", remote_addr, e);
                reject(&mut transport, &e).await;
                return Err(e);
            }
        };

        Connection::new(
            id,
            remote_addr,
            transport,
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            Arc::clone(&self.handler),
            self.stop_connections.subscribe(),
        )
        .run()
        .await
    }

    /// Stop accepting and close every live connection
    pub fn stop(&self) {
        info!("Stopping Odnix gateway");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
        self.stop_connections.send_replace(true);
    }

    /// Get the running flag for external shutdown handling
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Get live connection count
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.active_count()
    }

    /// Get gateway statistics
    pub async fn stats(&self) -> GatewayStats {
        let registry = self.registry.read().await;
        GatewayStats {
            active_connections: registry.active_count(),
            established_sessions: registry.established_count(),
            total_accepted: registry.total_accepted(),
            total_rejected: registry.total_rejected(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

async fn reject<T: FrameTransport>(transport: &mut T, reason: &GatewayError) {
    let record = HandshakeMessage::error(reason).to_json().ok();
    if let Some(text) = record.and_then(|r| String::from_utf8(r).ok()) {
        transport.send(&ChannelFrame::Text(text)).await.ok();
    }
    transport.send(&ChannelFrame::Close).await.ok();
    transport.close().await.ok();
}

/// Gateway statistics
#[derive(Debug, Clone)]
pub struct GatewayStats {
    /// Live connections
    pub active_connections: usize,
    /// Live connections past the handshake
    pub established_sessions: usize,
    /// Total connections accepted
    pub total_accepted: u64,
    /// Total connections rejected at the limit
    pub total_rejected: u64,
    /// Gateway uptime in seconds
    pub uptime_secs: u64,
}
