//! TCP Listener
//!
//! Accepts incoming connections with socket configuration.

use crate::config::GatewayConfig;
use crate::errors::GatewayError;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

const LISTEN_BACKLOG: i32 = 1024;
const SOCKET_BUFFER_SIZE: usize = 256 * 1024;

/// TCP listener for the gateway
pub struct GatewayListener {
    /// The underlying listener
    listener: TcpListener,
    /// Local address
    local_addr: SocketAddr,
}

impl GatewayListener {
    /// Bind to the configured address
    pub async fn bind(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let addr = config.socket_addr()?;
        let bind_failed = |e: std::io::Error| GatewayError::BindFailed {
            address: addr.to_string(),
            reason: e.to_string(),
        };

        // Create socket with socket2 for advanced options
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_failed)?;

        socket.set_reuse_address(true).ok();
        socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE).ok();
        socket.set_send_buffer_size(SOCKET_BUFFER_SIZE).ok();
        socket.set_nonblocking(true).map_err(bind_failed)?;

        socket.bind(&addr.into()).map_err(bind_failed)?;
        socket.listen(LISTEN_BACKLOG).map_err(bind_failed)?;

        // Convert to tokio listener
        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;

        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept a connection
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), GatewayError> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true).ok();
        Ok((stream, addr))
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
