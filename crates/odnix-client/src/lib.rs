//! # Odnix Client
//!
//! Client library for connecting to Odnix gateways.
//!
//! ## Features
//!
//! - Async TCP connection with connect and handshake deadlines
//! - Diffie-Hellman handshake producing a per-connection AuthKey
//! - JSON records and TL RPC calls over encrypted wire frames
//!
//! ## Quick Start
//!
//! ```ignore
//! use odnix_client::{ClientConfig, ClientError, OdnixClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ClientError> {
//!     let config = ClientConfig::builder()
//!         .server_address("gateway.example.com:7443")
//!         .build()?;
//!
//!     let mut client = OdnixClient::connect(config).await?;
//!     client.send_json(&json!({"type": "ping"})).await?;
//!     let pong: serde_json::Value = client.recv_json().await?;
//!
//!     client.close().await
//! }
//! ```

pub mod config;
pub mod connection;
pub mod errors;

pub use config::*;
pub use connection::*;
pub use errors::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::connection::*;
    pub use crate::errors::*;
}

use odnix_protocol::{
    ApplicationMessage, ChannelFrame, ConnectionSession, HandshakeMessage, Inbound, RpcRequest,
    SessionId, SessionStats, TlObject,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Connected and ready
    Connected,
    /// Closed locally or by the gateway
    Disconnected,
}

/// Client for one gateway connection
pub struct OdnixClient {
    /// Client configuration
    config: ClientConfig,
    /// Framed channel
    connection: ServerConnection,
    /// Protocol session
    session: ConnectionSession,
    /// Current connection state
    state: ConnectionState,
}

impl OdnixClient {
    /// Connect to the gateway and complete the handshake
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let server_addr = config.resolve_server_address()?;
        debug!("Connecting to gateway at {}", server_addr);

        let connection = ServerConnection::connect(
            server_addr,
            config.connection_timeout(),
            config.max_frame_size,
        )
        .await?;

        let mut client = Self {
            session: ConnectionSession::client(config.session.clone()),
            config,
            connection,
            state: ConnectionState::Connecting,
        };

        let handshake = tokio::time::timeout(client.config.handshake_timeout(), client.handshake());
        let result = match handshake.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::HandshakeTimeout),
        };
        if let Err(e) = result {
            client.teardown().await;
            return Err(e);
        }

        client.state = ConnectionState::Connected;
        info!(
            "Connected to gateway at {} (session {})",
            server_addr,
            client.session.id()
        );
        Ok(client)
    }

    /// Run the client side of the handshake
    async fn handshake(&mut self) -> ClientResult<()> {
        let first = self.session.start_handshake()?;
        self.send_record(first).await?;

        while !self.session.is_established() {
            let text = match self.connection.receive().await? {
                Some(ChannelFrame::Text(text)) => text,
                Some(ChannelFrame::Binary(_)) => {
                    return Err(ClientError::UnexpectedFrame(
                        "binary frame during handshake".into(),
                    ))
                }
                None | Some(ChannelFrame::Close) => return Err(ClientError::Disconnected),
            };

            if let Inbound::Message(HandshakeMessage::Error { message }) =
                HandshakeMessage::classify(text.as_bytes())
            {
                return Err(ClientError::Rejected(message));
            }

            if let Some(reply) = self.session.begin_handshake(text.as_bytes())? {
                self.send_record(reply).await?;
            }
        }

        debug!("Handshake complete, session established");
        Ok(())
    }

    async fn send_record(&mut self, record: Vec<u8>) -> ClientResult<()> {
        let text = String::from_utf8(record)
            .map_err(|e| ClientError::UnexpectedFrame(e.to_string()))?;
        self.connection.send(&ChannelFrame::Text(text)).await
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the session is established
    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Connected && self.session.is_established()
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get session ID
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// Send raw application bytes
    pub async fn send(&mut self, data: &[u8]) -> ClientResult<()> {
        self.send_with_id(data).await.map(|_| ())
    }

    async fn send_with_id(&mut self, data: &[u8]) -> ClientResult<u64> {
        self.ensure_connected()?;
        let (msg_id, wire) = self.session.wrap_with_id(data)?;
        self.connection.send(&ChannelFrame::Binary(wire)).await?;
        Ok(msg_id)
    }

    /// Receive the next application payload.
    ///
    /// Not cancel safe: dropping the future mid-frame desynchronizes the
    /// channel. Use [`call`](Self::call) for bounded waits.
    pub async fn recv(&mut self) -> ClientResult<Vec<u8>> {
        self.ensure_connected()?;
        loop {
            match self.connection.receive().await? {
                Some(ChannelFrame::Binary(wire)) => return Ok(self.session.unwrap(&wire)?),
                Some(ChannelFrame::Text(text)) => {
                    if let Inbound::Message(HandshakeMessage::Error { message }) =
                        HandshakeMessage::classify(text.as_bytes())
                    {
                        self.teardown().await;
                        return Err(ClientError::Rejected(message));
                    }
                    debug!("Ignoring text frame after handshake");
                }
                None | Some(ChannelFrame::Close) => {
                    self.teardown().await;
                    return Err(ClientError::Disconnected);
                }
            }
        }
    }

    /// Send a JSON record
    pub async fn send_json<T: Serialize>(&mut self, value: &T) -> ClientResult<()> {
        let bytes = serde_json::to_vec(value).map_err(odnix_protocol::ProtocolError::from)?;
        self.send(&bytes).await
    }

    /// Receive the next payload as a JSON record
    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> ClientResult<T> {
        let bytes = self.recv().await?;
        Ok(serde_json::from_slice(&bytes).map_err(odnix_protocol::ProtocolError::from)?)
    }

    /// TL RPC call: send `RpcRequest` and wait for the matching `RpcResult`.
    ///
    /// Unrelated payloads that arrive first are skipped. A timeout may land
    /// in the middle of a frame, so it also closes the connection.
    pub async fn call(&mut self, method: &str, params: Value) -> ClientResult<Value> {
        let request = RpcRequest::new(method, params);
        let req_msg_id = self.send_with_id(&request.to_bytes()?).await?;

        let deadline = self.config.request_timeout();
        match tokio::time::timeout(deadline, self.wait_for_result(req_msg_id, method)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("No result for {} within {:?}, closing", method, deadline);
                self.teardown().await;
                Err(ClientError::Timeout)
            }
        }
    }

    async fn wait_for_result(&mut self, req_msg_id: u64, method: &str) -> ClientResult<Value> {
        loop {
            let payload = self.recv().await?;
            match ApplicationMessage::decode(&payload) {
                Ok(ApplicationMessage::RpcResult(result)) if result.req_msg_id == req_msg_id => {
                    return Ok(result.result)
                }
                _ => debug!("Skipping payload while waiting for {}", method),
            }
        }
    }

    /// Close the connection and wipe the session key
    pub async fn close(&mut self) -> ClientResult<()> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }
        self.connection.send(&ChannelFrame::Close).await.ok();
        self.teardown().await;
        info!("Disconnected from gateway");
        Ok(())
    }

    async fn teardown(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.session.close();
        if let Err(e) = self.connection.shutdown().await {
            debug!("Shutdown failed: {}", e);
        }
    }

    fn ensure_connected(&self) -> ClientResult<()> {
        match self.state {
            ConnectionState::Connected => Ok(()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Get client statistics
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            state: self.state,
            connection: self.connection.info().clone(),
            session: self.session.stats(),
        }
    }
}

/// Client statistics
#[derive(Debug, Clone)]
pub struct ClientStats {
    /// Current state
    pub state: ConnectionState,
    /// Channel counters
    pub connection: ConnectionInfo,
    /// Session counters
    pub session: SessionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use odnix_protocol::{read_frame, write_frame, RpcResult, SessionConfig, DEFAULT_MAX_FRAME_SIZE};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    /// Minimal in-test gateway: handshake, then answer with `respond`.
    async fn fake_gateway<F>(listener: TcpListener, respond: F)
    where
        F: Fn(&[u8], u64) -> Option<Vec<u8>>,
    {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let mut session = ConnectionSession::server(SessionConfig::default());

        while let Some(frame) = read_frame(&mut reader, DEFAULT_MAX_FRAME_SIZE).await.unwrap() {
            match frame {
                ChannelFrame::Text(text) => {
                    if let Some(reply) = session.begin_handshake(text.as_bytes()).unwrap() {
                        let reply = ChannelFrame::Text(String::from_utf8(reply).unwrap());
                        write_frame(&mut writer, &reply).await.unwrap();
                    }
                }
                ChannelFrame::Binary(wire) => {
                    let envelope = session.unwrap_envelope(&wire).unwrap();
                    if let Some(reply) = respond(&envelope.data, envelope.msg_id) {
                        let wire = session.wrap(&reply).unwrap();
                        write_frame(&mut writer, &ChannelFrame::Binary(wire)).await.unwrap();
                    }
                }
                ChannelFrame::Close => break,
            }
        }
    }

    fn config_for(addr: std::net::SocketAddr) -> ClientConfig {
        ClientConfig::builder()
            .server_address(addr.to_string())
            .handshake_timeout(5)
            .request_timeout(5)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_echo_json() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(fake_gateway(listener, |data, _| Some(data.to_vec())));

        let mut client = OdnixClient::connect(config_for(addr)).await.unwrap();
        assert!(client.is_established());

        client.send_json(&json!({"type": "ping"})).await.unwrap();
        let echoed: Value = client.recv_json().await.unwrap();
        assert_eq!(echoed, json!({"type": "ping"}));

        let stats = client.stats();
        assert_eq!(stats.session.frames_sent, 1);
        assert_eq!(stats.session.frames_received, 1);

        client.close().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_call_skips_unrelated_payloads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            let mut session = ConnectionSession::server(SessionConfig::default());

            while let Some(frame) = read_frame(&mut reader, DEFAULT_MAX_FRAME_SIZE).await.unwrap() {
                match frame {
                    ChannelFrame::Text(text) => {
                        if let Some(reply) = session.begin_handshake(text.as_bytes()).unwrap() {
                            let reply = ChannelFrame::Text(String::from_utf8(reply).unwrap());
                            write_frame(&mut writer, &reply).await.unwrap();
                        }
                    }
                    ChannelFrame::Binary(wire) => {
                        let envelope = session.unwrap_envelope(&wire).unwrap();
                        // Unrelated record first, then the result
                        let noise = session.wrap(br#"{"type":"typing_update"}"#).unwrap();
                        write_frame(&mut writer, &ChannelFrame::Binary(noise)).await.unwrap();

                        let result = RpcResult {
                            req_msg_id: envelope.msg_id,
                            result: json!({"ok": true}),
                        };
                        let wire = session.wrap(&result.to_bytes().unwrap()).unwrap();
                        write_frame(&mut writer, &ChannelFrame::Binary(wire)).await.unwrap();
                    }
                    ChannelFrame::Close => break,
                }
            }
        });

        let mut client = OdnixClient::connect(config_for(addr)).await.unwrap();
        let result = client.call("messages.send", json!({"text": "hi"})).await.unwrap();
        assert_eq!(result, json!({"ok": true}));

        client.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_call_timeout_mid_frame_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            let mut session = ConnectionSession::server(SessionConfig::default());

            while let Some(frame) = read_frame(&mut reader, DEFAULT_MAX_FRAME_SIZE).await.unwrap() {
                match frame {
                    ChannelFrame::Text(text) => {
                        if let Some(reply) = session.begin_handshake(text.as_bytes()).unwrap() {
                            let reply = ChannelFrame::Text(String::from_utf8(reply).unwrap());
                            write_frame(&mut writer, &reply).await.unwrap();
                        }
                    }
                    ChannelFrame::Binary(wire) => {
                        let envelope = session.unwrap_envelope(&wire).unwrap();
                        let result = RpcResult {
                            req_msg_id: envelope.msg_id,
                            result: json!({"late": true}),
                        };
                        let wire = session.wrap(&result.to_bytes().unwrap()).unwrap();
                        let bytes = ChannelFrame::Binary(wire).to_bytes();

                        // First bytes of the frame, then stall past the deadline
                        writer.write_all(&bytes[..3]).await.unwrap();
                        writer.flush().await.unwrap();
                        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
                        writer.write_all(&bytes[3..]).await.ok();
                        break;
                    }
                    ChannelFrame::Close => break,
                }
            }
        });

        let config = ClientConfig::builder()
            .server_address(addr.to_string())
            .handshake_timeout(5)
            .request_timeout(1)
            .build()
            .unwrap();
        let mut client = OdnixClient::connect(config).await.unwrap();

        let result = client.call("echo", json!({})).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(client.recv().await, Err(ClientError::NotConnected)));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and stay silent
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            drop(stream);
        });

        let config = ClientConfig::builder()
            .server_address(addr.to_string())
            .handshake_timeout(1)
            .build()
            .unwrap();
        let result = OdnixClient::connect(config).await;
        assert!(matches!(result, Err(ClientError::HandshakeTimeout)));
        server.abort();
    }

    #[tokio::test]
    async fn test_rejected_by_error_record() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _): (TcpStream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            read_frame(&mut reader, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
            let record = HandshakeMessage::error("server full").to_json().unwrap();
            let frame = ChannelFrame::Text(String::from_utf8(record).unwrap());
            write_frame(&mut writer, &frame).await.unwrap();
        });

        match OdnixClient::connect(config_for(addr)).await {
            Err(ClientError::Rejected(message)) => assert!(message.contains("server full")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connection should be rejected"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_gateway_close_is_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(fake_gateway(listener, |_, _| None));

        let mut client = OdnixClient::connect(config_for(addr)).await.unwrap();
        client.send(b"no answer").await.unwrap();
        client.connection.send(&ChannelFrame::Close).await.unwrap();
        server.await.unwrap();

        assert!(matches!(client.recv().await, Err(ClientError::Disconnected)));
        assert!(matches!(client.send(b"late").await, Err(ClientError::NotConnected)));
    }
}
