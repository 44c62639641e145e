//! Connection Task
//!
//! One task per accepted connection. The task owns its `ConnectionSession`,
//! runs the handshake under a deadline, then unwraps frames in arrival order
//! and hands payloads to the configured [`PayloadHandler`].

use odnix_protocol::{
    ChannelFrame, ConnectionSession, HandshakeMessage, InnerPayload, ProtocolError,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::handler::{PayloadHandler, RequestContext};
use crate::registry::{ConnectionId, SharedRegistry};
use crate::transport::FrameTransport;

/// How an inbound frame was carried, so replies go back the same way
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Carrier {
    Binary,
    Text,
}

/// A live connection and its session
pub struct Connection<T: FrameTransport> {
    id: ConnectionId,
    remote_addr: SocketAddr,
    transport: T,
    session: ConnectionSession,
    config: Arc<GatewayConfig>,
    registry: SharedRegistry,
    handler: Arc<dyn PayloadHandler>,
    stop: watch::Receiver<bool>,
    malformed_frames: u32,
}

impl<T: FrameTransport> Connection<T> {
    /// Create a connection already registered under `id`
    pub fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        transport: T,
        config: Arc<GatewayConfig>,
        registry: SharedRegistry,
        handler: Arc<dyn PayloadHandler>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let session = ConnectionSession::server(config.session.clone());
        Self {
            id,
            remote_addr,
            transport,
            session,
            config,
            registry,
            handler,
            stop,
            malformed_frames: 0,
        }
    }

    /// Serve until the peer leaves, a deadline fires, the gateway stops or a
    /// fatal error occurs.
    ///
    /// The session is closed and deregistered on every path.
    pub async fn run(mut self) -> GatewayResult<()> {
        info!(
            "Connection {} from {} (session {})",
            self.id,
            self.transport.peer_addr(),
            self.session.id()
        );

        let mut stop = self.stop.clone();
        let served = tokio::select! {
            result = self.serve() => Some(result),
            _ = stop_requested(&mut stop) => None,
        };
        let result = served.unwrap_or_else(|| {
            info!("Connection {} closing, gateway stopping", self.id);
            Ok(())
        });
        self.shutdown(&result).await;
        result
    }

    async fn serve(&mut self) -> GatewayResult<()> {
        match timeout(self.config.handshake_timeout(), self.handshake()).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                self.send_handshake_error("handshake timed out").await;
                return Err(GatewayError::HandshakeTimeout);
            }
        }
        self.sync_registry().await;

        loop {
            let frame = match timeout(self.config.idle_timeout(), self.transport.receive()).await {
                Ok(frame) => frame?,
                Err(_) => return Err(GatewayError::IdleTimeout),
            };

            match frame {
                None | Some(ChannelFrame::Close) => return Ok(()),
                Some(ChannelFrame::Binary(wire)) => {
                    let envelope = self.session.unwrap_envelope(&wire);
                    self.on_payload(envelope, Carrier::Binary).await?;
                }
                Some(ChannelFrame::Text(text)) if looks_like_record(&text) => {
                    // Late handshake records are fatal, anything else is ignored
                    if self.session.begin_handshake(text.as_bytes())?.is_none() {
                        debug!("Connection {} ignored text record", self.id);
                    }
                }
                Some(ChannelFrame::Text(text)) => {
                    let envelope = self.session.unwrap_text_envelope(&text);
                    self.on_payload(envelope, Carrier::Text).await?;
                }
            }
            self.sync_registry().await;
        }
    }

    /// Returns `false` if the peer left before the handshake finished.
    async fn handshake(&mut self) -> GatewayResult<bool> {
        while !self.session.is_established() {
            match self.transport.receive().await? {
                None | Some(ChannelFrame::Close) => {
                    debug!("Connection {} closed during handshake", self.id);
                    return Ok(false);
                }
                Some(ChannelFrame::Text(text)) => {
                    if let Some(reply) = self.session.begin_handshake(text.as_bytes())? {
                        self.send_text(reply).await?;
                    }
                }
                Some(ChannelFrame::Binary(_)) => {
                    self.record_malformed(&ProtocolError::NotEstablished).await?
                }
            }
        }

        info!(
            "Connection {} handshake complete (session {})",
            self.id,
            self.session.id()
        );
        Ok(true)
    }

    async fn on_payload(
        &mut self,
        envelope: Result<InnerPayload, ProtocolError>,
        carrier: Carrier,
    ) -> GatewayResult<()> {
        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(e) if e.is_recoverable() => return self.record_malformed(&e).await,
            Err(e) => return Err(e.into()),
        };

        let ctx = RequestContext {
            connection_id: self.id,
            remote_addr: self.remote_addr,
            session_id: self.session.id(),
        };

        let reply = match self.handler.handle(&ctx, &envelope).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Ok(()),
            Err(GatewayError::Protocol(e)) if e.is_recoverable() => {
                return self.record_malformed(&e).await
            }
            Err(e) => return Err(e),
        };

        let frame = match carrier {
            Carrier::Binary => ChannelFrame::Binary(self.session.wrap(&reply)?),
            Carrier::Text => ChannelFrame::Text(self.session.wrap_text(&reply)?),
        };
        self.sync_registry().await;
        self.transport.send(&frame).await
    }

    async fn record_malformed(&mut self, err: &ProtocolError) -> GatewayResult<()> {
        self.malformed_frames += 1;
        self.registry.write().await.record_malformed(self.id);
        warn!(
            "Connection {} dropped frame ({:?}): {}",
            self.id,
            err.to_error_code(),
            err
        );

        if self.malformed_frames > self.config.max_malformed_frames {
            return Err(GatewayError::TooManyMalformedFrames(self.malformed_frames));
        }
        Ok(())
    }

    async fn send_text(&mut self, record: Vec<u8>) -> GatewayResult<()> {
        let text = String::from_utf8(record)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        self.transport.send(&ChannelFrame::Text(text)).await
    }

    async fn send_handshake_error(&mut self, reason: &str) {
        let sent = match HandshakeMessage::error(reason).to_json() {
            Ok(record) => self.send_text(record).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            debug!("Connection {} could not send error record: {}", self.id, e);
        }
    }

    async fn sync_registry(&mut self) {
        let stats = self.session.stats();
        self.registry.write().await.update_session(self.id, stats);
    }

    async fn shutdown(&mut self, result: &GatewayResult<()>) {
        let stats = self.session.stats();
        match result {
            Ok(()) => info!(
                "Connection {} closed ({} frames in, {} out)",
                self.id, stats.frames_received, stats.frames_sent
            ),
            Err(GatewayError::IdleTimeout) => info!("Connection {} idle, closing", self.id),
            Err(e) => warn!(
                "Connection {} closed with error ({:?}): {}",
                self.id,
                e.to_error_code(),
                e
            ),
        }

        if let Err(e) = self.transport.send(&ChannelFrame::Close).await {
            debug!("Connection {} close frame not sent: {}", self.id, e);
        }
        if let Err(e) = self.transport.close().await {
            debug!("Connection {} shutdown failed: {}", self.id, e);
        }

        self.session.close();
        self.registry.write().await.remove(self.id);
    }
}

/// Resolves once the gateway asks connections to stop.
///
/// A dropped sender never resolves.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopping| *stopping).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// JSON object rather than base64 wire bytes
fn looks_like_record(text: &str) -> bool {
    text.trim_start().starts_with('{')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EchoHandler;
    use crate::registry::ConnectionRegistry;
    use crate::transport::FramedConnection;
    use odnix_protocol::{
        read_frame, write_frame, SessionConfig, SessionState, DEFAULT_MAX_FRAME_SIZE,
    };
    use serde_json::{json, Value};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    type Peer = (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>);

    fn spawn_connection(
        config: GatewayConfig,
    ) -> (
        Peer,
        SharedRegistry,
        tokio::task::JoinHandle<GatewayResult<()>>,
    ) {
        // Dropped sender: the connection never sees a stop request
        let (_, stop) = watch::channel(false);
        spawn_stoppable(config, stop)
    }

    fn spawn_stoppable(
        config: GatewayConfig,
        stop: watch::Receiver<bool>,
    ) -> (
        Peer,
        SharedRegistry,
        tokio::task::JoinHandle<GatewayResult<()>>,
    ) {
        let (gateway_io, peer_io) = tokio::io::duplex(64 * 1024);
        let (r, w) = tokio::io::split(gateway_io);
        let transport = FramedConnection::new(r, w, "test-peer", config.max_frame_size);

        let registry = ConnectionRegistry::shared(config.max_connections);
        let remote: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let id = {
            let mut guard = registry.try_write().unwrap();
            guard.register(remote).unwrap()
        };

        let conn = Connection::new(
            id,
            remote,
            transport,
            Arc::new(config),
            registry.clone(),
            Arc::new(EchoHandler),
            stop,
        );
        let task = tokio::spawn(conn.run());
        (tokio::io::split(peer_io), registry, task)
    }

    async fn recv(peer: &mut Peer) -> Option<ChannelFrame> {
        read_frame(&mut peer.0, DEFAULT_MAX_FRAME_SIZE).await.unwrap()
    }

    async fn send(peer: &mut Peer, frame: ChannelFrame) {
        write_frame(&mut peer.1, &frame).await.unwrap();
    }

    async fn handshake(peer: &mut Peer) -> ConnectionSession {
        let mut client = ConnectionSession::client(SessionConfig::default());
        let first = String::from_utf8(client.start_handshake().unwrap()).unwrap();
        send(peer, ChannelFrame::Text(first)).await;

        while !client.is_established() {
            let Some(ChannelFrame::Text(text)) = recv(peer).await else {
                panic!("expected handshake record");
            };
            if let Some(reply) = client.begin_handshake(text.as_bytes()).unwrap() {
                send(peer, ChannelFrame::Text(String::from_utf8(reply).unwrap())).await;
            }
        }
        client
    }

    fn test_config() -> GatewayConfig {
        GatewayConfig::builder()
            .bind_address("127.0.0.1")
            .bind_port(0)
            .handshake_timeout(5)
            .idle_timeout(5)
            .max_malformed_frames(2)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_handshake_then_ping() {
        let (mut peer, registry, task) = spawn_connection(test_config());
        let mut client = handshake(&mut peer).await;

        let wire = client.wrap_json(&json!({"type": "ping"})).unwrap();
        send(&mut peer, ChannelFrame::Binary(wire)).await;

        let Some(ChannelFrame::Binary(reply)) = recv(&mut peer).await else {
            panic!("expected binary reply");
        };
        let value: Value = client.unwrap_json(&reply).unwrap();
        assert_eq!(value, json!({"type": "pong"}));

        {
            let registry = registry.read().await;
            let entry = &registry.entries()[0];
            assert!(entry.is_established());
            assert_eq!(entry.session.as_ref().unwrap().frames_received, 1);
        }

        send(&mut peer, ChannelFrame::Close).await;
        assert_eq!(recv(&mut peer).await, Some(ChannelFrame::Close));
        task.await.unwrap().unwrap();
        assert_eq!(registry.read().await.active_count(), 0);
    }

    #[tokio::test]
    async fn test_text_carrier_replies_as_text() {
        let (mut peer, _registry, task) = spawn_connection(test_config());
        let mut client = handshake(&mut peer).await;

        let text = client.wrap_text(br#"{"type":"ping"}"#).unwrap();
        send(&mut peer, ChannelFrame::Text(text)).await;

        let Some(ChannelFrame::Text(reply)) = recv(&mut peer).await else {
            panic!("expected text reply");
        };
        assert_eq!(client.unwrap_text(&reply).unwrap(), br#"{"type":"pong"}"#);

        drop(peer);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_tampered_frames_exhaust_budget() {
        let (mut peer, _registry, task) = spawn_connection(test_config());
        let mut client = handshake(&mut peer).await;

        for _ in 0..3 {
            let mut wire = client.wrap(b"payload").unwrap();
            let last = wire.len() - 1;
            wire[last] ^= 0x01;
            send(&mut peer, ChannelFrame::Binary(wire)).await;
        }

        assert_eq!(recv(&mut peer).await, Some(ChannelFrame::Close));
        assert!(matches!(
            task.await.unwrap(),
            Err(GatewayError::TooManyMalformedFrames(3))
        ));
    }

    #[tokio::test]
    async fn test_tampered_frame_within_budget_keeps_connection() {
        let (mut peer, _registry, task) = spawn_connection(test_config());
        let mut client = handshake(&mut peer).await;

        let mut wire = client.wrap(b"payload").unwrap();
        wire[30] ^= 0x80;
        send(&mut peer, ChannelFrame::Binary(wire)).await;

        let wire = client.wrap_json(&json!({"type": "ping"})).unwrap();
        send(&mut peer, ChannelFrame::Binary(wire)).await;
        let Some(ChannelFrame::Binary(reply)) = recv(&mut peer).await else {
            panic!("expected binary reply");
        };
        assert_eq!(
            client.unwrap_json::<Value>(&reply).unwrap(),
            json!({"type": "pong"})
        );

        drop(peer);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_payloads_exhaust_budget() {
        let (mut peer, registry, task) = spawn_connection(test_config());
        let mut client = handshake(&mut peer).await;

        // Valid envelope, broken TL body
        let mut payload = 0x6a15_7529u32.to_le_bytes().to_vec();
        payload.extend_from_slice(b"{not json");

        let wire = client.wrap(&payload).unwrap();
        send(&mut peer, ChannelFrame::Binary(wire)).await;
        let wire = client.wrap_json(&json!({"type": "ping"})).unwrap();
        send(&mut peer, ChannelFrame::Binary(wire)).await;

        // Only the ping is answered
        let Some(ChannelFrame::Binary(reply)) = recv(&mut peer).await else {
            panic!("expected binary reply");
        };
        assert_eq!(
            client.unwrap_json::<Value>(&reply).unwrap(),
            json!({"type": "pong"})
        );
        assert_eq!(registry.read().await.entries()[0].malformed_frames, 1);

        for _ in 0..2 {
            let wire = client.wrap(&payload).unwrap();
            send(&mut peer, ChannelFrame::Binary(wire)).await;
        }

        assert_eq!(recv(&mut peer).await, Some(ChannelFrame::Close));
        assert!(matches!(
            task.await.unwrap(),
            Err(GatewayError::TooManyMalformedFrames(3))
        ));
    }

    #[tokio::test]
    async fn test_stop_request_closes_connection() {
        let (stop_tx, stop) = watch::channel(false);
        let (mut peer, registry, task) = spawn_stoppable(test_config(), stop);
        let _client = handshake(&mut peer).await;

        stop_tx.send_replace(true);

        assert_eq!(recv(&mut peer).await, Some(ChannelFrame::Close));
        task.await.unwrap().unwrap();
        assert_eq!(registry.read().await.active_count(), 0);
    }

    #[tokio::test]
    async fn test_binary_before_handshake_is_malformed() {
        let (mut peer, registry, task) = spawn_connection(test_config());

        for _ in 0..3 {
            send(&mut peer, ChannelFrame::Binary(vec![0u8; 64])).await;
        }

        assert_eq!(recv(&mut peer).await, Some(ChannelFrame::Close));
        assert!(matches!(
            task.await.unwrap(),
            Err(GatewayError::TooManyMalformedFrames(3))
        ));
        assert_eq!(registry.read().await.active_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_record_gets_error_reply() {
        let (mut peer, _registry, task) = spawn_connection(test_config());

        let record = json!({"type": "set_client_dh_params", "nonce": "00", "server_nonce": "00", "gb": "02"});
        send(&mut peer, ChannelFrame::Text(record.to_string())).await;

        let Some(ChannelFrame::Text(reply)) = recv(&mut peer).await else {
            panic!("expected error record");
        };
        let value: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["type"], "error");

        // The stage is unchanged, a proper handshake still works
        let client = handshake(&mut peer).await;
        assert_eq!(client.state(), SessionState::Established);

        drop(peer);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let config = GatewayConfig::builder()
            .bind_address("127.0.0.1")
            .bind_port(0)
            .handshake_timeout(1)
            .build()
            .unwrap();
        let (mut peer, registry, task) = spawn_connection(config);

        let Some(ChannelFrame::Text(reply)) = recv(&mut peer).await else {
            panic!("expected error record");
        };
        assert!(reply.contains("handshake timed out"));
        assert_eq!(recv(&mut peer).await, Some(ChannelFrame::Close));

        assert!(matches!(task.await.unwrap(), Err(GatewayError::HandshakeTimeout)));
        assert_eq!(registry.read().await.active_count(), 0);
    }

    #[tokio::test]
    async fn test_late_handshake_record_is_fatal() {
        let (mut peer, _registry, task) = spawn_connection(test_config());
        let _client = handshake(&mut peer).await;

        let record = json!({"type": "req_dh_params", "nonce": "00112233445566778899aabbccddeeff"});
        send(&mut peer, ChannelFrame::Text(record.to_string())).await;

        assert_eq!(recv(&mut peer).await, Some(ChannelFrame::Close));
        assert!(matches!(
            task.await.unwrap(),
            Err(GatewayError::Protocol(ProtocolError::HandshakeProtocol(_)))
        ));
    }

    #[test]
    fn test_looks_like_record() {
        assert!(looks_like_record("  {\"type\":\"x\"}"));
        assert!(!looks_like_record("AAAA"));
    }
}
