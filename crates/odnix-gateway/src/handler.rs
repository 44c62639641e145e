//! Payload Handlers
//!
//! The application seam: every decrypted payload is handed to a
//! [`PayloadHandler`] and whatever it returns is wrapped and sent back.

use async_trait::async_trait;
use odnix_protocol::{
    ApplicationMessage, InnerPayload, ProtocolError, RpcResult, SessionId, TlObject,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tracing::debug;

use crate::errors::GatewayResult;
use crate::registry::ConnectionId;

/// Where a payload came from
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Gateway connection id
    pub connection_id: ConnectionId,
    /// Remote address
    pub remote_addr: SocketAddr,
    /// Gateway-side session id
    pub session_id: SessionId,
}

/// Application payload handler
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    /// Handle one decrypted payload.
    ///
    /// `Some(bytes)` is wrapped and sent back on the same connection.
    async fn handle(
        &self,
        ctx: &RequestContext,
        envelope: &InnerPayload,
    ) -> GatewayResult<Option<Vec<u8>>>;
}

/// Built-in handler: answers pings and echoes everything else.
///
/// JSON `{"type":"ping"}` gets `{"type":"pong"}`, RPC requests (TL or JSON
/// `{method, params}`) get a result keyed to the request `msg_id`, other
/// records come back unchanged. Results and updates need no answer.
/// Payloads that are neither TL nor JSON are rejected with the decode error.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl EchoHandler {
    fn call(method: &str, params: &Value) -> Value {
        match method {
            "ping" => json!({ "pong": true }),
            "echo" | "signal" => params.clone(),
            other => json!({ "error": format!("unknown method: {}", other) }),
        }
    }

    fn answer_json(value: Value, req_msg_id: u64) -> GatewayResult<Option<Vec<u8>>> {
        let reply = if value.get("type").and_then(Value::as_str) == Some("ping") {
            json!({ "type": "pong" })
        } else if let Some(method) = value.get("method").and_then(Value::as_str) {
            let params = value.get("params").cloned().unwrap_or(Value::Null);
            json!({ "req_msg_id": req_msg_id, "result": Self::call(method, &params) })
        } else {
            value
        };
        Ok(Some(serde_json::to_vec(&reply).map_err(ProtocolError::from)?))
    }
}

#[async_trait]
impl PayloadHandler for EchoHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        envelope: &InnerPayload,
    ) -> GatewayResult<Option<Vec<u8>>> {
        match ApplicationMessage::decode(&envelope.data)? {
            ApplicationMessage::RpcRequest(request) => {
                debug!(
                    "Connection {} RPC {} (msg_id {})",
                    ctx.connection_id, request.method, envelope.msg_id
                );
                let result = RpcResult {
                    req_msg_id: envelope.msg_id,
                    result: Self::call(&request.method, &request.params),
                };
                Ok(Some(result.to_bytes()?))
            }
            ApplicationMessage::Json(value) => Self::answer_json(value, envelope.msg_id),
            ApplicationMessage::RpcResult(_) | ApplicationMessage::UpdateNewMessage(_) => Ok(None),
        }
    }
}
