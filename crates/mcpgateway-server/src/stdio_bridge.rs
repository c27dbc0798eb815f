//! The `translate` bridge: wrap a spawned stdio MCP server and
//! re-expose it over the network transports.
//!
//! Every JSON-RPC request arriving on `/rpc` (or the SSE companion) is
//! forwarded verbatim to the child process; notifications are passed
//! through without an answer.

use crate::{ServerError, ServerResult};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use mcpgateway_protocol::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcResponse, error_codes,
};
use mcpgateway_upstream::StdioUpstream;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Wraps one child MCP server for network exposure.
pub struct StdioBridge {
    upstream: StdioUpstream,
}

impl StdioBridge {
    /// Spawn the child and wire the pipes.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` when the child cannot be spawned.
    pub fn spawn(command: &str, args: &[String], request_timeout: Duration) -> ServerResult<Self> {
        let upstream = StdioUpstream::spawn(command, args, request_timeout)?;
        Ok(Self { upstream })
    }

    /// Forward one raw message; requests get the child's response.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` when the pipe breaks or the child answers
    /// with garbage.
    pub async fn forward(&self, text: &str) -> ServerResult<Option<JsonRpcResponse>> {
        match JsonRpcMessage::from_json(text) {
            Ok(JsonRpcMessage::Request(request)) => {
                let id = request.id.clone();
                match self.upstream.request(&request.method, request.params).await {
                    Ok(result) => Ok(Some(JsonRpcResponse::success(id, result))),
                    Err(mcpgateway_upstream::UpstreamError::Rpc { code, message }) => Ok(Some(
                        JsonRpcResponse::error(id, JsonRpcError::new(code, message)),
                    )),
                    Err(error) => Ok(Some(JsonRpcResponse::error(
                        id,
                        ServerError::Upstream(error).to_jsonrpc(),
                    ))),
                }
            }
            Ok(JsonRpcMessage::Notification(notification)) => {
                self.upstream
                    .notify(&notification.method, notification.params)
                    .await?;
                Ok(None)
            }
            Ok(JsonRpcMessage::Response(_)) => Ok(None),
            Err(_) => Ok(Some(JsonRpcResponse::parse_error(JsonRpcError::new(
                error_codes::PARSE_ERROR,
                "Parse error",
            )))),
        }
    }

    /// Serve the bridge on a plain HTTP surface.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` when the listener cannot bind.
    pub async fn serve(self, host: &str, port: u16) -> ServerResult<()> {
        let bridge = Arc::new(self);
        let router = Router::new()
            .route("/health", get(|| async { axum::Json(json!({"status": "ok"})) }))
            .route("/rpc", post(bridge_rpc))
            .with_state(bridge);
        let addr = format!("{host}:{port}");
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Internal(format!("bind {addr}: {e}")))?;
        info!(%addr, "stdio bridge listening");
        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn bridge_rpc(State(bridge): State<Arc<StdioBridge>>, body: String) -> Response {
    match bridge.forward(&body).await {
        Ok(Some(response)) => axum::Json(response).into_response(),
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(error) => (
            StatusCode::BAD_GATEWAY,
            axum::Json(json!({"error": error.code_label()})),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bridge_forwards_requests_and_swallows_notifications() {
        let script = r#"while read -r line; do
            case "$line" in
                *'"id"'*) echo '{"jsonrpc":"2.0","id":1,"result":{"pong":true}}' ;;
            esac
        done"#;
        let bridge = StdioBridge::spawn(
            "sh",
            &["-c".to_string(), script.to_string()],
            Duration::from_secs(5),
        )
        .unwrap();

        let response = bridge
            .forward(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.result().unwrap()["pong"], true);

        let none = bridge
            .forward(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
