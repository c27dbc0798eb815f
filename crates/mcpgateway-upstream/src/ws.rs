//! WebSocket upstream: JSON-RPC over text frames.
//!
//! Used for external plugins registered with the WEBSOCKET transport.
//! A reader task correlates responses to pending requests by id, the
//! same shape as the stdio upstream.

use crate::{UpstreamError, UpstreamResult};
use dashmap::DashMap;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use mcpgateway_protocol::jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type PendingMap = Arc<DashMap<i64, oneshot::Sender<JsonRpcResponse>>>;

/// A JSON-RPC peer over a WebSocket connection.
pub struct WsUpstream {
    sink: Mutex<WsSink>,
    pending: PendingMap,
    next_id: AtomicI64,
    request_timeout: Duration,
}

impl WsUpstream {
    /// Connect and start the reader task.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Client` when the connection fails.
    pub async fn connect(url: &str, request_timeout: Duration) -> UpstreamResult<Self> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| UpstreamError::Client(format!("websocket connect {url}: {e}")))?;
        let (sink, mut stream) = socket.split();

        let pending: PendingMap = Arc::new(DashMap::new());
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    // text frames only
                    Ok(_) => continue,
                };
                match JsonRpcMessage::from_json(text.as_str()) {
                    Ok(JsonRpcMessage::Response(response)) => {
                        let waiter = response.id.0.as_ref().and_then(|id| match id {
                            RequestId::Number(n) => reader_pending.remove(n).map(|(_, tx)| tx),
                            RequestId::String(_) => None,
                        });
                        if let Some(tx) = waiter {
                            let _ = tx.send(response);
                        }
                    }
                    Ok(_) => debug!("ignoring non-response websocket message"),
                    Err(error) => warn!(%error, "undecodable websocket frame"),
                }
            }
            debug!("websocket upstream closed");
        });

        Ok(Self {
            sink: Mutex::new(sink),
            pending,
            next_id: AtomicI64::new(1),
            request_timeout,
        })
    }

    /// One JSON-RPC request over the socket.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` when the socket breaks or the deadline
    /// elapses.
    pub async fn request(&self, method: &str, params: Option<Value>) -> UpstreamResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let text =
            serde_json::to_string(&request).map_err(|e| UpstreamError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                self.pending.remove(&id);
                return Err(UpstreamError::io(e.to_string()));
            }
        }

        let response = tokio::time::timeout(self.request_timeout, rx)
            .await
            .map_err(|_| {
                self.pending.remove(&id);
                UpstreamError::Timeout {
                    timeout_ms: self.request_timeout.as_millis() as u64,
                }
            })?
            .map_err(|_| UpstreamError::io("websocket upstream closed"))?;

        if let Some(error) = response.error_payload() {
            return Err(UpstreamError::Rpc {
                code: error.code,
                message: error.message.clone(),
            });
        }
        Ok(response.result().cloned().unwrap_or(Value::Null))
    }
}
