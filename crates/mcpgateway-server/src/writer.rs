//! The per-session serialized response writer.
//!
//! Every stream transport (SSE, streamable HTTP notifications,
//! WebSocket) sends through one bounded queue per session, so messages
//! are delivered in the order they were enqueued no matter how handlers
//! interleave. On overflow the session is dropped with a structured
//! reason rather than buffering without bound.

use mcpgateway_protocol::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// One frame on a session's outbound queue.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// Response to a client request
    Response(JsonRpcResponse),
    /// Server-initiated notification
    Notification(JsonRpcNotification),
    /// Server-initiated request (elicitation)
    Request(JsonRpcRequest),
}

impl OutboundFrame {
    /// Serialize for the wire.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the frame cannot be encoded (a bug in
    /// the frame contents, not a transport condition).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Sender half of a session's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionWriter {
    session_id: String,
    tx: mpsc::Sender<OutboundFrame>,
}

impl SessionWriter {
    /// Create the queue for one session. The receiver half feeds the
    /// transport's single writer task.
    pub fn channel(session_id: impl Into<String>, depth: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(depth);
        (
            Self {
                session_id: session_id.into(),
                tx,
            },
            rx,
        )
    }

    /// The session this writer serves
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The same queue under a different session id. WebSocket transports
    /// open the queue before `initialize` assigns the real id.
    #[must_use]
    pub fn rebound(&self, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            tx: self.tx.clone(),
        }
    }

    /// Enqueue a frame. Returns false when the queue is full or closed;
    /// the caller must drop the session.
    pub fn enqueue(&self, frame: OutboundFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    session_id = %self.session_id,
                    reason = "send_queue_overflow",
                    "dropping session: outbound queue full"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Whether the transport side is still attached
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgateway_protocol::jsonrpc::RequestId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn frames_serialize_transparently() {
        let frame = OutboundFrame::Response(JsonRpcResponse::success(
            RequestId::Number(7),
            json!({"ok": true}),
        ));
        let text = frame.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["result"]["ok"], true);
        // untagged: no enum wrapper leaks onto the wire
        assert!(value.get("Response").is_none());
    }

    #[tokio::test]
    async fn ordering_is_queue_order() {
        let (writer, mut rx) = SessionWriter::channel("s1", 16);
        for i in 0..5 {
            assert!(writer.enqueue(OutboundFrame::Response(JsonRpcResponse::success(
                RequestId::Number(i),
                json!({}),
            ))));
        }
        for expected in 0..5 {
            match rx.recv().await.unwrap() {
                OutboundFrame::Response(response) => {
                    assert_eq!(response.id.0, Some(RequestId::Number(expected)));
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn overflow_reports_drop() {
        let (writer, _rx) = SessionWriter::channel("s1", 2);
        let frame = || {
            OutboundFrame::Notification(JsonRpcNotification::new("notifications/test", None))
        };
        assert!(writer.enqueue(frame()));
        assert!(writer.enqueue(frame()));
        assert!(!writer.enqueue(frame()));
    }
}
