//! WebSocket transport: bidirectional, text frames only.
//!
//! Inbound messages are processed sequentially per socket, which makes
//! response ordering trivially match acceptance ordering; everything
//! outbound (responses, elicitations) goes through the session's single
//! writer task.

use super::{AppState, header_set};
use crate::dispatcher::RequestOrigin;
use crate::session::TransportKind;
use crate::writer::{OutboundFrame, SessionWriter};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use mcpgateway_registry::EntityId;
use tracing::debug;

/// `GET /ws`
pub async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = RequestOrigin {
        session_id: None,
        virtual_server: None,
        client_headers: header_set(&headers),
        transport: TransportKind::WebSocket,
    };
    ws.on_upgrade(move |socket| handle_socket(state, socket, origin))
        .into_response()
}

/// `GET /servers/{vid}/ws`
pub async fn upgrade_scoped(
    State(state): State<AppState>,
    Path(vid): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Ok(vid) = vid.parse::<EntityId>() else {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    };
    let origin = RequestOrigin {
        session_id: None,
        virtual_server: Some(vid),
        client_headers: header_set(&headers),
        transport: TransportKind::WebSocket,
    };
    ws.on_upgrade(move |socket| handle_socket(state, socket, origin))
        .into_response()
}

async fn handle_socket(state: AppState, socket: WebSocket, mut origin: RequestOrigin) {
    let (mut sink, mut inbound) = socket.split();
    let depth = state.app.config().transport.session_queue_depth;

    // the single writer task: the only place that touches the sink
    let (writer, mut rx) = SessionWriter::channel(EntityId::generate().to_hex(), depth);
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = frame.to_json() else { continue };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = inbound.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            // text frames only; everything else is ignored
            Ok(_) => continue,
        };

        let reply = state.app.handle_text(text.as_str(), &origin).await;
        if let Some(reply) = reply {
            if let Some(session) = &reply.new_session {
                origin.session_id = Some(session.session_id.clone());
                state
                    .app
                    .register_writer(writer.rebound(&session.session_id));
                debug!(session_id = %session.session_id, "websocket session established");
            }
            if !writer.enqueue(OutboundFrame::Response(reply.response)) {
                break;
            }
        }
    }

    if let Some(session_id) = &origin.session_id {
        state.app.unregister_writer(session_id);
        let _ = state.app.sessions().delete(session_id).await;
    }
    writer_task.abort();
}
