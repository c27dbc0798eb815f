//! MCP transport handlers: JSON-RPC POST, streamable HTTP, SSE.

use super::{AppState, header_set};
use crate::dispatcher::RequestOrigin;
use crate::session::TransportKind;
use crate::writer::SessionWriter;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use mcpgateway_registry::EntityId;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

const SESSION_HEADER: &str = "Mcp-Session-Id";

fn origin_from(
    headers: &HeaderMap,
    virtual_server: Option<EntityId>,
    transport: TransportKind,
) -> RequestOrigin {
    let client_headers = header_set(headers);
    RequestOrigin {
        session_id: headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        virtual_server,
        client_headers,
        transport,
    }
}

async fn dispatch_body(state: &AppState, body: String, origin: RequestOrigin) -> Response {
    match state.app.handle_text(&body, &origin).await {
        Some(reply) => {
            let mut response = axum::Json(&reply.response).into_response();
            if let Some(session) = &reply.new_session {
                if let Ok(value) = session.session_id.parse() {
                    response.headers_mut().insert(SESSION_HEADER, value);
                }
            }
            response
        }
        // notifications and client responses are accepted without a body
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// `POST /rpc` - JSON-RPC entry with no virtual server binding.
pub async fn rpc(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let origin = origin_from(&headers, None, TransportKind::StreamableHttp);
    dispatch_body(&state, body, origin).await
}

/// `POST /servers/{vid}/rpc` - JSON-RPC bound to a virtual server.
pub async fn rpc_scoped(
    State(state): State<AppState>,
    Path(vid): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Ok(vid) = vid.parse::<EntityId>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let origin = origin_from(&headers, Some(vid), TransportKind::StreamableHttp);
    dispatch_body(&state, body, origin).await
}

/// `POST /servers/{vid}/mcp` - streamable HTTP request path.
pub async fn streamable_post(
    state: State<AppState>,
    path: Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    rpc_scoped(state, path, headers, body).await
}

/// `GET /servers/{vid}/mcp` and `GET /servers/{vid}/sse` - the
/// server-to-client stream for a session. Carries responses queued by
/// the per-session writer, server-initiated elicitations, and
/// keepalives.
pub async fn stream_get(
    State(state): State<AppState>,
    Path(_vid): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if state.app.sessions().get(&session_id).await.is_err() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let depth = state.app.config().transport.session_queue_depth;
    let (writer, rx) = SessionWriter::channel(session_id.clone(), depth);
    state.app.register_writer(writer);
    debug!(session_id, "SSE stream attached");

    let stream = frame_stream(rx);
    let keepalive = state.app.config().transport.sse_keepalive_interval;

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(keepalive))
        .into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CACHE_CONTROL,
        axum::http::HeaderValue::from_static("no-cache"),
    );
    response_headers.insert(
        "X-Accel-Buffering",
        axum::http::HeaderValue::from_static("no"),
    );
    if let Ok(value) = session_id.parse() {
        response_headers.insert(SESSION_HEADER, value);
    }
    response
}

fn frame_stream(
    rx: tokio::sync::mpsc::Receiver<crate::writer::OutboundFrame>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    ReceiverStream::new(rx).map(|frame| {
        let data = frame.to_json().unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event("message").data(data))
    })
}
