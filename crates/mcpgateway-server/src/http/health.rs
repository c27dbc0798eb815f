//! Liveness and readiness probes.

use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

/// `GET /health` - 200 while the process is healthy.
pub async fn health() -> impl IntoResponse {
    axum::Json(json!({"status": "ok"}))
}

/// `GET /ready` - 200 only once the store and background workers are
/// initialized.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.app.is_ready() {
        (StatusCode::OK, axum::Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(json!({"status": "initializing"})),
        )
    }
}
