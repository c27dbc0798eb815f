//! The axum HTTP surface.
//!
//! Public MCP routes (`/rpc`, `/servers/{id}/mcp|sse|rpc|ws`), the
//! admin registry CRUD, health/readiness, and metrics exposition.

mod admin;
mod health;
mod mcp;
mod ws;

use crate::app::Application;
use axum::Router;
use axum::routing::{any, get, post};
use governor::{Quota, RateLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use mcpgateway_plugins::HeaderSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Request body cap on the public surface (4 MiB)
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub(crate) type AdminLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared router state
#[derive(Clone)]
pub struct AppState {
    /// The application
    pub app: Arc<Application>,
    /// Rate limiter for the passthrough-headers admin endpoint
    pub admin_limiter: Arc<AdminLimiter>,
}

/// Build the full router.
pub fn router(app: Arc<Application>) -> Router {
    const ADMIN_RATE_PER_MINUTE: NonZeroU32 = NonZeroU32::new(30).unwrap();

    let compression_enabled = app.config().compression_enabled;
    // 30 requests per minute on the passthrough-headers admin surface
    let admin_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
        ADMIN_RATE_PER_MINUTE,
    )));
    let state = AppState {
        app,
        admin_limiter,
    };

    let mut router = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(admin::metrics))
        .route("/rpc", post(mcp::rpc))
        .route("/servers/{id}/rpc", post(mcp::rpc_scoped))
        .route(
            "/servers/{id}/mcp",
            post(mcp::streamable_post).get(mcp::stream_get),
        )
        .route("/servers/{id}/sse", get(mcp::stream_get))
        .route("/ws", any(ws::upgrade))
        .route("/servers/{id}/ws", any(ws::upgrade_scoped))
        .route(
            "/gateways",
            post(admin::create_gateway).get(admin::list_gateways),
        )
        .route(
            "/gateways/{id}",
            get(admin::get_gateway)
                .put(admin::update_gateway)
                .delete(admin::delete_gateway),
        )
        .route("/tools", post(admin::create_tool).get(admin::list_tools))
        .route(
            "/tools/{id}",
            get(admin::get_tool).delete(admin::delete_tool),
        )
        .route(
            "/resources",
            post(admin::create_resource).get(admin::list_resources),
        )
        .route(
            "/resources/{id}",
            axum::routing::put(admin::update_resource).delete(admin::delete_resource),
        )
        .route(
            "/prompts",
            post(admin::create_prompt).get(admin::list_prompts),
        )
        .route(
            "/prompts/{id}",
            axum::routing::put(admin::update_prompt).delete(admin::delete_prompt),
        )
        .route(
            "/servers",
            post(admin::create_server).get(admin::list_servers),
        )
        .route(
            "/servers/{id}",
            get(admin::get_server)
                .put(admin::update_server)
                .delete(admin::delete_server),
        )
        .route(
            "/admin/config/passthrough-headers",
            get(admin::get_passthrough).put(admin::put_passthrough),
        )
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive());
    if compression_enabled {
        router = router.layer(CompressionLayer::new());
    }
    router.with_state(state)
}

/// Collect an axum header map into the sanitized [`HeaderSet`].
pub(crate) fn header_set(headers: &http::HeaderMap) -> HeaderSet {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
