//! # MCP Gateway Upstream Pool
//!
//! One long-lived client per registered upstream gateway. The pool owns
//! connection reuse, retry with exponential backoff and full jitter,
//! per-upstream circuit breaking, in-flight caps, TLS with per-gateway
//! custom CAs, and the outbound header injection rules (passthrough
//! allowlists, `X-Upstream-Authorization` mapping, plugin additions).

mod breaker;
mod client;
mod error;
mod headers;
mod pool;
mod retry;
mod stdio;
mod ws;

pub use breaker::{CircuitBreaker, CircuitState};
pub use client::{UpstreamClient, UpstreamRpc};
pub use error::{UpstreamError, UpstreamResult};
pub use headers::{HeaderContext, build_outbound_headers};
pub use pool::ClientPool;
pub use retry::backoff_delay;
pub use stdio::StdioUpstream;
pub use ws::WsUpstream;
