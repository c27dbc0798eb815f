//! # MCP Gateway Server
//!
//! The runtime dataplane: a JSON-RPC dispatcher fronted by streamable
//! HTTP, SSE and WebSocket transports, backed by the entity registry,
//! the plugin chain, the upstream client pool and the federation
//! workers. A client connects once and sees the unified namespace of
//! tools, resources, prompts and virtual servers.

mod app;
mod auth;
mod dispatcher;
mod error;
mod observability;
mod session;
mod stdio_bridge;
mod virtual_servers;
mod writer;

pub mod http;

pub use app::{Application, ApplicationBuilder};
pub use auth::Authenticator;
pub use dispatcher::{RequestOrigin, RpcReply};
pub use error::{ServerError, ServerResult};
pub use session::{MemorySessionRegistry, SessionRecord, SessionRegistry, TransportKind};
pub use stdio_bridge::StdioBridge;
pub use writer::{OutboundFrame, SessionWriter};

#[cfg(feature = "redis-backend")]
pub use session::redis::RedisSessionRegistry;
