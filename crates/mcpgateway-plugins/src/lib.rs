//! # MCP Gateway Plugin Framework
//!
//! The gateway's extension spine. Plugins observe and modify requests at
//! eight hook points (prompt/tool/resource pre+post, HTTP forwarding
//! pre+post), run in ascending priority order with declaration-order
//! tie-breaks, and may short-circuit a request with a violation or suspend
//! it with an elicitation request routed to the originating client.
//!
//! The plugin table is built once at startup from the chain definition
//! file and is immutable afterwards.

mod chain;
mod conditions;
mod config;
mod context;
mod error;
mod external;
mod headers;
mod hooks;
mod result;

pub use chain::{ChainOutcome, PluginManager, ResumePoint};
pub use conditions::{PluginConditions, RequestAttributes};
pub use config::{ChainConfig, ExternalEndpoint, ExternalTransport, PluginMode, PluginSpec};
pub use context::{GlobalContext, PluginContext};
pub use error::{PluginError, PluginResultExt};
pub use external::{ExternalPlugin, PluginRpc};
pub use headers::{HeaderSet, merge_hook_headers, sanitize_header_value};
pub use hooks::{
    HookType, HttpForwardingPayload, PromptPayload, RenderedPromptPayload, ResourceContentPayload,
    ResourcePayload, ToolCallPayload, ToolResultPayload,
};
pub use result::{PluginElicitation, PluginResult, PluginViolation};

use async_trait::async_trait;
use serde_json::Value;

/// A plugin. Native plugins implement this directly; external plugins are
/// adapted through [`ExternalPlugin`], which speaks MCP to the remote
/// process over the configured transport.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The plugin's configured name
    fn name(&self) -> &str;

    /// Invoke one hook. `payload` is the hook-specific payload serialized
    /// to JSON; a returned `modified_payload` must deserialize back into
    /// the same payload type.
    ///
    /// # Errors
    ///
    /// Returns `PluginError` on transport failure, timeout, or a payload
    /// the plugin cannot decode. Mode rules decide whether an error blocks
    /// the request.
    async fn invoke(
        &self,
        hook: HookType,
        payload: Value,
        ctx: &PluginContext<'_>,
    ) -> Result<PluginResult<Value>, PluginError>;
}
