//! External plugin adapter.
//!
//! External plugins are MCP servers reached over stdio, SSE, streamable
//! HTTP or WebSocket. They must expose the hook names as tools plus
//! `get_plugin_config`; a missing hook tool yields a
//! `NotImplemented` result which the chain treats as continue.
//!
//! The transport itself lives behind [`PluginRpc`] so this crate stays
//! transport-agnostic; the server wires the adapter to the upstream
//! client machinery.

use crate::context::PluginContext;
use crate::error::PluginError;
use crate::hooks::HookType;
use crate::result::PluginResult;
use crate::Plugin;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// The MCP seam an external plugin is reached through.
#[async_trait]
pub trait PluginRpc: Send + Sync {
    /// Call a tool on the plugin process.
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, PluginError>;

    /// The tool names the plugin process exposes.
    async fn list_tools(&self) -> Result<Vec<String>, PluginError>;
}

/// Adapter presenting a remote MCP plugin process as a [`Plugin`].
pub struct ExternalPlugin {
    name: String,
    rpc: Arc<dyn PluginRpc>,
    available: OnceCell<HashSet<String>>,
}

impl ExternalPlugin {
    /// Wrap an MCP connection as a plugin
    pub fn new(name: impl Into<String>, rpc: Arc<dyn PluginRpc>) -> Self {
        Self {
            name: name.into(),
            rpc,
            available: OnceCell::new(),
        }
    }

    /// Fetch the plugin's self-reported configuration.
    ///
    /// # Errors
    ///
    /// Returns `PluginError` when the `get_plugin_config` tool is missing
    /// or the transport fails.
    pub async fn fetch_config(&self) -> Result<Value, PluginError> {
        self.rpc.call_tool("get_plugin_config", json!({})).await
    }

    async fn available_tools(&self) -> Result<&HashSet<String>, PluginError> {
        self.available
            .get_or_try_init(|| async {
                let tools = self.rpc.list_tools().await?;
                Ok(tools.into_iter().collect())
            })
            .await
    }
}

#[async_trait]
impl Plugin for ExternalPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        hook: HookType,
        payload: Value,
        ctx: &PluginContext<'_>,
    ) -> Result<PluginResult<Value>, PluginError> {
        let tool = hook.wire_name();
        if !self.available_tools().await?.contains(tool) {
            return Err(PluginError::NotImplemented {
                plugin: self.name.clone(),
                hook: tool.to_string(),
            });
        }

        let arguments = json!({
            "payload": payload,
            "context": {
                "request_id": ctx.global.request_id,
                "user": ctx.global.user,
                "tenant_id": ctx.global.tenant_id,
                "server_id": ctx.global.server_id,
                "metadata": ctx.global.metadata,
                "elicitation_responses": ctx.global.elicitation_responses,
            },
            "config": ctx.config,
        });
        let raw = self.rpc.call_tool(tool, arguments).await?;
        Ok(serde_json::from_value(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgateway_registry::EntityId;
    use crate::context::GlobalContext;
    use dashmap::DashMap;

    struct FakeRpc;

    #[async_trait]
    impl PluginRpc for FakeRpc {
        async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, PluginError> {
            assert_eq!(tool, "tool_pre_invoke");
            assert!(arguments["context"]["request_id"].is_string());
            Ok(json!({
                "continue_processing": true,
                "metadata": {"seen_by": "remote"}
            }))
        }

        async fn list_tools(&self) -> Result<Vec<String>, PluginError> {
            Ok(vec![
                "get_plugin_config".into(),
                "tool_pre_invoke".into(),
            ])
        }
    }

    #[tokio::test]
    async fn missing_hook_tool_is_not_implemented() {
        let plugin = ExternalPlugin::new("remote", Arc::new(FakeRpc));
        let global = GlobalContext::new("r", "u", EntityId::generate());
        let ctx = PluginContext {
            global: &global,
            state: Arc::new(DashMap::new()),
            config: &Value::Null,
        };

        let err = plugin
            .invoke(HookType::ResourcePreFetch, json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::NotImplemented { .. }));

        let ok = plugin
            .invoke(HookType::ToolPreInvoke, json!({"name": "x"}), &ctx)
            .await
            .unwrap();
        assert!(ok.continue_processing);
        assert_eq!(ok.metadata["seen_by"], "remote");
    }
}
