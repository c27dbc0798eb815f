//! Request-scoped context shared across a plugin chain.

use dashmap::DashMap;
use mcpgateway_protocol::types::ElicitResult;
use mcpgateway_registry::EntityId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Context shared by every plugin in one request's chain.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Correlation id (generated when the client sent none)
    pub request_id: String,
    /// Acting user
    pub user: String,
    /// Tenant
    pub tenant_id: EntityId,
    /// Virtual server the request was addressed to, if any
    pub server_id: Option<EntityId>,
    /// State shared between plugins within this request
    pub shared_state: Arc<DashMap<String, Value>>,
    /// Free-form metadata accumulated along the chain
    pub metadata: HashMap<String, Value>,
    /// Responses collected from completed elicitation round-trips, in
    /// arrival order. A re-run plugin reads its answer from here.
    pub elicitation_responses: Vec<ElicitResult>,
}

impl GlobalContext {
    /// Create a context for a request
    pub fn new(request_id: impl Into<String>, user: impl Into<String>, tenant_id: EntityId) -> Self {
        Self {
            request_id: request_id.into(),
            user: user.into(),
            tenant_id,
            server_id: None,
            shared_state: Arc::new(DashMap::new()),
            metadata: HashMap::new(),
            elicitation_responses: Vec::new(),
        }
    }

    /// Scope the context to a virtual server
    #[must_use]
    pub fn with_server(mut self, server_id: EntityId) -> Self {
        self.server_id = Some(server_id);
        self
    }
}

/// What a single plugin sees: the global context plus its private state.
pub struct PluginContext<'a> {
    /// The request-wide context
    pub global: &'a GlobalContext,
    /// This plugin's private state map, survives across hooks within the
    /// same request
    pub state: Arc<DashMap<String, Value>>,
    /// This plugin's opaque configuration from the chain definition
    pub config: &'a Value,
}
