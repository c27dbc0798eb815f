//! Plugin run conditions.
//!
//! A plugin runs only when every configured condition matches the
//! request. Empty lists match everything.

use crate::context::GlobalContext;
use mcpgateway_registry::EntityId;
use serde::{Deserialize, Serialize};

/// Attributes of the current request a condition can match on.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes<'a> {
    /// Tool name, for tool hooks
    pub tool: Option<&'a str>,
    /// Prompt name, for prompt hooks
    pub prompt: Option<&'a str>,
    /// Resource URI, for resource hooks
    pub resource: Option<&'a str>,
    /// Content type of the payload, when known
    pub content_type: Option<&'a str>,
}

/// Conditions from the chain definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConditions {
    /// Virtual server ids the plugin applies to
    pub server_ids: Vec<EntityId>,
    /// Tenants the plugin applies to
    pub tenant_ids: Vec<EntityId>,
    /// Tool names the plugin applies to
    pub tools: Vec<String>,
    /// Prompt names the plugin applies to
    pub prompts: Vec<String>,
    /// Resource URIs the plugin applies to
    pub resources: Vec<String>,
    /// Regex patterns matched against the acting user
    pub user_patterns: Vec<String>,
    /// Content types the plugin applies to
    pub content_types: Vec<String>,
}

impl PluginConditions {
    /// Whether all configured conditions match this request.
    pub fn matches(&self, ctx: &GlobalContext, attrs: &RequestAttributes<'_>) -> bool {
        if !self.tenant_ids.is_empty() && !self.tenant_ids.contains(&ctx.tenant_id) {
            return false;
        }
        if !self.server_ids.is_empty() {
            match ctx.server_id {
                Some(server) if self.server_ids.contains(&server) => {}
                _ => return false,
            }
        }
        if !self.tools.is_empty()
            && !attrs.tool.is_some_and(|t| self.tools.iter().any(|c| c == t))
        {
            return false;
        }
        if !self.prompts.is_empty()
            && !attrs
                .prompt
                .is_some_and(|p| self.prompts.iter().any(|c| c == p))
        {
            return false;
        }
        if !self.resources.is_empty()
            && !attrs
                .resource
                .is_some_and(|r| self.resources.iter().any(|c| c == r))
        {
            return false;
        }
        if !self.content_types.is_empty()
            && !attrs
                .content_type
                .is_some_and(|ct| self.content_types.iter().any(|c| c == ct))
        {
            return false;
        }
        if !self.user_patterns.is_empty() {
            let matched = self.user_patterns.iter().any(|pattern| {
                regex::Regex::new(pattern)
                    .map(|re| re.is_match(&ctx.user))
                    .unwrap_or(false)
            });
            if !matched {
                return false;
            }
        }
        true
    }
}
