//! Hook points and their typed payloads.

use crate::headers::HeaderSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// The eight hook points a plugin may attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
    /// Before a prompt template is fetched and rendered
    PromptPreFetch,
    /// After a prompt is rendered
    PromptPostFetch,
    /// Before a tool is invoked
    ToolPreInvoke,
    /// After a tool invocation returned
    ToolPostInvoke,
    /// Before a resource is dereferenced
    ResourcePreFetch,
    /// After a resource is fetched
    ResourcePostFetch,
    /// Before an HTTP request is forwarded upstream (header set)
    HttpPreForwardingCall,
    /// After the upstream HTTP response arrived
    HttpPostForwardingCall,
}

impl HookType {
    /// All hook types, in pipeline order
    pub const ALL: [Self; 8] = [
        Self::PromptPreFetch,
        Self::PromptPostFetch,
        Self::ToolPreInvoke,
        Self::ToolPostInvoke,
        Self::ResourcePreFetch,
        Self::ResourcePostFetch,
        Self::HttpPreForwardingCall,
        Self::HttpPostForwardingCall,
    ];

    /// The wire name, which doubles as the tool name an external plugin
    /// must expose for this hook.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::PromptPreFetch => "prompt_pre_fetch",
            Self::PromptPostFetch => "prompt_post_fetch",
            Self::ToolPreInvoke => "tool_pre_invoke",
            Self::ToolPostInvoke => "tool_post_invoke",
            Self::ResourcePreFetch => "resource_pre_fetch",
            Self::ResourcePostFetch => "resource_post_fetch",
            Self::HttpPreForwardingCall => "http_pre_forwarding_call",
            Self::HttpPostForwardingCall => "http_post_forwarding_call",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Payload for `prompt_pre_fetch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPayload {
    /// Prompt name
    pub name: String,
    /// Caller-provided arguments
    pub arguments: HashMap<String, String>,
}

/// Payload for `prompt_post_fetch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedPromptPayload {
    /// Prompt name
    pub name: String,
    /// Rendered template text
    pub rendered: String,
}

/// Payload for `tool_pre_invoke`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    /// Tool name as the client addressed it
    pub name: String,
    /// Invocation arguments
    pub arguments: HashMap<String, Value>,
}

/// Payload for `tool_post_invoke`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultPayload {
    /// Tool name
    pub name: String,
    /// Raw result envelope from the upstream
    pub result: Value,
}

/// Payload for `resource_pre_fetch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePayload {
    /// Resource URI
    pub uri: String,
}

/// Payload for `resource_post_fetch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContentPayload {
    /// Resource URI
    pub uri: String,
    /// Fetched contents
    pub contents: Value,
}

/// Payload for both HTTP forwarding hooks: the outbound header set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpForwardingPayload {
    /// Headers about to be sent (pre) or received (post)
    pub headers: HeaderSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_snake_case() {
        for hook in HookType::ALL {
            let name = hook.wire_name();
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
            let json = serde_json::to_value(hook).unwrap();
            assert_eq!(json, serde_json::Value::String(name.to_string()));
        }
    }
}
