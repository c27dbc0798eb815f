//! Plugin invocation results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// What a plugin returned for one hook invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResult<T> {
    /// Whether the chain should keep running
    pub continue_processing: bool,
    /// Replacement payload; becomes the input of the next plugin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_payload: Option<T>,
    /// Policy violation, if the plugin blocked the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<PluginViolation>,
    /// Request for client-side user input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation_request: Option<PluginElicitation>,
    /// Arbitrary key/value plumbing carried through the chain
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl<T> Default for PluginResult<T> {
    fn default() -> Self {
        Self::pass()
    }
}

impl<T> PluginResult<T> {
    /// Continue unchanged
    pub fn pass() -> Self {
        Self {
            continue_processing: true,
            modified_payload: None,
            violation: None,
            elicitation_request: None,
            metadata: HashMap::new(),
        }
    }

    /// Continue with a replacement payload
    pub fn modify(payload: T) -> Self {
        Self {
            modified_payload: Some(payload),
            ..Self::pass()
        }
    }

    /// Block the request with a violation
    pub fn block(violation: PluginViolation) -> Self {
        Self {
            continue_processing: false,
            violation: Some(violation),
            ..Self::pass()
        }
    }

    /// Suspend the request pending client input
    pub fn elicit(request: PluginElicitation) -> Self {
        Self {
            continue_processing: false,
            elicitation_request: Some(request),
            ..Self::pass()
        }
    }
}

/// A policy violation reported by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginViolation {
    /// Short machine-readable reason
    pub reason: String,
    /// Human-readable description
    pub description: String,
    /// Stable violation code (`CONTENT_BLOCKED`, ...)
    pub code: String,
    /// Structured details
    #[serde(default)]
    pub details: Value,
    /// Reporting plugin; filled in by the chain
    #[serde(default)]
    pub plugin_name: String,
}

impl PluginViolation {
    /// Create a violation
    pub fn new(
        reason: impl Into<String>,
        description: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            reason: reason.into(),
            description: description.into(),
            code: code.into(),
            details: Value::Null,
            plugin_name: String::new(),
        }
    }
}

/// A plugin's request for structured client-side user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginElicitation {
    /// Message shown to the user
    pub message: String,
    /// JSON Schema the response data must satisfy (primitive types only)
    pub schema: Value,
    /// Per-request timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}
