//! Server error taxonomy and its JSON-RPC / HTTP mappings.

use mcpgateway_plugins::{PluginError, PluginViolation};
use mcpgateway_protocol::jsonrpc::{JsonRpcError, error_codes};
use mcpgateway_registry::RegistryError;
use mcpgateway_upstream::UpstreamError;
use serde_json::json;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by the dispatcher and transports.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Entity store error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Plugin runtime error in `enforce` mode
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Upstream call failure
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// A policy plugin blocked the request
    #[error("Plugin violation: {}", .0.reason)]
    Violation(PluginViolation),

    /// The client lacks a required MCP capability
    #[error("Client capability missing: {0}")]
    CapabilityMissing(&'static str),

    /// The feature is disabled by configuration
    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    /// Session elicitation cap reached
    #[error("Too many pending elicitations")]
    TooManyElicitations,

    /// Admin surface rate limit hit
    #[error("Rate limited")]
    RateLimited,

    /// The client did not answer the elicitation in time
    #[error("Elicitation timed out")]
    ElicitationTimeout,

    /// Unknown or expired session
    #[error("Unknown session")]
    SessionNotFound,

    /// Request parameters failed validation
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Unknown method
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Request deadline elapsed
    #[error("Request timed out")]
    Timeout,

    /// Unhandled fault
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Map onto the wire-level JSON-RPC error. User-visible messages
    /// never echo untrusted input; details go to the log.
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        match self {
            Self::Registry(RegistryError::Invalid { field, .. }) => {
                JsonRpcError::invalid_params(format!("invalid {field}"))
            }
            Self::Registry(RegistryError::Unauthenticated) => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Unauthenticated")
                    .with_data(json!({"code": "UNAUTHENTICATED"}))
            }
            Self::Registry(RegistryError::Forbidden(_)) => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Forbidden")
                    .with_data(json!({"code": "FORBIDDEN"}))
            }
            Self::Registry(RegistryError::NotFound { entity, .. }) => {
                JsonRpcError::new(error_codes::SERVER_ERROR, format!("{entity} not found"))
                    .with_data(json!({"code": "NOT_FOUND"}))
            }
            Self::Registry(RegistryError::Conflict(_) | RegistryError::Stale { .. }) => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Conflict")
                    .with_data(json!({"code": "CONFLICT"}))
            }
            Self::Registry(RegistryError::Unavailable(_)) => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Store unavailable")
                    .with_data(json!({"code": "UNAVAILABLE"}))
            }
            Self::Registry(_) => JsonRpcError::internal("internal error"),

            Self::Violation(violation) => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Plugin violation").with_data(json!({
                    "plugin": violation.plugin_name,
                    "code": violation.code,
                    "reason": violation.reason,
                    "description": violation.description,
                }))
            }
            Self::Plugin(PluginError::Timeout { .. }) => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Plugin timed out")
                    .with_data(json!({"code": "TIMEOUT"}))
            }
            Self::Plugin(_) => JsonRpcError::internal("plugin failure"),

            Self::Upstream(UpstreamError::Unavailable(_)) => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Upstream unavailable")
                    .with_data(json!({"code": "UNAVAILABLE", "retry_after_s": 30}))
            }
            Self::Upstream(UpstreamError::Timeout { .. }) | Self::Timeout => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Timeout")
                    .with_data(json!({"code": "TIMEOUT"}))
            }
            // upstream JSON-RPC errors pass through verbatim
            Self::Upstream(UpstreamError::Rpc { code, message }) => {
                JsonRpcError::new(*code, message.clone())
            }
            Self::Upstream(_) => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Upstream error")
                    .with_data(json!({"code": "UNAVAILABLE"}))
            }

            Self::CapabilityMissing(capability) => JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("client capability missing: {capability}"),
            ),
            Self::FeatureDisabled(feature) => JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("feature disabled: {feature}"),
            ),
            Self::TooManyElicitations => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Too many pending elicitations")
                    .with_data(json!({"code": "TOO_MANY_ELICITATIONS"}))
            }
            Self::RateLimited => JsonRpcError::new(error_codes::SERVER_ERROR, "Rate limited")
                .with_data(json!({"code": "RATE_LIMITED"})),
            Self::ElicitationTimeout => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Elicitation timed out")
                    .with_data(json!({"code": "TIMEOUT"}))
            }
            Self::SessionNotFound => {
                JsonRpcError::new(error_codes::SERVER_ERROR, "Unknown session")
                    .with_data(json!({"code": "NOT_FOUND"}))
            }
            Self::InvalidParams(detail) => JsonRpcError::invalid_params(detail.clone()),
            Self::MethodNotFound(method) => JsonRpcError::method_not_found(method),
            Self::Internal(_) => JsonRpcError::internal("internal error"),
        }
    }

    /// Stable error-code label for logs and metric events
    pub fn code_label(&self) -> &'static str {
        match self {
            Self::Registry(RegistryError::Invalid { .. }) | Self::InvalidParams(_) => "INVALID",
            Self::Registry(RegistryError::Unauthenticated) => "UNAUTHENTICATED",
            Self::Registry(RegistryError::Forbidden(_)) => "FORBIDDEN",
            Self::Registry(RegistryError::NotFound { .. }) | Self::SessionNotFound => "NOT_FOUND",
            Self::Registry(RegistryError::Conflict(_) | RegistryError::Stale { .. }) => "CONFLICT",
            Self::Registry(RegistryError::Unavailable(_)) => "UNAVAILABLE",
            Self::Registry(_) | Self::Internal(_) => "INTERNAL",
            Self::Violation(_) => "PLUGIN_VIOLATION",
            Self::Plugin(_) => "PLUGIN_ERROR",
            Self::Upstream(UpstreamError::Unavailable(_)) => "UNAVAILABLE",
            Self::Upstream(UpstreamError::Timeout { .. })
            | Self::Timeout
            | Self::ElicitationTimeout => "TIMEOUT",
            Self::Upstream(_) => "UPSTREAM",
            Self::CapabilityMissing(_) => "CAPABILITY_MISSING",
            Self::FeatureDisabled(_) => "FEATURE_DISABLED",
            Self::TooManyElicitations => "TOO_MANY_ELICITATIONS",
            Self::RateLimited => "RATE_LIMITED",
            Self::MethodNotFound(_) => "METHOD_NOT_FOUND",
        }
    }

    /// HTTP status for the admin surface
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Registry(err) => err.http_status(),
            Self::InvalidParams(_) => 400,
            Self::MethodNotFound(_) | Self::SessionNotFound => 404,
            Self::CapabilityMissing(_) | Self::FeatureDisabled(_) => 400,
            Self::Violation(_) => 403,
            Self::TooManyElicitations | Self::RateLimited => 429,
            Self::Timeout | Self::ElicitationTimeout => 504,
            Self::Upstream(UpstreamError::Unavailable(_)) => 503,
            Self::Upstream(_) | Self::Plugin(_) | Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_maps_to_server_error_with_plugin_data() {
        let mut violation = PluginViolation::new("PII detected", "SSN found", "CONTENT_BLOCKED");
        violation.plugin_name = "PIIFilterPlugin".into();
        let rpc = ServerError::Violation(violation).to_jsonrpc();
        assert_eq!(rpc.code, -32000);
        let data = rpc.data.unwrap();
        assert_eq!(data["plugin"], "PIIFilterPlugin");
        assert_eq!(data["code"], "CONTENT_BLOCKED");
        assert_eq!(data["reason"], "PII detected");
    }

    #[test]
    fn capability_missing_is_method_not_found() {
        let rpc = ServerError::CapabilityMissing("elicitation").to_jsonrpc();
        assert_eq!(rpc.code, -32601);
        let rpc = ServerError::FeatureDisabled("elicitation").to_jsonrpc();
        assert_eq!(rpc.code, -32601);
    }

    #[test]
    fn upstream_rpc_error_passes_through() {
        let rpc = ServerError::Upstream(UpstreamError::Rpc {
            code: -32601,
            message: "no such tool".into(),
        })
        .to_jsonrpc();
        assert_eq!(rpc.code, -32601);
        assert_eq!(rpc.message, "no such tool");
    }

    #[test]
    fn unavailable_carries_retry_hint() {
        let rpc = ServerError::Upstream(UpstreamError::Unavailable("circuit open".into()))
            .to_jsonrpc();
        assert_eq!(rpc.code, -32000);
        assert_eq!(rpc.data.unwrap()["code"], "UNAVAILABLE");
    }
}
