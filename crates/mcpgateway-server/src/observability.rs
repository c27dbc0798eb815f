//! Request logging, redaction and metric emission.

use mcpgateway_plugins::HeaderSet;
use mcpgateway_registry::{EntityId, MetricEvent, MetricStatus};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const MASK: &str = "******";

/// Body field names redacted by key, case-insensitively.
const REDACTED_FIELDS: [&str; 7] = [
    "password",
    "secret",
    "token",
    "apikey",
    "access_token",
    "refresh_token",
    "client_secret",
];

/// Whether a header's value must be masked in logs.
pub fn is_sensitive_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "authorization"
        || lower == "cookie"
        || lower == "set-cookie"
        || (lower.starts_with("x-") && lower.ends_with("-token"))
        || lower.ends_with("-secret")
        || lower.ends_with("-password")
}

/// Copy a header set with sensitive values masked.
pub fn mask_headers(headers: &HeaderSet) -> HeaderSet {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if is_sensitive_header(name) { MASK } else { value };
            (name.to_string(), value.to_string())
        })
        .collect()
}

/// Redact secret-bearing fields (by key name, recursively) in a JSON
/// body before it can reach a log line.
pub fn redact_body(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                let lower = key.to_ascii_lowercase();
                if REDACTED_FIELDS.contains(&lower.as_str()) {
                    out.insert(key.clone(), Value::String(MASK.into()));
                } else {
                    out.insert(key.clone(), redact_body(inner));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_body).collect()),
        other => other.clone(),
    }
}

/// Emit the per-request structured record and method counters.
#[allow(clippy::too_many_arguments)]
pub fn record_request(
    request_id: &str,
    session_id: Option<&str>,
    method: &str,
    route: &str,
    principal: &str,
    tenant_id: Option<EntityId>,
    duration: Duration,
    error_code: Option<&str>,
) {
    let status = if error_code.is_none() { "ok" } else { "error" };
    info!(
        request_id,
        session_id = session_id.unwrap_or("-"),
        method,
        route,
        principal,
        tenant_id = %tenant_id.map(|t| t.to_hex()).unwrap_or_else(|| "-".into()),
        duration_ms = duration.as_millis() as u64,
        status,
        error_code = error_code.unwrap_or("-"),
        "request complete"
    );
    metrics::counter!(
        "mcpgateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "mcpgateway_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Log a request body when `LOG_REQUESTS` is on, redacted and truncated.
pub fn log_request_body(enabled: bool, max_size_mb: u64, method: &str, body: &Value) {
    if !enabled {
        return;
    }
    let redacted = redact_body(body);
    let mut text = redacted.to_string();
    let cap = (max_size_mb as usize) * 1024 * 1024;
    if text.len() > cap {
        let mut cut = cap;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...<truncated>");
    }
    debug!(method, body = %text, "request body");
}

/// Build the append-only metric event for an invocation.
pub fn metric_event(
    entity_id: EntityId,
    entity_kind: &str,
    duration: Duration,
    error_code: Option<&str>,
    tenant_id: EntityId,
    request_id: &str,
) -> MetricEvent {
    MetricEvent {
        entity_id,
        entity_kind: entity_kind.to_string(),
        duration_ms: duration.as_millis() as u64,
        status: if error_code.is_none() {
            MetricStatus::Ok
        } else {
            MetricStatus::Error
        },
        error_code: error_code.map(str::to_string),
        tenant_id,
        request_id: request_id.to_string(),
        timestamp: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn sensitive_header_patterns() {
        assert!(is_sensitive_header("Authorization"));
        assert!(is_sensitive_header("cookie"));
        assert!(is_sensitive_header("Set-Cookie"));
        assert!(is_sensitive_header("X-Api-Token"));
        assert!(is_sensitive_header("client-secret"));
        assert!(is_sensitive_header("db-password"));
        assert!(!is_sensitive_header("Content-Type"));
        assert!(!is_sensitive_header("X-Request-Id"));
    }

    #[test]
    fn masking_replaces_values() {
        let mut headers = HeaderSet::new();
        headers.insert("Authorization", "Bearer secret");
        headers.insert("X-Request-Id", "req-1");
        let masked = mask_headers(&headers);
        assert_eq!(masked.get("authorization"), Some(MASK));
        assert_eq!(masked.get("x-request-id"), Some("req-1"));
    }

    #[test]
    fn body_redaction_is_recursive() {
        let body = json!({
            "user": "alice",
            "password": "hunter2",
            "nested": {"access_token": "abc", "note": "keep"},
            "list": [{"client_secret": "xyz"}]
        });
        let redacted = redact_body(&body);
        assert_eq!(redacted["user"], "alice");
        assert_eq!(redacted["password"], MASK);
        assert_eq!(redacted["nested"]["access_token"], MASK);
        assert_eq!(redacted["nested"]["note"], "keep");
        assert_eq!(redacted["list"][0]["client_secret"], MASK);
    }
}
