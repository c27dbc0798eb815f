//! Entity records and their invariants.
//!
//! Every record owns a `validate()` that enforces the domain rules at the
//! store boundary, so no backend can persist an invalid entity.

use crate::{EntityId, RegistryError, RegistryResult, Visibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Transport an upstream gateway speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayTransport {
    /// Server-Sent Events with a companion POST path
    Sse,
    /// MCP streamable HTTP
    Streamablehttp,
    /// Spawned child process over stdio
    Stdio,
}

/// Authentication scheme for an upstream gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    /// No authentication
    None,
    /// HTTP basic
    Basic,
    /// Bearer token
    Bearer,
    /// Arbitrary custom headers
    CustomHeaders,
    /// OAuth client credentials
    Oauth,
}

/// An upstream MCP endpoint the gateway federates with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRecord {
    /// Identifier
    pub id: EntityId,
    /// Tenant the gateway belongs to
    pub tenant_id: EntityId,
    /// Unique name per tenant
    pub name: String,
    /// URL-safe slug used when prefixing federated capability names
    pub slug: String,
    /// Endpoint URL
    pub url: String,
    /// Transport the upstream speaks
    pub transport: GatewayTransport,
    /// Authentication scheme
    pub auth_type: AuthType,
    /// Opaque credential material; always absent for one-time-auth gateways
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_material: Option<String>,
    /// Credential was used once at registration and discarded
    pub one_time_auth: bool,
    /// Ordered allowlist of header names forwarded to this upstream
    pub passthrough_headers: Vec<String>,
    /// Custom CA bundle (PEM)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,
    /// Administratively enabled
    pub enabled: bool,
    /// Last health check succeeded
    pub reachable: bool,
    /// Periodic health checks run for this gateway
    pub health_checks_enabled: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last successful contact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Owning team
    pub owner_team_id: EntityId,
    /// Sharing scope
    pub visibility: Visibility,
    /// Optimistic concurrency version
    pub version: u64,
}

impl GatewayRecord {
    /// Validate the record's invariants.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Invalid` naming the offending field.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::invalid("name", "must be non-empty"));
        }
        canonicalize_endpoint(&self.url)?;
        if self.one_time_auth {
            if self.auth_material.is_some() {
                return Err(RegistryError::invalid(
                    "auth_material",
                    "must be absent for one-time-auth gateways",
                ));
            }
            if self.health_checks_enabled {
                return Err(RegistryError::invalid(
                    "health_checks_enabled",
                    "must be false for one-time-auth gateways",
                ));
            }
        }
        if let Some(pem) = &self.ca_certificate {
            validate_pem(pem)?;
        }
        for header in &self.passthrough_headers {
            validate_header_name(header)?;
        }
        Ok(())
    }
}

/// How a tool is integrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntegrationType {
    /// Proxied MCP tool
    Mcp,
    /// REST endpoint exposed as a tool
    Rest,
}

/// Request style for a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP PATCH
    Patch,
    /// HTTP DELETE
    Delete,
    /// Server-Sent Events
    Sse,
    /// MCP streamable HTTP
    Streamablehttp,
}

/// An invocable capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    /// Identifier
    pub id: EntityId,
    /// Owning gateway; absent for native tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<EntityId>,
    /// Tenant
    pub tenant_id: EntityId,
    /// Normalized name, unique within the owning gateway
    pub name: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Integration style
    pub integration_type: IntegrationType,
    /// Request style
    pub request_type: RequestType,
    /// REST endpoint URL (REST tools only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// MCP method name on the upstream (MCP tools only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_method: Option<String>,
    /// JSON Schema for arguments (primitives + object/array only)
    pub input_schema: Value,
    /// Behavioral annotations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    /// Tags
    pub tags: Vec<String>,
    /// Administratively enabled
    pub enabled: bool,
    /// Upstream reachable at last check
    pub reachable: bool,
    /// Owning team
    pub owner_team_id: EntityId,
    /// Sharing scope
    pub visibility: Visibility,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl ToolRecord {
    /// Validate the record's invariants.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Invalid` naming the offending field.
    pub fn validate(&self) -> RegistryResult<()> {
        if !is_valid_tool_name(&self.name) {
            return Err(RegistryError::invalid(
                "name",
                "must match [A-Za-z0-9_-]{1,128}",
            ));
        }
        match self.integration_type {
            IntegrationType::Rest if self.url.is_none() => {
                Err(RegistryError::invalid("url", "REST tools require a URL"))
            }
            IntegrationType::Mcp if self.mcp_method.is_none() => Err(RegistryError::invalid(
                "mcp_method",
                "MCP tools require an mcp_method",
            )),
            _ => Ok(()),
        }
    }

    /// Whether this is a native tool (no upstream gateway)
    pub fn is_native(&self) -> bool {
        self.gateway_id.is_none()
    }
}

/// Addressable content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Identifier
    pub id: EntityId,
    /// Owning gateway; absent for native resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<EntityId>,
    /// Tenant
    pub tenant_id: EntityId,
    /// Normalized URI, unique within the owning gateway
    pub uri: String,
    /// Display name
    pub name: String,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size hint in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_hint: Option<u64>,
    /// Inline text content for native resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Tags
    pub tags: Vec<String>,
    /// Owning team
    pub owner_team_id: EntityId,
    /// Sharing scope
    pub visibility: Visibility,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl ResourceRecord {
    /// Validate the record's invariants.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Invalid` when the URI is empty or contains
    /// whitespace.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.uri.trim().is_empty() || self.uri.contains(char::is_whitespace) {
            return Err(RegistryError::invalid("uri", "must be a normalized URI"));
        }
        Ok(())
    }
}

/// A prompt template argument specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgumentSpec {
    /// Argument name
    pub name: String,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument is required
    pub required: bool,
}

/// A parameterized text template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRecord {
    /// Identifier
    pub id: EntityId,
    /// Owning gateway; absent for native prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<EntityId>,
    /// Tenant
    pub tenant_id: EntityId,
    /// Name, unique within the owning gateway
    pub name: String,
    /// The prompt's name on the upstream, when federated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Argument schema
    pub arguments: Vec<PromptArgumentSpec>,
    /// Template text with `{{ name }}` placeholders
    pub template: String,
    /// Owning team
    pub owner_team_id: EntityId,
    /// Sharing scope
    pub visibility: Visibility,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl PromptRecord {
    /// Validate the record's invariants.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Invalid` when the name is empty.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::invalid("name", "must be non-empty"));
        }
        Ok(())
    }

    /// Render the template with the given arguments.
    ///
    /// Rendering is pure: no I/O, deterministic for identical inputs.
    /// Placeholders are `{{ name }}` with optional inner whitespace.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Invalid` when a required argument is missing
    /// or a placeholder has no corresponding argument value.
    pub fn render(
        &self,
        args: &std::collections::HashMap<String, String>,
    ) -> RegistryResult<String> {
        for spec in &self.arguments {
            if spec.required && !args.contains_key(&spec.name) {
                return Err(RegistryError::invalid(
                    "arguments",
                    format!("missing required argument {:?}", spec.name),
                ));
            }
        }
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(RegistryError::invalid("template", "unterminated placeholder"));
            };
            let key = after[..end].trim();
            match args.get(key) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(RegistryError::invalid(
                        "arguments",
                        format!("no value for placeholder {key:?}"),
                    ));
                }
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// A named composition of capabilities drawn from many upstreams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualServerRecord {
    /// Identifier
    pub id: EntityId,
    /// Tenant
    pub tenant_id: EntityId,
    /// Name, unique per tenant
    pub name: String,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Associated tool ids (ordered)
    pub associated_tools: Vec<EntityId>,
    /// Associated resource ids
    pub associated_resources: Vec<EntityId>,
    /// Associated prompt ids
    pub associated_prompts: Vec<EntityId>,
    /// Associated A2A agent ids
    pub associated_a2a_agents: Vec<EntityId>,
    /// Owning team
    pub owner_team_id: EntityId,
    /// Sharing scope
    pub visibility: Visibility,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: u64,
}

impl VirtualServerRecord {
    /// Validate the record's invariants.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Invalid` when the name is empty.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::invalid("name", "must be non-empty"));
        }
        Ok(())
    }
}

/// Invocation outcome recorded per metric event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    /// Completed successfully
    Ok,
    /// Failed
    Error,
}

/// Per-invocation metric record. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    /// Tool/resource/prompt the invocation targeted
    pub entity_id: EntityId,
    /// Entity class label (`tool`, `resource`, `prompt`)
    pub entity_kind: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Outcome
    pub status: MetricStatus,
    /// Error code when the outcome was an error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Tenant
    pub tenant_id: EntityId,
    /// Correlation id
    pub request_id: String,
    /// Event time
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Correlation id
    pub request_id: String,
    /// Acting principal
    pub actor: String,
    /// Action label (`gateway.create`, `tool.invoke.blocked`, ...)
    pub action: String,
    /// Target entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<EntityId>,
    /// Event time
    pub at: DateTime<Utc>,
    /// Structured details
    pub details: Value,
}

/// Canonicalize an endpoint URL for uniqueness comparison:
/// scheme + lowercased host + explicit port + normalized path with the
/// trailing slash collapsed.
///
/// # Errors
///
/// Returns `RegistryError::Invalid` when the URL does not parse or has no
/// host.
pub fn canonicalize_endpoint(raw: &str) -> RegistryResult<String> {
    let url = Url::parse(raw).map_err(|e| RegistryError::invalid("url", e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| RegistryError::invalid("url", "missing host"))?
        .to_ascii_lowercase();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| RegistryError::invalid("url", "unknown scheme default port"))?;
    let mut path = url.path().to_string();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    Ok(format!("{}://{host}:{port}{path}", url.scheme()))
}

/// Normalize a raw remote tool name: whitespace and disallowed characters
/// become `-`, runs are collapsed.
///
/// # Errors
///
/// Returns `RegistryError::Invalid` when nothing valid remains or the
/// result exceeds 128 characters.
pub fn normalize_tool_name(raw: &str) -> RegistryResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            last_dash = false;
        } else if c == '-' || c == '.' || c.is_whitespace() || c == '/' {
            if !last_dash && !out.is_empty() {
                out.push('-');
                last_dash = true;
            }
        }
        // anything else is dropped
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() || out.len() > 128 {
        return Err(RegistryError::invalid(
            "name",
            format!("{raw:?} does not normalize to a valid tool name"),
        ));
    }
    Ok(out)
}

fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn validate_pem(pem: &str) -> RegistryResult<()> {
    let trimmed = pem.trim();
    if trimmed.starts_with("-----BEGIN CERTIFICATE-----")
        && trimmed.ends_with("-----END CERTIFICATE-----")
    {
        Ok(())
    } else {
        Err(RegistryError::invalid(
            "ca_certificate",
            "not a PEM certificate",
        ))
    }
}

fn validate_header_name(name: &str) -> RegistryResult<()> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        Ok(())
    } else {
        Err(RegistryError::invalid(
            "passthrough_headers",
            format!("invalid header name {name:?}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn base_gateway() -> GatewayRecord {
        GatewayRecord {
            id: EntityId::generate(),
            tenant_id: EntityId::generate(),
            name: "time-server".into(),
            slug: "time-server".into(),
            url: "https://mcp.example.com/api/".into(),
            transport: GatewayTransport::Streamablehttp,
            auth_type: AuthType::None,
            auth_material: None,
            one_time_auth: false,
            passthrough_headers: vec!["X-Tenant-Id".into()],
            ca_certificate: None,
            enabled: true,
            reachable: false,
            health_checks_enabled: true,
            created_at: Utc::now(),
            last_seen_at: None,
            owner_team_id: EntityId::generate(),
            visibility: Visibility::Team,
            version: 0,
        }
    }

    #[test]
    fn endpoint_canonicalization_collapses_case_and_slash() {
        let a = canonicalize_endpoint("https://MCP.Example.com/api/").unwrap();
        let b = canonicalize_endpoint("https://mcp.example.com:443/api").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "https://mcp.example.com:443/api");
    }

    #[test]
    fn one_time_auth_forbids_stored_material() {
        let mut gateway = base_gateway();
        gateway.one_time_auth = true;
        gateway.health_checks_enabled = false;
        assert!(gateway.validate().is_ok());

        gateway.auth_material = Some("s3cret".into());
        assert!(gateway.validate().is_err());

        gateway.auth_material = None;
        gateway.health_checks_enabled = true;
        assert!(gateway.validate().is_err());
    }

    #[test]
    fn tool_name_normalization() {
        assert_eq!(normalize_tool_name("get system time").unwrap(), "get-system-time");
        assert_eq!(normalize_tool_name("Time.Get/Now").unwrap(), "Time-Get-Now");
        assert_eq!(normalize_tool_name("already_fine-1").unwrap(), "already_fine-1");
        assert!(normalize_tool_name("!!!").is_err());
    }

    #[test]
    fn rest_tool_requires_url() {
        let tool = ToolRecord {
            id: EntityId::generate(),
            gateway_id: None,
            tenant_id: EntityId::generate(),
            name: "weather".into(),
            display_name: None,
            description: None,
            integration_type: IntegrationType::Rest,
            request_type: RequestType::Get,
            url: None,
            mcp_method: None,
            input_schema: serde_json::json!({"type": "object"}),
            annotations: None,
            tags: vec![],
            enabled: true,
            reachable: true,
            owner_team_id: EntityId::generate(),
            visibility: Visibility::Public,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 0,
        };
        assert!(tool.validate().is_err());
    }

    #[test]
    fn prompt_render_is_pure_and_strict() {
        let prompt = PromptRecord {
            id: EntityId::generate(),
            gateway_id: None,
            tenant_id: EntityId::generate(),
            name: "greeting".into(),
            remote_name: None,
            description: None,
            arguments: vec![PromptArgumentSpec {
                name: "who".into(),
                description: None,
                required: true,
            }],
            template: "Hello, {{ who }}! Welcome to {{ place }}.".into(),
            owner_team_id: EntityId::generate(),
            visibility: Visibility::Public,
            created_at: Utc::now(),
            version: 0,
        };

        let mut args = HashMap::new();
        args.insert("who".to_string(), "Ada".to_string());
        args.insert("place".to_string(), "the gateway".to_string());

        let first = prompt.render(&args).unwrap();
        let second = prompt.render(&args).unwrap();
        assert_eq!(first, "Hello, Ada! Welcome to the gateway.");
        assert_eq!(first, second);

        args.remove("who");
        assert!(prompt.render(&args).is_err());
    }
}
