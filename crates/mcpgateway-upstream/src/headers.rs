//! Outbound header injection.
//!
//! Order of application before dispatch:
//! 1. base headers the gateway itself produces (content negotiation, auth
//!    material for persistent auth types);
//! 2. allowlisted client headers, iff `ENABLE_HEADER_PASSTHROUGH` is on,
//!    using the gateway-specific list when present, else the global one;
//! 3. `X-Upstream-Authorization` mapped to `Authorization` at egress
//!    (this is the only runtime credential path for one-time-auth
//!    gateways);
//! 4. plugin additions from `http_pre_forwarding_call`, subject to
//!    base-header protection (applied by the caller via
//!    [`mcpgateway_plugins::merge_hook_headers`]).

use base64::Engine as _;
use mcpgateway_plugins::HeaderSet;
use mcpgateway_registry::{AuthType, GatewayRecord};
use tracing::debug;

/// Inputs for computing the outbound header set.
#[derive(Debug, Clone, Default)]
pub struct HeaderContext {
    /// Headers the client sent with the request
    pub client_headers: HeaderSet,
    /// Global passthrough allowlist (admin-configured)
    pub global_passthrough: Vec<String>,
    /// `ENABLE_HEADER_PASSTHROUGH` flag
    pub passthrough_enabled: bool,
}

/// Compute the outbound header set for one upstream dispatch, before the
/// forwarding hooks run.
pub fn build_outbound_headers(gateway: &GatewayRecord, ctx: &HeaderContext) -> HeaderSet {
    let mut headers = HeaderSet::new();
    headers.insert("Content-Type", "application/json");
    headers.insert("Accept", "application/json, text/event-stream");

    // persistent credential material
    if let Some(material) = &gateway.auth_material {
        match gateway.auth_type {
            AuthType::Bearer => {
                headers.insert("Authorization", &format!("Bearer {material}"));
            }
            AuthType::Basic => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(material);
                headers.insert("Authorization", &format!("Basic {encoded}"));
            }
            AuthType::CustomHeaders => {
                if let Ok(map) =
                    serde_json::from_str::<std::collections::HashMap<String, String>>(material)
                {
                    for (name, value) in &map {
                        headers.insert(name, value);
                    }
                }
            }
            AuthType::Oauth | AuthType::None => {}
        }
    }

    // allowlisted client headers
    let allowlist: &[String] = if gateway.passthrough_headers.is_empty() {
        &ctx.global_passthrough
    } else {
        &gateway.passthrough_headers
    };
    if ctx.passthrough_enabled {
        for name in allowlist {
            if let Some(value) = ctx.client_headers.get(name) {
                headers.insert(name, value);
            }
        }
    } else if allowlist
        .iter()
        .any(|name| ctx.client_headers.contains(name))
    {
        debug!(gateway = %gateway.name, "Header passthrough is disabled");
    }

    // one-shot upstream credential supplied by the client
    if let Some(value) = ctx.client_headers.get("X-Upstream-Authorization") {
        headers.insert("Authorization", value);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mcpgateway_registry::{EntityId, GatewayTransport, Visibility};
    use pretty_assertions::assert_eq;

    fn gateway(auth_type: AuthType, auth_material: Option<&str>) -> GatewayRecord {
        GatewayRecord {
            id: EntityId::generate(),
            tenant_id: EntityId::generate(),
            name: "up".into(),
            slug: "up".into(),
            url: "https://up.example.com/mcp".into(),
            transport: GatewayTransport::Streamablehttp,
            auth_type,
            auth_material: auth_material.map(str::to_string),
            one_time_auth: auth_material.is_none() && auth_type == AuthType::Bearer,
            passthrough_headers: vec!["X-Tenant-Id".into()],
            ca_certificate: None,
            enabled: true,
            reachable: true,
            health_checks_enabled: false,
            created_at: Utc::now(),
            last_seen_at: None,
            owner_team_id: EntityId::generate(),
            visibility: Visibility::Team,
            version: 0,
        }
    }

    fn client_headers(pairs: &[(&str, &str)]) -> HeaderSet {
        let mut set = HeaderSet::new();
        for (name, value) in pairs {
            set.insert(name, value);
        }
        set
    }

    #[test]
    fn passthrough_disabled_drops_allowlisted_header() {
        let gateway = gateway(AuthType::None, None);
        let ctx = HeaderContext {
            client_headers: client_headers(&[("X-Tenant-Id", "acme")]),
            global_passthrough: vec![],
            passthrough_enabled: false,
        };
        let headers = build_outbound_headers(&gateway, &ctx);
        assert!(!headers.contains("X-Tenant-Id"));
    }

    #[test]
    fn passthrough_enabled_forwards_gateway_allowlist_only() {
        let gateway = gateway(AuthType::None, None);
        let ctx = HeaderContext {
            client_headers: client_headers(&[
                ("X-Tenant-Id", "acme"),
                ("X-Not-Allowed", "nope"),
            ]),
            global_passthrough: vec!["X-Not-Allowed".into()],
            passthrough_enabled: true,
        };
        let headers = build_outbound_headers(&gateway, &ctx);
        assert_eq!(headers.get("x-tenant-id"), Some("acme"));
        // gateway list overrides the global one
        assert!(!headers.contains("X-Not-Allowed"));
    }

    #[test]
    fn one_time_auth_maps_upstream_authorization() {
        let gateway = gateway(AuthType::Bearer, None);
        let ctx = HeaderContext {
            client_headers: client_headers(&[("X-Upstream-Authorization", "Bearer s3cret")]),
            global_passthrough: vec![],
            passthrough_enabled: false,
        };
        let headers = build_outbound_headers(&gateway, &ctx);
        assert_eq!(headers.get("authorization"), Some("Bearer s3cret"));
        assert!(!headers.contains("X-Upstream-Authorization"));
    }

    #[test]
    fn bearer_material_becomes_authorization() {
        let gateway = gateway(AuthType::Bearer, Some("tok"));
        let headers = build_outbound_headers(&gateway, &HeaderContext::default());
        assert_eq!(headers.get("authorization"), Some("Bearer tok"));
    }
}
