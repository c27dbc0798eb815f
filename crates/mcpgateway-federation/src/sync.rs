//! Capability sync: pull `tools/list`, `resources/list` and
//! `prompts/list` from each reachable peer and reconcile the cached set
//! transactionally.

use crate::naming::federated_name;
use crate::FederationResult;
use chrono::Utc;
use mcpgateway_registry::{
    EntityId, GatewayRecord, GatewayTransport, IntegrationType, PromptArgumentSpec, PromptRecord,
    RegistryStore, RequestType, ResourceRecord, SyncOutcome, ToolRecord, normalize_tool_name,
};
use mcpgateway_upstream::{ClientPool, HeaderContext, build_outbound_headers};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconciles upstream capability listings into the registry.
pub struct CapabilitySync {
    store: Arc<dyn RegistryStore>,
    pool: Arc<ClientPool>,
    separator: String,
}

impl CapabilitySync {
    /// Create a sync worker
    pub fn new(store: Arc<dyn RegistryStore>, pool: Arc<ClientPool>, separator: String) -> Self {
        Self {
            store,
            pool,
            separator,
        }
    }

    /// Sync every enabled, reachable gateway. One-time-auth peers are
    /// skipped: with no stored credential they refresh only on explicit
    /// admin request.
    ///
    /// # Errors
    ///
    /// Returns `FederationError` only for store failures; per-gateway
    /// upstream failures are logged and skipped.
    pub async fn sync_all(&self) -> FederationResult<SyncOutcome> {
        let mut totals = SyncOutcome::default();
        for gateway in self.store.all_gateways_system().await? {
            if !gateway.enabled || !gateway.reachable || gateway.one_time_auth {
                continue;
            }
            match self.sync_gateway(&gateway).await {
                Ok(outcome) => {
                    totals.added += outcome.added;
                    totals.removed += outcome.removed;
                    totals.updated += outcome.updated;
                }
                Err(error) => {
                    warn!(gateway = %gateway.name, %error, "capability sync failed");
                }
            }
        }
        Ok(totals)
    }

    /// Sync a single gateway's tools, resources and prompts.
    ///
    /// # Errors
    ///
    /// Returns `FederationError` on upstream or store failure.
    pub async fn sync_gateway(&self, gateway: &GatewayRecord) -> FederationResult<SyncOutcome> {
        let client = self.pool.client_for(gateway).await?;
        self.sync_with(&client, gateway).await
    }

    /// One-shot discovery with a transient client, outside the pool.
    ///
    /// Used at registration time: for one-time-auth gateways the caller
    /// passes a record still carrying the credential, uses it exactly
    /// once here, and persists the record without it.
    ///
    /// # Errors
    ///
    /// Returns `FederationError` on upstream or store failure.
    pub async fn discover_once(
        &self,
        gateway_with_credentials: &GatewayRecord,
        settings: &mcpgateway_config::UpstreamSettings,
        request_timeout: std::time::Duration,
    ) -> FederationResult<SyncOutcome> {
        let client = std::sync::Arc::new(mcpgateway_upstream::UpstreamClient::connect(
            gateway_with_credentials.clone(),
            settings.clone(),
            request_timeout,
        )?);
        self.sync_with(&client, gateway_with_credentials).await
    }

    async fn sync_with(
        &self,
        client: &std::sync::Arc<mcpgateway_upstream::UpstreamClient>,
        gateway: &GatewayRecord,
    ) -> FederationResult<SyncOutcome> {
        let headers = build_outbound_headers(gateway, &HeaderContext::default());

        let taken = self.names_taken_by_others(gateway.id).await?;

        let mut totals = SyncOutcome::default();

        let listed = client.list_tools(&headers).await?;
        let tools = listed
            .tools
            .into_iter()
            .filter_map(|tool| self.tool_record(gateway, &taken, tool))
            .collect();
        let outcome = self.store.replace_gateway_tools(gateway.id, tools).await?;
        totals.added += outcome.added;
        totals.removed += outcome.removed;
        totals.updated += outcome.updated;

        let listed = client.list_resources(&headers).await?;
        let resources = listed
            .resources
            .into_iter()
            .map(|resource| self.resource_record(gateway, resource))
            .collect();
        let outcome = self
            .store
            .replace_gateway_resources(gateway.id, resources)
            .await?;
        totals.added += outcome.added;
        totals.removed += outcome.removed;
        totals.updated += outcome.updated;

        let listed = client.list_prompts(&headers).await?;
        let prompts = listed
            .prompts
            .into_iter()
            .filter_map(|prompt| self.prompt_record(gateway, &taken, prompt))
            .collect();
        let outcome = self
            .store
            .replace_gateway_prompts(gateway.id, prompts)
            .await?;
        totals.added += outcome.added;
        totals.removed += outcome.removed;
        totals.updated += outcome.updated;

        info!(
            gateway = %gateway.name,
            added = totals.added,
            removed = totals.removed,
            updated = totals.updated,
            "capability sync applied"
        );
        Ok(totals)
    }

    /// Advertised names already used by capabilities of other gateways in
    /// the same tenant.
    async fn names_taken_by_others(&self, gateway_id: EntityId) -> FederationResult<HashSet<String>> {
        let mut taken = HashSet::new();
        for other in self.store.all_gateways_system().await? {
            if other.id == gateway_id {
                continue;
            }
            for tool in self.store.tools_for_gateway_system(other.id).await? {
                taken.insert(tool.name);
            }
        }
        Ok(taken)
    }

    fn tool_record(
        &self,
        gateway: &GatewayRecord,
        taken: &HashSet<String>,
        tool: mcpgateway_protocol::types::Tool,
    ) -> Option<ToolRecord> {
        let Ok(remote_name) = normalize_tool_name(&tool.name) else {
            debug!(gateway = %gateway.name, raw = %tool.name, "skipping unnormalizable tool name");
            return None;
        };
        let name = federated_name(
            &gateway.slug,
            &self.separator,
            &remote_name,
            gateway.id,
            |candidate| taken.contains(candidate),
        );
        Some(ToolRecord {
            id: EntityId::generate(),
            gateway_id: Some(gateway.id),
            tenant_id: gateway.tenant_id,
            name,
            display_name: tool.title,
            description: tool.description,
            integration_type: IntegrationType::Mcp,
            request_type: match gateway.transport {
                GatewayTransport::Sse => RequestType::Sse,
                GatewayTransport::Streamablehttp | GatewayTransport::Stdio => {
                    RequestType::Streamablehttp
                }
            },
            url: None,
            mcp_method: Some(tool.name),
            input_schema: tool.input_schema,
            annotations: tool.annotations,
            tags: vec![],
            enabled: true,
            reachable: true,
            owner_team_id: gateway.owner_team_id,
            visibility: gateway.visibility,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 0,
        })
    }

    fn resource_record(
        &self,
        gateway: &GatewayRecord,
        resource: mcpgateway_protocol::types::Resource,
    ) -> ResourceRecord {
        ResourceRecord {
            id: EntityId::generate(),
            gateway_id: Some(gateway.id),
            tenant_id: gateway.tenant_id,
            uri: resource.uri,
            name: resource.name,
            description: resource.description,
            mime_type: resource.mime_type,
            size_hint: resource.size,
            text: None,
            tags: vec![],
            owner_team_id: gateway.owner_team_id,
            visibility: gateway.visibility,
            created_at: Utc::now(),
            version: 0,
        }
    }

    fn prompt_record(
        &self,
        gateway: &GatewayRecord,
        taken: &HashSet<String>,
        prompt: mcpgateway_protocol::types::Prompt,
    ) -> Option<PromptRecord> {
        let Ok(remote_name) = normalize_tool_name(&prompt.name) else {
            return None;
        };
        let name = federated_name(
            &gateway.slug,
            &self.separator,
            &remote_name,
            gateway.id,
            |candidate| taken.contains(candidate),
        );
        Some(PromptRecord {
            id: EntityId::generate(),
            gateway_id: Some(gateway.id),
            tenant_id: gateway.tenant_id,
            name,
            remote_name: Some(prompt.name),
            description: prompt.description,
            arguments: prompt
                .arguments
                .unwrap_or_default()
                .into_iter()
                .map(|arg| PromptArgumentSpec {
                    name: arg.name,
                    description: arg.description,
                    required: arg.required.unwrap_or(false),
                })
                .collect(),
            // rendered by the upstream; the gateway stores no template text
            template: String::new(),
            owner_team_id: gateway.owner_team_id,
            visibility: gateway.visibility,
            created_at: Utc::now(),
            version: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgateway_config::UpstreamSettings;
    use mcpgateway_registry::{AuthType, InMemoryStore, Visibility};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn peer(url: &str, name: &str) -> GatewayRecord {
        GatewayRecord {
            id: EntityId::generate(),
            tenant_id: EntityId::generate(),
            name: name.into(),
            slug: name.into(),
            url: format!("{url}/mcp"),
            transport: GatewayTransport::Streamablehttp,
            auth_type: AuthType::None,
            auth_material: None,
            one_time_auth: false,
            passthrough_headers: vec![],
            ca_certificate: None,
            enabled: true,
            reachable: true,
            health_checks_enabled: true,
            created_at: Utc::now(),
            last_seen_at: None,
            owner_team_id: EntityId::generate(),
            visibility: Visibility::Public,
            version: 0,
        }
    }

    async fn mount_listings(server: &MockServer, tools: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": {"tools": tools}
            })))
            .mount(server)
            .await;
        for listing in ["resources/list", "prompts/list"] {
            let key = listing.split('/').next().unwrap();
            Mock::given(method("POST"))
                .and(path("/mcp"))
                .and(body_partial_json(json!({"method": listing})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0", "id": 1, "result": {key: []}
                })))
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn sync_prefixes_and_stores_peer_tools() {
        let server = MockServer::start().await;
        mount_listings(
            &server,
            json!([
                {"name": "a", "inputSchema": {"type": "object"}},
                {"name": "b", "inputSchema": {"type": "object"}}
            ]),
        )
        .await;

        let store: Arc<dyn RegistryStore> = Arc::new(InMemoryStore::new());
        let pool = Arc::new(ClientPool::new(
            UpstreamSettings::default(),
            Duration::from_secs(5),
        ));
        let sync = CapabilitySync::new(store.clone(), pool, "-".into());

        let p1 = peer(&server.uri(), "p1");
        let outcome = sync.sync_gateway(&p1).await.unwrap();
        assert_eq!(outcome.added, 2);

        let names: Vec<String> = store
            .tools_for_gateway_system(p1.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["p1-a".to_string(), "p1-b".to_string()]);
    }

    #[tokio::test]
    async fn resync_is_idempotent() {
        let server = MockServer::start().await;
        mount_listings(&server, json!([{"name": "a", "inputSchema": {}}])).await;

        let store: Arc<dyn RegistryStore> = Arc::new(InMemoryStore::new());
        let pool = Arc::new(ClientPool::new(
            UpstreamSettings::default(),
            Duration::from_secs(5),
        ));
        let sync = CapabilitySync::new(store.clone(), pool, "-".into());

        let p1 = peer(&server.uri(), "p1");
        let first = sync.sync_gateway(&p1).await.unwrap();
        assert_eq!(first.added, 1);
        let second = sync.sync_gateway(&p1).await.unwrap();
        assert_eq!(second, SyncOutcome::default());
    }

    #[tokio::test]
    async fn one_time_auth_peers_are_skipped_by_sync_all() {
        let store: Arc<dyn RegistryStore> = Arc::new(InMemoryStore::new());
        let pool = Arc::new(ClientPool::new(
            UpstreamSettings::default(),
            Duration::from_secs(5),
        ));
        let sync = CapabilitySync::new(store.clone(), pool, "-".into());

        let mut one_time = peer("https://unreachable.invalid", "ot");
        one_time.one_time_auth = true;
        one_time.health_checks_enabled = false;
        let principal = mcpgateway_registry::Principal {
            user: "admin".into(),
            tenant_id: one_time.tenant_id,
            team_ids: vec![one_time.owner_team_id],
            scopes: vec![],
        };
        store.create_gateway(one_time, &principal).await.unwrap();

        // no upstream call is attempted, so this returns cleanly
        let outcome = sync.sync_all().await.unwrap();
        assert_eq!(outcome, SyncOutcome::default());
    }
}
