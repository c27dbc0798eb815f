//! The leader-gated background worker loop.

use crate::leader::LeaderElector;
use crate::sync::CapabilitySync;
use crate::FederationResult;
use mcpgateway_config::FederationSettings;
use mcpgateway_plugins::HeaderSet;
use mcpgateway_registry::RegistryStore;
use mcpgateway_upstream::ClientPool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Owns the leader elector and runs the leader-only jobs on the health
/// check cadence: peer health checks, capability sync, and the
/// dangling-association sweep.
pub struct FederationRuntime {
    store: Arc<dyn RegistryStore>,
    pool: Arc<ClientPool>,
    elector: Arc<LeaderElector>,
    sync: CapabilitySync,
    settings: FederationSettings,
}

impl FederationRuntime {
    /// Wire up the runtime
    pub fn new(
        store: Arc<dyn RegistryStore>,
        pool: Arc<ClientPool>,
        settings: FederationSettings,
    ) -> Self {
        let node_id = format!("mcpgateway-{}", uuid::Uuid::new_v4().simple());
        let elector = Arc::new(LeaderElector::new(
            store.clone(),
            node_id,
            settings.leader_ttl,
            settings.leader_renewal,
        ));
        let sync = CapabilitySync::new(
            store.clone(),
            pool.clone(),
            settings.tool_name_separator.clone(),
        );
        Self {
            store,
            pool,
            elector,
            sync,
            settings,
        }
    }

    /// The elector, for readiness reporting
    pub fn elector(&self) -> Arc<LeaderElector> {
        self.elector.clone()
    }

    /// Run until `shutdown` flips to true. Renewal and work run on their
    /// own cadences; non-leaders only renew.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut renewal = tokio::time::interval(self.settings.leader_renewal);
        renewal.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut work = tokio::time::interval(self.settings.health_check_interval);
        work.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = renewal.tick() => {
                    self.elector.tick().await;
                }
                _ = work.tick() => {
                    if self.elector.is_leader() {
                        if let Err(error) = self.run_leader_jobs().await {
                            warn!(%error, "leader job cycle failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        if self.elector.is_leader() {
            if let Err(error) = self.store.release_leader(self.elector.node_id()).await {
                warn!(%error, "failed to release leader lock on shutdown");
            }
        }
    }

    /// One cycle of the leader-only jobs.
    ///
    /// # Errors
    ///
    /// Returns `FederationError` on store failure; per-gateway upstream
    /// failures only flip reachability.
    pub async fn run_leader_jobs(&self) -> FederationResult<()> {
        self.health_check_all().await?;
        let outcome = self.sync.sync_all().await?;
        debug!(
            added = outcome.added,
            removed = outcome.removed,
            updated = outcome.updated,
            "federation sync cycle complete"
        );
        let pruned = self.store.prune_dangling_associations().await?;
        if pruned > 0 {
            info!(pruned, "pruned dangling virtual-server associations");
        }
        Ok(())
    }

    /// Ping every gateway with health checks enabled and record the
    /// outcome.
    async fn health_check_all(&self) -> FederationResult<()> {
        for gateway in self.store.all_gateways_system().await? {
            if !gateway.enabled || !gateway.health_checks_enabled {
                continue;
            }
            let reachable = match self.pool.client_for(&gateway).await {
                Ok(client) => client.ping(&HeaderSet::new()).await.is_ok(),
                Err(error) => {
                    warn!(gateway = %gateway.name, %error, "cannot build upstream client");
                    false
                }
            };
            if reachable != gateway.reachable {
                info!(gateway = %gateway.name, reachable, "gateway health transition");
            }
            self.store.set_gateway_health(gateway.id, reachable).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgateway_config::UpstreamSettings;
    use mcpgateway_registry::{
        AuthType, EntityId, GatewayRecord, GatewayTransport, InMemoryStore, Principal, Visibility,
    };
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rig(store: Arc<dyn RegistryStore>) -> FederationRuntime {
        let pool = Arc::new(ClientPool::new(
            UpstreamSettings {
                retry_attempts: 1,
                retry_base: Duration::from_millis(1),
                retry_cap: Duration::from_millis(2),
                ..UpstreamSettings::default()
            },
            Duration::from_secs(2),
        ));
        FederationRuntime::new(store, pool, FederationSettings::default())
    }

    fn peer(url: &str, name: &str) -> (GatewayRecord, Principal) {
        let tenant = EntityId::generate();
        let team = EntityId::generate();
        let gateway = GatewayRecord {
            id: EntityId::generate(),
            tenant_id: tenant,
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
            created_at: chrono::Utc::now(),
            last_seen_at: None,
            owner_team_id: team,
            visibility: Visibility::Public,
            version: 0,
        };
        let principal = Principal {
            user: "admin".into(),
            tenant_id: tenant,
            team_ids: vec![team],
            scopes: vec![],
        };
        (gateway, principal)
    }

    #[tokio::test]
    async fn health_and_sync_cycle_registers_peer_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "ping"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": {}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {"tools": [
                    {"name": "a", "inputSchema": {}},
                    {"name": "b", "inputSchema": {}}
                ]}
            })))
            .mount(&server)
            .await;
        for listing in [("resources/list", "resources"), ("prompts/list", "prompts")] {
            Mock::given(method("POST"))
                .and(path("/mcp"))
                .and(body_partial_json(json!({"method": listing.0})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0", "id": 1, "result": {listing.1: []}
                })))
                .mount(&server)
                .await;
        }

        let store: Arc<dyn RegistryStore> = Arc::new(InMemoryStore::new());
        let (gateway, principal) = peer(&server.uri(), "p1");
        let gateway = store.create_gateway(gateway, &principal).await.unwrap();

        let runtime = rig(store.clone());
        assert!(runtime.elector.tick().await);
        runtime.run_leader_jobs().await.unwrap();

        let tools = store.tools_for_gateway_system(gateway.id).await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["p1-a", "p1-b"]);

        // deleting the peer removes both atomically
        store.delete_gateway(gateway.id, &principal).await.unwrap();
        assert!(
            store
                .tools_for_gateway_system(gateway.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn unreachable_peer_is_marked_down() {
        let store: Arc<dyn RegistryStore> = Arc::new(InMemoryStore::new());
        let (gateway, principal) = peer("http://127.0.0.1:1", "down");
        let gateway = store.create_gateway(gateway, &principal).await.unwrap();

        let runtime = rig(store.clone());
        assert!(runtime.elector.tick().await);
        runtime.run_leader_jobs().await.unwrap();

        let refreshed = store.gateway(gateway.id, &principal).await.unwrap();
        assert!(!refreshed.reachable);
    }
}
