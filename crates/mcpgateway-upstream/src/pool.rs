//! The upstream client pool.

use crate::{UpstreamClient, UpstreamResult};
use dashmap::DashMap;
use mcpgateway_config::UpstreamSettings;
use mcpgateway_registry::{EntityId, GatewayRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One long-lived client per registered upstream gateway. (Re)connection
/// serializes on a per-pool mutex; dispatch on an existing client is
/// lock-free.
pub struct ClientPool {
    clients: DashMap<EntityId, Arc<UpstreamClient>>,
    connect_lock: Mutex<()>,
    settings: UpstreamSettings,
    request_timeout: Duration,
}

impl ClientPool {
    /// Create an empty pool
    pub fn new(settings: UpstreamSettings, request_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            connect_lock: Mutex::new(()),
            settings,
            request_timeout,
        }
    }

    /// The client for a gateway, creating it on first use. A stale client
    /// (older gateway version) is replaced.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Client` when a new client cannot be built.
    pub async fn client_for(&self, gateway: &GatewayRecord) -> UpstreamResult<Arc<UpstreamClient>> {
        if let Some(existing) = self.clients.get(&gateway.id) {
            if existing.gateway().version == gateway.version {
                return Ok(existing.clone());
            }
        }
        let _guard = self.connect_lock.lock().await;
        // re-check under the lock
        if let Some(existing) = self.clients.get(&gateway.id) {
            if existing.gateway().version == gateway.version {
                return Ok(existing.clone());
            }
        }
        let client = Arc::new(UpstreamClient::connect(
            gateway.clone(),
            self.settings.clone(),
            self.request_timeout,
        )?);
        self.clients.insert(gateway.id, client.clone());
        Ok(client)
    }

    /// Drop the client for a deleted or updated gateway
    pub fn evict(&self, gateway_id: EntityId) {
        self.clients.remove(&gateway_id);
    }

    /// Number of live clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mcpgateway_registry::{AuthType, GatewayTransport, Visibility};

    fn gateway(version: u64) -> GatewayRecord {
        GatewayRecord {
            id: EntityId::generate(),
            tenant_id: EntityId::generate(),
            name: "g".into(),
            slug: "g".into(),
            url: "https://g.example.com/mcp".into(),
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
            visibility: Visibility::Team,
            version,
        }
    }

    #[tokio::test]
    async fn client_is_reused_until_gateway_changes() {
        let pool = ClientPool::new(UpstreamSettings::default(), Duration::from_secs(5));
        let g = gateway(0);
        let first = pool.client_for(&g).await.unwrap();
        let second = pool.client_for(&g).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let mut bumped = g.clone();
        bumped.version = 1;
        let third = pool.client_for(&bumped).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn evict_drops_the_client() {
        let pool = ClientPool::new(UpstreamSettings::default(), Duration::from_secs(5));
        let g = gateway(0);
        pool.client_for(&g).await.unwrap();
        pool.evict(g.id);
        assert!(pool.is_empty());
    }
}
