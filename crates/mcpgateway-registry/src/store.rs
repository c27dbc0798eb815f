//! The repository contract every store backend implements.

use crate::{
    AuditRecord, EntityId, GatewayRecord, MetricEvent, PromptRecord, Principal, RegistryResult,
    ResourceRecord, ToolRecord, Visibility, VirtualServerRecord,
};
use async_trait::async_trait;
use std::time::Duration;

/// Default page size for list operations
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Hard cap on page size
pub const MAX_PAGE_SIZE: usize = 500;

/// A bounded page request
#[derive(Debug, Clone, Copy)]
pub struct Page {
    /// Items to skip
    pub offset: usize,
    /// Items to return (clamped to [`MAX_PAGE_SIZE`])
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    /// Effective limit after clamping
    pub fn effective_limit(self) -> usize {
        if self.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.limit.min(MAX_PAGE_SIZE)
        }
    }
}

/// Filter for list operations. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Restrict to entities owned by this gateway
    pub gateway_id: Option<EntityId>,
    /// Substring match on the name
    pub name_contains: Option<String>,
    /// Require all of these tags
    pub tags: Vec<String>,
    /// Only administratively enabled entities
    pub enabled_only: bool,
}

/// Partial update for a gateway
#[derive(Debug, Clone, Default)]
pub struct GatewayPatch {
    /// New name
    pub name: Option<String>,
    /// New URL
    pub url: Option<String>,
    /// Enable/disable
    pub enabled: Option<bool>,
    /// Replace the passthrough allowlist
    pub passthrough_headers: Option<Vec<String>>,
    /// Replace the visibility
    pub visibility: Option<Visibility>,
    /// Version token for optimistic concurrency; mismatch fails with `Stale`
    pub expected_version: Option<u64>,
}

/// Partial update for a tool
#[derive(Debug, Clone, Default)]
pub struct ToolPatch {
    /// New display name
    pub display_name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Enable/disable
    pub enabled: Option<bool>,
    /// Replace the tags
    pub tags: Option<Vec<String>>,
    /// Replace the visibility
    pub visibility: Option<Visibility>,
    /// Version token for optimistic concurrency
    pub expected_version: Option<u64>,
}

/// Partial update for a resource
#[derive(Debug, Clone, Default)]
pub struct ResourcePatch {
    /// New display name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New MIME type
    pub mime_type: Option<String>,
    /// Replace the inline text content (native resources)
    pub text: Option<String>,
    /// Replace the tags
    pub tags: Option<Vec<String>>,
    /// Replace the visibility
    pub visibility: Option<Visibility>,
    /// Version token for optimistic concurrency
    pub expected_version: Option<u64>,
}

/// Partial update for a prompt
#[derive(Debug, Clone, Default)]
pub struct PromptPatch {
    /// New description
    pub description: Option<String>,
    /// Replace the template text
    pub template: Option<String>,
    /// Replace the argument schema
    pub arguments: Option<Vec<crate::PromptArgumentSpec>>,
    /// Replace the visibility
    pub visibility: Option<Visibility>,
    /// Version token for optimistic concurrency
    pub expected_version: Option<u64>,
}

/// Partial update for a virtual server
#[derive(Debug, Clone, Default)]
pub struct VirtualServerPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Replace tool associations
    pub associated_tools: Option<Vec<EntityId>>,
    /// Replace resource associations
    pub associated_resources: Option<Vec<EntityId>>,
    /// Replace prompt associations
    pub associated_prompts: Option<Vec<EntityId>>,
    /// Replace the visibility
    pub visibility: Option<Visibility>,
    /// Version token for optimistic concurrency
    pub expected_version: Option<u64>,
}

/// Outcome of a federated capability sync for one gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Capabilities added
    pub added: usize,
    /// Capabilities removed
    pub removed: usize,
    /// Capabilities updated in place
    pub updated: usize,
}

/// The repository contract.
///
/// Principal-checked operations enforce visibility on every read and
/// ownership on every mutation. The `system` operations run without a
/// principal and are reserved for leader-elected background workers; they
/// never cross a tenant boundary implicitly.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    // ------------------------------------------------------------------
    // Gateways
    // ------------------------------------------------------------------

    /// Create a gateway after validating its invariants.
    async fn create_gateway(
        &self,
        record: GatewayRecord,
        principal: &Principal,
    ) -> RegistryResult<GatewayRecord>;

    /// Fetch a gateway if the principal may read it.
    async fn gateway(&self, id: EntityId, principal: &Principal) -> RegistryResult<GatewayRecord>;

    /// List gateways visible to the principal.
    async fn list_gateways(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<GatewayRecord>>;

    /// Apply a partial update.
    async fn update_gateway(
        &self,
        id: EntityId,
        patch: GatewayPatch,
        principal: &Principal,
    ) -> RegistryResult<GatewayRecord>;

    /// Delete a gateway, cascading to its derived tools, resources and
    /// prompts and pruning virtual-server associations atomically.
    async fn delete_gateway(&self, id: EntityId, principal: &Principal) -> RegistryResult<()>;

    /// All gateways across tenants (system).
    async fn all_gateways_system(&self) -> RegistryResult<Vec<GatewayRecord>>;

    /// Record the outcome of a health check (system).
    async fn set_gateway_health(
        &self,
        id: EntityId,
        reachable: bool,
    ) -> RegistryResult<()>;

    // ------------------------------------------------------------------
    // Tools
    // ------------------------------------------------------------------

    /// Create a tool after validating its invariants.
    async fn create_tool(
        &self,
        record: ToolRecord,
        principal: &Principal,
    ) -> RegistryResult<ToolRecord>;

    /// Fetch a tool if the principal may read it.
    async fn tool(&self, id: EntityId, principal: &Principal) -> RegistryResult<ToolRecord>;

    /// Resolve a tool by its advertised name within a tenant.
    async fn tool_by_name(
        &self,
        tenant_id: EntityId,
        name: &str,
        principal: &Principal,
    ) -> RegistryResult<ToolRecord>;

    /// List tools visible to the principal.
    async fn list_tools(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<ToolRecord>>;

    /// Apply a partial update.
    async fn update_tool(
        &self,
        id: EntityId,
        patch: ToolPatch,
        principal: &Principal,
    ) -> RegistryResult<ToolRecord>;

    /// Delete a tool, pruning virtual-server associations atomically.
    async fn delete_tool(&self, id: EntityId, principal: &Principal) -> RegistryResult<()>;

    /// Replace the federated tool set of a gateway in one transaction
    /// (system). Existing records keep their ids when the name matches.
    async fn replace_gateway_tools(
        &self,
        gateway_id: EntityId,
        tools: Vec<ToolRecord>,
    ) -> RegistryResult<SyncOutcome>;

    /// Tools owned by a gateway (system).
    async fn tools_for_gateway_system(&self, gateway_id: EntityId)
    -> RegistryResult<Vec<ToolRecord>>;

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    /// Create a resource after validating its invariants.
    async fn create_resource(
        &self,
        record: ResourceRecord,
        principal: &Principal,
    ) -> RegistryResult<ResourceRecord>;

    /// Fetch a resource if the principal may read it.
    async fn resource(&self, id: EntityId, principal: &Principal)
    -> RegistryResult<ResourceRecord>;

    /// Resolve a resource by URI within a tenant.
    async fn resource_by_uri(
        &self,
        tenant_id: EntityId,
        uri: &str,
        principal: &Principal,
    ) -> RegistryResult<ResourceRecord>;

    /// List resources visible to the principal.
    async fn list_resources(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<ResourceRecord>>;

    /// Apply a partial update.
    async fn update_resource(
        &self,
        id: EntityId,
        patch: ResourcePatch,
        principal: &Principal,
    ) -> RegistryResult<ResourceRecord>;

    /// Delete a resource, pruning virtual-server associations atomically.
    async fn delete_resource(&self, id: EntityId, principal: &Principal) -> RegistryResult<()>;

    /// Replace the federated resource set of a gateway (system).
    async fn replace_gateway_resources(
        &self,
        gateway_id: EntityId,
        resources: Vec<ResourceRecord>,
    ) -> RegistryResult<SyncOutcome>;

    // ------------------------------------------------------------------
    // Prompts
    // ------------------------------------------------------------------

    /// Create a prompt after validating its invariants.
    async fn create_prompt(
        &self,
        record: PromptRecord,
        principal: &Principal,
    ) -> RegistryResult<PromptRecord>;

    /// Fetch a prompt if the principal may read it.
    async fn prompt(&self, id: EntityId, principal: &Principal) -> RegistryResult<PromptRecord>;

    /// Resolve a prompt by name within a tenant.
    async fn prompt_by_name(
        &self,
        tenant_id: EntityId,
        name: &str,
        principal: &Principal,
    ) -> RegistryResult<PromptRecord>;

    /// List prompts visible to the principal.
    async fn list_prompts(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<PromptRecord>>;

    /// Apply a partial update.
    async fn update_prompt(
        &self,
        id: EntityId,
        patch: PromptPatch,
        principal: &Principal,
    ) -> RegistryResult<PromptRecord>;

    /// Delete a prompt, pruning virtual-server associations atomically.
    async fn delete_prompt(&self, id: EntityId, principal: &Principal) -> RegistryResult<()>;

    /// Replace the federated prompt set of a gateway (system).
    async fn replace_gateway_prompts(
        &self,
        gateway_id: EntityId,
        prompts: Vec<PromptRecord>,
    ) -> RegistryResult<SyncOutcome>;

    // ------------------------------------------------------------------
    // Virtual servers
    // ------------------------------------------------------------------

    /// Create a virtual server; all associations must reference existing
    /// entities.
    async fn create_virtual_server(
        &self,
        record: VirtualServerRecord,
        principal: &Principal,
    ) -> RegistryResult<VirtualServerRecord>;

    /// Fetch a virtual server if the principal may read it. Dangling
    /// associations are pruned before the record is returned.
    async fn virtual_server(
        &self,
        id: EntityId,
        principal: &Principal,
    ) -> RegistryResult<VirtualServerRecord>;

    /// List virtual servers visible to the principal.
    async fn list_virtual_servers(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<VirtualServerRecord>>;

    /// Apply a partial update.
    async fn update_virtual_server(
        &self,
        id: EntityId,
        patch: VirtualServerPatch,
        principal: &Principal,
    ) -> RegistryResult<VirtualServerRecord>;

    /// Delete a virtual server.
    async fn delete_virtual_server(&self, id: EntityId, principal: &Principal)
    -> RegistryResult<()>;

    /// Drop associations to entities that no longer exist across all
    /// virtual servers. Returns how many associations were pruned (system).
    async fn prune_dangling_associations(&self) -> RegistryResult<usize>;

    // ------------------------------------------------------------------
    // Leader lock
    // ------------------------------------------------------------------

    /// Try to acquire or renew the leader lock for `node_id`. Returns true
    /// when this node holds the lock after the call.
    async fn try_acquire_leader(&self, node_id: &str, ttl: Duration) -> RegistryResult<bool>;

    /// Release the leader lock if held by `node_id`.
    async fn release_leader(&self, node_id: &str) -> RegistryResult<()>;

    // ------------------------------------------------------------------
    // Global passthrough configuration
    // ------------------------------------------------------------------

    /// The global passthrough header allowlist.
    async fn global_passthrough_headers(&self) -> RegistryResult<Vec<String>>;

    /// Replace the global passthrough header allowlist.
    async fn set_global_passthrough_headers(&self, headers: Vec<String>) -> RegistryResult<()>;

    // ------------------------------------------------------------------
    // Audit & metrics (append-only)
    // ------------------------------------------------------------------

    /// Append an audit record.
    async fn append_audit(&self, record: AuditRecord) -> RegistryResult<()>;

    /// Snapshot of recorded audit records (system; support bundle and
    /// tests).
    async fn audit_snapshot(&self) -> RegistryResult<Vec<AuditRecord>>;

    /// Append a metric event.
    async fn append_metric(&self, event: MetricEvent) -> RegistryResult<()>;

    /// Snapshot of recorded metric events (system; used by rollup and
    /// the exposition endpoint).
    async fn metrics_snapshot(&self) -> RegistryResult<Vec<MetricEvent>>;
}
