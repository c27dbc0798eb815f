//! In-memory store backend.
//!
//! Reads go straight to the concurrent maps (snapshot semantics); all
//! mutations serialize on a single async mutex so cross-entity cascades
//! and uniqueness checks are atomic. This mirrors the serializable
//! transaction contract the SQL backends provide.

use crate::store::{
    GatewayPatch, ListFilter, Page, PromptPatch, RegistryStore, ResourcePatch, SyncOutcome,
    ToolPatch, VirtualServerPatch,
};
use crate::{
    AuditRecord, EntityId, GatewayRecord, MetricEvent, PromptRecord, Principal, RegistryError,
    RegistryResult, ResourceRecord, ToolRecord, Visibility, VirtualServerRecord,
    canonicalize_endpoint,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Access metadata shared by every entity record.
trait Owned {
    fn tenant(&self) -> EntityId;
    fn owner_team(&self) -> EntityId;
    fn visibility(&self) -> Visibility;
}

macro_rules! impl_owned {
    ($($ty:ty),*) => {
        $(impl Owned for $ty {
            fn tenant(&self) -> EntityId { self.tenant_id }
            fn owner_team(&self) -> EntityId { self.owner_team_id }
            fn visibility(&self) -> Visibility { self.visibility }
        })*
    };
}

impl_owned!(
    GatewayRecord,
    ToolRecord,
    ResourceRecord,
    PromptRecord,
    VirtualServerRecord
);

fn readable<T: Owned>(record: &T, principal: &Principal) -> bool {
    record
        .visibility()
        .allows(principal, record.tenant(), record.owner_team())
}

fn ensure_owner<T: Owned>(record: &T, principal: &Principal) -> RegistryResult<()> {
    if principal.tenant_id != record.tenant() {
        return Err(RegistryError::Forbidden("wrong tenant".into()));
    }
    if !principal.in_team(record.owner_team()) {
        return Err(RegistryError::Forbidden("not a member of the owning team".into()));
    }
    Ok(())
}

fn check_version(expected: Option<u64>, found: u64) -> RegistryResult<()> {
    match expected {
        Some(expected) if expected != found => Err(RegistryError::Stale { expected, found }),
        _ => Ok(()),
    }
}

fn page_slice<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset)
        .take(page.effective_limit())
        .collect()
}

struct LeaderLock {
    node_id: String,
    expires_at: Instant,
}

/// The in-memory store engine.
pub struct InMemoryStore {
    gateways: DashMap<EntityId, GatewayRecord>,
    tools: DashMap<EntityId, ToolRecord>,
    resources: DashMap<EntityId, ResourceRecord>,
    prompts: DashMap<EntityId, PromptRecord>,
    virtual_servers: DashMap<EntityId, VirtualServerRecord>,
    /// Serializes mutations; cascades and uniqueness checks run under it.
    write_lock: Mutex<()>,
    leader: parking_lot::Mutex<Option<LeaderLock>>,
    passthrough: parking_lot::RwLock<Vec<String>>,
    audit: parking_lot::Mutex<Vec<AuditRecord>>,
    metrics: parking_lot::Mutex<Vec<MetricEvent>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            gateways: DashMap::new(),
            tools: DashMap::new(),
            resources: DashMap::new(),
            prompts: DashMap::new(),
            virtual_servers: DashMap::new(),
            write_lock: Mutex::new(()),
            leader: parking_lot::Mutex::new(None),
            passthrough: parking_lot::RwLock::new(Vec::new()),
            audit: parking_lot::Mutex::new(Vec::new()),
            metrics: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Seed the global passthrough allowlist (startup only)
    pub fn with_passthrough_headers(self, headers: Vec<String>) -> Self {
        *self.passthrough.write() = headers;
        self
    }

    fn entity_exists(&self, id: EntityId) -> bool {
        self.tools.contains_key(&id)
            || self.resources.contains_key(&id)
            || self.prompts.contains_key(&id)
    }

    /// Drop associations referencing `id` from every virtual server.
    /// Caller must hold the write lock.
    fn prune_associations_locked(&self, id: EntityId) -> usize {
        let mut pruned = 0;
        for mut server in self.virtual_servers.iter_mut() {
            let before = server.associated_tools.len();
            server.associated_tools.retain(|assoc| *assoc != id);
            pruned += before - server.associated_tools.len();

            let before = server.associated_resources.len();
            server.associated_resources.retain(|assoc| *assoc != id);
            pruned += before - server.associated_resources.len();

            let before = server.associated_prompts.len();
            server.associated_prompts.retain(|assoc| *assoc != id);
            pruned += before - server.associated_prompts.len();

            let before = server.associated_a2a_agents.len();
            server.associated_a2a_agents.retain(|assoc| *assoc != id);
            pruned += before - server.associated_a2a_agents.len();
        }
        pruned
    }

    fn gateway_conflict(&self, candidate: &GatewayRecord) -> RegistryResult<()> {
        let canonical = canonicalize_endpoint(&candidate.url)?;
        for existing in self.gateways.iter() {
            if existing.id == candidate.id || existing.tenant_id != candidate.tenant_id {
                continue;
            }
            if existing.name == candidate.name {
                return Err(RegistryError::Conflict(format!(
                    "gateway name {:?} already registered",
                    candidate.name
                )));
            }
            if canonicalize_endpoint(&existing.url)? == canonical {
                return Err(RegistryError::Conflict(format!(
                    "gateway URL {} already registered",
                    canonical
                )));
            }
        }
        Ok(())
    }

    fn tool_conflict(&self, candidate: &ToolRecord) -> RegistryResult<()> {
        for existing in self.tools.iter() {
            if existing.id != candidate.id
                && existing.tenant_id == candidate.tenant_id
                && existing.gateway_id == candidate.gateway_id
                && existing.name == candidate.name
            {
                return Err(RegistryError::Conflict(format!(
                    "tool name {:?} already exists for this gateway",
                    candidate.name
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    // ------------------------------------------------------------------
    // Gateways
    // ------------------------------------------------------------------

    async fn create_gateway(
        &self,
        record: GatewayRecord,
        principal: &Principal,
    ) -> RegistryResult<GatewayRecord> {
        record.validate()?;
        ensure_owner(&record, principal)?;
        let _guard = self.write_lock.lock().await;
        self.gateway_conflict(&record)?;
        self.gateways.insert(record.id, record.clone());
        Ok(record)
    }

    async fn gateway(&self, id: EntityId, principal: &Principal) -> RegistryResult<GatewayRecord> {
        match self.gateways.get(&id) {
            Some(record) if readable(record.value(), principal) => Ok(record.clone()),
            _ => Err(RegistryError::not_found("gateway", id)),
        }
    }

    async fn list_gateways(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<GatewayRecord>> {
        let mut items: Vec<GatewayRecord> = self
            .gateways
            .iter()
            .filter(|entry| readable(entry.value(), principal))
            .filter(|entry| !filter.enabled_only || entry.enabled)
            .filter(|entry| {
                filter
                    .name_contains
                    .as_deref()
                    .is_none_or(|needle| entry.name.contains(needle))
            })
            .map(|entry| entry.clone())
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page_slice(items, page))
    }

    async fn update_gateway(
        &self,
        id: EntityId,
        patch: GatewayPatch,
        principal: &Principal,
    ) -> RegistryResult<GatewayRecord> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .gateways
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("gateway", id))?;
        ensure_owner(&current, principal)?;
        check_version(patch.expected_version, current.version)?;

        let mut updated = current;
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(url) = patch.url {
            updated.url = url;
        }
        if let Some(enabled) = patch.enabled {
            updated.enabled = enabled;
        }
        if let Some(headers) = patch.passthrough_headers {
            updated.passthrough_headers = headers;
        }
        if let Some(visibility) = patch.visibility {
            updated.visibility = visibility;
        }
        updated.version += 1;
        updated.validate()?;
        self.gateway_conflict(&updated)?;
        self.gateways.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_gateway(&self, id: EntityId, principal: &Principal) -> RegistryResult<()> {
        let _guard = self.write_lock.lock().await;
        let record = self
            .gateways
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("gateway", id))?;
        ensure_owner(&record, principal)?;

        // cascade: derived capabilities first, then their associations
        let derived_tools: Vec<EntityId> = self
            .tools
            .iter()
            .filter(|t| t.gateway_id == Some(id))
            .map(|t| t.id)
            .collect();
        for tool_id in derived_tools {
            self.tools.remove(&tool_id);
            self.prune_associations_locked(tool_id);
        }
        let derived_resources: Vec<EntityId> = self
            .resources
            .iter()
            .filter(|r| r.gateway_id == Some(id))
            .map(|r| r.id)
            .collect();
        for resource_id in derived_resources {
            self.resources.remove(&resource_id);
            self.prune_associations_locked(resource_id);
        }
        let derived_prompts: Vec<EntityId> = self
            .prompts
            .iter()
            .filter(|p| p.gateway_id == Some(id))
            .map(|p| p.id)
            .collect();
        for prompt_id in derived_prompts {
            self.prompts.remove(&prompt_id);
            self.prune_associations_locked(prompt_id);
        }
        self.gateways.remove(&id);
        Ok(())
    }

    async fn all_gateways_system(&self) -> RegistryResult<Vec<GatewayRecord>> {
        let mut items: Vec<GatewayRecord> =
            self.gateways.iter().map(|entry| entry.clone()).collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn set_gateway_health(&self, id: EntityId, reachable: bool) -> RegistryResult<()> {
        let mut entry = self
            .gateways
            .get_mut(&id)
            .ok_or_else(|| RegistryError::not_found("gateway", id))?;
        entry.reachable = reachable;
        if reachable {
            entry.last_seen_at = Some(Utc::now());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tools
    // ------------------------------------------------------------------

    async fn create_tool(
        &self,
        record: ToolRecord,
        principal: &Principal,
    ) -> RegistryResult<ToolRecord> {
        record.validate()?;
        ensure_owner(&record, principal)?;
        let _guard = self.write_lock.lock().await;
        self.tool_conflict(&record)?;
        self.tools.insert(record.id, record.clone());
        Ok(record)
    }

    async fn tool(&self, id: EntityId, principal: &Principal) -> RegistryResult<ToolRecord> {
        match self.tools.get(&id) {
            Some(record) if readable(record.value(), principal) => Ok(record.clone()),
            _ => Err(RegistryError::not_found("tool", id)),
        }
    }

    async fn tool_by_name(
        &self,
        tenant_id: EntityId,
        name: &str,
        principal: &Principal,
    ) -> RegistryResult<ToolRecord> {
        self.tools
            .iter()
            .find(|t| t.tenant_id == tenant_id && t.name == name && readable(t.value(), principal))
            .map(|t| t.clone())
            .ok_or_else(|| RegistryError::not_found("tool", name))
    }

    async fn list_tools(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<ToolRecord>> {
        let mut items: Vec<ToolRecord> = self
            .tools
            .iter()
            .filter(|entry| readable(entry.value(), principal))
            .filter(|entry| !filter.enabled_only || entry.enabled)
            .filter(|entry| {
                filter
                    .gateway_id
                    .is_none_or(|gateway| entry.gateway_id == Some(gateway))
            })
            .filter(|entry| {
                filter
                    .name_contains
                    .as_deref()
                    .is_none_or(|needle| entry.name.contains(needle))
            })
            .filter(|entry| filter.tags.iter().all(|tag| entry.tags.contains(tag)))
            .map(|entry| entry.clone())
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page_slice(items, page))
    }

    async fn update_tool(
        &self,
        id: EntityId,
        patch: ToolPatch,
        principal: &Principal,
    ) -> RegistryResult<ToolRecord> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .tools
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("tool", id))?;
        ensure_owner(&current, principal)?;
        check_version(patch.expected_version, current.version)?;

        let mut updated = current;
        if let Some(display_name) = patch.display_name {
            updated.display_name = Some(display_name);
        }
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(enabled) = patch.enabled {
            updated.enabled = enabled;
        }
        if let Some(tags) = patch.tags {
            updated.tags = tags;
        }
        if let Some(visibility) = patch.visibility {
            updated.visibility = visibility;
        }
        updated.version += 1;
        updated.updated_at = Utc::now();
        updated.validate()?;
        self.tools.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_tool(&self, id: EntityId, principal: &Principal) -> RegistryResult<()> {
        let _guard = self.write_lock.lock().await;
        let record = self
            .tools
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("tool", id))?;
        ensure_owner(&record, principal)?;
        self.tools.remove(&id);
        self.prune_associations_locked(id);
        Ok(())
    }

    async fn replace_gateway_tools(
        &self,
        gateway_id: EntityId,
        tools: Vec<ToolRecord>,
    ) -> RegistryResult<SyncOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut outcome = SyncOutcome::default();

        let existing: Vec<ToolRecord> = self
            .tools
            .iter()
            .filter(|t| t.gateway_id == Some(gateway_id))
            .map(|t| t.clone())
            .collect();

        for old in &existing {
            if !tools.iter().any(|new| new.name == old.name) {
                self.tools.remove(&old.id);
                self.prune_associations_locked(old.id);
                outcome.removed += 1;
            }
        }

        for mut new in tools {
            new.gateway_id = Some(gateway_id);
            new.validate()?;
            match existing.iter().find(|old| old.name == new.name) {
                Some(old) => {
                    let changed = old.description != new.description
                        || old.input_schema != new.input_schema
                        || old.url != new.url
                        || old.mcp_method != new.mcp_method
                        || old.annotations != new.annotations;
                    if changed {
                        let mut updated = new;
                        updated.id = old.id;
                        updated.created_at = old.created_at;
                        updated.version = old.version + 1;
                        updated.updated_at = Utc::now();
                        self.tools.insert(updated.id, updated);
                        outcome.updated += 1;
                    }
                }
                None => {
                    self.tools.insert(new.id, new);
                    outcome.added += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn tools_for_gateway_system(
        &self,
        gateway_id: EntityId,
    ) -> RegistryResult<Vec<ToolRecord>> {
        let mut items: Vec<ToolRecord> = self
            .tools
            .iter()
            .filter(|t| t.gateway_id == Some(gateway_id))
            .map(|t| t.clone())
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    async fn create_resource(
        &self,
        record: ResourceRecord,
        principal: &Principal,
    ) -> RegistryResult<ResourceRecord> {
        record.validate()?;
        ensure_owner(&record, principal)?;
        let _guard = self.write_lock.lock().await;
        let duplicate = self.resources.iter().any(|r| {
            r.id != record.id
                && r.tenant_id == record.tenant_id
                && r.gateway_id == record.gateway_id
                && r.uri == record.uri
        });
        if duplicate {
            return Err(RegistryError::Conflict(format!(
                "resource URI {:?} already exists for this gateway",
                record.uri
            )));
        }
        self.resources.insert(record.id, record.clone());
        Ok(record)
    }

    async fn resource(
        &self,
        id: EntityId,
        principal: &Principal,
    ) -> RegistryResult<ResourceRecord> {
        match self.resources.get(&id) {
            Some(record) if readable(record.value(), principal) => Ok(record.clone()),
            _ => Err(RegistryError::not_found("resource", id)),
        }
    }

    async fn resource_by_uri(
        &self,
        tenant_id: EntityId,
        uri: &str,
        principal: &Principal,
    ) -> RegistryResult<ResourceRecord> {
        self.resources
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.uri == uri && readable(r.value(), principal))
            .map(|r| r.clone())
            .ok_or_else(|| RegistryError::not_found("resource", uri))
    }

    async fn list_resources(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<ResourceRecord>> {
        let mut items: Vec<ResourceRecord> = self
            .resources
            .iter()
            .filter(|entry| readable(entry.value(), principal))
            .filter(|entry| {
                filter
                    .gateway_id
                    .is_none_or(|gateway| entry.gateway_id == Some(gateway))
            })
            .filter(|entry| filter.tags.iter().all(|tag| entry.tags.contains(tag)))
            .map(|entry| entry.clone())
            .collect();
        items.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(page_slice(items, page))
    }

    async fn update_resource(
        &self,
        id: EntityId,
        patch: ResourcePatch,
        principal: &Principal,
    ) -> RegistryResult<ResourceRecord> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .resources
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("resource", id))?;
        ensure_owner(&current, principal)?;
        check_version(patch.expected_version, current.version)?;

        let mut updated = current;
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(mime_type) = patch.mime_type {
            updated.mime_type = Some(mime_type);
        }
        if let Some(text) = patch.text {
            updated.size_hint = Some(text.len() as u64);
            updated.text = Some(text);
        }
        if let Some(tags) = patch.tags {
            updated.tags = tags;
        }
        if let Some(visibility) = patch.visibility {
            updated.visibility = visibility;
        }
        updated.version += 1;
        updated.validate()?;
        self.resources.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_resource(&self, id: EntityId, principal: &Principal) -> RegistryResult<()> {
        let _guard = self.write_lock.lock().await;
        let record = self
            .resources
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("resource", id))?;
        ensure_owner(&record, principal)?;
        self.resources.remove(&id);
        self.prune_associations_locked(id);
        Ok(())
    }

    async fn replace_gateway_resources(
        &self,
        gateway_id: EntityId,
        resources: Vec<ResourceRecord>,
    ) -> RegistryResult<SyncOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut outcome = SyncOutcome::default();

        let existing: Vec<ResourceRecord> = self
            .resources
            .iter()
            .filter(|r| r.gateway_id == Some(gateway_id))
            .map(|r| r.clone())
            .collect();

        for old in &existing {
            if !resources.iter().any(|new| new.uri == old.uri) {
                self.resources.remove(&old.id);
                self.prune_associations_locked(old.id);
                outcome.removed += 1;
            }
        }
        for mut new in resources {
            new.gateway_id = Some(gateway_id);
            new.validate()?;
            match existing.iter().find(|old| old.uri == new.uri) {
                Some(old) => {
                    let changed = old.mime_type != new.mime_type
                        || old.name != new.name
                        || old.description != new.description;
                    if changed {
                        let mut updated = new;
                        updated.id = old.id;
                        updated.created_at = old.created_at;
                        updated.version = old.version + 1;
                        self.resources.insert(updated.id, updated);
                        outcome.updated += 1;
                    }
                }
                None => {
                    self.resources.insert(new.id, new);
                    outcome.added += 1;
                }
            }
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Prompts
    // ------------------------------------------------------------------

    async fn create_prompt(
        &self,
        record: PromptRecord,
        principal: &Principal,
    ) -> RegistryResult<PromptRecord> {
        record.validate()?;
        ensure_owner(&record, principal)?;
        let _guard = self.write_lock.lock().await;
        let duplicate = self.prompts.iter().any(|p| {
            p.id != record.id
                && p.tenant_id == record.tenant_id
                && p.gateway_id == record.gateway_id
                && p.name == record.name
        });
        if duplicate {
            return Err(RegistryError::Conflict(format!(
                "prompt {:?} already exists for this gateway",
                record.name
            )));
        }
        self.prompts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn prompt(&self, id: EntityId, principal: &Principal) -> RegistryResult<PromptRecord> {
        match self.prompts.get(&id) {
            Some(record) if readable(record.value(), principal) => Ok(record.clone()),
            _ => Err(RegistryError::not_found("prompt", id)),
        }
    }

    async fn prompt_by_name(
        &self,
        tenant_id: EntityId,
        name: &str,
        principal: &Principal,
    ) -> RegistryResult<PromptRecord> {
        self.prompts
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.name == name && readable(p.value(), principal))
            .map(|p| p.clone())
            .ok_or_else(|| RegistryError::not_found("prompt", name))
    }

    async fn list_prompts(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<PromptRecord>> {
        let mut items: Vec<PromptRecord> = self
            .prompts
            .iter()
            .filter(|entry| readable(entry.value(), principal))
            .filter(|entry| {
                filter
                    .gateway_id
                    .is_none_or(|gateway| entry.gateway_id == Some(gateway))
            })
            .filter(|entry| {
                filter
                    .name_contains
                    .as_deref()
                    .is_none_or(|needle| entry.name.contains(needle))
            })
            .map(|entry| entry.clone())
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page_slice(items, page))
    }

    async fn update_prompt(
        &self,
        id: EntityId,
        patch: PromptPatch,
        principal: &Principal,
    ) -> RegistryResult<PromptRecord> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .prompts
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("prompt", id))?;
        ensure_owner(&current, principal)?;
        check_version(patch.expected_version, current.version)?;

        let mut updated = current;
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(template) = patch.template {
            updated.template = template;
        }
        if let Some(arguments) = patch.arguments {
            updated.arguments = arguments;
        }
        if let Some(visibility) = patch.visibility {
            updated.visibility = visibility;
        }
        updated.version += 1;
        updated.validate()?;
        self.prompts.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_prompt(&self, id: EntityId, principal: &Principal) -> RegistryResult<()> {
        let _guard = self.write_lock.lock().await;
        let record = self
            .prompts
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("prompt", id))?;
        ensure_owner(&record, principal)?;
        self.prompts.remove(&id);
        self.prune_associations_locked(id);
        Ok(())
    }

    async fn replace_gateway_prompts(
        &self,
        gateway_id: EntityId,
        prompts: Vec<PromptRecord>,
    ) -> RegistryResult<SyncOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut outcome = SyncOutcome::default();

        let existing: Vec<PromptRecord> = self
            .prompts
            .iter()
            .filter(|p| p.gateway_id == Some(gateway_id))
            .map(|p| p.clone())
            .collect();

        for old in &existing {
            if !prompts.iter().any(|new| new.name == old.name) {
                self.prompts.remove(&old.id);
                self.prune_associations_locked(old.id);
                outcome.removed += 1;
            }
        }
        for mut new in prompts {
            new.gateway_id = Some(gateway_id);
            new.validate()?;
            match existing.iter().find(|old| old.name == new.name) {
                Some(old) => {
                    let changed = old.description != new.description
                        || old.template != new.template;
                    if changed {
                        let mut updated = new;
                        updated.id = old.id;
                        updated.created_at = old.created_at;
                        updated.version = old.version + 1;
                        self.prompts.insert(updated.id, updated);
                        outcome.updated += 1;
                    }
                }
                None => {
                    self.prompts.insert(new.id, new);
                    outcome.added += 1;
                }
            }
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Virtual servers
    // ------------------------------------------------------------------

    async fn create_virtual_server(
        &self,
        record: VirtualServerRecord,
        principal: &Principal,
    ) -> RegistryResult<VirtualServerRecord> {
        record.validate()?;
        ensure_owner(&record, principal)?;
        let _guard = self.write_lock.lock().await;
        let duplicate = self
            .virtual_servers
            .iter()
            .any(|s| s.id != record.id && s.tenant_id == record.tenant_id && s.name == record.name);
        if duplicate {
            return Err(RegistryError::Conflict(format!(
                "virtual server {:?} already exists",
                record.name
            )));
        }
        for id in record
            .associated_tools
            .iter()
            .chain(&record.associated_resources)
            .chain(&record.associated_prompts)
        {
            if !self.entity_exists(*id) {
                return Err(RegistryError::invalid(
                    "associations",
                    format!("association {id} does not refer to an existing entity"),
                ));
            }
        }
        self.virtual_servers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn virtual_server(
        &self,
        id: EntityId,
        principal: &Principal,
    ) -> RegistryResult<VirtualServerRecord> {
        let record = match self.virtual_servers.get(&id) {
            Some(record) if readable(record.value(), principal) => record.clone(),
            _ => return Err(RegistryError::not_found("server", id)),
        };

        // self-heal: prune dangling associations at read time
        let dangling: Vec<EntityId> = record
            .associated_tools
            .iter()
            .chain(&record.associated_resources)
            .chain(&record.associated_prompts)
            .filter(|assoc| !self.entity_exists(**assoc))
            .copied()
            .collect();
        if dangling.is_empty() {
            return Ok(record);
        }

        let _guard = self.write_lock.lock().await;
        let mut entry = self
            .virtual_servers
            .get_mut(&id)
            .ok_or_else(|| RegistryError::not_found("server", id))?;
        for assoc in dangling {
            entry.associated_tools.retain(|t| *t != assoc);
            entry.associated_resources.retain(|r| *r != assoc);
            entry.associated_prompts.retain(|p| *p != assoc);
        }
        Ok(entry.clone())
    }

    async fn list_virtual_servers(
        &self,
        filter: &ListFilter,
        principal: &Principal,
        page: Page,
    ) -> RegistryResult<Vec<VirtualServerRecord>> {
        let mut items: Vec<VirtualServerRecord> = self
            .virtual_servers
            .iter()
            .filter(|entry| readable(entry.value(), principal))
            .filter(|entry| {
                filter
                    .name_contains
                    .as_deref()
                    .is_none_or(|needle| entry.name.contains(needle))
            })
            .map(|entry| entry.clone())
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page_slice(items, page))
    }

    async fn update_virtual_server(
        &self,
        id: EntityId,
        patch: VirtualServerPatch,
        principal: &Principal,
    ) -> RegistryResult<VirtualServerRecord> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .virtual_servers
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("server", id))?;
        ensure_owner(&current, principal)?;
        check_version(patch.expected_version, current.version)?;

        let mut updated = current;
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(tools) = patch.associated_tools {
            updated.associated_tools = tools;
        }
        if let Some(resources) = patch.associated_resources {
            updated.associated_resources = resources;
        }
        if let Some(prompts) = patch.associated_prompts {
            updated.associated_prompts = prompts;
        }
        if let Some(visibility) = patch.visibility {
            updated.visibility = visibility;
        }
        for assoc in updated
            .associated_tools
            .iter()
            .chain(&updated.associated_resources)
            .chain(&updated.associated_prompts)
        {
            if !self.entity_exists(*assoc) {
                return Err(RegistryError::invalid(
                    "associations",
                    format!("association {assoc} does not refer to an existing entity"),
                ));
            }
        }
        updated.version += 1;
        updated.validate()?;
        self.virtual_servers.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_virtual_server(
        &self,
        id: EntityId,
        principal: &Principal,
    ) -> RegistryResult<()> {
        let _guard = self.write_lock.lock().await;
        let record = self
            .virtual_servers
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::not_found("server", id))?;
        ensure_owner(&record, principal)?;
        self.virtual_servers.remove(&id);
        Ok(())
    }

    async fn prune_dangling_associations(&self) -> RegistryResult<usize> {
        let _guard = self.write_lock.lock().await;
        let mut pruned = 0;
        for mut server in self.virtual_servers.iter_mut() {
            for list_selector in 0..3 {
                let list = match list_selector {
                    0 => &mut server.associated_tools,
                    1 => &mut server.associated_resources,
                    _ => &mut server.associated_prompts,
                };
                let before = list.len();
                let survivors: Vec<EntityId> = list
                    .iter()
                    .filter(|id| {
                        self.tools.contains_key(id)
                            || self.resources.contains_key(id)
                            || self.prompts.contains_key(id)
                    })
                    .copied()
                    .collect();
                pruned += before - survivors.len();
                *list = survivors;
            }
        }
        Ok(pruned)
    }

    // ------------------------------------------------------------------
    // Leader lock
    // ------------------------------------------------------------------

    async fn try_acquire_leader(&self, node_id: &str, ttl: Duration) -> RegistryResult<bool> {
        let mut slot = self.leader.lock();
        let now = Instant::now();
        match slot.as_mut() {
            Some(lock) if lock.node_id == node_id || lock.expires_at <= now => {
                lock.node_id = node_id.to_string();
                lock.expires_at = now + ttl;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                *slot = Some(LeaderLock {
                    node_id: node_id.to_string(),
                    expires_at: now + ttl,
                });
                Ok(true)
            }
        }
    }

    async fn release_leader(&self, node_id: &str) -> RegistryResult<()> {
        let mut slot = self.leader.lock();
        if slot.as_ref().is_some_and(|lock| lock.node_id == node_id) {
            *slot = None;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Global passthrough configuration
    // ------------------------------------------------------------------

    async fn global_passthrough_headers(&self) -> RegistryResult<Vec<String>> {
        Ok(self.passthrough.read().clone())
    }

    async fn set_global_passthrough_headers(&self, headers: Vec<String>) -> RegistryResult<()> {
        *self.passthrough.write() = headers;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Audit & metrics
    // ------------------------------------------------------------------

    async fn append_audit(&self, record: AuditRecord) -> RegistryResult<()> {
        self.audit.lock().push(record);
        Ok(())
    }

    async fn audit_snapshot(&self) -> RegistryResult<Vec<AuditRecord>> {
        Ok(self.audit.lock().clone())
    }

    async fn append_metric(&self, event: MetricEvent) -> RegistryResult<()> {
        self.metrics.lock().push(event);
        Ok(())
    }

    async fn metrics_snapshot(&self) -> RegistryResult<Vec<MetricEvent>> {
        Ok(self.metrics.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuthType, GatewayTransport, IntegrationType, RequestType};
    use pretty_assertions::assert_eq;

    fn principal(tenant: EntityId, team: EntityId) -> Principal {
        Principal {
            user: "admin".into(),
            tenant_id: tenant,
            team_ids: vec![team],
            scopes: vec![],
        }
    }

    fn gateway(tenant: EntityId, team: EntityId, name: &str, url: &str) -> GatewayRecord {
        GatewayRecord {
            id: EntityId::generate(),
            tenant_id: tenant,
            name: name.into(),
            slug: name.into(),
            url: url.into(),
            transport: GatewayTransport::Streamablehttp,
            auth_type: AuthType::None,
            auth_material: None,
            one_time_auth: false,
            passthrough_headers: vec![],
            ca_certificate: None,
            enabled: true,
            reachable: false,
            health_checks_enabled: true,
            created_at: Utc::now(),
            last_seen_at: None,
            owner_team_id: team,
            visibility: Visibility::Team,
            version: 0,
        }
    }

    fn tool(tenant: EntityId, team: EntityId, gateway_id: Option<EntityId>, name: &str) -> ToolRecord {
        ToolRecord {
            id: EntityId::generate(),
            gateway_id,
            tenant_id: tenant,
            name: name.into(),
            display_name: None,
            description: None,
            integration_type: IntegrationType::Mcp,
            request_type: RequestType::Streamablehttp,
            url: None,
            mcp_method: Some(name.to_string()),
            input_schema: serde_json::json!({"type": "object"}),
            annotations: None,
            tags: vec![],
            enabled: true,
            reachable: true,
            owner_team_id: team,
            visibility: Visibility::Team,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn gateway_url_uniqueness_is_canonical() {
        let store = InMemoryStore::new();
        let tenant = EntityId::generate();
        let team = EntityId::generate();
        let p = principal(tenant, team);

        store
            .create_gateway(gateway(tenant, team, "one", "https://Host.example.com/api/"), &p)
            .await
            .unwrap();
        let err = store
            .create_gateway(gateway(tenant, team, "two", "https://host.example.com:443/api"), &p)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_gateway_cascades_and_prunes_associations() {
        let store = InMemoryStore::new();
        let tenant = EntityId::generate();
        let team = EntityId::generate();
        let p = principal(tenant, team);

        let g = store
            .create_gateway(gateway(tenant, team, "peer", "https://peer.example.com/mcp"), &p)
            .await
            .unwrap();
        let t = store
            .create_tool(tool(tenant, team, Some(g.id), "peer-echo"), &p)
            .await
            .unwrap();

        let vs = VirtualServerRecord {
            id: EntityId::generate(),
            tenant_id: tenant,
            name: "composed".into(),
            description: None,
            associated_tools: vec![t.id],
            associated_resources: vec![],
            associated_prompts: vec![],
            associated_a2a_agents: vec![],
            owner_team_id: team,
            visibility: Visibility::Team,
            created_at: Utc::now(),
            version: 0,
        };
        let vs = store.create_virtual_server(vs, &p).await.unwrap();

        store.delete_gateway(g.id, &p).await.unwrap();

        assert!(store.tool(t.id, &p).await.is_err());
        let healed = store.virtual_server(vs.id, &p).await.unwrap();
        assert!(healed.associated_tools.is_empty());
    }

    #[tokio::test]
    async fn register_then_delete_restores_pre_state() {
        let store = InMemoryStore::new();
        let tenant = EntityId::generate();
        let team = EntityId::generate();
        let p = principal(tenant, team);

        let before = store.list_gateways(&ListFilter::default(), &p, Page::default()).await.unwrap();
        assert!(before.is_empty());

        let g = store
            .create_gateway(gateway(tenant, team, "ephemeral", "https://e.example.com/mcp"), &p)
            .await
            .unwrap();
        store.delete_gateway(g.id, &p).await.unwrap();

        let after = store.list_gateways(&ListFilter::default(), &p, Page::default()).await.unwrap();
        assert!(after.is_empty());
        assert!(store.tools.is_empty());
    }

    #[tokio::test]
    async fn stale_version_rejected() {
        let store = InMemoryStore::new();
        let tenant = EntityId::generate();
        let team = EntityId::generate();
        let p = principal(tenant, team);

        let g = store
            .create_gateway(gateway(tenant, team, "g", "https://g.example.com/mcp"), &p)
            .await
            .unwrap();
        let patch = GatewayPatch {
            enabled: Some(false),
            expected_version: Some(g.version + 5),
            ..GatewayPatch::default()
        };
        let err = store.update_gateway(g.id, patch, &p).await.unwrap_err();
        assert!(matches!(err, RegistryError::Stale { .. }));
    }

    #[tokio::test]
    async fn visibility_hides_other_teams_private_entities() {
        let store = InMemoryStore::new();
        let tenant = EntityId::generate();
        let team_a = EntityId::generate();
        let team_b = EntityId::generate();
        let owner = principal(tenant, team_a);
        let outsider = principal(tenant, team_b);

        let mut g = gateway(tenant, team_a, "mine", "https://mine.example.com/mcp");
        g.visibility = Visibility::Private;
        let g = store.create_gateway(g, &owner).await.unwrap();

        assert!(store.gateway(g.id, &outsider).await.is_err());
        let listed = store
            .list_gateways(&ListFilter::default(), &outsider, Page::default())
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn replace_gateway_tools_diffs() {
        let store = InMemoryStore::new();
        let tenant = EntityId::generate();
        let team = EntityId::generate();
        let p = principal(tenant, team);
        let g = store
            .create_gateway(gateway(tenant, team, "peer", "https://p.example.com/mcp"), &p)
            .await
            .unwrap();

        let first = store
            .replace_gateway_tools(
                g.id,
                vec![
                    tool(tenant, team, Some(g.id), "a"),
                    tool(tenant, team, Some(g.id), "b"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(first, SyncOutcome { added: 2, removed: 0, updated: 0 });

        // b disappears, c appears, a updates its description
        let mut a2 = tool(tenant, team, Some(g.id), "a");
        a2.description = Some("changed".into());
        let second = store
            .replace_gateway_tools(g.id, vec![a2, tool(tenant, team, Some(g.id), "c")])
            .await
            .unwrap();
        assert_eq!(second, SyncOutcome { added: 1, removed: 1, updated: 1 });

        let names: Vec<String> = store
            .tools_for_gateway_system(g.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn resource_and_prompt_updates_are_optimistic() {
        let store = InMemoryStore::new();
        let tenant = EntityId::generate();
        let team = EntityId::generate();
        let p = principal(tenant, team);

        let resource = store
            .create_resource(
                ResourceRecord {
                    id: EntityId::generate(),
                    gateway_id: None,
                    tenant_id: tenant,
                    uri: "mem://greeting".into(),
                    name: "greeting".into(),
                    description: None,
                    mime_type: Some("text/plain".into()),
                    size_hint: Some(2),
                    text: Some("hi".into()),
                    tags: vec![],
                    owner_team_id: team,
                    visibility: Visibility::Team,
                    created_at: Utc::now(),
                    version: 0,
                },
                &p,
            )
            .await
            .unwrap();

        let updated = store
            .update_resource(
                resource.id,
                ResourcePatch {
                    text: Some("hello there".into()),
                    expected_version: Some(0),
                    ..ResourcePatch::default()
                },
                &p,
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.text.as_deref(), Some("hello there"));
        assert_eq!(updated.size_hint, Some(11));

        let prompt = store
            .create_prompt(
                PromptRecord {
                    id: EntityId::generate(),
                    gateway_id: None,
                    tenant_id: tenant,
                    name: "greet".into(),
                    remote_name: None,
                    description: None,
                    arguments: vec![],
                    template: "Hello".into(),
                    owner_team_id: team,
                    visibility: Visibility::Team,
                    created_at: Utc::now(),
                    version: 0,
                },
                &p,
            )
            .await
            .unwrap();

        let err = store
            .update_prompt(
                prompt.id,
                PromptPatch {
                    template: Some("Howdy".into()),
                    expected_version: Some(7),
                    ..PromptPatch::default()
                },
                &p,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Stale { .. }));

        let updated = store
            .update_prompt(
                prompt.id,
                PromptPatch {
                    template: Some("Howdy".into()),
                    ..PromptPatch::default()
                },
                &p,
            )
            .await
            .unwrap();
        assert_eq!(updated.template, "Howdy");
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn leader_lock_expires_and_hands_over() {
        let store = InMemoryStore::new();
        assert!(store
            .try_acquire_leader("node-1", Duration::from_millis(10))
            .await
            .unwrap());
        assert!(!store
            .try_acquire_leader("node-2", Duration::from_secs(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store
            .try_acquire_leader("node-2", Duration::from_secs(10))
            .await
            .unwrap());
        store.release_leader("node-2").await.unwrap();
        assert!(store
            .try_acquire_leader("node-3", Duration::from_secs(10))
            .await
            .unwrap());
    }
}
