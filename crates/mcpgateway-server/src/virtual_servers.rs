//! Virtual server composition.
//!
//! A virtual server substitutes the global listings with its association
//! set; everything else about a request is unchanged. Associations to
//! deleted entities self-heal at read time in the store, and the
//! periodic sweep covers the rest.

use crate::{ServerError, ServerResult};
use mcpgateway_registry::{
    EntityId, ListFilter, Page, Principal, PromptRecord, RegistryStore, ResourceRecord,
    ToolRecord, VirtualServerRecord,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Load a virtual server, enforcing caller visibility.
///
/// # Errors
///
/// Returns `NotFound` when the server does not exist or the principal
/// may not see it.
pub async fn resolve(
    store: &Arc<dyn RegistryStore>,
    id: EntityId,
    principal: &Principal,
) -> ServerResult<VirtualServerRecord> {
    Ok(store.virtual_server(id, principal).await?)
}

/// The tools visible through a scope: the virtual server's association
/// set, or every visible tool when unscoped. Ordering is deterministic;
/// the caller sorts by `(gateway_name, tool_name)`.
pub async fn scoped_tools(
    store: &Arc<dyn RegistryStore>,
    scope: Option<&VirtualServerRecord>,
    principal: &Principal,
    page: Page,
) -> ServerResult<Vec<ToolRecord>> {
    let filter = ListFilter {
        enabled_only: true,
        ..ListFilter::default()
    };
    let tools = store.list_tools(&filter, principal, page).await?;
    Ok(match scope {
        Some(server) => {
            let allowed: HashSet<EntityId> = server.associated_tools.iter().copied().collect();
            tools
                .into_iter()
                .filter(|tool| allowed.contains(&tool.id))
                .collect()
        }
        None => tools,
    })
}

/// The resources visible through a scope.
pub async fn scoped_resources(
    store: &Arc<dyn RegistryStore>,
    scope: Option<&VirtualServerRecord>,
    principal: &Principal,
    page: Page,
) -> ServerResult<Vec<ResourceRecord>> {
    let resources = store
        .list_resources(&ListFilter::default(), principal, page)
        .await?;
    Ok(match scope {
        Some(server) => {
            let allowed: HashSet<EntityId> =
                server.associated_resources.iter().copied().collect();
            resources
                .into_iter()
                .filter(|resource| allowed.contains(&resource.id))
                .collect()
        }
        None => resources,
    })
}

/// The prompts visible through a scope.
pub async fn scoped_prompts(
    store: &Arc<dyn RegistryStore>,
    scope: Option<&VirtualServerRecord>,
    principal: &Principal,
    page: Page,
) -> ServerResult<Vec<PromptRecord>> {
    let prompts = store
        .list_prompts(&ListFilter::default(), principal, page)
        .await?;
    Ok(match scope {
        Some(server) => {
            let allowed: HashSet<EntityId> = server.associated_prompts.iter().copied().collect();
            prompts
                .into_iter()
                .filter(|prompt| allowed.contains(&prompt.id))
                .collect()
        }
        None => prompts,
    })
}

/// Resolve a tool by advertised name within a scope.
///
/// # Errors
///
/// Returns `NotFound` when the tool is absent from the scope (or not
/// visible to the principal).
pub async fn resolve_tool(
    store: &Arc<dyn RegistryStore>,
    scope: Option<&VirtualServerRecord>,
    principal: &Principal,
    name: &str,
) -> ServerResult<ToolRecord> {
    let tool = store
        .tool_by_name(principal.tenant_id, name, principal)
        .await?;
    if let Some(server) = scope {
        if !server.associated_tools.contains(&tool.id) {
            return Err(ServerError::Registry(
                mcpgateway_registry::RegistryError::not_found("tool", name),
            ));
        }
    }
    if !tool.enabled {
        return Err(ServerError::Registry(
            mcpgateway_registry::RegistryError::not_found("tool", name),
        ));
    }
    Ok(tool)
}
