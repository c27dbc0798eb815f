//! Registry admin surface: gateway/tool/resource/prompt/virtual-server
//! CRUD, the global passthrough allowlist, and metrics exposition.
//!
//! Responses never include credential material: gateway views carry no
//! `auth_material` field at all.

use super::AppState;
use crate::{ServerError, ServerResult};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use mcpgateway_federation::CapabilitySync;
use mcpgateway_registry::{
    AuditRecord, AuthType, EntityId, GatewayPatch, GatewayRecord, GatewayTransport,
    IntegrationType, ListFilter, Page, Principal, PromptArgumentSpec, PromptPatch, PromptRecord,
    RequestType, ResourcePatch, ResourceRecord, ToolRecord, Visibility, VirtualServerPatch,
    VirtualServerRecord, normalize_tool_name,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

/// Error wrapper mapping the server taxonomy onto HTTP statuses.
pub struct ApiError(ServerError);

impl From<ServerError> for ApiError {
    fn from(error: ServerError) -> Self {
        Self(error)
    }
}

impl From<mcpgateway_registry::RegistryError> for ApiError {
    fn from(error: mcpgateway_registry::RegistryError) -> Self {
        Self(ServerError::Registry(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (
            status,
            Json(json!({"error": self.0.code_label(), "message": self.0.to_string()})),
        )
            .into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert("Retry-After", axum::http::HeaderValue::from_static("30"));
        }
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn principal_from(state: &AppState, headers: &HeaderMap) -> ServerResult<Principal> {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    state.app.authenticator().authenticate(authorization)
}

fn parse_id(raw: &str) -> ServerResult<EntityId> {
    raw.parse()
        .map_err(|_| ServerError::Registry(mcpgateway_registry::RegistryError::not_found("entity", raw)))
}

async fn audit(state: &AppState, principal: &Principal, action: &str, target: Option<EntityId>, details: Value) {
    let record = AuditRecord {
        request_id: EntityId::generate().to_hex(),
        actor: principal.user.clone(),
        action: action.to_string(),
        target_id: target,
        at: Utc::now(),
        details,
    };
    if let Err(error) = state.app.store().append_audit(record).await {
        warn!(%error, "audit append failed");
    }
}

// ---------------------------------------------------------------------
// Gateways
// ---------------------------------------------------------------------

/// Gateway registration payload
#[derive(Debug, Deserialize)]
pub struct CreateGateway {
    name: String,
    url: String,
    #[serde(default = "default_transport")]
    transport: GatewayTransport,
    #[serde(default = "default_auth_type")]
    auth_type: AuthType,
    /// Credential material; consumed once and discarded when
    /// `one_time_auth` is set
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    one_time_auth: bool,
    #[serde(default)]
    passthrough_headers: Vec<String>,
    #[serde(default)]
    ca_certificate: Option<String>,
    #[serde(default)]
    visibility: Visibility,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_transport() -> GatewayTransport {
    GatewayTransport::Streamablehttp
}
fn default_auth_type() -> AuthType {
    AuthType::None
}
fn default_true() -> bool {
    true
}

/// Gateway view with credentials stripped
#[derive(Debug, Serialize)]
pub struct GatewayView {
    id: EntityId,
    name: String,
    url: String,
    transport: GatewayTransport,
    auth_type: AuthType,
    one_time_auth: bool,
    passthrough_headers: Vec<String>,
    enabled: bool,
    reachable: bool,
    health_checks_enabled: bool,
    visibility: Visibility,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen_at: Option<DateTime<Utc>>,
    version: u64,
}

impl From<GatewayRecord> for GatewayView {
    fn from(record: GatewayRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            url: record.url,
            transport: record.transport,
            auth_type: record.auth_type,
            one_time_auth: record.one_time_auth,
            passthrough_headers: record.passthrough_headers,
            enabled: record.enabled,
            reachable: record.reachable,
            health_checks_enabled: record.health_checks_enabled,
            visibility: record.visibility,
            created_at: record.created_at,
            last_seen_at: record.last_seen_at,
            version: record.version,
        }
    }
}

/// `POST /gateways` - register an upstream and discover its
/// capabilities. One-time credentials are used for discovery here and
/// never persisted.
pub async fn create_gateway(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateGateway>,
) -> ApiResult<(StatusCode, Json<GatewayView>)> {
    let principal = principal_from(&state, &headers)?;
    let owner_team = *principal
        .team_ids
        .first()
        .ok_or_else(|| ServerError::Registry(mcpgateway_registry::RegistryError::Unauthenticated))?;

    let slug = normalize_tool_name(&body.name)
        .map_err(ServerError::Registry)?
        .to_lowercase();
    let record = GatewayRecord {
        id: EntityId::generate(),
        tenant_id: principal.tenant_id,
        name: body.name,
        slug,
        url: body.url,
        transport: body.transport,
        auth_type: body.auth_type,
        // one-time credentials never reach the store
        auth_material: if body.one_time_auth {
            None
        } else {
            body.auth_token.clone()
        },
        one_time_auth: body.one_time_auth,
        passthrough_headers: body.passthrough_headers,
        ca_certificate: body.ca_certificate,
        enabled: body.enabled,
        reachable: false,
        health_checks_enabled: !body.one_time_auth,
        created_at: Utc::now(),
        last_seen_at: None,
        owner_team_id: owner_team,
        visibility: body.visibility,
        version: 0,
    };
    let record = state.app.store().create_gateway(record, &principal).await?;

    // discovery: one-shot with the (possibly one-time) credential
    let sync = CapabilitySync::new(
        state.app.store().clone(),
        state.app.pool().clone(),
        state.app.config().federation.tool_name_separator.clone(),
    );
    let mut discovery_record = record.clone();
    if body.one_time_auth {
        discovery_record.auth_material = body.auth_token;
    }
    match sync
        .discover_once(
            &discovery_record,
            &state.app.config().upstream,
            state.app.config().request_timeout,
        )
        .await
    {
        Ok(outcome) => {
            state
                .app
                .store()
                .set_gateway_health(record.id, true)
                .await
                .ok();
            info!(
                gateway = %record.name,
                added = outcome.added,
                "registered gateway and discovered capabilities"
            );
        }
        Err(error) => {
            warn!(gateway = %record.name, %error, "registration discovery failed");
        }
    }

    audit(
        &state,
        &principal,
        "gateway.create",
        Some(record.id),
        json!({"name": record.name, "one_time_auth": record.one_time_auth}),
    )
    .await;

    let refreshed = state.app.store().gateway(record.id, &principal).await?;
    Ok((StatusCode::CREATED, Json(refreshed.into())))
}

/// `GET /gateways`
pub async fn list_gateways(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<GatewayView>>> {
    let principal = principal_from(&state, &headers)?;
    let gateways = state
        .app
        .store()
        .list_gateways(&ListFilter::default(), &principal, Page::default())
        .await?;
    Ok(Json(gateways.into_iter().map(Into::into).collect()))
}

/// `GET /gateways/{id}`
pub async fn get_gateway(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<GatewayView>> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    let record = state.app.store().gateway(id, &principal).await?;
    Ok(Json(record.into()))
}

/// Gateway update payload
#[derive(Debug, Deserialize)]
pub struct UpdateGateway {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    passthrough_headers: Option<Vec<String>>,
    #[serde(default)]
    visibility: Option<Visibility>,
    #[serde(default)]
    version: Option<u64>,
}

/// `PUT /gateways/{id}`
pub async fn update_gateway(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateGateway>,
) -> ApiResult<Json<GatewayView>> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    let patch = GatewayPatch {
        name: body.name,
        url: body.url,
        enabled: body.enabled,
        passthrough_headers: body.passthrough_headers,
        visibility: body.visibility,
        expected_version: body.version,
    };
    let updated = state.app.store().update_gateway(id, patch, &principal).await?;
    state.app.pool().evict(id);
    audit(&state, &principal, "gateway.update", Some(id), json!({})).await;
    Ok(Json(updated.into()))
}

/// `DELETE /gateways/{id}` - cascades to derived capabilities and
/// virtual-server associations.
pub async fn delete_gateway(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    state.app.store().delete_gateway(id, &principal).await?;
    state.app.pool().evict(id);
    audit(&state, &principal, "gateway.delete", Some(id), json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------

/// Native tool creation payload
#[derive(Debug, Deserialize)]
pub struct CreateTool {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    integration_type: IntegrationType,
    request_type: RequestType,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    mcp_method: Option<String>,
    #[serde(default = "default_schema")]
    input_schema: Value,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    visibility: Visibility,
}

fn default_schema() -> Value {
    json!({"type": "object"})
}

/// `POST /tools` - register a native tool.
pub async fn create_tool(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateTool>,
) -> ApiResult<(StatusCode, Json<ToolRecord>)> {
    let principal = principal_from(&state, &headers)?;
    let owner_team = *principal
        .team_ids
        .first()
        .ok_or_else(|| ServerError::Registry(mcpgateway_registry::RegistryError::Unauthenticated))?;
    let name = normalize_tool_name(&body.name).map_err(ServerError::Registry)?;
    let record = ToolRecord {
        id: EntityId::generate(),
        gateway_id: None,
        tenant_id: principal.tenant_id,
        name,
        display_name: body.display_name,
        description: body.description,
        integration_type: body.integration_type,
        request_type: body.request_type,
        url: body.url,
        mcp_method: body.mcp_method,
        input_schema: body.input_schema,
        annotations: None,
        tags: body.tags,
        enabled: true,
        reachable: true,
        owner_team_id: owner_team,
        visibility: body.visibility,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        version: 0,
    };
    let record = state.app.store().create_tool(record, &principal).await?;
    audit(&state, &principal, "tool.create", Some(record.id), json!({"name": record.name})).await;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /tools`
pub async fn list_tools(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ToolRecord>>> {
    let principal = principal_from(&state, &headers)?;
    let tools = state
        .app
        .store()
        .list_tools(&ListFilter::default(), &principal, Page::default())
        .await?;
    Ok(Json(tools))
}

/// `GET /tools/{id}`
pub async fn get_tool(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ToolRecord>> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    Ok(Json(state.app.store().tool(id, &principal).await?))
}

/// `DELETE /tools/{id}`
pub async fn delete_tool(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    state.app.store().delete_tool(id, &principal).await?;
    audit(&state, &principal, "tool.delete", Some(id), json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------
// Resources & prompts (native)
// ---------------------------------------------------------------------

/// Native resource creation payload
#[derive(Debug, Deserialize)]
pub struct CreateResource {
    uri: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    visibility: Visibility,
}

/// `POST /resources`
pub async fn create_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateResource>,
) -> ApiResult<(StatusCode, Json<ResourceRecord>)> {
    let principal = principal_from(&state, &headers)?;
    let owner_team = *principal
        .team_ids
        .first()
        .ok_or_else(|| ServerError::Registry(mcpgateway_registry::RegistryError::Unauthenticated))?;
    let record = ResourceRecord {
        id: EntityId::generate(),
        gateway_id: None,
        tenant_id: principal.tenant_id,
        uri: body.uri,
        name: body.name,
        description: body.description,
        mime_type: body.mime_type,
        size_hint: body.text.as_ref().map(|t| t.len() as u64),
        text: body.text,
        tags: body.tags,
        owner_team_id: owner_team,
        visibility: body.visibility,
        created_at: Utc::now(),
        version: 0,
    };
    let record = state.app.store().create_resource(record, &principal).await?;
    audit(&state, &principal, "resource.create", Some(record.id), json!({"uri": record.uri})).await;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /resources`
pub async fn list_resources(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ResourceRecord>>> {
    let principal = principal_from(&state, &headers)?;
    let resources = state
        .app
        .store()
        .list_resources(&ListFilter::default(), &principal, Page::default())
        .await?;
    Ok(Json(resources))
}

/// Resource update payload
#[derive(Debug, Deserialize)]
pub struct UpdateResource {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    visibility: Option<Visibility>,
    #[serde(default)]
    version: Option<u64>,
}

/// `PUT /resources/{id}`
pub async fn update_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateResource>,
) -> ApiResult<Json<ResourceRecord>> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    let patch = ResourcePatch {
        name: body.name,
        description: body.description,
        mime_type: body.mime_type,
        text: body.text,
        tags: body.tags,
        visibility: body.visibility,
        expected_version: body.version,
    };
    let updated = state
        .app
        .store()
        .update_resource(id, patch, &principal)
        .await?;
    audit(&state, &principal, "resource.update", Some(id), json!({})).await;
    Ok(Json(updated))
}

/// `DELETE /resources/{id}`
pub async fn delete_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    state.app.store().delete_resource(id, &principal).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Native prompt creation payload
#[derive(Debug, Deserialize)]
pub struct CreatePrompt {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    arguments: Vec<PromptArgumentSpec>,
    template: String,
    #[serde(default)]
    visibility: Visibility,
}

/// `POST /prompts`
pub async fn create_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePrompt>,
) -> ApiResult<(StatusCode, Json<PromptRecord>)> {
    let principal = principal_from(&state, &headers)?;
    let owner_team = *principal
        .team_ids
        .first()
        .ok_or_else(|| ServerError::Registry(mcpgateway_registry::RegistryError::Unauthenticated))?;
    let record = PromptRecord {
        id: EntityId::generate(),
        gateway_id: None,
        tenant_id: principal.tenant_id,
        name: body.name,
        remote_name: None,
        description: body.description,
        arguments: body.arguments,
        template: body.template,
        owner_team_id: owner_team,
        visibility: body.visibility,
        created_at: Utc::now(),
        version: 0,
    };
    let record = state.app.store().create_prompt(record, &principal).await?;
    audit(&state, &principal, "prompt.create", Some(record.id), json!({"name": record.name})).await;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /prompts`
pub async fn list_prompts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PromptRecord>>> {
    let principal = principal_from(&state, &headers)?;
    let prompts = state
        .app
        .store()
        .list_prompts(&ListFilter::default(), &principal, Page::default())
        .await?;
    Ok(Json(prompts))
}

/// Prompt update payload
#[derive(Debug, Deserialize)]
pub struct UpdatePrompt {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<PromptArgumentSpec>>,
    #[serde(default)]
    visibility: Option<Visibility>,
    #[serde(default)]
    version: Option<u64>,
}

/// `PUT /prompts/{id}`
pub async fn update_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdatePrompt>,
) -> ApiResult<Json<PromptRecord>> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    let patch = PromptPatch {
        description: body.description,
        template: body.template,
        arguments: body.arguments,
        visibility: body.visibility,
        expected_version: body.version,
    };
    let updated = state
        .app
        .store()
        .update_prompt(id, patch, &principal)
        .await?;
    audit(&state, &principal, "prompt.update", Some(id), json!({})).await;
    Ok(Json(updated))
}

/// `DELETE /prompts/{id}`
pub async fn delete_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    state.app.store().delete_prompt(id, &principal).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------
// Virtual servers
// ---------------------------------------------------------------------

/// Virtual server creation payload
#[derive(Debug, Deserialize)]
pub struct CreateServer {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    associated_tools: Vec<EntityId>,
    #[serde(default)]
    associated_resources: Vec<EntityId>,
    #[serde(default)]
    associated_prompts: Vec<EntityId>,
    #[serde(default)]
    associated_a2a_agents: Vec<EntityId>,
    #[serde(default)]
    visibility: Visibility,
}

/// `POST /servers`
pub async fn create_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateServer>,
) -> ApiResult<(StatusCode, Json<VirtualServerRecord>)> {
    let principal = principal_from(&state, &headers)?;
    let owner_team = *principal
        .team_ids
        .first()
        .ok_or_else(|| ServerError::Registry(mcpgateway_registry::RegistryError::Unauthenticated))?;
    let record = VirtualServerRecord {
        id: EntityId::generate(),
        tenant_id: principal.tenant_id,
        name: body.name,
        description: body.description,
        associated_tools: body.associated_tools,
        associated_resources: body.associated_resources,
        associated_prompts: body.associated_prompts,
        associated_a2a_agents: body.associated_a2a_agents,
        owner_team_id: owner_team,
        visibility: body.visibility,
        created_at: Utc::now(),
        version: 0,
    };
    let record = state
        .app
        .store()
        .create_virtual_server(record, &principal)
        .await?;
    audit(&state, &principal, "server.create", Some(record.id), json!({"name": record.name})).await;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /servers`
pub async fn list_servers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<VirtualServerRecord>>> {
    let principal = principal_from(&state, &headers)?;
    let servers = state
        .app
        .store()
        .list_virtual_servers(&ListFilter::default(), &principal, Page::default())
        .await?;
    Ok(Json(servers))
}

/// `GET /servers/{id}`
pub async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<VirtualServerRecord>> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    Ok(Json(state.app.store().virtual_server(id, &principal).await?))
}

/// Virtual server update payload
#[derive(Debug, Deserialize)]
pub struct UpdateServer {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    associated_tools: Option<Vec<EntityId>>,
    #[serde(default)]
    associated_resources: Option<Vec<EntityId>>,
    #[serde(default)]
    associated_prompts: Option<Vec<EntityId>>,
    #[serde(default)]
    visibility: Option<Visibility>,
    #[serde(default)]
    version: Option<u64>,
}

/// `PUT /servers/{id}`
pub async fn update_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateServer>,
) -> ApiResult<Json<VirtualServerRecord>> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    let patch = VirtualServerPatch {
        name: body.name,
        description: body.description,
        associated_tools: body.associated_tools,
        associated_resources: body.associated_resources,
        associated_prompts: body.associated_prompts,
        visibility: body.visibility,
        expected_version: body.version,
    };
    let updated = state
        .app
        .store()
        .update_virtual_server(id, patch, &principal)
        .await?;
    Ok(Json(updated))
}

/// `DELETE /servers/{id}`
pub async fn delete_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let principal = principal_from(&state, &headers)?;
    let id = parse_id(&id)?;
    state
        .app
        .store()
        .delete_virtual_server(id, &principal)
        .await?;
    audit(&state, &principal, "server.delete", Some(id), json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------
// Passthrough headers & metrics
// ---------------------------------------------------------------------

/// Allowlist payload
#[derive(Debug, Serialize, Deserialize)]
pub struct PassthroughHeaders {
    /// Header names
    pub headers: Vec<String>,
}

fn check_rate(state: &AppState) -> Result<(), ApiError> {
    state
        .admin_limiter
        .check()
        .map_err(|_| ApiError(ServerError::RateLimited))
}

/// `GET /admin/config/passthrough-headers` (rate limited)
pub async fn get_passthrough(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PassthroughHeaders>> {
    check_rate(&state)?;
    principal_from(&state, &headers)?;
    Ok(Json(PassthroughHeaders {
        headers: state.app.global_passthrough().await,
    }))
}

/// `PUT /admin/config/passthrough-headers` (rate limited)
pub async fn put_passthrough(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PassthroughHeaders>,
) -> ApiResult<Json<PassthroughHeaders>> {
    check_rate(&state)?;
    let principal = principal_from(&state, &headers)?;
    for name in &body.headers {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(ApiError(ServerError::InvalidParams(format!(
                "invalid header name {name:?}"
            ))));
        }
    }
    state
        .app
        .store()
        .set_global_passthrough_headers(body.headers.clone())
        .await
        .map_err(ServerError::Registry)?;
    audit(&state, &principal, "config.passthrough_headers.update", None, json!({"headers": body.headers})).await;
    Ok(Json(body))
}

/// `GET /metrics` - Prometheus exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.app.render_metrics() {
        Some(text) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        None => StatusCode::NOT_IMPLEMENTED.into_response(),
    }
}
