//! The application value owning every shared component.
//!
//! No implicit globals: handlers receive an `Arc<Application>`, tests
//! inject fakes through the builder.

use crate::auth::Authenticator;
use crate::session::{MemorySessionRegistry, SessionRecord, SessionRegistry};
use crate::writer::{OutboundFrame, SessionWriter};
use crate::{ServerError, ServerResult};
use dashmap::DashMap;
use mcpgateway_config::GatewayConfig;
use mcpgateway_plugins::{
    ChainConfig, ExternalEndpoint, ExternalPlugin, ExternalTransport, Plugin, PluginElicitation,
    PluginError, PluginManager, PluginSpec,
};
use mcpgateway_protocol::jsonrpc::JsonRpcRequest;
use mcpgateway_protocol::methods;
use mcpgateway_protocol::types::{ElicitRequestParams, ElicitResult, LogLevel};
use mcpgateway_registry::{EntityId, InMemoryStore, RegistryStore};
use mcpgateway_upstream::{ClientPool, StdioUpstream, UpstreamRpc};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Shared state for the whole dataplane.
pub struct Application {
    config: GatewayConfig,
    store: Arc<dyn RegistryStore>,
    sessions: Arc<dyn SessionRegistry>,
    plugins: Arc<PluginManager>,
    pool: Arc<ClientPool>,
    authenticator: Authenticator,
    /// REST tool invocations go through this plain client
    rest_http: reqwest::Client,
    /// Stream-transport writers by session id
    writers: DashMap<String, SessionWriter>,
    /// Per-session minimum log level (`logging/setLevel`)
    log_levels: DashMap<String, LogLevel>,
    /// Resource subscription counters by URI
    resource_subscriptions: DashMap<String, usize>,
    prometheus: Option<PrometheusHandle>,
    ready: AtomicBool,
}

/// Builds an [`Application`], allowing tests to inject fakes.
pub struct ApplicationBuilder {
    config: GatewayConfig,
    store: Option<Arc<dyn RegistryStore>>,
    sessions: Option<Arc<dyn SessionRegistry>>,
    plugins: Option<Arc<PluginManager>>,
    install_prometheus: bool,
}

impl ApplicationBuilder {
    /// Start from a configuration
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            store: None,
            sessions: None,
            plugins: None,
            install_prometheus: false,
        }
    }

    /// Inject a store (tests)
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RegistryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Inject a session registry (tests)
    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionRegistry>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Inject a plugin manager (tests)
    #[must_use]
    pub fn with_plugins(mut self, plugins: Arc<PluginManager>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// Install the process-wide Prometheus recorder (binary only; tests
    /// must not, the recorder is global)
    #[must_use]
    pub fn with_prometheus(mut self) -> Self {
        self.install_prometheus = true;
        self
    }

    /// Wire everything up.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` when the plugin chain fails to load or a
    /// component cannot be constructed.
    pub fn build(self) -> ServerResult<Arc<Application>> {
        let config = self.config;
        let store = self.store.unwrap_or_else(|| {
            Arc::new(
                InMemoryStore::new()
                    .with_passthrough_headers(config.default_passthrough_headers.clone()),
            )
        });
        let sessions = self.sessions.unwrap_or_else(|| {
            Arc::new(MemorySessionRegistry::new(
                config.transport.session_idle_timeout,
                config.elicitation.max_concurrent,
            ))
        });

        let plugins = match self.plugins {
            Some(plugins) => plugins,
            None if config.plugins.enabled => {
                let path = config
                    .plugins
                    .config_file
                    .as_deref()
                    .ok_or_else(|| ServerError::Internal("plugin config file missing".into()))?;
                let chain = ChainConfig::load(path)?;
                Arc::new(PluginManager::build(
                    chain,
                    config.plugins.timeout,
                    &external_resolver(&config),
                )?)
            }
            None => Arc::new(PluginManager::empty()),
        };

        let pool = Arc::new(ClientPool::new(
            config.upstream.clone(),
            config.request_timeout,
        ));
        let authenticator = Authenticator::new(&config.jwt)?;
        let rest_http = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        let prometheus = if self.install_prometheus {
            Some(
                PrometheusBuilder::new()
                    .install_recorder()
                    .map_err(|e| ServerError::Internal(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Arc::new(Application {
            config,
            store,
            sessions,
            plugins,
            pool,
            authenticator,
            rest_http,
            writers: DashMap::new(),
            log_levels: DashMap::new(),
            resource_subscriptions: DashMap::new(),
            prometheus,
            ready: AtomicBool::new(false),
        }))
    }
}

/// Resolver turning external plugin specs into live adapters. Native
/// plugin names are unknown to the core build; they must arrive through
/// `ApplicationBuilder::with_plugins`.
fn external_resolver(
    config: &GatewayConfig,
) -> impl Fn(&PluginSpec) -> Result<Arc<dyn Plugin>, PluginError> + '_ {
    let request_timeout = config.request_timeout;
    let upstream = config.upstream.clone();
    move |spec: &PluginSpec| {
        let Some(endpoint) = &spec.external else {
            return Err(PluginError::Config(format!(
                "plugin {:?} is not external and no native implementation is registered",
                spec.name
            )));
        };
        match endpoint.transport {
            ExternalTransport::Stdio => {
                let script = endpoint
                    .script
                    .as_deref()
                    .ok_or_else(|| PluginError::Config("stdio plugin without script".into()))?;
                let child = StdioUpstream::spawn(script, &[], request_timeout)
                    .map_err(|e| PluginError::Config(e.to_string()))?;
                Ok(Arc::new(ExternalPlugin::new(
                    spec.name.clone(),
                    Arc::new(StdioPluginRpc(child)),
                )) as Arc<dyn Plugin>)
            }
            ExternalTransport::Websocket => {
                let url = endpoint
                    .url
                    .clone()
                    .ok_or_else(|| PluginError::Config("websocket plugin without url".into()))?;
                Ok(Arc::new(ExternalPlugin::new(
                    spec.name.clone(),
                    Arc::new(WsPluginRpc::new(url, request_timeout)),
                )) as Arc<dyn Plugin>)
            }
            ExternalTransport::Sse | ExternalTransport::Streamablehttp => {
                let client = plugin_client(endpoint, &upstream, request_timeout)?;
                Ok(Arc::new(ExternalPlugin::new(
                    spec.name.clone(),
                    Arc::new(UpstreamRpc::new(client)),
                )) as Arc<dyn Plugin>)
            }
        }
    }
}

/// [`mcpgateway_plugins::PluginRpc`] over a lazily-connected WebSocket.
struct WsPluginRpc {
    url: String,
    request_timeout: std::time::Duration,
    conn: tokio::sync::OnceCell<mcpgateway_upstream::WsUpstream>,
}

impl WsPluginRpc {
    fn new(url: String, request_timeout: std::time::Duration) -> Self {
        Self {
            url,
            request_timeout,
            conn: tokio::sync::OnceCell::new(),
        }
    }

    async fn conn(&self) -> Result<&mcpgateway_upstream::WsUpstream, PluginError> {
        self.conn
            .get_or_try_init(|| async {
                mcpgateway_upstream::WsUpstream::connect(&self.url, self.request_timeout)
                    .await
                    .map_err(|e| PluginError::transport(&self.url, e.to_string()))
            })
            .await
    }
}

#[async_trait::async_trait]
impl mcpgateway_plugins::PluginRpc for WsPluginRpc {
    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError> {
        self.conn()
            .await?
            .request(
                methods::TOOLS_CALL,
                Some(json!({"name": tool, "arguments": arguments})),
            )
            .await
            .map_err(|e| PluginError::transport(tool, e.to_string()))
    }

    async fn list_tools(&self) -> Result<Vec<String>, PluginError> {
        let result = self
            .conn()
            .await?
            .request(methods::TOOLS_LIST, None)
            .await
            .map_err(|e| PluginError::transport("tools/list", e.to_string()))?;
        let listed: mcpgateway_protocol::types::ListToolsResult =
            serde_json::from_value(result).map_err(PluginError::Payload)?;
        Ok(listed.tools.into_iter().map(|t| t.name).collect())
    }
}

fn plugin_client(
    endpoint: &ExternalEndpoint,
    upstream: &mcpgateway_config::UpstreamSettings,
    request_timeout: std::time::Duration,
) -> Result<Arc<mcpgateway_upstream::UpstreamClient>, PluginError> {
    let url = endpoint
        .url
        .clone()
        .ok_or_else(|| PluginError::Config("network plugin without url".into()))?;
    let record = mcpgateway_registry::GatewayRecord {
        id: EntityId::generate(),
        tenant_id: EntityId::generate(),
        name: format!("plugin:{url}"),
        slug: "plugin".into(),
        url,
        transport: mcpgateway_registry::GatewayTransport::Streamablehttp,
        auth_type: mcpgateway_registry::AuthType::None,
        auth_material: None,
        one_time_auth: false,
        passthrough_headers: vec![],
        ca_certificate: None,
        enabled: true,
        reachable: true,
        health_checks_enabled: false,
        created_at: chrono::Utc::now(),
        last_seen_at: None,
        owner_team_id: EntityId::generate(),
        visibility: mcpgateway_registry::Visibility::Private,
        version: 0,
    };
    mcpgateway_upstream::UpstreamClient::connect(record, upstream.clone(), request_timeout)
        .map(Arc::new)
        .map_err(|e| PluginError::Config(e.to_string()))
}

/// [`mcpgateway_plugins::PluginRpc`] over a stdio child.
struct StdioPluginRpc(StdioUpstream);

#[async_trait::async_trait]
impl mcpgateway_plugins::PluginRpc for StdioPluginRpc {
    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError> {
        self.0
            .request(
                methods::TOOLS_CALL,
                Some(json!({"name": tool, "arguments": arguments})),
            )
            .await
            .map_err(|e| PluginError::transport(tool, e.to_string()))
    }

    async fn list_tools(&self) -> Result<Vec<String>, PluginError> {
        let result = self
            .0
            .request(methods::TOOLS_LIST, None)
            .await
            .map_err(|e| PluginError::transport("tools/list", e.to_string()))?;
        let listed: mcpgateway_protocol::types::ListToolsResult =
            serde_json::from_value(result).map_err(PluginError::Payload)?;
        Ok(listed.tools.into_iter().map(|t| t.name).collect())
    }
}

impl Application {
    /// The merged configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The entity store
    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// The session registry
    pub fn sessions(&self) -> &Arc<dyn SessionRegistry> {
        &self.sessions
    }

    /// The plugin chain
    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    /// The upstream client pool
    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    /// The bearer-token authenticator
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Plain HTTP client for REST tool invocations
    pub(crate) fn rest_http(&self) -> &reqwest::Client {
        &self.rest_http
    }

    /// Subscription counters by resource URI
    pub(crate) fn resource_subscriptions(&self) -> &DashMap<String, usize> {
        &self.resource_subscriptions
    }

    /// Per-session log level store
    pub(crate) fn log_levels(&self) -> &DashMap<String, LogLevel> {
        &self.log_levels
    }

    /// Mark the dataplane ready (store reachable, workers started)
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Whether `/ready` should succeed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Render the Prometheus exposition, when the recorder is installed
    pub fn render_metrics(&self) -> Option<String> {
        self.prometheus.as_ref().map(PrometheusHandle::render)
    }

    /// Attach a stream transport's writer for a session
    pub fn register_writer(&self, writer: SessionWriter) {
        self.writers.insert(writer.session_id().to_string(), writer);
    }

    /// Detach (and close) a session's writer
    pub fn unregister_writer(&self, session_id: &str) {
        self.writers.remove(session_id);
    }

    /// The writer for a session, if a stream transport is attached
    pub fn writer(&self, session_id: &str) -> Option<SessionWriter> {
        self.writers.get(session_id).map(|w| w.clone())
    }

    /// Drop sessions idle beyond the timeout, closing their writers.
    pub async fn sweep_idle_sessions(&self) {
        match self.sessions.sweep_idle().await {
            Ok(expired) => {
                for session_id in expired {
                    debug!(session_id, "closing idle session");
                    self.writers.remove(&session_id);
                    self.log_levels.remove(&session_id);
                }
            }
            Err(error) => warn!(%error, "idle sweep failed"),
        }
    }

    /// Run one elicitation round-trip: send `elicitation/create` to the
    /// originating client and await its typed response.
    ///
    /// # Errors
    ///
    /// - `FeatureDisabled` when elicitation is off
    /// - `CapabilityMissing` when the client did not advertise it
    /// - `TooManyElicitations` past the per-session cap
    /// - `ElicitationTimeout` when the client does not answer in time
    pub async fn elicit(
        &self,
        session: &SessionRecord,
        request: PluginElicitation,
    ) -> ServerResult<ElicitResult> {
        if !self.config.elicitation.enabled {
            return Err(ServerError::FeatureDisabled("elicitation"));
        }
        if !session.capabilities.supports_elicitation() {
            return Err(ServerError::CapabilityMissing("elicitation"));
        }
        let writer = self
            .writer(&session.session_id)
            .ok_or(ServerError::SessionNotFound)?;

        let request_id = EntityId::generate().to_hex();
        let timeout = request
            .timeout_seconds
            .map_or(self.config.elicitation.timeout, std::time::Duration::from_secs);

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sessions
            .attach_pending_elicitation(&session.session_id, &request_id, tx)
            .await?;

        let params = ElicitRequestParams {
            message: request.message,
            requested_schema: request.schema.clone(),
            timeout_ms: Some(timeout.as_millis() as u64),
        };
        let frame = OutboundFrame::Request(JsonRpcRequest::new(
            request_id.as_str(),
            methods::ELICITATION_CREATE,
            Some(serde_json::to_value(&params).map_err(|e| ServerError::Internal(e.to_string()))?),
        ));
        if !writer.enqueue(frame) {
            self.sessions
                .abandon_elicitation(&session.session_id, &request_id)
                .await?;
            self.unregister_writer(&session.session_id);
            return Err(ServerError::SessionNotFound);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                if let (mcpgateway_protocol::types::ElicitationAction::Accept, Some(data)) =
                    (response.action, response.data.as_ref())
                {
                    crate::dispatcher::validate_against_schema(&request.schema, data).map_err(
                        |()| {
                            ServerError::InvalidParams(
                                "elicitation response does not match the requested schema".into(),
                            )
                        },
                    )?;
                }
                Ok(response)
            }
            Ok(Err(_)) => Err(ServerError::ElicitationTimeout),
            Err(_) => {
                self.sessions
                    .abandon_elicitation(&session.session_id, &request_id)
                    .await?;
                Err(ServerError::ElicitationTimeout)
            }
        }
    }

    /// Resolve a pending elicitation from a client's JSON-RPC response.
    pub async fn complete_elicitation(
        &self,
        session_id: &str,
        request_id: &str,
        result: serde_json::Value,
    ) {
        let response: ElicitResult = match serde_json::from_value(result) {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "undecodable elicitation response");
                return;
            }
        };
        if let Err(error) = self
            .sessions
            .resolve_elicitation(session_id, request_id, response)
            .await
        {
            debug!(%error, session_id, request_id, "no pending elicitation to resolve");
        }
    }

    /// The effective global passthrough allowlist: the admin-configured
    /// store row, falling back to the configured default.
    pub async fn global_passthrough(&self) -> Vec<String> {
        match self.store.global_passthrough_headers().await {
            Ok(headers) if !headers.is_empty() => headers,
            _ => self.config.default_passthrough_headers.clone(),
        }
    }

    /// Map a tool-call's argument map into plugin payload form
    pub(crate) fn arguments_or_default(
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> HashMap<String, serde_json::Value> {
        arguments.unwrap_or_default()
    }
}
