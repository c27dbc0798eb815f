//! End-to-end dispatcher scenarios against a wiremock upstream.

use async_trait::async_trait;
use chrono::Utc;
use mcpgateway_config::GatewayConfig;
use mcpgateway_plugins::{
    ChainConfig, HookType, Plugin, PluginContext, PluginElicitation, PluginError, PluginManager,
    PluginMode, PluginResult, PluginSpec, PluginViolation,
};
use mcpgateway_protocol::jsonrpc::{JsonRpcRequest, RequestId};
use mcpgateway_protocol::types::{ClientCapabilities, ElicitationCapabilities};
use mcpgateway_registry::{
    AuthType, EntityId, GatewayRecord, GatewayTransport, InMemoryStore, IntegrationType,
    Principal, RegistryStore, RequestType, ToolRecord, Visibility, VirtualServerRecord,
};
use mcpgateway_server::{
    Application, ApplicationBuilder, OutboundFrame, RequestOrigin, SessionRecord, SessionWriter,
    TransportKind,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    app: Arc<Application>,
    store: Arc<dyn RegistryStore>,
    principal: Principal,
    gateway: GatewayRecord,
    tool: ToolRecord,
    server: VirtualServerRecord,
}

async fn fixture(upstream_url: &str, config: GatewayConfig, plugins: Option<Arc<PluginManager>>) -> Fixture {
    let store: Arc<dyn RegistryStore> = Arc::new(
        InMemoryStore::new().with_passthrough_headers(config.default_passthrough_headers.clone()),
    );

    let mut builder = ApplicationBuilder::new(config).with_store(store.clone());
    if let Some(plugins) = plugins {
        builder = builder.with_plugins(plugins);
    }
    let app = builder.build().unwrap();

    // seed tenant and team matching the open-mode anonymous principal
    let principal = app.authenticator().authenticate(None).unwrap();
    let team = principal.team_ids[0];

    let gateway = store
        .create_gateway(
            GatewayRecord {
                id: EntityId::generate(),
                tenant_id: principal.tenant_id,
                name: "time".into(),
                slug: "time".into(),
                url: format!("{upstream_url}/mcp"),
                transport: GatewayTransport::Streamablehttp,
                auth_type: AuthType::None,
                auth_material: None,
                one_time_auth: false,
                passthrough_headers: vec!["X-Tenant-Id".into()],
                ca_certificate: None,
                enabled: true,
                reachable: true,
                health_checks_enabled: true,
                created_at: Utc::now(),
                last_seen_at: None,
                owner_team_id: team,
                visibility: Visibility::Public,
                version: 0,
            },
            &principal,
        )
        .await
        .unwrap();

    let tool = store
        .create_tool(
            ToolRecord {
                id: EntityId::generate(),
                gateway_id: Some(gateway.id),
                tenant_id: principal.tenant_id,
                name: "time-get_system_time".into(),
                display_name: None,
                description: Some("Current time in a zone".into()),
                integration_type: IntegrationType::Mcp,
                request_type: RequestType::Streamablehttp,
                url: None,
                mcp_method: Some("get_system_time".into()),
                input_schema: json!({"type": "object", "properties": {"timezone": {"type": "string"}}}),
                annotations: None,
                tags: vec![],
                enabled: true,
                reachable: true,
                owner_team_id: team,
                visibility: Visibility::Public,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                version: 0,
            },
            &principal,
        )
        .await
        .unwrap();

    let server = store
        .create_virtual_server(
            VirtualServerRecord {
                id: EntityId::generate(),
                tenant_id: principal.tenant_id,
                name: "v1".into(),
                description: None,
                associated_tools: vec![tool.id],
                associated_resources: vec![],
                associated_prompts: vec![],
                associated_a2a_agents: vec![],
                owner_team_id: team,
                visibility: Visibility::Public,
                created_at: Utc::now(),
                version: 0,
            },
            &principal,
        )
        .await
        .unwrap();

    Fixture {
        app,
        store,
        principal,
        gateway,
        tool,
        server,
    }
}

fn call_request(id: i64, name: &str, arguments: Value) -> JsonRpcRequest {
    JsonRpcRequest::new(
        id,
        "tools/call",
        Some(json!({"name": name, "arguments": arguments})),
    )
}

fn origin_scoped(server: &VirtualServerRecord) -> RequestOrigin {
    RequestOrigin {
        session_id: None,
        virtual_server: Some(server.id),
        client_headers: mcpgateway_plugins::HeaderSet::new(),
        transport: TransportKind::StreamableHttp,
    }
}

#[tokio::test]
async fn tool_invocation_through_virtual_server() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": {"name": "get_system_time", "arguments": {"timezone": "UTC"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"content": [{"type": "text", "text": "2025-01-01T00:00:00Z"}]}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let fx = fixture(&upstream.uri(), GatewayConfig::default(), None).await;
    let reply = fx
        .app
        .handle_request(
            call_request(7, "time-get_system_time", json!({"timezone": "UTC"})),
            &origin_scoped(&fx.server),
        )
        .await;

    assert_eq!(reply.response.id.0, Some(RequestId::Number(7)));
    let result = reply.response.result().expect("success");
    // the upstream return payload is passed through verbatim
    assert_eq!(result["content"][0]["text"], "2025-01-01T00:00:00Z");

    let metrics = fx.store.metrics_snapshot().await.unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].entity_id, fx.tool.id);
}

/// Plugin that blocks on a literal SSN in any string argument.
struct PiiFilter;

#[async_trait]
impl Plugin for PiiFilter {
    fn name(&self) -> &str {
        "PIIFilterPlugin"
    }

    async fn invoke(
        &self,
        _hook: HookType,
        payload: Value,
        _ctx: &PluginContext<'_>,
    ) -> Result<PluginResult<Value>, PluginError> {
        let blocked = payload["arguments"]
            .as_object()
            .is_some_and(|arguments| {
                arguments
                    .values()
                    .filter_map(Value::as_str)
                    .any(|text| text.contains("123-45-6789"))
            });
        if blocked {
            Ok(PluginResult::block(PluginViolation::new(
                "PII detected",
                "a social security number was found in the arguments",
                "CONTENT_BLOCKED",
            )))
        } else {
            Ok(PluginResult::pass())
        }
    }
}

fn chain_with(specs: Vec<(PluginSpec, Arc<dyn Plugin>)>) -> Arc<PluginManager> {
    let lookup: HashMap<String, Arc<dyn Plugin>> = specs
        .iter()
        .map(|(spec, plugin)| (spec.name.clone(), plugin.clone()))
        .collect();
    let config = ChainConfig {
        plugins: specs.into_iter().map(|(spec, _)| spec).collect(),
        parallel_execution_within_band: false,
    };
    Arc::new(
        PluginManager::build(config, Duration::from_secs(5), &|spec| {
            Ok(lookup[&spec.name].clone())
        })
        .unwrap(),
    )
}

fn spec(name: &str, hook: HookType, priority: i32, mode: PluginMode) -> PluginSpec {
    PluginSpec {
        name: name.into(),
        hooks: vec![hook],
        mode,
        priority,
        conditions: Default::default(),
        config: Value::Null,
        mutates_payload: true,
        timeout_seconds: None,
        external: None,
    }
}

#[tokio::test]
async fn pii_plugin_blocks_in_enforce_mode() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0) // the upstream must never be called
        .mount(&upstream)
        .await;

    let plugins = chain_with(vec![(
        spec("PIIFilterPlugin", HookType::ToolPreInvoke, 10, PluginMode::Enforce),
        Arc::new(PiiFilter),
    )]);

    let fx = fixture(&upstream.uri(), GatewayConfig::default(), Some(plugins)).await;
    let reply = fx
        .app
        .handle_request(
            call_request(9, "time-get_system_time", json!({"text": "SSN is 123-45-6789"})),
            &origin_scoped(&fx.server),
        )
        .await;

    let error = reply.response.error_payload().expect("blocked");
    assert_eq!(error.code, -32000);
    assert_eq!(error.message, "Plugin violation");
    let data = error.data.as_ref().unwrap();
    assert_eq!(data["plugin"], "PIIFilterPlugin");
    assert_eq!(data["code"], "CONTENT_BLOCKED");
    assert_eq!(data["reason"], "PII detected");

    let audits = fx.store.audit_snapshot().await.unwrap();
    assert!(audits.iter().any(|a| a.action == "tool.invoke.blocked"));
}

#[tokio::test]
async fn passthrough_disabled_strips_allowlisted_header() {
    let upstream = MockServer::start().await;
    // any request carrying the tenant header is a failure
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header_exists("x-tenant-id"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": {"content": []}
        })))
        .mount(&upstream)
        .await;

    let config = GatewayConfig::default();
    assert!(!config.enable_header_passthrough);
    let fx = fixture(&upstream.uri(), config, None).await;

    let mut origin = origin_scoped(&fx.server);
    origin.client_headers.insert("X-Tenant-Id", "acme");

    let reply = fx
        .app
        .handle_request(
            call_request(1, "time-get_system_time", json!({"timezone": "UTC"})),
            &origin,
        )
        .await;
    assert!(reply.response.result().is_some());
}

#[tokio::test]
async fn one_time_auth_header_maps_at_egress() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": {"content": []}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let fx = fixture(&upstream.uri(), GatewayConfig::default(), None).await;
    // turn the fixture gateway into a one-time-auth gateway: no stored
    // credential, runtime auth exclusively via the mapped header
    assert!(fx.gateway.auth_material.is_none());

    let mut origin = origin_scoped(&fx.server);
    origin
        .client_headers
        .insert("X-Upstream-Authorization", "Bearer s3cret");

    let reply = fx
        .app
        .handle_request(
            call_request(2, "time-get_system_time", json!({"timezone": "UTC"})),
            &origin,
        )
        .await;
    assert!(reply.response.result().is_some());
}

/// Plugin that asks for confirmation before `delete_file` runs.
struct ConfirmDelete;

#[async_trait]
impl Plugin for ConfirmDelete {
    fn name(&self) -> &str {
        "ConfirmDelete"
    }

    async fn invoke(
        &self,
        _hook: HookType,
        _payload: Value,
        ctx: &PluginContext<'_>,
    ) -> Result<PluginResult<Value>, PluginError> {
        let confirmed = ctx.global.elicitation_responses.iter().any(|response| {
            response
                .data
                .as_ref()
                .is_some_and(|data| data["confirm_deletion"] == json!(true))
        });
        if confirmed {
            Ok(PluginResult::pass())
        } else {
            Ok(PluginResult::elicit(PluginElicitation {
                message: "Confirm deletion of /tmp/x".into(),
                schema: json!({
                    "type": "object",
                    "properties": {"confirm_deletion": {"type": "boolean"}},
                    "required": ["confirm_deletion"]
                }),
                timeout_seconds: Some(60),
            }))
        }
    }
}

#[tokio::test]
async fn elicitation_round_trip_reinvokes_plugin_and_completes() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({"params": {"name": "delete_file"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": {"content": [{"type": "text", "text": "deleted"}]}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let plugins = chain_with(vec![(
        spec("ConfirmDelete", HookType::ToolPreInvoke, 10, PluginMode::Enforce),
        Arc::new(ConfirmDelete),
    )]);
    let fx = fixture(&upstream.uri(), GatewayConfig::default(), Some(plugins)).await;

    // register the deletion tool and associate it
    let delete_tool = fx
        .store
        .create_tool(
            ToolRecord {
                id: EntityId::generate(),
                gateway_id: Some(fx.gateway.id),
                tenant_id: fx.principal.tenant_id,
                name: "delete_file".into(),
                display_name: None,
                description: None,
                integration_type: IntegrationType::Mcp,
                request_type: RequestType::Streamablehttp,
                url: None,
                mcp_method: Some("delete_file".into()),
                input_schema: json!({"type": "object"}),
                annotations: None,
                tags: vec![],
                enabled: true,
                reachable: true,
                owner_team_id: fx.principal.team_ids[0],
                visibility: Visibility::Public,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                version: 0,
            },
            &fx.principal,
        )
        .await
        .unwrap();

    // session advertising the elicitation capability, with a live writer
    let session = SessionRecord::new(
        EntityId::generate().to_hex(),
        fx.principal.clone(),
        ClientCapabilities {
            elicitation: Some(ElicitationCapabilities),
            ..ClientCapabilities::default()
        },
        TransportKind::StreamableHttp,
    );
    fx.app.sessions().create(session.clone()).await.unwrap();
    let (writer, mut rx) = SessionWriter::channel(session.session_id.clone(), 64);
    fx.app.register_writer(writer);

    // the "client": answer the elicitation request arriving on the stream
    let client_app = fx.app.clone();
    let client_session = session.session_id.clone();
    let client = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let OutboundFrame::Request(request) = frame {
                assert_eq!(request.method, "elicitation/create");
                assert_eq!(
                    request.params.as_ref().unwrap()["message"],
                    "Confirm deletion of /tmp/x"
                );
                let request_id = request.id.to_string();
                client_app
                    .complete_elicitation(
                        &client_session,
                        &request_id,
                        json!({"action": "accept", "data": {"confirm_deletion": true}}),
                    )
                    .await;
                break;
            }
        }
    });

    let mut origin = RequestOrigin::new(TransportKind::StreamableHttp);
    origin.session_id = Some(session.session_id.clone());

    let reply = fx
        .app
        .handle_request(call_request(42, "delete_file", json!({})), &origin)
        .await;
    client.await.unwrap();

    assert_eq!(reply.response.id.0, Some(RequestId::Number(42)));
    let result = reply.response.result().expect("accepted and invoked");
    assert_eq!(result["content"][0]["text"], "deleted");
    let _ = delete_tool;
}

#[tokio::test]
async fn elicitation_without_capability_is_method_not_found() {
    let upstream = MockServer::start().await;
    let plugins = chain_with(vec![(
        spec("ConfirmDelete", HookType::ToolPreInvoke, 10, PluginMode::Enforce),
        Arc::new(ConfirmDelete),
    )]);
    let fx = fixture(&upstream.uri(), GatewayConfig::default(), Some(plugins)).await;

    // session WITHOUT the elicitation capability
    let session = SessionRecord::new(
        EntityId::generate().to_hex(),
        fx.principal.clone(),
        ClientCapabilities::default(),
        TransportKind::StreamableHttp,
    );
    fx.app.sessions().create(session.clone()).await.unwrap();
    let (writer, _rx) = SessionWriter::channel(session.session_id.clone(), 64);
    fx.app.register_writer(writer);

    let mut origin = origin_scoped(&fx.server);
    origin.session_id = Some(session.session_id.clone());

    let reply = fx
        .app
        .handle_request(
            call_request(5, "time-get_system_time", json!({"timezone": "UTC"})),
            &origin,
        )
        .await;
    let error = reply.response.error_payload().expect("capability missing");
    assert_eq!(error.code, -32601);
}

#[tokio::test]
async fn unknown_method_and_malformed_params() {
    let upstream = MockServer::start().await;
    let fx = fixture(&upstream.uri(), GatewayConfig::default(), None).await;

    let reply = fx
        .app
        .handle_request(
            JsonRpcRequest::new(1, "tools/imaginary", None),
            &RequestOrigin::new(TransportKind::StreamableHttp),
        )
        .await;
    assert_eq!(reply.response.error_payload().unwrap().code, -32601);

    let reply = fx
        .app
        .handle_request(
            JsonRpcRequest::new(2, "tools/call", Some(json!({"bogus": true}))),
            &RequestOrigin::new(TransportKind::StreamableHttp),
        )
        .await;
    assert_eq!(reply.response.error_payload().unwrap().code, -32602);
}

#[tokio::test]
async fn tools_list_is_scoped_and_deterministic() {
    let upstream = MockServer::start().await;
    let fx = fixture(&upstream.uri(), GatewayConfig::default(), None).await;

    let list = |origin: RequestOrigin| {
        let app = fx.app.clone();
        async move {
            let reply = app
                .handle_request(JsonRpcRequest::new(1, "tools/list", None), &origin)
                .await;
            reply.response.result().unwrap()["tools"]
                .as_array()
                .unwrap()
                .iter()
                .map(|t| t["name"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        }
    };

    let scoped = list(origin_scoped(&fx.server)).await;
    assert_eq!(scoped, vec!["time-get_system_time".to_string()]);

    let scoped_again = list(origin_scoped(&fx.server)).await;
    assert_eq!(scoped, scoped_again);

    let unscoped = list(RequestOrigin::new(TransportKind::StreamableHttp)).await;
    assert_eq!(unscoped, scoped);
}
