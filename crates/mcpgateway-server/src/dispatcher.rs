//! The JSON-RPC dispatcher.
//!
//! Accepts MCP 2025-06-18 messages from any transport, resolves the
//! session and principal, runs the matching plugin chains around each
//! entity handler, and encodes the reply. Every suspension point
//! (store, plugin, upstream, elicitation) carries its own deadline.

use crate::app::Application;
use crate::observability;
use crate::session::{SessionRecord, TransportKind};
use crate::virtual_servers;
use crate::{ServerError, ServerResult};
use mcpgateway_plugins::{
    ChainOutcome, GlobalContext, HeaderSet, HttpForwardingPayload, HookType, PromptPayload,
    RenderedPromptPayload, RequestAttributes, ResourceContentPayload, ResourcePayload,
    ToolCallPayload, ToolResultPayload, merge_hook_headers,
};
use mcpgateway_protocol::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId, error_codes,
};
use mcpgateway_protocol::types::{
    CallToolRequest, CallToolResult, Content, GetPromptRequest, GetPromptResult,
    InitializeRequest, InitializeResult, Implementation, ListPromptsResult, ListResourcesResult,
    ListRootsResult, ListToolsResult, ProtocolVersion, Prompt, PromptArgument, PromptMessage,
    ReadResourceRequest, ReadResourceResult, Resource, ResourceContents, ServerCapabilities,
    SetLevelRequest, Tool,
};
use mcpgateway_protocol::methods;
use mcpgateway_registry::{
    AuditRecord, EntityId, GatewayRecord, IntegrationType, Page, Principal, RequestType,
    ToolRecord, VirtualServerRecord,
};
use mcpgateway_upstream::{HeaderContext, UpstreamError, build_outbound_headers};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Where a request came from: its transport, session binding, virtual
/// server binding, and the client's HTTP headers.
#[derive(Debug, Clone)]
pub struct RequestOrigin {
    /// Session, when the transport carries one
    pub session_id: Option<String>,
    /// Virtual server the URL path bound, if any
    pub virtual_server: Option<EntityId>,
    /// Client request headers (already lowercased in the set)
    pub client_headers: HeaderSet,
    /// Transport kind
    pub transport: TransportKind,
}

impl RequestOrigin {
    /// An unbound origin for a transport
    pub fn new(transport: TransportKind) -> Self {
        Self {
            session_id: None,
            virtual_server: None,
            client_headers: HeaderSet::new(),
            transport,
        }
    }
}

/// A dispatched request's reply.
pub struct RpcReply {
    /// The wire response
    pub response: JsonRpcResponse,
    /// Set when the request created a session (`initialize`)
    pub new_session: Option<SessionRecord>,
}

/// A dispatched request's internal success value.
struct DispatchOk {
    result: Value,
    new_session: Option<SessionRecord>,
    principal: Principal,
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> ServerResult<T> {
    let params = params.unwrap_or(Value::Null);
    // raw serde messages can echo client values; log them, answer generically
    serde_json::from_value(params).map_err(|error| {
        debug!(%error, "parameter decode failed");
        ServerError::InvalidParams("malformed parameters".into())
    })
}

impl Application {
    /// Handle one raw inbound message. Requests produce a reply;
    /// notifications and responses produce none.
    pub async fn handle_text(&self, text: &str, origin: &RequestOrigin) -> Option<RpcReply> {
        match JsonRpcMessage::from_json(text) {
            Ok(JsonRpcMessage::Request(request)) => Some(self.handle_request(request, origin).await),
            Ok(JsonRpcMessage::Notification(notification)) => {
                debug!(method = %notification.method, "notification received");
                None
            }
            Ok(JsonRpcMessage::Response(response)) => {
                // the only server-initiated requests are elicitations
                if let (Some(session_id), Some(RequestId::String(request_id))) =
                    (&origin.session_id, response.id.0.as_ref())
                {
                    let result = response.result().cloned().unwrap_or(Value::Null);
                    self.complete_elicitation(session_id, request_id, result).await;
                }
                None
            }
            Err(_) => {
                // valid JSON that is not a JSON-RPC message is an invalid
                // request; broken JSON is a parse error
                let error = if serde_json::from_str::<Value>(text).is_ok() {
                    JsonRpcError::new(error_codes::INVALID_REQUEST, "Invalid Request")
                } else {
                    JsonRpcError::new(error_codes::PARSE_ERROR, "Parse error")
                };
                Some(RpcReply {
                    response: JsonRpcResponse::parse_error(error),
                    new_session: None,
                })
            }
        }
    }

    /// Dispatch one request.
    pub async fn handle_request(&self, request: JsonRpcRequest, origin: &RequestOrigin) -> RpcReply {
        let started = Instant::now();
        let request_id = origin
            .client_headers
            .get("X-Request-Id")
            .map(str::to_string)
            .unwrap_or_else(|| EntityId::generate().to_hex());
        let method = request.method.clone();
        let wire_id = request.id.clone();

        observability::log_request_body(
            self.config().logging.log_requests,
            self.config().logging.max_size_mb,
            &method,
            request.params.as_ref().unwrap_or(&Value::Null),
        );

        let outcome = self.dispatch(request, origin, &request_id).await;

        let (response, new_session, principal_label, tenant, error_code) = match outcome {
            Ok(dispatched) => {
                let DispatchOk {
                    result,
                    new_session,
                    principal,
                } = dispatched;
                (
                    JsonRpcResponse::success(wire_id, result),
                    new_session,
                    principal.user.clone(),
                    Some(principal.tenant_id),
                    None,
                )
            }
            Err(error) => {
                let code = error.code_label();
                debug!(%error, method, "request failed");
                (
                    JsonRpcResponse::error(wire_id, error.to_jsonrpc()),
                    None,
                    "-".to_string(),
                    None,
                    Some(code),
                )
            }
        };

        observability::record_request(
            &request_id,
            origin.session_id.as_deref(),
            &method,
            origin
                .virtual_server
                .map(|v| format!("/servers/{v}"))
                .as_deref()
                .unwrap_or("/rpc"),
            &principal_label,
            tenant,
            started.elapsed(),
            error_code,
        );

        RpcReply {
            response,
            new_session,
        }
    }

    async fn dispatch(
        &self,
        request: JsonRpcRequest,
        origin: &RequestOrigin,
        request_id: &str,
    ) -> ServerResult<DispatchOk> {
        // session and principal resolution
        let session = match &origin.session_id {
            Some(id) => {
                let record = self.sessions().get(id).await?;
                self.sessions().touch(id).await.ok();
                Some(record)
            }
            None => None,
        };
        let principal = match &session {
            Some(record) => record.principal.clone(),
            None => self
                .authenticator()
                .authenticate(origin.client_headers.get("Authorization"))?,
        };

        // virtual server binding constrains everything below
        let scope = match origin.virtual_server {
            Some(vid) => Some(virtual_servers::resolve(self.store(), vid, &principal).await?),
            None => None,
        };

        let mut ctx = GlobalContext::new(request_id, principal.user.clone(), principal.tenant_id);
        if let Some(server) = &scope {
            ctx = ctx.with_server(server.id);
        }

        let result = match request.method.as_str() {
            methods::INITIALIZE => {
                let params: InitializeRequest = parse_params(request.params)?;
                let record = SessionRecord::new(
                    EntityId::generate().to_hex(),
                    principal.clone(),
                    params.capabilities,
                    origin.transport,
                );
                self.sessions().create(record.clone()).await?;
                let result = InitializeResult {
                    protocol_version: ProtocolVersion::current(),
                    capabilities: ServerCapabilities::gateway(),
                    server_info: Implementation {
                        name: "mcpgateway".into(),
                        version: env!("CARGO_PKG_VERSION").into(),
                        title: Some("MCP Gateway".into()),
                    },
                    instructions: None,
                };
                return Ok(DispatchOk {
                    result: serde_json::to_value(result)
                        .map_err(|e| ServerError::Internal(e.to_string()))?,
                    new_session: Some(record),
                    principal,
                });
            }
            methods::PING => json!({}),
            methods::TOOLS_LIST => {
                let listed = self.list_tools(&principal, scope.as_ref()).await?;
                serde_json::to_value(listed).map_err(|e| ServerError::Internal(e.to_string()))?
            }
            methods::TOOLS_CALL => {
                let params: CallToolRequest = parse_params(request.params)?;
                let result = self
                    .invoke_tool(&principal, session.as_ref(), scope.as_ref(), params, origin, &mut ctx)
                    .await?;
                serde_json::to_value(result).map_err(|e| ServerError::Internal(e.to_string()))?
            }
            methods::RESOURCES_LIST => {
                let resources =
                    virtual_servers::scoped_resources(self.store(), scope.as_ref(), &principal, Page::default())
                        .await?;
                let listed = ListResourcesResult {
                    resources: resources.into_iter().map(resource_view).collect(),
                    next_cursor: None,
                };
                serde_json::to_value(listed).map_err(|e| ServerError::Internal(e.to_string()))?
            }
            methods::RESOURCES_READ => {
                let params: ReadResourceRequest = parse_params(request.params)?;
                let result = self
                    .read_resource(&principal, session.as_ref(), scope.as_ref(), params, origin, &mut ctx)
                    .await?;
                serde_json::to_value(result).map_err(|e| ServerError::Internal(e.to_string()))?
            }
            methods::RESOURCES_SUBSCRIBE => {
                let params: ReadResourceRequest = parse_params(request.params)?;
                // visibility check doubles as an existence check
                self.store()
                    .resource_by_uri(principal.tenant_id, &params.uri, &principal)
                    .await?;
                *self
                    .resource_subscriptions()
                    .entry(params.uri.clone())
                    .or_insert(0) += 1;
                json!({})
            }
            methods::PROMPTS_LIST => {
                let prompts =
                    virtual_servers::scoped_prompts(self.store(), scope.as_ref(), &principal, Page::default())
                        .await?;
                let listed = ListPromptsResult {
                    prompts: prompts.into_iter().map(prompt_view).collect(),
                    next_cursor: None,
                };
                serde_json::to_value(listed).map_err(|e| ServerError::Internal(e.to_string()))?
            }
            methods::PROMPTS_GET => {
                let params: GetPromptRequest = parse_params(request.params)?;
                let result = self
                    .get_prompt(&principal, session.as_ref(), scope.as_ref(), params, origin, &mut ctx)
                    .await?;
                serde_json::to_value(result).map_err(|e| ServerError::Internal(e.to_string()))?
            }
            methods::LOGGING_SET_LEVEL => {
                let params: SetLevelRequest = parse_params(request.params)?;
                let key = origin
                    .session_id
                    .clone()
                    .unwrap_or_else(|| "global".to_string());
                self.log_levels().insert(key, params.level);
                json!({})
            }
            methods::ROOTS_LIST => {
                // the gateway exposes no filesystem roots of its own
                serde_json::to_value(ListRootsResult { roots: vec![] })
                    .map_err(|e| ServerError::Internal(e.to_string()))?
            }
            other => return Err(ServerError::MethodNotFound(other.to_string())),
        };

        Ok(DispatchOk {
            result,
            new_session: None,
            principal,
        })
    }

    /// `tools/list`: native tools plus enabled upstream gateways' cached
    /// tools, visibility filtered, stable-sorted by
    /// `(gateway_name, tool_name)`.
    async fn list_tools(
        &self,
        principal: &Principal,
        scope: Option<&VirtualServerRecord>,
    ) -> ServerResult<ListToolsResult> {
        let mut tools =
            virtual_servers::scoped_tools(self.store(), scope, principal, Page::default()).await?;

        // drop tools of disabled gateways
        let gateways: HashMap<EntityId, GatewayRecord> = self
            .store()
            .all_gateways_system()
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect();
        tools.retain(|tool| match tool.gateway_id {
            Some(gateway_id) => gateways.get(&gateway_id).is_some_and(|g| g.enabled),
            None => true,
        });

        tools.sort_by(|a, b| {
            let ga = a
                .gateway_id
                .and_then(|id| gateways.get(&id))
                .map_or("", |g| g.name.as_str());
            let gb = b
                .gateway_id
                .and_then(|id| gateways.get(&id))
                .map_or("", |g| g.name.as_str());
            ga.cmp(gb).then_with(|| a.name.cmp(&b.name))
        });

        Ok(ListToolsResult {
            tools: tools.into_iter().map(tool_view).collect(),
            next_cursor: None,
        })
    }

    /// Run a plugin chain, looping through elicitation round-trips.
    async fn run_chain<T>(
        &self,
        hook: HookType,
        ctx: &mut GlobalContext,
        attrs: &RequestAttributes<'_>,
        payload: T,
        session: Option<&SessionRecord>,
    ) -> ServerResult<T>
    where
        T: serde::Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        let mut outcome = self.plugins().run(hook, ctx, attrs, payload.clone()).await?;
        loop {
            match outcome {
                ChainOutcome::Continue(value) => return Ok(value),
                ChainOutcome::Blocked(violation) => {
                    return Err(ServerError::Violation(violation));
                }
                ChainOutcome::Elicit { resume, request } => {
                    let Some(session) = session else {
                        return Err(ServerError::CapabilityMissing("elicitation"));
                    };
                    let response = self.elicit(session, request).await?;
                    ctx.elicitation_responses.push(response);
                    outcome = self
                        .plugins()
                        .resume(hook, ctx, attrs, payload.clone(), resume)
                        .await?;
                }
            }
        }
    }

    /// The `tools/call` pipeline: pre-hooks, virtual-to-concrete
    /// resolution, upstream dispatch with forwarding hooks, post-hooks,
    /// metrics and audit.
    async fn invoke_tool(
        &self,
        principal: &Principal,
        session: Option<&SessionRecord>,
        scope: Option<&VirtualServerRecord>,
        params: CallToolRequest,
        origin: &RequestOrigin,
        ctx: &mut GlobalContext,
    ) -> ServerResult<CallToolResult> {
        let started = Instant::now();
        let tool =
            virtual_servers::resolve_tool(self.store(), scope, principal, &params.name).await?;
        let attrs = RequestAttributes {
            tool: Some(&params.name),
            ..RequestAttributes::default()
        };

        let arguments = Self::arguments_or_default(params.arguments);
        validate_against_schema(&tool.input_schema, &json!(arguments))
            .map_err(|_| ServerError::InvalidParams("arguments do not match the tool schema".into()))?;

        let payload = ToolCallPayload {
            name: params.name.clone(),
            arguments,
        };
        let pre = self
            .run_chain(HookType::ToolPreInvoke, ctx, &attrs, payload, session)
            .await;
        let payload = match pre {
            Ok(payload) => payload,
            Err(error) => {
                self.audit_blocked(principal, &ctx.request_id, &tool, &error).await;
                self.record_tool_metric(&tool, principal, ctx, started, Some(error.code_label()))
                    .await;
                return Err(error);
            }
        };

        let invoked = self
            .dispatch_tool(&tool, principal, payload.arguments.clone(), origin, ctx, session)
            .await;
        let result = match invoked {
            Ok(result) => result,
            Err(error) => {
                self.record_tool_metric(&tool, principal, ctx, started, Some(error.code_label()))
                    .await;
                return Err(error);
            }
        };

        // post-hooks run; a violation here still blocks the response
        let result_value =
            serde_json::to_value(&result).map_err(|e| ServerError::Internal(e.to_string()))?;
        let post_payload = ToolResultPayload {
            name: payload.name,
            result: result_value,
        };
        let post = self
            .run_chain(HookType::ToolPostInvoke, ctx, &attrs, post_payload, session)
            .await;
        let final_result = match post {
            Ok(post_payload) => serde_json::from_value(post_payload.result)
                .map_err(|e| ServerError::Internal(e.to_string()))?,
            Err(error) => {
                self.audit_blocked(principal, &ctx.request_id, &tool, &error).await;
                self.record_tool_metric(&tool, principal, ctx, started, Some(error.code_label()))
                    .await;
                return Err(error);
            }
        };

        self.record_tool_metric(&tool, principal, ctx, started, None)
            .await;
        Ok(final_result)
    }

    /// Route a tool call to its concrete backend.
    async fn dispatch_tool(
        &self,
        tool: &ToolRecord,
        principal: &Principal,
        arguments: HashMap<String, Value>,
        origin: &RequestOrigin,
        ctx: &mut GlobalContext,
        session: Option<&SessionRecord>,
    ) -> ServerResult<CallToolResult> {
        match (tool.integration_type, tool.gateway_id) {
            (IntegrationType::Mcp, Some(gateway_id)) => {
                let gateway = self
                    .store()
                    .all_gateways_system()
                    .await?
                    .into_iter()
                    .find(|g| g.id == gateway_id)
                    .ok_or_else(|| {
                        ServerError::Registry(mcpgateway_registry::RegistryError::not_found(
                            "gateway", gateway_id,
                        ))
                    })?;
                let headers = self
                    .outbound_headers(&gateway, origin, ctx, session, tool)
                    .await?;
                let client = self.pool().client_for(&gateway).await?;
                let method = tool
                    .mcp_method
                    .as_deref()
                    .ok_or_else(|| ServerError::Internal("MCP tool without method".into()))?;
                Ok(client.call_tool(method, arguments, &headers).await?)
            }
            (IntegrationType::Rest, _) => {
                self.invoke_rest_tool(tool, principal, arguments, origin, ctx, session)
                    .await
            }
            (IntegrationType::Mcp, None) => Err(ServerError::Internal(
                "native MCP tool has no registered executor".into(),
            )),
        }
    }

    /// Outbound header set: gateway rules, then the pre-forwarding hook
    /// with base-header protection.
    async fn outbound_headers(
        &self,
        gateway: &GatewayRecord,
        origin: &RequestOrigin,
        ctx: &mut GlobalContext,
        session: Option<&SessionRecord>,
        tool: &ToolRecord,
    ) -> ServerResult<HeaderSet> {
        let base = build_outbound_headers(
            gateway,
            &HeaderContext {
                client_headers: origin.client_headers.clone(),
                global_passthrough: self.global_passthrough().await,
                passthrough_enabled: self.config().enable_header_passthrough,
            },
        );
        let attrs = RequestAttributes {
            tool: Some(&tool.name),
            ..RequestAttributes::default()
        };
        let hook_payload = self
            .run_chain(
                HookType::HttpPreForwardingCall,
                ctx,
                &attrs,
                HttpForwardingPayload {
                    headers: base.clone(),
                },
                session,
            )
            .await?;
        Ok(merge_hook_headers(
            &base,
            hook_payload.headers,
            self.config().enable_overwrite_base_headers,
        ))
    }

    /// Invoke a REST tool with the outbound header rules applied.
    async fn invoke_rest_tool(
        &self,
        tool: &ToolRecord,
        _principal: &Principal,
        arguments: HashMap<String, Value>,
        origin: &RequestOrigin,
        ctx: &mut GlobalContext,
        session: Option<&SessionRecord>,
    ) -> ServerResult<CallToolResult> {
        let url = tool
            .url
            .as_deref()
            .ok_or_else(|| ServerError::Internal("REST tool without URL".into()))?;

        // base headers for a REST dispatch: content negotiation plus the
        // global passthrough allowlist
        let mut base = HeaderSet::new();
        base.insert("Content-Type", "application/json");
        base.insert("Accept", "application/json");
        if self.config().enable_header_passthrough {
            for name in self.global_passthrough().await {
                if let Some(value) = origin.client_headers.get(&name) {
                    base.insert(&name, value);
                }
            }
        }
        if let Some(value) = origin.client_headers.get("X-Upstream-Authorization") {
            base.insert("Authorization", value);
        }

        let attrs = RequestAttributes {
            tool: Some(&tool.name),
            ..RequestAttributes::default()
        };
        let hook_payload = self
            .run_chain(
                HookType::HttpPreForwardingCall,
                ctx,
                &attrs,
                HttpForwardingPayload {
                    headers: base.clone(),
                },
                session,
            )
            .await?;
        let headers = merge_hook_headers(
            &base,
            hook_payload.headers,
            self.config().enable_overwrite_base_headers,
        );

        let method = match tool.request_type {
            RequestType::Get => reqwest::Method::GET,
            RequestType::Post | RequestType::Sse | RequestType::Streamablehttp => {
                reqwest::Method::POST
            }
            RequestType::Put => reqwest::Method::PUT,
            RequestType::Patch => reqwest::Method::PATCH,
            RequestType::Delete => reqwest::Method::DELETE,
        };

        let mut request = self.rest_http().request(method.clone(), url);
        for (name, value) in headers.iter() {
            request = request.header(name, value);
        }
        if method != reqwest::Method::GET && method != reqwest::Method::DELETE {
            request = request.json(&arguments);
        }

        let response = tokio::time::timeout(self.config().request_timeout, request.send())
            .await
            .map_err(|_| ServerError::Timeout)?
            .map_err(|e| ServerError::Upstream(UpstreamError::io(e.to_string())))?;

        let status = response.status();
        let response_headers: HeaderSet = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body: Value = response
            .json()
            .await
            .unwrap_or(Value::Null);

        // post-forwarding hook observes the upstream's response headers
        let _ = self
            .run_chain(
                HookType::HttpPostForwardingCall,
                ctx,
                &attrs,
                HttpForwardingPayload {
                    headers: response_headers,
                },
                session,
            )
            .await?;

        if !status.is_success() {
            return Err(ServerError::Upstream(UpstreamError::Status {
                status: status.as_u16(),
            }));
        }

        Ok(CallToolResult {
            content: vec![Content::text(body.to_string())],
            is_error: None,
            structured_content: Some(body),
        })
    }

    /// The `resources/read` pipeline.
    async fn read_resource(
        &self,
        principal: &Principal,
        session: Option<&SessionRecord>,
        scope: Option<&VirtualServerRecord>,
        params: ReadResourceRequest,
        origin: &RequestOrigin,
        ctx: &mut GlobalContext,
    ) -> ServerResult<ReadResourceResult> {
        let started = Instant::now();
        let resource = self
            .store()
            .resource_by_uri(principal.tenant_id, &params.uri, principal)
            .await?;
        if let Some(server) = scope {
            if !server.associated_resources.contains(&resource.id) {
                return Err(ServerError::Registry(
                    mcpgateway_registry::RegistryError::not_found("resource", &params.uri),
                ));
            }
        }

        let attrs = RequestAttributes {
            resource: Some(&params.uri),
            ..RequestAttributes::default()
        };
        let pre = self
            .run_chain(
                HookType::ResourcePreFetch,
                ctx,
                &attrs,
                ResourcePayload {
                    uri: params.uri.clone(),
                },
                session,
            )
            .await?;

        let fetch = async {
            match resource.gateway_id {
                None => {
                    let text = resource.text.clone().unwrap_or_default();
                    Ok(ReadResourceResult {
                        contents: vec![ResourceContents::Text {
                            uri: resource.uri.clone(),
                            mime_type: resource.mime_type.clone(),
                            text,
                        }],
                    })
                }
                Some(gateway_id) => {
                    let gateway = self
                        .store()
                        .all_gateways_system()
                        .await?
                        .into_iter()
                        .find(|g| g.id == gateway_id)
                        .ok_or_else(|| {
                            ServerError::Registry(mcpgateway_registry::RegistryError::not_found(
                                "gateway", gateway_id,
                            ))
                        })?;
                    let headers = build_outbound_headers(
                        &gateway,
                        &HeaderContext {
                            client_headers: origin.client_headers.clone(),
                            global_passthrough: self.global_passthrough().await,
                            passthrough_enabled: self.config().enable_header_passthrough,
                        },
                    );
                    let client = self.pool().client_for(&gateway).await?;
                    Ok(client.read_resource(&pre.uri, &headers).await?)
                }
            }
        };
        // dereferencing never blocks the request beyond resource_timeout
        let fetched: ServerResult<ReadResourceResult> =
            tokio::time::timeout(self.config().resource_timeout, fetch)
                .await
                .map_err(|_| ServerError::Timeout)?;
        let fetched = match fetched {
            Ok(result) => result,
            Err(error) => {
                self.record_entity_metric(resource.id, "resource", principal, ctx, started, Some(error.code_label()))
                    .await;
                return Err(error);
            }
        };

        let contents_value =
            serde_json::to_value(&fetched).map_err(|e| ServerError::Internal(e.to_string()))?;
        let post = self
            .run_chain(
                HookType::ResourcePostFetch,
                ctx,
                &attrs,
                ResourceContentPayload {
                    uri: pre.uri,
                    contents: contents_value,
                },
                session,
            )
            .await?;
        let result = serde_json::from_value(post.contents)
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        self.record_entity_metric(resource.id, "resource", principal, ctx, started, None)
            .await;
        Ok(result)
    }

    /// The `prompts/get` pipeline. Rendering is pure; upstream prompts
    /// are fetched from their gateway.
    async fn get_prompt(
        &self,
        principal: &Principal,
        session: Option<&SessionRecord>,
        scope: Option<&VirtualServerRecord>,
        params: GetPromptRequest,
        origin: &RequestOrigin,
        ctx: &mut GlobalContext,
    ) -> ServerResult<GetPromptResult> {
        let started = Instant::now();
        let prompt = self
            .store()
            .prompt_by_name(principal.tenant_id, &params.name, principal)
            .await?;
        if let Some(server) = scope {
            if !server.associated_prompts.contains(&prompt.id) {
                return Err(ServerError::Registry(
                    mcpgateway_registry::RegistryError::not_found("prompt", &params.name),
                ));
            }
        }

        let attrs = RequestAttributes {
            prompt: Some(&params.name),
            ..RequestAttributes::default()
        };
        let arguments = params.arguments.unwrap_or_default();
        let pre = self
            .run_chain(
                HookType::PromptPreFetch,
                ctx,
                &attrs,
                PromptPayload {
                    name: params.name.clone(),
                    arguments,
                },
                session,
            )
            .await?;

        let (description, rendered) = match prompt.gateway_id {
            None => (prompt.description.clone(), prompt.render(&pre.arguments)?),
            Some(gateway_id) => {
                let gateway = self
                    .store()
                    .all_gateways_system()
                    .await?
                    .into_iter()
                    .find(|g| g.id == gateway_id)
                    .ok_or_else(|| {
                        ServerError::Registry(mcpgateway_registry::RegistryError::not_found(
                            "gateway", gateway_id,
                        ))
                    })?;
                let headers = build_outbound_headers(
                    &gateway,
                    &HeaderContext {
                        client_headers: origin.client_headers.clone(),
                        global_passthrough: self.global_passthrough().await,
                        passthrough_enabled: self.config().enable_header_passthrough,
                    },
                );
                let client = self.pool().client_for(&gateway).await?;
                let remote = prompt.remote_name.as_deref().unwrap_or(&prompt.name);
                let fetched = client.get_prompt(remote, pre.arguments, &headers).await?;
                let text = fetched
                    .messages
                    .iter()
                    .filter_map(|message| match &message.content {
                        Content::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                (fetched.description, text)
            }
        };

        let post = self
            .run_chain(
                HookType::PromptPostFetch,
                ctx,
                &attrs,
                RenderedPromptPayload {
                    name: pre.name,
                    rendered,
                },
                session,
            )
            .await?;

        self.record_entity_metric(prompt.id, "prompt", principal, ctx, started, None)
            .await;
        Ok(GetPromptResult {
            description,
            messages: vec![PromptMessage {
                role: "user".into(),
                content: Content::text(post.rendered),
            }],
        })
    }

    async fn audit_blocked(
        &self,
        principal: &Principal,
        request_id: &str,
        tool: &ToolRecord,
        error: &ServerError,
    ) {
        let record = AuditRecord {
            request_id: request_id.to_string(),
            actor: principal.user.clone(),
            action: "tool.invoke.blocked".into(),
            target_id: Some(tool.id),
            at: chrono::Utc::now(),
            details: json!({"error": error.code_label(), "tool": tool.name}),
        };
        if let Err(error) = self.store().append_audit(record).await {
            warn!(%error, "audit append failed");
        }
    }

    async fn record_tool_metric(
        &self,
        tool: &ToolRecord,
        principal: &Principal,
        ctx: &GlobalContext,
        started: Instant,
        error_code: Option<&str>,
    ) {
        self.record_entity_metric(tool.id, "tool", principal, ctx, started, error_code)
            .await;
    }

    async fn record_entity_metric(
        &self,
        entity_id: EntityId,
        kind: &str,
        principal: &Principal,
        ctx: &GlobalContext,
        started: Instant,
        error_code: Option<&str>,
    ) {
        let event = observability::metric_event(
            entity_id,
            kind,
            started.elapsed(),
            error_code,
            principal.tenant_id,
            &ctx.request_id,
        );
        if let Err(error) = self.store().append_metric(event).await {
            warn!(%error, "metric append failed");
        }
    }
}

/// Validate an instance against a JSON Schema. A schema that itself
/// fails to compile is treated as matching (the registry accepted it).
pub(crate) fn validate_against_schema(schema: &Value, instance: &Value) -> Result<(), ()> {
    match jsonschema::validator_for(schema) {
        Ok(validator) if !validator.is_valid(instance) => Err(()),
        Ok(_) => Ok(()),
        Err(error) => {
            warn!(%error, "uncompilable input schema, skipping validation");
            Ok(())
        }
    }
}

fn tool_view(record: ToolRecord) -> Tool {
    Tool {
        name: record.name,
        title: record.display_name,
        description: record.description,
        input_schema: record.input_schema,
        annotations: record.annotations,
    }
}

fn resource_view(record: mcpgateway_registry::ResourceRecord) -> Resource {
    Resource {
        uri: record.uri,
        name: record.name,
        description: record.description,
        mime_type: record.mime_type,
        size: record.size_hint,
    }
}

fn prompt_view(record: mcpgateway_registry::PromptRecord) -> Prompt {
    Prompt {
        name: record.name,
        description: record.description,
        arguments: Some(
            record
                .arguments
                .into_iter()
                .map(|arg| PromptArgument {
                    name: arg.name,
                    description: arg.description,
                    required: Some(arg.required),
                })
                .collect(),
        ),
    }
}
