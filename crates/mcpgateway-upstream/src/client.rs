//! Long-lived client for one upstream gateway.
//!
//! Speaks MCP streamable HTTP: requests go out as POSTs, responses come
//! back as immediate JSON or as an SSE stream that is drained until the
//! matching response arrives. The client owns the upstream's circuit
//! breaker and in-flight semaphore.

use crate::breaker::CircuitBreaker;
use crate::retry::backoff_delay;
use crate::{UpstreamError, UpstreamResult};
use futures::StreamExt;
use mcpgateway_config::UpstreamSettings;
use mcpgateway_plugins::{HeaderSet, PluginError, PluginRpc};
use mcpgateway_protocol::jsonrpc::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use mcpgateway_protocol::types::{
    CallToolResult, GetPromptResult, InitializeResult, ListPromptsResult, ListResourcesResult,
    ListToolsResult, ReadResourceResult,
};
use mcpgateway_protocol::{PROTOCOL_VERSION, methods};
use mcpgateway_registry::GatewayRecord;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

/// A long-lived MCP client bound to one upstream gateway.
pub struct UpstreamClient {
    gateway: GatewayRecord,
    http: reqwest::Client,
    semaphore: Semaphore,
    breaker: CircuitBreaker,
    settings: UpstreamSettings,
    request_timeout: Duration,
    session_id: RwLock<Option<String>>,
    next_id: AtomicI64,
}

impl UpstreamClient {
    /// Build a client for a gateway. The gateway's custom CA, if any, is
    /// loaded into the TLS verifier.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Client` when the CA bundle is invalid or
    /// the HTTP client cannot be constructed.
    pub fn connect(
        gateway: GatewayRecord,
        settings: UpstreamSettings,
        request_timeout: Duration,
    ) -> UpstreamResult<Self> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_idle_timeout(settings.idle_recycle)
            .connect_timeout(Duration::from_secs(10));
        if let Some(pem) = &gateway.ca_certificate {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| UpstreamError::Client(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;
        Ok(Self {
            semaphore: Semaphore::new(settings.max_in_flight),
            breaker: CircuitBreaker::new(settings.breaker_threshold, settings.breaker_open_for),
            gateway,
            http,
            settings,
            request_timeout,
            session_id: RwLock::new(None),
            next_id: AtomicI64::new(1),
        })
    }

    /// The gateway this client serves
    pub fn gateway(&self) -> &GatewayRecord {
        &self.gateway
    }

    /// Current breaker state
    pub fn circuit_state(&self) -> crate::CircuitState {
        self.breaker.state()
    }

    /// Perform the MCP handshake and remember the upstream session.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` when the upstream is unreachable or rejects
    /// the handshake.
    pub async fn initialize(&self, headers: &HeaderSet) -> UpstreamResult<InitializeResult> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "mcpgateway", "version": env!("CARGO_PKG_VERSION")},
        });
        let result = self
            .request(methods::INITIALIZE, Some(params), headers, true)
            .await?;
        let initialized: InitializeResult =
            serde_json::from_value(result).map_err(|e| UpstreamError::Protocol(e.to_string()))?;
        // best-effort: the upstream may not require the notification
        if let Err(error) = self
            .notify(methods::INITIALIZED, None, headers)
            .await
        {
            debug!(gateway = %self.gateway.name, %error, "initialized notification failed");
        }
        Ok(initialized)
    }

    /// Liveness probe used by the health checker.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` when the upstream does not answer the ping.
    pub async fn ping(&self, headers: &HeaderSet) -> UpstreamResult<()> {
        self.request(methods::PING, None, headers, true).await?;
        Ok(())
    }

    /// `tools/list` on the upstream.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` on transport or protocol failure.
    pub async fn list_tools(&self, headers: &HeaderSet) -> UpstreamResult<ListToolsResult> {
        let result = self
            .request(methods::TOOLS_LIST, None, headers, true)
            .await?;
        serde_json::from_value(result).map_err(|e| UpstreamError::Protocol(e.to_string()))
    }

    /// `resources/list` on the upstream.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` on transport or protocol failure.
    pub async fn list_resources(&self, headers: &HeaderSet) -> UpstreamResult<ListResourcesResult> {
        let result = self
            .request(methods::RESOURCES_LIST, None, headers, true)
            .await?;
        serde_json::from_value(result).map_err(|e| UpstreamError::Protocol(e.to_string()))
    }

    /// `prompts/list` on the upstream.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` on transport or protocol failure.
    pub async fn list_prompts(&self, headers: &HeaderSet) -> UpstreamResult<ListPromptsResult> {
        let result = self
            .request(methods::PROMPTS_LIST, None, headers, true)
            .await?;
        serde_json::from_value(result).map_err(|e| UpstreamError::Protocol(e.to_string()))
    }

    /// Invoke a tool. Not idempotent: retried only when the transport
    /// failed before any bytes were written.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` on transport, protocol, or upstream RPC
    /// failure.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
        headers: &HeaderSet,
    ) -> UpstreamResult<CallToolResult> {
        let params = json!({"name": name, "arguments": arguments});
        let result = self
            .request(methods::TOOLS_CALL, Some(params), headers, false)
            .await?;
        serde_json::from_value(result).map_err(|e| UpstreamError::Protocol(e.to_string()))
    }

    /// Dereference a resource.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` on transport or protocol failure.
    pub async fn read_resource(
        &self,
        uri: &str,
        headers: &HeaderSet,
    ) -> UpstreamResult<ReadResourceResult> {
        let params = json!({"uri": uri});
        let result = self
            .request(methods::RESOURCES_READ, Some(params), headers, true)
            .await?;
        serde_json::from_value(result).map_err(|e| UpstreamError::Protocol(e.to_string()))
    }

    /// Render a prompt on the upstream.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` on transport or protocol failure.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
        headers: &HeaderSet,
    ) -> UpstreamResult<GetPromptResult> {
        let params = json!({"name": name, "arguments": arguments});
        let result = self
            .request(methods::PROMPTS_GET, Some(params), headers, true)
            .await?;
        serde_json::from_value(result).map_err(|e| UpstreamError::Protocol(e.to_string()))
    }

    /// One JSON-RPC request with breaker, in-flight cap, retry and
    /// deadline applied.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Unavailable` when the circuit is open or
    /// the in-flight cap is reached; other variants per the failure.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        headers: &HeaderSet,
        idempotent: bool,
    ) -> UpstreamResult<Value> {
        self.breaker.check()?;
        let _permit = self
            .semaphore
            .try_acquire()
            .map_err(|_| UpstreamError::Unavailable("upstream in-flight cap reached".into()))?;

        let max_attempts = if idempotent {
            self.settings.retry_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(
                self.request_timeout,
                self.send_once(method, params.clone(), headers),
            )
            .await
            .unwrap_or(Err(UpstreamError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            }));

            match result {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(error @ UpstreamError::Rpc { .. }) => {
                    // the upstream answered: reachable, not a breaker event
                    self.breaker.record_success();
                    return Err(error);
                }
                Err(error) => {
                    self.breaker.record_failure();
                    let may_retry = attempt + 1 < max_attempts && error.retryable_read()
                        || !idempotent && error.retry_safe() && attempt == 0;
                    if !may_retry {
                        return Err(error);
                    }
                    let delay = backoff_delay(
                        attempt,
                        self.settings.retry_base,
                        self.settings.retry_cap,
                    );
                    warn!(
                        gateway = %self.gateway.name,
                        %method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying upstream call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    self.breaker.check()?;
                }
            }
        }
    }

    /// Fire a notification (no response expected).
    async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
        headers: &HeaderSet,
    ) -> UpstreamResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        let body = serde_json::to_vec(&notification)
            .map_err(|e| UpstreamError::Protocol(e.to_string()))?;
        let response = self
            .build_post(headers)
            .await
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(UpstreamError::Status {
                status: response.status().as_u16(),
            })
        }
    }

    async fn build_post(&self, headers: &HeaderSet) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(&self.gateway.url);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(session) = self.session_id.read().await.as_deref() {
            builder = builder.header("Mcp-Session-Id", session);
        }
        builder
    }

    async fn send_once(
        &self,
        method: &str,
        params: Option<Value>,
        headers: &HeaderSet,
    ) -> UpstreamResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let body =
            serde_json::to_vec(&request).map_err(|e| UpstreamError::Protocol(e.to_string()))?;

        let response = self
            .build_post(headers)
            .await
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if let Some(session) = response
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(session.to_string());
        }

        let status = response.status();
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(Value::Null);
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            self.read_sse_response(response, id).await
        } else {
            let bytes = response.bytes().await.map_err(map_reqwest_error)?;
            let parsed: JsonRpcResponse = serde_json::from_slice(&bytes)
                .map_err(|e| UpstreamError::Protocol(e.to_string()))?;
            unwrap_response(parsed)
        }
    }

    /// Drain a POST's SSE response stream until the event answering our
    /// request id arrives.
    async fn read_sse_response(
        &self,
        response: reqwest::Response,
        id: i64,
    ) -> UpstreamResult<Value> {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find("\n\n") {
                let event = buffer[..pos].to_string();
                buffer.drain(..pos + 2);
                let data: String = event
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect::<Vec<_>>()
                    .join("\n");
                if data.is_empty() {
                    continue;
                }
                let Ok(parsed) = serde_json::from_str::<JsonRpcResponse>(&data) else {
                    continue; // interleaved notification or keepalive
                };
                let matches = parsed
                    .id
                    .0
                    .as_ref()
                    .is_some_and(|rid| *rid == RequestId::Number(id));
                if matches {
                    return unwrap_response(parsed);
                }
            }
        }
        Err(UpstreamError::Protocol(
            "SSE stream ended without a response".into(),
        ))
    }
}

fn unwrap_response(response: JsonRpcResponse) -> UpstreamResult<Value> {
    if let Some(error) = response.error_payload() {
        return Err(UpstreamError::Rpc {
            code: error.code,
            message: error.message.clone(),
        });
    }
    Ok(response.result().cloned().unwrap_or(Value::Null))
}

fn map_reqwest_error(error: reqwest::Error) -> UpstreamError {
    if error.is_connect() || error.is_builder() {
        UpstreamError::connect(error.to_string())
    } else if error.is_timeout() {
        UpstreamError::Timeout { timeout_ms: 0 }
    } else {
        UpstreamError::io(error.to_string())
    }
}

/// [`PluginRpc`] backend letting external plugins be reached through the
/// same upstream machinery.
pub struct UpstreamRpc {
    client: Arc<UpstreamClient>,
}

impl UpstreamRpc {
    /// Wrap an upstream client as a plugin RPC seam
    pub fn new(client: Arc<UpstreamClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl PluginRpc for UpstreamRpc {
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, PluginError> {
        let params = json!({"name": tool, "arguments": arguments});
        let result = self
            .client
            .request(methods::TOOLS_CALL, Some(params), &HeaderSet::new(), false)
            .await
            .map_err(|e| PluginError::transport(tool, e.to_string()))?;
        // external plugins answer in structuredContent when present
        let call: CallToolResult = serde_json::from_value(result.clone()).unwrap_or(CallToolResult {
            content: vec![],
            is_error: None,
            structured_content: Some(result),
        });
        Ok(call.structured_content.unwrap_or(Value::Null))
    }

    async fn list_tools(&self) -> Result<Vec<String>, PluginError> {
        let listed = self
            .client
            .list_tools(&HeaderSet::new())
            .await
            .map_err(|e| PluginError::transport("tools/list", e.to_string()))?;
        Ok(listed.tools.into_iter().map(|t| t.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mcpgateway_registry::{AuthType, EntityId, GatewayTransport, Visibility};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(url: &str) -> GatewayRecord {
        GatewayRecord {
            id: EntityId::generate(),
            tenant_id: EntityId::generate(),
            name: "test-upstream".into(),
            slug: "test-upstream".into(),
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
            visibility: Visibility::Team,
            version: 0,
        }
    }

    fn fast_settings() -> UpstreamSettings {
        UpstreamSettings {
            retry_base: Duration::from_millis(1),
            retry_cap: Duration::from_millis(5),
            ..UpstreamSettings::default()
        }
    }

    fn rpc_result(id: u64, result: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "result": result})
    }

    #[tokio::test]
    async fn call_tool_returns_upstream_payload_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(
                1,
                json!({"content": [{"type": "text", "text": "2025-01-01T00:00:00Z"}]}),
            )))
            .mount(&server)
            .await;

        let client = UpstreamClient::connect(
            gateway(&server.uri()),
            fast_settings(),
            Duration::from_secs(5),
        )
        .unwrap();
        let result = client
            .call_tool("get_system_time", HashMap::new(), &HeaderSet::new())
            .await
            .unwrap();
        assert_eq!(result.content.len(), 1);
    }

    #[tokio::test]
    async fn idempotent_read_retries_on_503() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(rpc_result(3, json!({"tools": []}))),
            )
            .mount(&server)
            .await;

        let client = UpstreamClient::connect(
            gateway(&server.uri()),
            fast_settings(),
            Duration::from_secs(5),
        )
        .unwrap();
        // ids 1 and 2 fail with 503, id 3 succeeds
        let listed = client.list_tools(&HeaderSet::new()).await.unwrap();
        assert!(listed.tools.is_empty());
    }

    #[tokio::test]
    async fn rpc_error_is_not_a_breaker_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "no such tool"}
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::connect(
            gateway(&server.uri()),
            fast_settings(),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client
            .call_tool("ghost", HashMap::new(), &HeaderSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Rpc { code: -32601, .. }));
        assert_eq!(client.circuit_state(), crate::CircuitState::Closed);
    }

    #[tokio::test]
    async fn circuit_opens_and_rejects_without_dispatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(500))
            .expect(5)
            .mount(&server)
            .await;

        let settings = UpstreamSettings {
            retry_attempts: 1,
            breaker_threshold: 5,
            ..fast_settings()
        };
        let client = UpstreamClient::connect(
            gateway(&server.uri()),
            settings,
            Duration::from_secs(5),
        )
        .unwrap();

        for _ in 0..5 {
            let err = client
                .call_tool("t", HashMap::new(), &HeaderSet::new())
                .await
                .unwrap_err();
            // 500 is not in the retryable-read set for non-idempotent calls
            assert!(matches!(
                err,
                UpstreamError::Status { .. } | UpstreamError::Unavailable(_)
            ));
        }
        assert_eq!(client.circuit_state(), crate::CircuitState::Open);
        let err = client
            .call_tool("t", HashMap::new(), &HeaderSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable(_)));
        // the mock's expect(5) verifies no sixth request was dispatched
    }

    #[tokio::test]
    async fn sse_framed_response_is_parsed() {
        let server = MockServer::start().await;
        let sse_body = format!(
            ": keepalive\n\ndata: {}\n\n",
            rpc_result(1, json!({"tools": [{"name": "a", "inputSchema": {}}]}))
        );
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .mount(&server)
            .await;

        let client = UpstreamClient::connect(
            gateway(&server.uri()),
            fast_settings(),
            Duration::from_secs(5),
        )
        .unwrap();
        let listed = client.list_tools(&HeaderSet::new()).await.unwrap();
        assert_eq!(listed.tools.len(), 1);
        assert_eq!(listed.tools[0].name, "a");
    }

    #[tokio::test]
    async fn session_header_is_echoed_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Mcp-Session-Id", "sess-42")
                    .set_body_json(rpc_result(1, json!({"tools": []}))),
            )
            .mount(&server)
            .await;

        let client = UpstreamClient::connect(
            gateway(&server.uri()),
            fast_settings(),
            Duration::from_secs(5),
        )
        .unwrap();
        client.list_tools(&HeaderSet::new()).await.unwrap();
        assert_eq!(
            client.session_id.read().await.as_deref(),
            Some("sess-42")
        );
    }
}
