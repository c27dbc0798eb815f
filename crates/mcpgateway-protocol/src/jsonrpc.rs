//! JSON-RPC 2.0 envelope.
//!
//! A strict implementation of the JSON-RPC 2.0 framing rules the gateway
//! relies on: the version tag must be exactly `"2.0"`, a response carries
//! either `result` or `error` (never both), and a message without an `id`
//! is a notification and must never be answered.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// JSON-RPC version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC version tag. Serializes as the literal `"2.0"` and rejects
/// anything else on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "Invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// Request identifier: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier
    String(String),
    /// Numeric identifier
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// JSON-RPC request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Request method name
    pub method: String,
    /// Request parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request identifier
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Create a new request
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// JSON-RPC notification message (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Notification method name
    pub method: String,
    /// Notification parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// Response payload - mutual exclusion of result and error is encoded in
/// the type, not left to convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    /// Successful response with result
    Success {
        /// Response result
        result: Value,
    },
    /// Error response
    Error {
        /// Response error
        error: JsonRpcError,
    },
}

/// Response ID - parse errors are answered with a null id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    /// Response ID echoing a request
    pub fn from_request(id: RequestId) -> Self {
        Self(Some(id))
    }

    /// Null response ID (parse errors only)
    pub fn null() -> Self {
        Self(None)
    }
}

/// JSON-RPC response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Response payload (either result or error, never both)
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    /// Request identifier being answered
    pub id: ResponseId,
}

impl JsonRpcResponse {
    /// Build a success response echoing the request id
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Success { result },
            id: ResponseId::from_request(id),
        }
    }

    /// Build an error response echoing the request id
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId::from_request(id),
        }
    }

    /// Build a parse-error response with a null id
    pub fn parse_error(error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId::null(),
        }
    }

    /// The result value, if this is a success response
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            JsonRpcResponsePayload::Success { result } => Some(result),
            JsonRpcResponsePayload::Error { .. } => None,
        }
    }

    /// The error, if this is an error response
    pub fn error_payload(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            JsonRpcResponsePayload::Error { error } => Some(error),
            JsonRpcResponsePayload::Success { .. } => None,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create an error with no attached data
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data to the error
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Method not found / capability missing / feature disabled
    pub fn method_not_found(method: &str) -> Self {
        Self::new(error_codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    /// Invalid params with a short detail string
    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, detail)
    }

    /// Internal error
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, detail)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// Standard and gateway-defined JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method does not exist, capability missing, or feature disabled
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server-defined: timeout, too-many-elicitations, upstream unavailable,
    /// plugin violation. Details travel in `error.data`.
    pub const SERVER_ERROR: i32 = -32000;
}

/// Any inbound JSON-RPC message.
///
/// Deserialization order matters: a request is tried before a notification
/// so that messages carrying an `id` never parse as notifications, and a
/// response is recognized by the presence of `result`/`error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A request expecting a response
    Request(JsonRpcRequest),
    /// A response to an earlier request
    Response(JsonRpcResponse),
    /// A fire-and-forget notification
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// Parse a message from raw JSON text.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error when the text is not a valid
    /// JSON-RPC message of any kind.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn version_roundtrip_rejects_wrong_tag() {
        let ok: Result<JsonRpcVersion, _> = serde_json::from_value(json!("2.0"));
        assert!(ok.is_ok());
        let bad: Result<JsonRpcVersion, _> = serde_json::from_value(json!("1.0"));
        assert!(bad.is_err());
    }

    #[test]
    fn request_roundtrip() {
        let req = JsonRpcRequest::new(7, "tools/call", Some(json!({"name": "t"})));
        let text = serde_json::to_string(&req).unwrap();
        let back: JsonRpcRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back.method, "tools/call");
        assert_eq!(back.id, RequestId::Number(7));
    }

    #[test]
    fn response_excludes_error_on_success() {
        let resp = JsonRpcResponse::success(RequestId::Number(1), json!({"ok": true}));
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("result").is_some());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn parse_error_has_null_id() {
        let resp = JsonRpcResponse::parse_error(JsonRpcError::new(
            error_codes::PARSE_ERROR,
            "parse error",
        ));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["id"], serde_json::Value::Null);
    }

    #[test]
    fn message_with_id_is_request_not_notification() {
        let msg = JsonRpcMessage::from_json(r#"{"jsonrpc":"2.0","method":"ping","id":3}"#).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Request(_)));

        let msg = JsonRpcMessage::from_json(r#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification(_)));
    }

    #[test]
    fn response_message_recognized() {
        let msg =
            JsonRpcMessage::from_json(r#"{"jsonrpc":"2.0","result":{"x":1},"id":"abc"}"#).unwrap();
        match msg {
            JsonRpcMessage::Response(resp) => {
                assert_eq!(resp.result().unwrap()["x"], 1);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn error_data_roundtrip() {
        let err = JsonRpcError::new(error_codes::SERVER_ERROR, "Plugin violation")
            .with_data(json!({"plugin": "PIIFilterPlugin", "code": "CONTENT_BLOCKED"}));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["data"]["plugin"], "PIIFilterPlugin");
    }
}
