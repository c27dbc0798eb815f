//! # MCP Gateway Protocol
//!
//! JSON-RPC 2.0 envelope and the MCP 2025-06-18 wire types the gateway
//! dispatches on. This crate is transport-agnostic: the server, upstream
//! clients, and external plugin adapters all speak these types.
//!
//! ## Layout
//!
//! - [`jsonrpc`] - the JSON-RPC 2.0 envelope: strict version tag,
//!   request/response/notification split, error codes
//! - [`types`] - MCP request and result payloads for the gateway's method
//!   set (initialize, ping, tools, resources, prompts, roots, logging,
//!   elicitation)
//! - [`methods`] - method-name constants

pub mod jsonrpc;
pub mod methods;
pub mod types;

pub use jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponsePayload, JsonRpcVersion, RequestId, ResponseId, error_codes,
};
pub use types::{
    CallToolRequest, CallToolResult, ClientCapabilities, Content, ElicitRequestParams,
    ElicitResult, ElicitationAction, GetPromptRequest, GetPromptResult, Implementation,
    InitializeRequest, InitializeResult, ListPromptsResult, ListResourcesResult, ListRootsResult,
    ListToolsResult, LogLevel, ProtocolVersion, Prompt, PromptArgument, PromptMessage,
    ReadResourceRequest, ReadResourceResult, Resource, ResourceContents, Root,
    ServerCapabilities, SetLevelRequest, Tool,
};

/// The protocol revision this gateway implements.
pub const PROTOCOL_VERSION: &str = "2025-06-18";
