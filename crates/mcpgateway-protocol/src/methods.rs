//! MCP method-name constants the dispatcher routes on.

/// Session handshake
pub const INITIALIZE: &str = "initialize";
/// Handshake-complete notification (client to server)
pub const INITIALIZED: &str = "notifications/initialized";
/// Liveness probe
pub const PING: &str = "ping";
/// List tools visible to the caller
pub const TOOLS_LIST: &str = "tools/list";
/// Invoke a tool
pub const TOOLS_CALL: &str = "tools/call";
/// List resources visible to the caller
pub const RESOURCES_LIST: &str = "resources/list";
/// Read a resource by URI
pub const RESOURCES_READ: &str = "resources/read";
/// Subscribe to resource change notifications
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
/// List prompt templates visible to the caller
pub const PROMPTS_LIST: &str = "prompts/list";
/// Render a prompt template
pub const PROMPTS_GET: &str = "prompts/get";
/// Adjust the client-requested log level
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
/// Server-initiated structured user-input request
pub const ELICITATION_CREATE: &str = "elicitation/create";
/// Client-side filesystem roots listing (client to server)
pub const ROOTS_LIST: &str = "roots/list";
