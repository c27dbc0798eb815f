//! # MCP Gateway Registry
//!
//! The persistent, concurrency-safe store of everything the gateway
//! federates: upstream gateways, tools, resources, prompts, virtual
//! servers, plus the append-only audit and metric logs and the leader
//! lock used by background workers.
//!
//! Every read and mutation is checked against the caller's [`Principal`]
//! under the ownership/visibility model: `private` entities are readable
//! by the owning team only, `team` by team members, `public` by any
//! authenticated principal of the tenant.
//!
//! The shipped backend is the in-memory engine ([`InMemoryStore`]);
//! `DATABASE_URL` selects the backend and unknown schemes abort startup.

mod entities;
mod error;
mod ids;
mod memory;
mod principal;
mod store;

pub use entities::{
    AuditRecord, AuthType, GatewayRecord, GatewayTransport, IntegrationType, MetricEvent,
    MetricStatus, PromptArgumentSpec, PromptRecord, RequestType, ResourceRecord, ToolRecord,
    VirtualServerRecord, canonicalize_endpoint, normalize_tool_name,
};
pub use error::{RegistryError, RegistryResult};
pub use ids::EntityId;
pub use memory::InMemoryStore;
pub use principal::{Principal, Visibility};
pub use store::{
    DEFAULT_PAGE_SIZE, GatewayPatch, ListFilter, MAX_PAGE_SIZE, Page, PromptPatch, RegistryStore,
    ResourcePatch, SyncOutcome, ToolPatch, VirtualServerPatch,
};
