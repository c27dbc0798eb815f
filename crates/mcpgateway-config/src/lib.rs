//! # MCP Gateway Configuration
//!
//! A single immutable [`GatewayConfig`] built at startup from, in order of
//! precedence: process flags, environment variables, an optional config
//! file. Validation is fail-fast: any invalid or missing required option
//! aborts startup with a structured error naming the offending key.
//!
//! Every risky feature is a flag and defaults to off
//! (`ENABLE_HEADER_PASSTHROUGH`, `ENABLE_OVERWRITE_BASE_HEADERS`).

mod env;
mod error;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use settings::{
    CacheBackend, ElicitationSettings, FederationSettings, GatewayConfig, JwtSettings,
    LoggingSettings, PluginSettings, PoolSettings, ServerSettings, StoreBackend, StoreSettings,
    TransportSettings, UpstreamSettings,
};

/// Overrides supplied on the command line; these win over environment and
/// file values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Bind host
    pub host: Option<String>,
    /// Bind port
    pub port: Option<u16>,
    /// Config file path
    pub config_file: Option<std::path::PathBuf>,
}
