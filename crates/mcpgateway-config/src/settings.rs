//! Gateway configuration settings.
//!
//! All structs deserialize from the optional config file with serde
//! defaults, then environment variables and CLI flags are layered on top.

use crate::env::{parse, parse_bool, parse_list, parse_secs, var};
use crate::{CliOverrides, ConfigError, ConfigResult};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4444
}
fn default_database_url() -> String {
    "memory://".to_string()
}
fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}
fn default_tool_separator() -> String {
    "-".to_string()
}
fn default_passthrough() -> Vec<String> {
    vec!["X-Tenant-Id".to_string(), "X-Trace-Id".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}
fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}
fn default_request_timeout() -> Duration {
    secs(60)
}
fn default_plugin_timeout() -> Duration {
    secs(30)
}
fn default_resource_timeout() -> Duration {
    secs(30)
}
fn default_idle_timeout() -> Duration {
    secs(300)
}
fn default_keepalive() -> Duration {
    secs(30)
}
fn default_health_interval() -> Duration {
    secs(60)
}
fn default_elicitation_timeout() -> Duration {
    secs(60)
}

/// Bind address settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host (`HOST`)
    pub host: String,
    /// Bind port (`PORT`)
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Entity store backend selected by `DATABASE_URL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store, dies with the process
    Memory,
    /// SQLite file store
    Sqlite,
    /// PostgreSQL store
    Postgres,
    /// MySQL store
    Mysql,
}

/// Entity store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Store backend URL (`DATABASE_URL`)
    pub database_url: String,
    /// Connection pool sizing (`DB_POOL_*`)
    pub pool: PoolSettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool: PoolSettings::default(),
        }
    }
}

impl StoreSettings {
    /// Resolve the backend from the URL scheme.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming `DATABASE_URL` when the scheme
    /// is not one of `memory`, `sqlite`, `postgres(ql)`, `mysql`.
    pub fn backend(&self) -> ConfigResult<StoreBackend> {
        let scheme = self
            .database_url
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .unwrap_or(self.database_url.as_str());
        match scheme.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "mysql" => Ok(StoreBackend::Mysql),
            other => Err(ConfigError::invalid(
                "DATABASE_URL",
                format!("unsupported scheme {other:?}"),
            )),
        }
    }
}

/// Store connection pool sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Base pool size (`DB_POOL_SIZE`)
    pub size: u32,
    /// Burst connections above the base size (`DB_MAX_OVERFLOW`)
    pub max_overflow: u32,
    /// Seconds to wait for a connection before `Unavailable` (`DB_POOL_TIMEOUT`)
    pub timeout: Duration,
    /// Seconds after which idle connections are recycled (`DB_POOL_RECYCLE`)
    pub recycle: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: 200,
            max_overflow: 10,
            timeout: secs(30),
            recycle: secs(3600),
        }
    }
}

/// Session registry / plugin context cache backend (`CACHE_BACKEND`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process maps
    Memory,
    /// Shared Redis; requires `REDIS_URL`
    Redis,
    /// Delegate to the entity store
    Database,
}

/// Token validation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    /// HMAC/RSA secret or PEM (`JWT_SECRET`)
    pub secret: Option<String>,
    /// Signing algorithm (`JWT_ALGORITHM`)
    pub algorithm: String,
    /// Reject tokens without an `exp` claim (`REQUIRE_TOKEN_EXPIRATION`)
    pub require_token_expiration: bool,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: None,
            algorithm: default_jwt_algorithm(),
            require_token_expiration: false,
        }
    }
}

/// Federation and discovery settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FederationSettings {
    /// Master switch (`MCPGATEWAY_ENABLE_FEDERATION`)
    pub enabled: bool,
    /// mDNS announce/browse (`MCPGATEWAY_ENABLE_MDNS_DISCOVERY`)
    pub mdns_discovery: bool,
    /// Separator for federated tool names (`GATEWAY_TOOL_NAME_SEPARATOR`)
    pub tool_name_separator: String,
    /// Peer health check cadence (`HEALTH_CHECK_INTERVAL`)
    pub health_check_interval: Duration,
    /// Leader lock TTL
    pub leader_ttl: Duration,
    /// Leader lock renewal cadence
    pub leader_renewal: Duration,
}

impl Default for FederationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mdns_discovery: false,
            tool_name_separator: default_tool_separator(),
            health_check_interval: default_health_interval(),
            leader_ttl: secs(90),
            leader_renewal: secs(30),
        }
    }
}

/// Plugin framework settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Master switch (`PLUGINS_ENABLED`)
    pub enabled: bool,
    /// Plugin chain definition file (`PLUGIN_CONFIG_FILE`)
    pub config_file: Option<PathBuf>,
    /// Per-invocation deadline (`PLUGIN_TIMEOUT`)
    pub timeout: Duration,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            config_file: None,
            timeout: default_plugin_timeout(),
        }
    }
}

/// Elicitation guard rails
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElicitationSettings {
    /// Feature switch (`MCPGATEWAY_ELICITATION_ENABLED`)
    pub enabled: bool,
    /// Per-elicitation deadline (`MCPGATEWAY_ELICITATION_TIMEOUT`)
    pub timeout: Duration,
    /// Max pending elicitations per session (`MCPGATEWAY_ELICITATION_MAX_CONCURRENT`)
    pub max_concurrent: usize,
}

impl Default for ElicitationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: default_elicitation_timeout(),
            max_concurrent: 10,
        }
    }
}

/// Transport-layer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Heartbeat cadence on SSE / streamable HTTP (`SSE_KEEPALIVE_INTERVAL`)
    pub sse_keepalive_interval: Duration,
    /// Per-session bounded send queue length
    pub session_queue_depth: usize,
    /// Idle timeout before a session is closed
    pub session_idle_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            sse_keepalive_interval: default_keepalive(),
            session_queue_depth: 1024,
            session_idle_timeout: default_idle_timeout(),
        }
    }
}

/// Upstream client pool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Per-upstream concurrent in-flight cap
    pub max_in_flight: usize,
    /// Idle HTTP connections closed after this long
    pub idle_recycle: Duration,
    /// Retry base delay
    pub retry_base: Duration,
    /// Retry delay cap
    pub retry_cap: Duration,
    /// Max retry attempts for idempotent reads
    pub retry_attempts: u32,
    /// Consecutive failures before the circuit opens
    pub breaker_threshold: u32,
    /// How long an open circuit rejects before half-open
    pub breaker_open_for: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            idle_recycle: secs(3600),
            retry_base: Duration::from_millis(250),
            retry_cap: secs(8),
            retry_attempts: 5,
            breaker_threshold: 5,
            breaker_open_for: secs(30),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log request bodies (`LOG_REQUESTS`)
    pub log_requests: bool,
    /// Minimum level (`LOG_LEVEL`)
    pub level: String,
    /// Also log to a rolling file (`LOG_TO_FILE`)
    pub to_file: bool,
    /// Truncate logged bodies above this size (`LOG_MAX_SIZE_MB`)
    pub max_size_mb: u64,
    /// Directory for file logs
    pub file_dir: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_requests: false,
            level: default_log_level(),
            to_file: false,
            max_size_mb: 1,
            file_dir: PathBuf::from("logs"),
        }
    }
}

/// The complete, immutable gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address
    pub server: ServerSettings,
    /// Entity store
    pub store: StoreSettings,
    /// Session registry backend (`CACHE_BACKEND`)
    pub cache_backend: CacheBackend,
    /// Redis URL when `cache_backend = redis` (`REDIS_URL`)
    pub redis_url: Option<String>,
    /// Token validation
    pub jwt: JwtSettings,
    /// Federation & discovery
    pub federation: FederationSettings,
    /// Plugin framework
    pub plugins: PluginSettings,
    /// Elicitation guards
    pub elicitation: ElicitationSettings,
    /// Transport layer
    pub transport: TransportSettings,
    /// Upstream client pool
    pub upstream: UpstreamSettings,
    /// Logging
    pub logging: LoggingSettings,
    /// Forward allowlisted client headers upstream (`ENABLE_HEADER_PASSTHROUGH`)
    pub enable_header_passthrough: bool,
    /// Let plugins replace base headers (`ENABLE_OVERWRITE_BASE_HEADERS`)
    pub enable_overwrite_base_headers: bool,
    /// Global passthrough allowlist (`DEFAULT_PASSTHROUGH_HEADERS`)
    pub default_passthrough_headers: Vec<String>,
    /// Expose A2A agents in tool listings (`MCPGATEWAY_A2A_ENABLED`)
    pub a2a_enabled: bool,
    /// HTTP response compression (`COMPRESSION_ENABLED`)
    pub compression_enabled: bool,
    /// Enclosing per-request deadline (`REQUEST_TIMEOUT`)
    pub request_timeout: Duration,
    /// Resource dereference deadline (`RESOURCE_TIMEOUT`)
    pub resource_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            store: StoreSettings::default(),
            cache_backend: CacheBackend::Memory,
            redis_url: None,
            jwt: JwtSettings::default(),
            federation: FederationSettings::default(),
            plugins: PluginSettings::default(),
            elicitation: ElicitationSettings::default(),
            transport: TransportSettings::default(),
            upstream: UpstreamSettings::default(),
            logging: LoggingSettings::default(),
            enable_header_passthrough: false,
            enable_overwrite_base_headers: false,
            default_passthrough_headers: default_passthrough(),
            a2a_enabled: true,
            compression_enabled: true,
            request_timeout: default_request_timeout(),
            resource_timeout: default_resource_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Build the configuration: defaults, then file, then environment, then
    /// CLI overrides, then validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the offending key when any layer fails
    /// to parse or the merged result violates a domain rule.
    pub fn load(overrides: &CliOverrides) -> ConfigResult<Self> {
        let file = overrides
            .config_file
            .clone()
            .or_else(|| var("MCPGATEWAY_CONFIG").map(PathBuf::from));
        let mut cfg = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env()?;
        if let Some(host) = &overrides.host {
            cfg.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            cfg.server.port = port;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load the file layer only.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::File` when the file is unreadable or does not
    /// deserialize into the settings tree.
    pub fn from_file(path: &std::path::Path) -> ConfigResult<Self> {
        let built = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .build()?;
        Ok(built.try_deserialize()?)
    }

    /// Apply flat environment variable overrides.
    fn apply_env(&mut self) -> ConfigResult<()> {
        if let Some(host) = var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse::<u16>("PORT")? {
            self.server.port = port;
        }
        if let Some(url) = var("DATABASE_URL") {
            self.store.database_url = url;
        }
        if let Some(size) = parse::<u32>("DB_POOL_SIZE")? {
            self.store.pool.size = size;
        }
        if let Some(overflow) = parse::<u32>("DB_MAX_OVERFLOW")? {
            self.store.pool.max_overflow = overflow;
        }
        if let Some(timeout) = parse_secs("DB_POOL_TIMEOUT")? {
            self.store.pool.timeout = timeout;
        }
        if let Some(recycle) = parse_secs("DB_POOL_RECYCLE")? {
            self.store.pool.recycle = recycle;
        }
        if let Some(backend) = var("CACHE_BACKEND") {
            self.cache_backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => CacheBackend::Memory,
                "redis" => CacheBackend::Redis,
                "database" => CacheBackend::Database,
                other => {
                    return Err(ConfigError::invalid(
                        "CACHE_BACKEND",
                        format!("expected memory|redis|database, got {other:?}"),
                    ));
                }
            };
        }
        if let Some(url) = var("REDIS_URL") {
            self.redis_url = Some(url);
        }
        if let Some(secret) = var("JWT_SECRET") {
            self.jwt.secret = Some(secret);
        }
        if let Some(alg) = var("JWT_ALGORITHM") {
            self.jwt.algorithm = alg;
        }
        if let Some(required) = parse_bool("REQUIRE_TOKEN_EXPIRATION")? {
            self.jwt.require_token_expiration = required;
        }
        if let Some(enabled) = parse_bool("MCPGATEWAY_ENABLE_FEDERATION")? {
            self.federation.enabled = enabled;
        }
        if let Some(enabled) = parse_bool("MCPGATEWAY_ENABLE_MDNS_DISCOVERY")? {
            self.federation.mdns_discovery = enabled;
        }
        if let Some(separator) = var("GATEWAY_TOOL_NAME_SEPARATOR") {
            self.federation.tool_name_separator = separator;
        }
        if let Some(interval) = parse_secs("HEALTH_CHECK_INTERVAL")? {
            self.federation.health_check_interval = interval;
        }
        if let Some(headers) = parse_list("DEFAULT_PASSTHROUGH_HEADERS") {
            self.default_passthrough_headers = headers;
        }
        if let Some(enabled) = parse_bool("ENABLE_HEADER_PASSTHROUGH")? {
            self.enable_header_passthrough = enabled;
        }
        if let Some(enabled) = parse_bool("ENABLE_OVERWRITE_BASE_HEADERS")? {
            self.enable_overwrite_base_headers = enabled;
        }
        if let Some(enabled) = parse_bool("MCPGATEWAY_A2A_ENABLED")? {
            self.a2a_enabled = enabled;
        }
        if let Some(enabled) = parse_bool("MCPGATEWAY_ELICITATION_ENABLED")? {
            self.elicitation.enabled = enabled;
        }
        if let Some(timeout) = parse_secs("MCPGATEWAY_ELICITATION_TIMEOUT")? {
            self.elicitation.timeout = timeout;
        }
        if let Some(max) = parse::<usize>("MCPGATEWAY_ELICITATION_MAX_CONCURRENT")? {
            self.elicitation.max_concurrent = max;
        }
        if let Some(enabled) = parse_bool("COMPRESSION_ENABLED")? {
            self.compression_enabled = enabled;
        }
        if let Some(interval) = parse_secs("SSE_KEEPALIVE_INTERVAL")? {
            self.transport.sse_keepalive_interval = interval;
        }
        if let Some(timeout) = parse_secs("SESSION_IDLE_TIMEOUT")? {
            self.transport.session_idle_timeout = timeout;
        }
        if let Some(enabled) = parse_bool("PLUGINS_ENABLED")? {
            self.plugins.enabled = enabled;
        }
        if let Some(file) = var("PLUGIN_CONFIG_FILE") {
            self.plugins.config_file = Some(PathBuf::from(file));
        }
        if let Some(timeout) = parse_secs("PLUGIN_TIMEOUT")? {
            self.plugins.timeout = timeout;
        }
        if let Some(timeout) = parse_secs("REQUEST_TIMEOUT")? {
            self.request_timeout = timeout;
        }
        if let Some(timeout) = parse_secs("RESOURCE_TIMEOUT")? {
            self.resource_timeout = timeout;
        }
        if let Some(enabled) = parse_bool("LOG_REQUESTS")? {
            self.logging.log_requests = enabled;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(enabled) = parse_bool("LOG_TO_FILE")? {
            self.logging.to_file = enabled;
        }
        if let Some(size) = parse::<u64>("LOG_MAX_SIZE_MB")? {
            self.logging.max_size_mb = size;
        }
        Ok(())
    }

    /// Validate the merged configuration. Fails fast on the first violation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the offending key.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("PORT", "must be non-zero"));
        }
        self.store.backend()?;
        if self.cache_backend == CacheBackend::Redis && self.redis_url.is_none() {
            return Err(ConfigError::missing("REDIS_URL"));
        }
        match self.jwt.algorithm.as_str() {
            "HS256" | "HS384" | "HS512" | "RS256" | "RS384" | "RS512" | "ES256" | "ES384" => {}
            other => {
                return Err(ConfigError::invalid(
                    "JWT_ALGORITHM",
                    format!("unsupported algorithm {other:?}"),
                ));
            }
        }
        if self.jwt.secret.is_none() && self.jwt.require_token_expiration {
            return Err(ConfigError::missing("JWT_SECRET"));
        }
        if self.federation.tool_name_separator.is_empty()
            || self.federation.tool_name_separator.contains(char::is_whitespace)
        {
            return Err(ConfigError::invalid(
                "GATEWAY_TOOL_NAME_SEPARATOR",
                "must be non-empty and contain no whitespace",
            ));
        }
        for name in &self.default_passthrough_headers {
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') || name.is_empty() {
                return Err(ConfigError::invalid(
                    "DEFAULT_PASSTHROUGH_HEADERS",
                    format!("invalid header name {name:?}"),
                ));
            }
        }
        if self.plugins.enabled && self.plugins.config_file.is_none() {
            return Err(ConfigError::missing("PLUGIN_CONFIG_FILE"));
        }
        if self.elicitation.max_concurrent == 0 {
            return Err(ConfigError::invalid(
                "MCPGATEWAY_ELICITATION_MAX_CONCURRENT",
                "must be at least 1",
            ));
        }
        if self.logging.max_size_mb == 0 {
            return Err(ConfigError::invalid("LOG_MAX_SIZE_MB", "must be at least 1"));
        }
        if self.request_timeout.is_zero() || self.resource_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "REQUEST_TIMEOUT",
                "timeouts must be non-zero",
            ));
        }
        if self.transport.session_queue_depth == 0 {
            return Err(ConfigError::invalid(
                "transport.session_queue_depth",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(unsafe_code)] // Required for set_var in Rust 2024 edition
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "HOST",
            "PORT",
            "DATABASE_URL",
            "CACHE_BACKEND",
            "REDIS_URL",
            "ENABLE_HEADER_PASSTHROUGH",
            "DEFAULT_PASSTHROUGH_HEADERS",
            "GATEWAY_TOOL_NAME_SEPARATOR",
            "MCPGATEWAY_ELICITATION_MAX_CONCURRENT",
            "PLUGINS_ENABLED",
            "PLUGIN_CONFIG_FILE",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn defaults_are_valid_and_conservative() {
        clear_env();
        let cfg = GatewayConfig::load(&CliOverrides::default()).unwrap();
        assert!(!cfg.enable_header_passthrough);
        assert!(!cfg.enable_overwrite_base_headers);
        assert!(cfg.compression_enabled);
        assert_eq!(cfg.server.port, 4444);
        assert_eq!(cfg.transport.sse_keepalive_interval, secs(30));
        assert_eq!(cfg.store.backend().unwrap(), StoreBackend::Memory);
    }

    #[test]
    #[serial]
    fn env_overrides_win_over_defaults() {
        clear_env();
        unsafe {
            std::env::set_var("PORT", "9000");
            std::env::set_var("ENABLE_HEADER_PASSTHROUGH", "true");
            std::env::set_var("DEFAULT_PASSTHROUGH_HEADERS", "X-Custom-One,X-Custom-Two");
        }
        let cfg = GatewayConfig::load(&CliOverrides::default()).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert!(cfg.enable_header_passthrough);
        assert_eq!(
            cfg.default_passthrough_headers,
            vec!["X-Custom-One".to_string(), "X-Custom-Two".to_string()]
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn cli_overrides_win_over_env() {
        clear_env();
        unsafe { std::env::set_var("PORT", "9000") };
        let overrides = CliOverrides {
            port: Some(4445),
            ..CliOverrides::default()
        };
        let cfg = GatewayConfig::load(&overrides).unwrap();
        assert_eq!(cfg.server.port, 4445);
        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_scheme_names_the_key() {
        clear_env();
        unsafe { std::env::set_var("DATABASE_URL", "mongodb://nope") };
        let err = GatewayConfig::load(&CliOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
        clear_env();
    }

    #[test]
    #[serial]
    fn redis_backend_requires_url() {
        clear_env();
        unsafe { std::env::set_var("CACHE_BACKEND", "redis") };
        let err = GatewayConfig::load(&CliOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("REDIS_URL"));
        clear_env();
    }

    #[test]
    #[serial]
    fn plugins_enabled_requires_config_file() {
        clear_env();
        unsafe { std::env::set_var("PLUGINS_ENABLED", "true") };
        let err = GatewayConfig::load(&CliOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("PLUGIN_CONFIG_FILE"));
        clear_env();
    }

    #[test]
    #[serial]
    fn file_layer_loads_under_env() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(
            &path,
            "[server]\nhost = \"0.0.0.0\"\nport = 8111\n\n[federation]\ntool_name_separator = \"__\"\n",
        )
        .unwrap();
        unsafe { std::env::set_var("PORT", "8222") };
        let overrides = CliOverrides {
            config_file: Some(path),
            ..CliOverrides::default()
        };
        let cfg = GatewayConfig::load(&overrides).unwrap();
        // env beats file; file beats default
        assert_eq!(cfg.server.port, 8222);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.federation.tool_name_separator, "__");
        clear_env();
    }
}
