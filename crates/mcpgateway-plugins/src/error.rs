//! Plugin framework error types.

/// Result alias for fallible plugin-framework operations
pub type PluginResultExt<T> = Result<T, PluginError>;

/// Errors raised while running a plugin or building the chain.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PluginError {
    /// The plugin exceeded its deadline
    #[error("Plugin {plugin} timed out after {timeout_ms}ms")]
    Timeout {
        /// Plugin name
        plugin: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Transport failure talking to an external plugin
    #[error("Plugin {plugin} transport error: {message}")]
    Transport {
        /// Plugin name
        plugin: String,
        /// What went wrong
        message: String,
    },

    /// The external plugin does not implement the requested hook tool.
    /// Treated as continue-without-changes by the chain.
    #[error("Plugin {plugin} does not implement {hook}")]
    NotImplemented {
        /// Plugin name
        plugin: String,
        /// Hook tool that was missing
        hook: String,
    },

    /// A payload failed to (de)serialize across the plugin boundary
    #[error("Plugin payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// The chain definition file is invalid
    #[error("Plugin chain config error: {0}")]
    Config(String),

    /// Anything else a plugin reported
    #[error("Plugin {plugin} failed: {message}")]
    Execution {
        /// Plugin name
        plugin: String,
        /// Failure detail
        message: String,
    },
}

impl PluginError {
    /// Create an execution error
    pub fn execution(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}
