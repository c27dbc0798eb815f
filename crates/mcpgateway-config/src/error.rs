//! Configuration error types.

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors. Every variant names the offending key so startup
/// failures are actionable without a debugger.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value failed to parse or violated a domain rule
    #[error("Invalid value for `{key}`: {reason}")]
    Invalid {
        /// Offending configuration key
        key: String,
        /// What was wrong with it
        reason: String,
    },

    /// A required option is absent
    #[error("Missing required option `{key}`")]
    Missing {
        /// Missing configuration key
        key: String,
    },

    /// The config file could not be read or parsed
    #[error("Config file error: {0}")]
    File(#[from] config::ConfigError),
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing-option error
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }
}
