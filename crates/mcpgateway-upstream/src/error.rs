//! Upstream client error types.

/// Result type for upstream operations
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Errors from talking to upstream gateways.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Circuit open or in-flight cap reached
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// Transport failure. `before_write` is true when the failure happened
    /// before any request bytes were written, which makes a retry safe
    /// even for non-idempotent calls.
    #[error("Upstream transport error: {message}")]
    Transport {
        /// What went wrong
        message: String,
        /// Whether the failure preceded the request write
        before_write: bool,
    },

    /// The upstream answered with a non-success HTTP status
    #[error("Upstream returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The upstream answered with a JSON-RPC error
    #[error("Upstream JSON-RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i32,
        /// Error message
        message: String,
    },

    /// The deadline for the call elapsed
    #[error("Upstream call timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Response was not a valid JSON-RPC message
    #[error("Upstream protocol error: {0}")]
    Protocol(String),

    /// TLS or client construction failure
    #[error("Upstream client error: {0}")]
    Client(String),
}

impl UpstreamError {
    /// Transport failure before the request was written
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            before_write: true,
        }
    }

    /// Transport failure after bytes may have been written
    pub fn io(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            before_write: false,
        }
    }

    /// Whether a retry is safe for a non-idempotent call
    pub fn retry_safe(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                before_write: true,
                ..
            }
        )
    }

    /// Whether an idempotent read should retry on this error
    pub fn retryable_read(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Status { status: 502..=504 } | Self::Timeout { .. }
        )
    }
}
