//! Federation error types.

/// Result type for federation operations
pub type FederationResult<T> = Result<T, FederationError>;

/// Errors from the federation workers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FederationError {
    /// Another node holds the leader lock
    #[error("Leader lock held by another node")]
    LockHeld,

    /// Entity store failure
    #[error("Registry error: {0}")]
    Registry(#[from] mcpgateway_registry::RegistryError),

    /// Upstream failure during a sync or health check
    #[error("Upstream error: {0}")]
    Upstream(#[from] mcpgateway_upstream::UpstreamError),

    /// mDNS announce/browse failure
    #[error("Discovery error: {0}")]
    Discovery(String),
}
