//! Registry error taxonomy.
//!
//! Transport-independent: the dispatcher maps these onto JSON-RPC codes
//! and the HTTP surface maps them onto status codes. Errors are never
//! swallowed; callers downgrade explicitly where a spec rule says so.

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry error taxonomy
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Client-provided data fails schema or domain rules
    #[error("Invalid {field}: {reason}")]
    Invalid {
        /// Offending field
        field: String,
        /// What was wrong with it
        reason: String,
    },

    /// No or invalid principal
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Visibility or ownership denied
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown entity
    #[error("Not found: {entity} {id}")]
    NotFound {
        /// Entity class
        entity: &'static str,
        /// Identifier that missed
        id: String,
    },

    /// Uniqueness violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Optimistic update lost the race
    #[error("Stale version: expected {expected}, found {found}")]
    Stale {
        /// Version the caller presented
        expected: u64,
        /// Version in the store
        found: u64,
    },

    /// Pool exhausted or backend unreachable
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Unhandled backend fault
    #[error("Internal registry error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Create an invalid-field error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// HTTP status code for the admin surface
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Invalid { .. } => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) | Self::Stale { .. } => 409,
            Self::Unavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(RegistryError::invalid("name", "empty").http_status(), 400);
        assert_eq!(RegistryError::Unauthenticated.http_status(), 401);
        assert_eq!(RegistryError::Forbidden("x".into()).http_status(), 403);
        assert_eq!(RegistryError::not_found("tool", "abc").http_status(), 404);
        assert_eq!(RegistryError::Conflict("dup".into()).http_status(), 409);
        assert_eq!(
            RegistryError::Stale {
                expected: 1,
                found: 2
            }
            .http_status(),
            409
        );
        assert_eq!(RegistryError::Unavailable("pool".into()).http_status(), 503);
    }
}
