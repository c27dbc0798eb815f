//! Bearer-token principal extraction.
//!
//! The gateway consumes a verified principal; identity providers live
//! outside the core. When a `JWT_SECRET` is configured, `Authorization:
//! Bearer` tokens are validated and their claims become the principal.
//! Without a secret the gateway runs open (development mode) and every
//! request maps to the anonymous principal of the default tenant.

use crate::{ServerError, ServerResult};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use mcpgateway_config::JwtSettings;
use mcpgateway_registry::{EntityId, Principal, RegistryError};
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    teams: Vec<String>,
    #[serde(default)]
    scopes: Vec<String>,
}

/// Validates bearer tokens into principals.
pub struct Authenticator {
    key: Option<DecodingKey>,
    validation: Validation,
    /// Tenant and team used for anonymous principals in open mode
    default_tenant: EntityId,
    default_team: EntityId,
}

impl Authenticator {
    /// Build from the JWT settings.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Internal` when the configured algorithm is
    /// unknown (config validation should have caught it).
    pub fn new(settings: &JwtSettings) -> ServerResult<Self> {
        let algorithm = Algorithm::from_str(&settings.algorithm)
            .map_err(|_| ServerError::Internal(format!("bad algorithm {}", settings.algorithm)))?;
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims.clear();
        if settings.require_token_expiration {
            validation.required_spec_claims.insert("exp".to_string());
        } else {
            validation.validate_exp = false;
        }
        let key = match &settings.secret {
            Some(secret) if matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => {
                Some(DecodingKey::from_secret(secret.as_bytes()))
            }
            Some(secret) => Some(
                DecodingKey::from_rsa_pem(secret.as_bytes())
                    .or_else(|_| DecodingKey::from_ec_pem(secret.as_bytes()))
                    .map_err(|e| ServerError::Internal(format!("bad JWT key material: {e}")))?,
            ),
            None => None,
        };
        Ok(Self {
            key,
            validation,
            default_tenant: EntityId::generate(),
            default_team: EntityId::generate(),
        })
    }

    /// Whether token validation is active
    pub fn enforcing(&self) -> bool {
        self.key.is_some()
    }

    /// The tenant anonymous principals belong to (open mode only)
    pub fn default_tenant(&self) -> EntityId {
        self.default_tenant
    }

    /// The team anonymous principals belong to (open mode only)
    pub fn default_team(&self) -> EntityId {
        self.default_team
    }

    /// Resolve the principal for a request from its `Authorization`
    /// header value, if any.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` when enforcement is on and the token is
    /// absent, malformed, or fails validation.
    pub fn authenticate(&self, authorization: Option<&str>) -> ServerResult<Principal> {
        let Some(key) = &self.key else {
            return Ok(self.anonymous());
        };
        let token = authorization
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ServerError::Registry(RegistryError::Unauthenticated))?;
        let decoded = jsonwebtoken::decode::<Claims>(token, key, &self.validation)
            .map_err(|_| ServerError::Registry(RegistryError::Unauthenticated))?;
        let claims = decoded.claims;
        let tenant_id = claims
            .tenant_id
            .as_deref()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(self.default_tenant);
        let team_ids = claims
            .teams
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect::<Vec<_>>();
        Ok(Principal {
            user: claims.sub,
            tenant_id,
            team_ids: if team_ids.is_empty() {
                vec![self.default_team]
            } else {
                team_ids
            },
            scopes: claims.scopes,
        })
    }

    fn anonymous(&self) -> Principal {
        Principal {
            user: "anonymous".into(),
            tenant_id: self.default_tenant,
            team_ids: vec![self.default_team],
            scopes: vec![],
        }
    }
}
