//! Principals and the ownership/sharing model.

use crate::EntityId;
use serde::{Deserialize, Serialize};

/// The authenticated identity attached to every request: user, tenant and
/// team context, plus any token scopes the validator extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User identifier (subject claim)
    pub user: String,
    /// Tenant the principal belongs to
    pub tenant_id: EntityId,
    /// Teams the principal is a member of
    pub team_ids: Vec<EntityId>,
    /// Token scopes, if any
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Principal {
    /// Whether the principal is a member of the given team
    pub fn in_team(&self, team_id: EntityId) -> bool {
        self.team_ids.contains(&team_id)
    }
}

/// Entity visibility under the ownership model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Owner team only
    Private,
    /// Members of the owning team
    #[default]
    Team,
    /// All authenticated principals of the tenant
    Public,
}

impl Visibility {
    /// Whether `principal` may read an entity owned by `owner_team_id` in
    /// `tenant_id` under this visibility.
    ///
    /// Tenant isolation is absolute: a principal from another tenant never
    /// sees the entity regardless of visibility.
    pub fn allows(
        self,
        principal: &Principal,
        tenant_id: EntityId,
        owner_team_id: EntityId,
    ) -> bool {
        if principal.tenant_id != tenant_id {
            return false;
        }
        match self {
            Self::Private | Self::Team => principal.in_team(owner_team_id),
            Self::Public => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(tenant: EntityId, teams: Vec<EntityId>) -> Principal {
        Principal {
            user: "alice".into(),
            tenant_id: tenant,
            team_ids: teams,
            scopes: vec![],
        }
    }

    #[test]
    fn tenant_isolation_is_absolute() {
        let tenant_a = EntityId::generate();
        let tenant_b = EntityId::generate();
        let team = EntityId::generate();
        let p = principal(tenant_a, vec![team]);
        assert!(!Visibility::Public.allows(&p, tenant_b, team));
    }

    #[test]
    fn team_visibility_requires_membership() {
        let tenant = EntityId::generate();
        let owner_team = EntityId::generate();
        let other_team = EntityId::generate();

        let member = principal(tenant, vec![owner_team]);
        let outsider = principal(tenant, vec![other_team]);

        assert!(Visibility::Team.allows(&member, tenant, owner_team));
        assert!(!Visibility::Team.allows(&outsider, tenant, owner_team));
        assert!(Visibility::Public.allows(&outsider, tenant, owner_team));
        assert!(!Visibility::Private.allows(&outsider, tenant, owner_team));
    }
}
