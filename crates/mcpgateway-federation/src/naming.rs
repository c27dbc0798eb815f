//! Federated capability naming.

use mcpgateway_registry::EntityId;

/// Compose the advertised name of a federated capability:
/// `{peer_slug}{separator}{remote_name}`. When that name is already taken
/// by a different gateway, the first 8 hex chars of the peer id are
/// appended as a deterministic tiebreaker.
pub fn federated_name(
    peer_slug: &str,
    separator: &str,
    remote_name: &str,
    peer_id: EntityId,
    taken_by_other: impl Fn(&str) -> bool,
) -> String {
    let candidate = format!("{peer_slug}{separator}{remote_name}");
    if !taken_by_other(&candidate) {
        return candidate;
    }
    format!("{candidate}{separator}{}", peer_id.short_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_name_when_free() {
        let peer = EntityId::generate();
        let name = federated_name("p1", "-", "a", peer, |_| false);
        assert_eq!(name, "p1-a");
    }

    #[test]
    fn collision_appends_short_peer_id() {
        let peer = EntityId::generate();
        let name = federated_name("p1", "-", "a", peer, |candidate| candidate == "p1-a");
        assert_eq!(name, format!("p1-a-{}", peer.short_hex()));
    }

    #[test]
    fn tiebreaker_is_deterministic() {
        let peer = EntityId::generate();
        let first = federated_name("p", "__", "t", peer, |c| c == "p__t");
        let second = federated_name("p", "__", "t", peer, |c| c == "p__t");
        assert_eq!(first, second);
    }
}
