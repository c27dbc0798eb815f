//! Advisory leader election over the entity store's lock row.

use mcpgateway_registry::RegistryStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Tracks whether this node currently holds the leader lock.
///
/// The lock TTL is renewed on a cadence well inside the TTL; when renewal
/// fails the elector yields leadership within one renewal tick.
pub struct LeaderElector {
    store: Arc<dyn RegistryStore>,
    node_id: String,
    ttl: Duration,
    renewal: Duration,
    is_leader: AtomicBool,
}

impl LeaderElector {
    /// Create an elector for this node
    pub fn new(
        store: Arc<dyn RegistryStore>,
        node_id: impl Into<String>,
        ttl: Duration,
        renewal: Duration,
    ) -> Self {
        Self {
            store,
            node_id: node_id.into(),
            ttl,
            renewal,
            is_leader: AtomicBool::new(false),
        }
    }

    /// Whether this node holds the lock right now
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    /// The node id used for the lock
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Try once to acquire or renew the lock, updating the local flag.
    pub async fn tick(&self) -> bool {
        match self
            .store
            .try_acquire_leader(&self.node_id, self.ttl)
            .await
        {
            Ok(acquired) => {
                let was = self.is_leader.swap(acquired, Ordering::AcqRel);
                if acquired && !was {
                    info!(node = %self.node_id, "acquired leader lock");
                } else if !acquired && was {
                    warn!(node = %self.node_id, "lost leader lock, yielding");
                }
                acquired
            }
            Err(error) => {
                // store unreachable: assume the worst and yield
                if self.is_leader.swap(false, Ordering::AcqRel) {
                    warn!(node = %self.node_id, %error, "leader renewal failed, yielding");
                }
                false
            }
        }
    }

    /// Run the renewal loop until `shutdown` flips to true, then release
    /// the lock if held.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.renewal);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        if self.is_leader.swap(false, Ordering::AcqRel) {
            if let Err(error) = self.store.release_leader(&self.node_id).await {
                warn!(node = %self.node_id, %error, "failed to release leader lock");
            } else {
                debug!(node = %self.node_id, "released leader lock");
            }
        }
    }
}
