//! Session registry: one record per live MCP connection.
//!
//! The backend is pluggable (`CACHE_BACKEND`): the in-process registry
//! ships here; a Redis-backed registry (feature `redis-backend`) shares
//! records across workers and wakes elicitation waiters through pub/sub.
//! Sessions never outlive the process unless a shared backend is
//! configured.

#[cfg(feature = "redis-backend")]
pub mod redis;

use crate::{ServerError, ServerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mcpgateway_protocol::types::{ClientCapabilities, ElicitResult};
use mcpgateway_registry::Principal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Transport a session arrived over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// MCP streamable HTTP
    StreamableHttp,
    /// Long-lived SSE with companion POST
    Sse,
    /// WebSocket
    WebSocket,
    /// Stdio bridge
    Stdio,
}

/// One MCP connection's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// 128-bit session id, hex on the wire
    pub session_id: String,
    /// The authenticated principal
    pub principal: Principal,
    /// Capabilities the client advertised at initialize
    pub capabilities: ClientCapabilities,
    /// Transport the session arrived over
    pub transport: TransportKind,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last activity, for idle expiry
    pub last_activity_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a fresh record
    pub fn new(
        session_id: impl Into<String>,
        principal: Principal,
        capabilities: ClientCapabilities,
        transport: TransportKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            principal,
            capabilities,
            transport,
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// The session registry contract.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Register a new session.
    async fn create(&self, record: SessionRecord) -> ServerResult<()>;

    /// Fetch a live session; expired sessions are `SessionNotFound`.
    async fn get(&self, session_id: &str) -> ServerResult<SessionRecord>;

    /// Reset the idle timer.
    async fn touch(&self, session_id: &str) -> ServerResult<()>;

    /// Register an elicitation waiter. Fails with `TooManyElicitations`
    /// when the per-session cap is reached.
    async fn attach_pending_elicitation(
        &self,
        session_id: &str,
        request_id: &str,
        waiter: oneshot::Sender<ElicitResult>,
    ) -> ServerResult<()>;

    /// Wake the waiter for a completed elicitation. O(1).
    async fn resolve_elicitation(
        &self,
        session_id: &str,
        request_id: &str,
        response: ElicitResult,
    ) -> ServerResult<()>;

    /// Drop an abandoned elicitation waiter.
    async fn abandon_elicitation(&self, session_id: &str, request_id: &str) -> ServerResult<()>;

    /// Remove a session and all pending elicitations.
    async fn delete(&self, session_id: &str) -> ServerResult<()>;

    /// Drop sessions idle beyond the timeout; returns their ids.
    async fn sweep_idle(&self) -> ServerResult<Vec<String>>;
}

struct MemoryEntry {
    record: SessionRecord,
    last_activity: parking_lot::Mutex<DateTime<Utc>>,
    pending: DashMap<String, oneshot::Sender<ElicitResult>>,
}

/// In-process session registry.
pub struct MemorySessionRegistry {
    sessions: DashMap<String, MemoryEntry>,
    idle_timeout: Duration,
    max_pending: usize,
}

impl MemorySessionRegistry {
    /// Create a registry with the given idle timeout and per-session
    /// pending-elicitation cap.
    pub fn new(idle_timeout: Duration, max_pending: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            max_pending,
        }
    }

    fn expired(&self, last_activity: DateTime<Utc>) -> bool {
        let idle = Utc::now().signed_duration_since(last_activity);
        idle.to_std().is_ok_and(|idle| idle > self.idle_timeout)
    }
}

#[async_trait]
impl SessionRegistry for MemorySessionRegistry {
    async fn create(&self, record: SessionRecord) -> ServerResult<()> {
        let entry = MemoryEntry {
            last_activity: parking_lot::Mutex::new(record.last_activity_at),
            record,
            pending: DashMap::new(),
        };
        self.sessions.insert(entry.record.session_id.clone(), entry);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> ServerResult<SessionRecord> {
        let expired = match self.sessions.get(session_id) {
            Some(entry) => {
                if self.expired(*entry.last_activity.lock()) {
                    true
                } else {
                    let mut record = entry.record.clone();
                    record.last_activity_at = *entry.last_activity.lock();
                    return Ok(record);
                }
            }
            None => return Err(ServerError::SessionNotFound),
        };
        if expired {
            debug!(session_id, "session expired on access");
            self.sessions.remove(session_id);
        }
        Err(ServerError::SessionNotFound)
    }

    async fn touch(&self, session_id: &str) -> ServerResult<()> {
        let entry = self
            .sessions
            .get(session_id)
            .ok_or(ServerError::SessionNotFound)?;
        *entry.last_activity.lock() = Utc::now();
        Ok(())
    }

    async fn attach_pending_elicitation(
        &self,
        session_id: &str,
        request_id: &str,
        waiter: oneshot::Sender<ElicitResult>,
    ) -> ServerResult<()> {
        let entry = self
            .sessions
            .get(session_id)
            .ok_or(ServerError::SessionNotFound)?;
        if entry.pending.len() >= self.max_pending {
            return Err(ServerError::TooManyElicitations);
        }
        entry.pending.insert(request_id.to_string(), waiter);
        Ok(())
    }

    async fn resolve_elicitation(
        &self,
        session_id: &str,
        request_id: &str,
        response: ElicitResult,
    ) -> ServerResult<()> {
        let entry = self
            .sessions
            .get(session_id)
            .ok_or(ServerError::SessionNotFound)?;
        let (_, waiter) = entry
            .pending
            .remove(request_id)
            .ok_or(ServerError::SessionNotFound)?;
        // the requester may have timed out already; nothing left to do then
        let _ = waiter.send(response);
        Ok(())
    }

    async fn abandon_elicitation(&self, session_id: &str, request_id: &str) -> ServerResult<()> {
        if let Some(entry) = self.sessions.get(session_id) {
            entry.pending.remove(request_id);
        }
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> ServerResult<()> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn sweep_idle(&self) -> ServerResult<Vec<String>> {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| self.expired(*entry.last_activity.lock()))
            .map(|entry| entry.key().clone())
            .collect();
        for session_id in &expired {
            self.sessions.remove(session_id);
        }
        Ok(expired)
    }
}
