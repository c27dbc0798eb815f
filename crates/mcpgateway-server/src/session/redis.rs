//! Redis-backed session registry (feature `redis-backend`).
//!
//! Records live in Redis under `mcpgw:session:{id}` with the idle
//! timeout as TTL. Elicitation waiters stay process-local; a resolution
//! arriving on any worker is published on `mcpgw:elicit:{session_id}`
//! and the worker holding the waiter completes it.

use super::{SessionRecord, SessionRegistry};
use crate::{ServerError, ServerResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use mcpgateway_protocol::types::ElicitResult;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

const SESSION_PREFIX: &str = "mcpgw:session:";
const ELICIT_CHANNEL_PREFIX: &str = "mcpgw:elicit:";

#[derive(Serialize, Deserialize)]
struct ElicitWake {
    request_id: String,
    response: ElicitResult,
}

/// Shared session registry over Redis.
pub struct RedisSessionRegistry {
    manager: redis::aio::ConnectionManager,
    waiters: Arc<DashMap<(String, String), oneshot::Sender<ElicitResult>>>,
    idle_timeout: Duration,
    max_pending: usize,
}

impl RedisSessionRegistry {
    /// Connect and start the wake subscriber.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Internal` when Redis is unreachable.
    pub async fn connect(
        url: &str,
        idle_timeout: Duration,
        max_pending: usize,
    ) -> ServerResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ServerError::Internal(format!("redis url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| ServerError::Internal(format!("redis connect: {e}")))?;

        let waiters: Arc<DashMap<(String, String), oneshot::Sender<ElicitResult>>> =
            Arc::new(DashMap::new());

        // wake subscriber: any worker may receive the client's response;
        // the one holding the waiter completes it
        let sub_client = client.clone();
        let sub_waiters = waiters.clone();
        tokio::spawn(async move {
            let mut pubsub = match sub_client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(error) => {
                    warn!(%error, "redis pubsub unavailable, elicitation wake disabled");
                    return;
                }
            };
            if let Err(error) = pubsub.psubscribe(format!("{ELICIT_CHANNEL_PREFIX}*")).await {
                warn!(%error, "redis psubscribe failed");
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                let channel: String = message.get_channel_name().to_string();
                let session_id = channel
                    .strip_prefix(ELICIT_CHANNEL_PREFIX)
                    .unwrap_or_default()
                    .to_string();
                let Ok(payload) = message.get_payload::<String>() else {
                    continue;
                };
                let Ok(wake) = serde_json::from_str::<ElicitWake>(&payload) else {
                    continue;
                };
                if let Some((_, waiter)) =
                    sub_waiters.remove(&(session_id.clone(), wake.request_id.clone()))
                {
                    let _ = waiter.send(wake.response);
                } else {
                    debug!(session_id, request_id = %wake.request_id, "wake for waiter on another worker");
                }
            }
        });

        Ok(Self {
            manager,
            waiters,
            idle_timeout,
            max_pending,
        })
    }

    fn key(session_id: &str) -> String {
        format!("{SESSION_PREFIX}{session_id}")
    }

    fn pending_count(&self, session_id: &str) -> usize {
        self.waiters
            .iter()
            .filter(|entry| entry.key().0 == session_id)
            .count()
    }
}

#[async_trait]
impl SessionRegistry for RedisSessionRegistry {
    async fn create(&self, record: SessionRecord) -> ServerResult<()> {
        let payload = serde_json::to_string(&record)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(
                Self::key(&record.session_id),
                payload,
                self.idle_timeout.as_secs(),
            )
            .await
            .map_err(|e| ServerError::Internal(format!("redis set: {e}")))?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> ServerResult<SessionRecord> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = conn
            .get(Self::key(session_id))
            .await
            .map_err(|e| ServerError::Internal(format!("redis get: {e}")))?;
        let payload = payload.ok_or(ServerError::SessionNotFound)?;
        serde_json::from_str(&payload).map_err(|e| ServerError::Internal(e.to_string()))
    }

    async fn touch(&self, session_id: &str) -> ServerResult<()> {
        let mut conn = self.manager.clone();
        let refreshed: bool = conn
            .expire(Self::key(session_id), self.idle_timeout.as_secs() as i64)
            .await
            .map_err(|e| ServerError::Internal(format!("redis expire: {e}")))?;
        if refreshed {
            Ok(())
        } else {
            Err(ServerError::SessionNotFound)
        }
    }

    async fn attach_pending_elicitation(
        &self,
        session_id: &str,
        request_id: &str,
        waiter: oneshot::Sender<ElicitResult>,
    ) -> ServerResult<()> {
        // validate the session still exists
        self.get(session_id).await?;
        if self.pending_count(session_id) >= self.max_pending {
            return Err(ServerError::TooManyElicitations);
        }
        self.waiters
            .insert((session_id.to_string(), request_id.to_string()), waiter);
        Ok(())
    }

    async fn resolve_elicitation(
        &self,
        session_id: &str,
        request_id: &str,
        response: ElicitResult,
    ) -> ServerResult<()> {
        // local fast path
        if let Some((_, waiter)) = self
            .waiters
            .remove(&(session_id.to_string(), request_id.to_string()))
        {
            let _ = waiter.send(response);
            return Ok(());
        }
        // waiter lives on another worker: publish the wake
        let wake = ElicitWake {
            request_id: request_id.to_string(),
            response,
        };
        let payload =
            serde_json::to_string(&wake).map_err(|e| ServerError::Internal(e.to_string()))?;
        let mut conn = self.manager.clone();
        let _: () = conn
            .publish(format!("{ELICIT_CHANNEL_PREFIX}{session_id}"), payload)
            .await
            .map_err(|e| ServerError::Internal(format!("redis publish: {e}")))?;
        Ok(())
    }

    async fn abandon_elicitation(&self, session_id: &str, request_id: &str) -> ServerResult<()> {
        self.waiters
            .remove(&(session_id.to_string(), request_id.to_string()));
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> ServerResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .del(Self::key(session_id))
            .await
            .map_err(|e| ServerError::Internal(format!("redis del: {e}")))?;
        self.waiters.retain(|key, _| key.0 != session_id);
        Ok(())
    }

    async fn sweep_idle(&self) -> ServerResult<Vec<String>> {
        // Redis TTLs expire sessions server-side; nothing to sweep here
        Ok(Vec::new())
    }
}
