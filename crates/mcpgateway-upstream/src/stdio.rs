//! Stdio upstream: a spawned child MCP server over newline-delimited
//! JSON-RPC on its stdin/stdout.
//!
//! Used for `transport = STDIO` gateways and by the `translate` bridge.
//! A reader task correlates responses to pending requests by id; stderr
//! is drained to the log.

use crate::{UpstreamError, UpstreamResult};
use dashmap::DashMap;
use mcpgateway_protocol::jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

type PendingMap = Arc<DashMap<i64, oneshot::Sender<JsonRpcResponse>>>;

/// A child MCP server reached over stdio.
pub struct StdioUpstream {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicI64,
    request_timeout: Duration,
}

impl StdioUpstream {
    /// Spawn `command` with `args` and wire up the JSON-RPC pipes.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Client` when the process cannot be spawned
    /// or its pipes are missing.
    pub fn spawn(
        command: &str,
        args: &[String],
        request_timeout: Duration,
    ) -> UpstreamResult<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| UpstreamError::Client(format!("cannot spawn {command:?}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| UpstreamError::Client("child stdin not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| UpstreamError::Client("child stdout not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| UpstreamError::Client("child stderr not piped".into()))?;

        let pending: PendingMap = Arc::new(DashMap::new());

        // reader task: route responses to their waiters
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match JsonRpcMessage::from_json(&line) {
                    Ok(JsonRpcMessage::Response(response)) => {
                        let waiter = response.id.0.as_ref().and_then(|id| match id {
                            RequestId::Number(n) => reader_pending.remove(n).map(|(_, tx)| tx),
                            RequestId::String(_) => None,
                        });
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => debug!("stdio response with no pending waiter"),
                        }
                    }
                    Ok(_) => debug!("ignoring non-response stdio message"),
                    Err(error) => warn!(%error, "undecodable stdio line"),
                }
            }
            debug!("stdio upstream stdout closed");
        });

        // drain stderr into the log
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "mcpgateway::stdio_child", "{line}");
            }
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicI64::new(1),
            request_timeout,
        })
    }

    /// One JSON-RPC request over the pipe.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` when the pipe breaks, the child exits, or
    /// the deadline elapses.
    pub async fn request(&self, method: &str, params: Option<Value>) -> UpstreamResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let mut line =
            serde_json::to_string(&request).map_err(|e| UpstreamError::Protocol(e.to_string()))?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.remove(&id);
                return Err(UpstreamError::io(e.to_string()));
            }
            if let Err(e) = stdin.flush().await {
                self.pending.remove(&id);
                return Err(UpstreamError::io(e.to_string()));
            }
        }

        let response = tokio::time::timeout(self.request_timeout, rx)
            .await
            .map_err(|_| {
                self.pending.remove(&id);
                UpstreamError::Timeout {
                    timeout_ms: self.request_timeout.as_millis() as u64,
                }
            })?
            .map_err(|_| UpstreamError::io("stdio upstream closed"))?;

        if let Some(error) = response.error_payload() {
            return Err(UpstreamError::Rpc {
                code: error.code,
                message: error.message.clone(),
            });
        }
        Ok(response.result().cloned().unwrap_or(Value::Null))
    }

    /// Send a notification (no response expected).
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` when the pipe breaks.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> UpstreamResult<()> {
        let notification = mcpgateway_protocol::jsonrpc::JsonRpcNotification::new(method, params);
        let mut line = serde_json::to_string(&notification)
            .map_err(|e| UpstreamError::Protocol(e.to_string()))?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| UpstreamError::io(e.to_string()))?;
        stdin.flush().await.map_err(|e| UpstreamError::io(e.to_string()))
    }

    /// Terminate the child process.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` when the child cannot be killed.
    pub async fn shutdown(&self) -> UpstreamResult<()> {
        let mut child = self.child.lock().await;
        child
            .kill()
            .await
            .map_err(|e| UpstreamError::io(e.to_string()))
    }
}
