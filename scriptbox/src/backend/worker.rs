//! Isolated worker backend
//!
//! Runs the engine on a dedicated OS thread with its own heap,
//! reachable only via message passing. Request and response envelopes
//! are JSON-serialized across the channel boundary and matched by
//! correlation id, so timeout handling and worker reuse are testable
//! without touching the interpreter.
//!
//! A worker that misses its deadline is abandoned: its channels are
//! dropped, engine fuel bounds the orphaned script, and the next
//! invocation gets a fresh worker.

use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

use js_sandbox::protocol::{ExecutionRequest, SandboxError, ScriptOutput};

use crate::backend::ExecutionBackend;
use crate::config::SandboxConfig;
use crate::Invocation;

/// Request envelope crossing the worker boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Correlation id echoed by the matching response.
    pub id: Uuid,
    /// Deadline the host enforces around this request.
    pub deadline_ms: u64,
    pub request: ExecutionRequest,
}

/// Response envelope; `id` echoes the request's correlation id. A nil
/// id marks a response the worker could not correlate (undecodable
/// request).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: Uuid,
    pub outcome: Result<ScriptOutput, SandboxError>,
}

/// Channel pair owned by the host side of one worker.
struct WorkerHandle {
    req_tx: std_mpsc::Sender<String>,
    resp_rx: mpsc::UnboundedReceiver<String>,
}

fn spawn_worker() -> Result<WorkerHandle, SandboxError> {
    let (req_tx, req_rx) = std_mpsc::channel::<String>();
    let (resp_tx, resp_rx) = mpsc::unbounded_channel::<String>();

    thread::Builder::new()
        .name("sandbox-worker".to_string())
        .spawn(move || worker_loop(req_rx, resp_tx))
        .map_err(|e| SandboxError::Unknown(format!("failed to spawn sandbox worker: {e}")))?;

    Ok(WorkerHandle { req_tx, resp_rx })
}

/// The worker side: decode, execute, encode, repeat until the host
/// drops its end of either channel.
fn worker_loop(req_rx: std_mpsc::Receiver<String>, resp_tx: mpsc::UnboundedSender<String>) {
    println!("[SandboxWorker] started");

    while let Ok(raw) = req_rx.recv() {
        let response = match serde_json::from_str::<WorkerRequest>(&raw) {
            Ok(request) => WorkerResponse {
                id: request.id,
                outcome: js_sandbox::execute(&request.request),
            },
            Err(e) => WorkerResponse {
                id: Uuid::nil(),
                outcome: Err(SandboxError::Transport(format!(
                    "failed to decode worker request: {e}"
                ))),
            },
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                let fallback = WorkerResponse {
                    id: response.id,
                    outcome: Err(SandboxError::Transport(format!(
                        "failed to encode worker response: {e}"
                    ))),
                };
                match serde_json::to_string(&fallback) {
                    Ok(encoded) => encoded,
                    Err(_) => continue,
                }
            }
        };

        if resp_tx.send(encoded).is_err() {
            // Host dropped its receiver (timeout or shutdown).
            break;
        }
    }

    println!("[SandboxWorker] channel closed, shutting down");
}

pub struct WorkerBackend {
    config: SandboxConfig,
    /// Reusable worker slot; `None` until first use and after a failed
    /// worker was discarded.
    slot: Mutex<Option<WorkerHandle>>,
}

impl WorkerBackend {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
        }
    }

    /// Send one request to a worker and await its matching response
    /// within the request's deadline.
    async fn run_on(
        &self,
        handle: &mut WorkerHandle,
        request: &WorkerRequest,
    ) -> Result<ScriptOutput, SandboxError> {
        let encoded = serde_json::to_string(request)
            .map_err(|e| SandboxError::Transport(format!("failed to encode worker request: {e}")))?;
        handle
            .req_tx
            .send(encoded)
            .map_err(|_| SandboxError::Transport("sandbox worker is gone".to_string()))?;

        let deadline = Instant::now() + Duration::from_millis(request.deadline_ms);
        loop {
            let raw = match tokio::time::timeout_at(deadline, handle.resp_rx.recv()).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    return Err(SandboxError::Transport(
                        "sandbox worker closed its response channel".to_string(),
                    ))
                }
                Err(_) => {
                    return Err(SandboxError::Timeout(format!(
                        "script did not complete within {} ms",
                        request.deadline_ms
                    )))
                }
            };

            let response: WorkerResponse = serde_json::from_str(&raw).map_err(|e| {
                SandboxError::Transport(format!("failed to decode worker response: {e}"))
            })?;

            if response.id == request.id || response.id.is_nil() {
                return response.outcome;
            }
            // A stale response from an earlier, timed-out request on a
            // reused worker; never deliver it as this outcome.
            println!(
                "[WorkerBackend] discarding stale response {} (expected {})",
                response.id, request.id
            );
        }
    }
}

#[async_trait]
impl ExecutionBackend for WorkerBackend {
    async fn execute(&self, invocation: Invocation) -> Result<ScriptOutput, SandboxError> {
        let request = WorkerRequest {
            id: Uuid::new_v4(),
            deadline_ms: self.config.timeout_ms,
            request: self.config.to_execution_request(invocation),
        };

        if self.config.reuse_worker {
            let mut slot = self.slot.lock().await;
            if slot.is_none() {
                *slot = Some(spawn_worker()?);
            }
            let handle = match slot.as_mut() {
                Some(handle) => handle,
                None => {
                    return Err(SandboxError::Unknown(
                        "sandbox worker slot is empty".to_string(),
                    ))
                }
            };
            let outcome = self.run_on(handle, &request).await;
            if matches!(
                outcome,
                Err(SandboxError::Timeout(_)) | Err(SandboxError::Transport(_))
            ) {
                // The worker may still be wedged in the old script, or
                // its channels are broken; never hand it another
                // invocation.
                println!("[WorkerBackend] discarding worker after {}", request.id);
                *slot = None;
            }
            outcome
        } else {
            let mut handle = spawn_worker()?;
            self.run_on(&mut handle, &request).await
        }
    }
}
