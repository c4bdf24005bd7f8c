//! Execution backends — one async contract, two isolation strategies
//!
//! The strategy is fixed at construction time; call sites hold a
//! `dyn ExecutionBackend` and never branch on which one is active.

pub mod in_process;
pub mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use js_sandbox::protocol::{SandboxError, ScriptOutput};

use crate::config::SandboxConfig;
use crate::Invocation;

pub use in_process::InProcessBackend;
pub use worker::WorkerBackend;

/// Which isolation strategy a host wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Restricted interpreter on a blocking thread of the host runtime.
    /// For hosts that are themselves trusted, e.g. a command-line
    /// runner.
    InProcess,
    /// Dedicated worker thread with its own heap, reachable only via
    /// message passing. Mandatory when the host must stay responsive
    /// or a hostile script must not touch host memory.
    IsolatedWorker,
}

/// The shared execution contract.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run one invocation to exactly one outcome.
    ///
    /// Never panics across this boundary; every failure path resolves
    /// to a `SandboxError`, and a timed-out invocation leaves the
    /// backend usable for the next one.
    async fn execute(&self, invocation: Invocation) -> Result<ScriptOutput, SandboxError>;
}

/// Construct the backend for `kind`.
pub fn create_backend(kind: BackendKind, config: SandboxConfig) -> Arc<dyn ExecutionBackend> {
    match kind {
        BackendKind::InProcess => Arc::new(InProcessBackend::new(config)),
        BackendKind::IsolatedWorker => Arc::new(WorkerBackend::new(config)),
    }
}
