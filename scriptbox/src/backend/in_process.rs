//! In-process backend
//!
//! Runs the engine on a blocking thread of the async runtime, wrapped
//! in the same asynchronous contract as the isolated worker. The
//! interpreter context is still restricted; only the isolation
//! boundary differs.

use std::time::Duration;

use async_trait::async_trait;

use js_sandbox::protocol::{SandboxError, ScriptOutput};

use crate::backend::ExecutionBackend;
use crate::config::SandboxConfig;
use crate::Invocation;

pub struct InProcessBackend {
    config: SandboxConfig,
}

impl InProcessBackend {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExecutionBackend for InProcessBackend {
    async fn execute(&self, invocation: Invocation) -> Result<ScriptOutput, SandboxError> {
        let request = self.config.to_execution_request(invocation);
        let timeout_ms = self.config.timeout_ms;

        let task = tokio::task::spawn_blocking(move || js_sandbox::execute(&request));

        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(SandboxError::Unknown(format!(
                "execution task failed: {join_error}"
            ))),
            // The abandoned blocking task stops on its own once the
            // engine fuel runs out; the outcome is already settled.
            Err(_) => Err(SandboxError::Timeout(format!(
                "script did not complete within {timeout_ms} ms"
            ))),
        }
    }
}
