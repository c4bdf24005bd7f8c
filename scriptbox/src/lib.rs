//! scriptbox — sandboxed execution of request scripts
//!
//! Runs user-authored pre-request and test scripts in isolation from
//! the host and turns every outcome — updated variables, a test report,
//! an exception, a timeout — into one settled, typed result.
//!
//! Two interchangeable isolation strategies sit behind a single async
//! contract: an in-process restricted interpreter for trusted hosts,
//! and a dedicated worker thread reachable only via message passing for
//! hosts that must stay responsive against hostile scripts. See the
//! `backend` module.

pub mod backend;
pub mod config;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

pub use backend::{
    create_backend, BackendKind, ExecutionBackend, InProcessBackend, WorkerBackend,
};
pub use config::SandboxConfig;
pub use js_sandbox::protocol::{
    ConsoleEntry, ConsoleLevel, EnvEntry, ExpectResult, ResponseSnapshot, SandboxError,
    ScriptKind, ScriptOutput, TestNode,
};

/// One request to run a script against an environment snapshot.
///
/// Everything is owned: the backend hands the script its own copy of
/// the data, so a script mutating its view can never touch the
/// caller's snapshot or a concurrent invocation's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub script: String,
    pub kind: ScriptKind,
    pub envs: Vec<EnvEntry>,
    /// Response context; only meaningful for `Test` invocations and
    /// ignored otherwise.
    #[serde(default)]
    pub response: Option<ResponseSnapshot>,
}

impl Invocation {
    /// A pre-request invocation: the script may read and update the
    /// snapshot before the request goes out.
    pub fn pre_request(script: impl Into<String>, envs: Vec<EnvEntry>) -> Self {
        Self {
            script: script.into(),
            kind: ScriptKind::PreRequest,
            envs,
            response: None,
        }
    }

    /// A test invocation: the script additionally sees the response
    /// snapshot and records a test report.
    pub fn test(
        script: impl Into<String>,
        envs: Vec<EnvEntry>,
        response: ResponseSnapshot,
    ) -> Self {
        Self {
            script: script.into(),
            kind: ScriptKind::Test,
            envs,
            response: Some(response),
        }
    }
}

/// The settled result of one invocation.
pub type Outcome = Result<ScriptOutput, SandboxError>;

/// Run a batch of invocations concurrently on one backend.
///
/// Outcomes are returned in submission order even though invocations
/// may complete out of order; each invocation still gets exactly one
/// outcome.
pub async fn run_all(backend: &dyn ExecutionBackend, invocations: Vec<Invocation>) -> Vec<Outcome> {
    futures::future::join_all(
        invocations
            .into_iter()
            .map(|invocation| backend.execute(invocation)),
    )
    .await
}
