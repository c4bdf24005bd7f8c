//! Host-side sandbox configuration

use serde::{Deserialize, Serialize};

use js_sandbox::protocol::{EngineLimits, ExecutionRequest};

use crate::Invocation;

/// Configuration shared by both execution backends.
///
/// The wall-clock deadline is enforced by the host around the engine;
/// the engine limits bound the interpreter itself so a runaway script
/// also terminates from the inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock deadline per invocation, in milliseconds.
    pub timeout_ms: u64,
    /// Total loop iterations before the engine aborts the script.
    pub loop_iteration_limit: u64,
    /// Maximum call depth before the engine aborts the script.
    pub recursion_limit: usize,
    /// Scripts larger than this are rejected before parsing.
    pub max_script_bytes: usize,
    /// Keep one worker alive across invocations. Safe because every
    /// execution builds a fresh interpreter context and resets the
    /// state slot; a worker that timed out is discarded regardless.
    pub reuse_worker: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let limits = EngineLimits::default();
        Self {
            timeout_ms: 5_000,
            loop_iteration_limit: limits.loop_iteration_limit,
            recursion_limit: limits.recursion_limit,
            max_script_bytes: limits.max_script_bytes,
            reuse_worker: true,
        }
    }
}

impl SandboxConfig {
    pub(crate) fn to_execution_request(&self, invocation: Invocation) -> ExecutionRequest {
        ExecutionRequest {
            script: invocation.script,
            kind: invocation.kind,
            envs: invocation.envs,
            // The response context only exists for test scripts.
            response: match invocation.kind {
                js_sandbox::protocol::ScriptKind::Test => invocation.response,
                js_sandbox::protocol::ScriptKind::PreRequest => None,
            },
            limits: EngineLimits {
                loop_iteration_limit: self.loop_iteration_limit,
                recursion_limit: self.recursion_limit,
                max_script_bytes: self.max_script_bytes,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use js_sandbox::protocol::{EnvEntry, ResponseSnapshot, ScriptKind};

    #[test]
    fn test_defaults_deserialize_from_empty_object() {
        let config: SandboxConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, SandboxConfig::default());
        assert!(config.reuse_worker);
    }

    #[test]
    fn test_pre_request_invocations_never_carry_a_response() {
        let config = SandboxConfig::default();
        let invocation = Invocation {
            script: "1".to_string(),
            kind: ScriptKind::PreRequest,
            envs: vec![EnvEntry::new("a", "1")],
            response: Some(ResponseSnapshot {
                status: 200,
                status_text: "OK".to_string(),
                headers: Vec::new(),
                body: String::new(),
            }),
        };

        let request = config.to_execution_request(invocation);

        assert!(request.response.is_none());
    }
}
