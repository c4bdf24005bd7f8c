//! Protocol types for host-sandbox communication
//!
//! Every type here may cross the worker boundary as JSON, so everything
//! derives Serialize/Deserialize and carries only plain data (strings,
//! nested structs, vectors) with no functions or cyclic references.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============ Environment ============

/// One key/value variable entry.
///
/// Entries are kept in append order and are not deduplicated; lookups
/// resolve last-write-wins (see the `environment` module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    pub key: String,
    pub value: String,
}

impl EnvEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============ Invocation ============

/// Which script slot of a request is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptKind {
    /// Runs before the request is sent; produces an updated snapshot.
    PreRequest,
    /// Runs after the response arrived; produces a test report.
    Test,
}

/// Snapshot of the HTTP response a test script may inspect.
///
/// Read-only from the script's point of view; the sandbox never reads
/// it back after execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<EnvEntry>,
    pub body: String,
}

/// Interpreter resource limits applied to a single execution.
///
/// These bound the engine itself (fuel), independent of the wall-clock
/// deadline the host enforces around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Total loop iterations before the engine aborts the script.
    pub loop_iteration_limit: u64,
    /// Maximum call depth before the engine aborts the script.
    pub recursion_limit: usize,
    /// Scripts larger than this are rejected before parsing.
    pub max_script_bytes: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 5_000_000,
            recursion_limit: 512,
            max_script_bytes: 1024 * 1024,
        }
    }
}

/// A fully-specified execution request handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The script source text.
    pub script: String,
    /// Which script slot is being run.
    pub kind: ScriptKind,
    /// Input environment snapshot; the engine works on its own copy.
    pub envs: Vec<EnvEntry>,
    /// Response context, present for `Test` invocations only.
    #[serde(default)]
    pub response: Option<ResponseSnapshot>,
    #[serde(default)]
    pub limits: EngineLimits,
}

// ============ Test results ============

/// Outcome of a single terminal assertion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectResult {
    pub passed: bool,
    pub message: String,
}

/// One node of the test descriptor tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestNode {
    /// Human-readable label from `pw.test(label, ...)`.
    pub label: String,
    /// Assertion outcomes recorded directly on this node, in call order.
    pub results: Vec<ExpectResult>,
    /// Nested `pw.test` groups, in declaration order.
    pub children: Vec<TestNode>,
}

impl TestNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            results: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Aggregate pass state: `true` iff every expectation on this node
    /// and in all descendants passed. Computed on demand, never cached.
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed) && self.children.iter().all(TestNode::passed)
    }

    /// `(passed, failed)` expectation counts over the whole subtree.
    pub fn counts(&self) -> (usize, usize) {
        let mut passed = self.results.iter().filter(|r| r.passed).count();
        let mut failed = self.results.len() - passed;
        for child in &self.children {
            let (p, f) = child.counts();
            passed += p;
            failed += f;
        }
        (passed, failed)
    }
}

// ============ Console capture ============

/// Severity of a captured `console.*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
}

/// One captured `console.*` call, arguments already joined into a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
}

// ============ Output ============

/// Successful result of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptOutput {
    /// The snapshot after the script's `pw.env` calls were applied.
    pub envs: Vec<EnvEntry>,
    /// Root of the test descriptor tree; `Some` for `Test` invocations.
    pub tests: Option<TestNode>,
    /// Captured console output, in call order.
    pub console: Vec<ConsoleEntry>,
}

// ============ Errors ============

/// Every failure mode of the sandbox, as one tagged value.
///
/// The serde tag is machine-stable; the payload is the human-readable
/// message callers surface verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "message")]
pub enum SandboxError {
    /// The script text is not syntactically valid JavaScript.
    #[error("script parse error: {0}")]
    #[serde(rename = "PARSE_ERROR")]
    Parse(String),
    /// The script threw, or a capability call was misused.
    #[error("script runtime error: {0}")]
    #[serde(rename = "RUNTIME_ERROR")]
    Runtime(String),
    /// The script exceeded its deadline or engine fuel.
    #[error("script timed out: {0}")]
    #[serde(rename = "TIMEOUT")]
    Timeout(String),
    /// Serialization failed at the worker boundary.
    #[error("sandbox transport error: {0}")]
    #[serde(rename = "TRANSPORT_ERROR")]
    Transport(String),
    /// Anything not classified above; the message is the stringified
    /// underlying cause.
    #[error("sandbox error: {0}")]
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown(String),
}

impl SandboxError {
    /// The machine-stable kind tag, matching the serde representation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "PARSE_ERROR",
            Self::Runtime(_) => "RUNTIME_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Unknown(_) => "UNKNOWN_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_request_roundtrip() {
        let request = ExecutionRequest {
            script: "pw.env.set(\"a\", \"1\")".to_string(),
            kind: ScriptKind::PreRequest,
            envs: vec![EnvEntry::new("a", "0")],
            response: None,
            limits: EngineLimits::default(),
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: ExecutionRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, request);
    }

    #[test]
    fn test_error_tag_is_stable() {
        let err = SandboxError::Timeout("script did not complete within 5 ms".to_string());

        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["kind"], "TIMEOUT");
        assert_eq!(err.kind(), "TIMEOUT");
        let back: SandboxError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_node_aggregate_pass_state() {
        let mut root = TestNode::new("root");
        let mut outer = TestNode::new("outer");
        let mut inner = TestNode::new("inner");
        inner.results.push(ExpectResult {
            passed: true,
            message: "Expected '1' to be '1'".to_string(),
        });
        outer.children.push(inner);
        root.children.push(outer);

        assert!(root.passed());
        assert_eq!(root.counts(), (1, 0));

        root.children[0].results.push(ExpectResult {
            passed: false,
            message: "Expected '1' to be '2'".to_string(),
        });

        assert!(!root.passed());
        assert!(root.children[0].children[0].passed());
        assert_eq!(root.counts(), (1, 1));
    }

    #[test]
    fn test_response_snapshot_uses_script_field_names() {
        let response = ResponseSnapshot {
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![EnvEntry::new("content-type", "application/json")],
            body: "{}".to_string(),
        };

        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["statusText"], "OK");
        assert_eq!(json["status"], 200);
    }
}
