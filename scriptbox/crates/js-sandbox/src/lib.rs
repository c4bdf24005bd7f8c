//! js-sandbox — restricted JavaScript execution for request scripts
//!
//! This crate runs pre-request and test scripts in an embedded
//! JavaScript engine with a narrow capability surface:
//! - A fresh interpreter context per execution; nothing survives
//!   between runs
//! - Only the injected `pw` namespace (plus captured `console`) is
//!   reachable; no filesystem, network, timer, or process bindings
//! - Engine fuel (loop iteration and recursion limits) so runaway
//!   scripts terminate inside the engine
//! - Every failure mode mapped to one tagged error value

pub mod environment;
pub mod protocol;
pub mod sandbox;

use boa_engine::{Context, Script, Source};

use protocol::{ExecutionRequest, SandboxError, ScriptKind, ScriptOutput};
use sandbox::{install_capabilities, reset_state, take_state};

/// Execute one script invocation in a fresh restricted interpreter.
///
/// This is the single entry point both execution strategies use. It
/// builds a new context, installs the capability namespace, runs the
/// script, and drains the recorded state into the output. Exactly one
/// result is produced; no failure escapes as a panic.
pub fn execute(request: &ExecutionRequest) -> Result<ScriptOutput, SandboxError> {
    if request.script.len() > request.limits.max_script_bytes {
        return Err(SandboxError::Runtime(format!(
            "script is {} bytes, exceeding the {}-byte limit",
            request.script.len(),
            request.limits.max_script_bytes
        )));
    }

    // The script works on its own copy of the snapshot; the caller's
    // data is never aliased into the interpreter.
    reset_state(request.envs.clone());

    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(request.limits.loop_iteration_limit);
    context
        .runtime_limits_mut()
        .set_recursion_limit(request.limits.recursion_limit);

    // Parse before any setup so malformed scripts fail fast, with no
    // capability calls recorded and no snapshot produced.
    let script = match Script::parse(
        Source::from_bytes(request.script.as_bytes()),
        None,
        &mut context,
    ) {
        Ok(script) => script,
        Err(e) => return Err(SandboxError::Parse(e.to_string())),
    };

    install_capabilities(&mut context, request.response.as_ref())
        .map_err(SandboxError::Unknown)?;

    if let Err(e) = script.evaluate(&mut context) {
        let message = e.to_string();
        let lower = message.to_lowercase();
        // Engine fuel exhaustion surfaces as a runtime-limit error.
        if lower.contains("limit") && lower.contains("exceeded") {
            return Err(SandboxError::Timeout(message));
        }
        return Err(SandboxError::Runtime(message));
    }

    let state = take_state();
    Ok(ScriptOutput {
        envs: state.envs,
        tests: match request.kind {
            ScriptKind::Test => Some(state.root),
            ScriptKind::PreRequest => None,
        },
        console: state.console,
    })
}
