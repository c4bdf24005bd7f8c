//! Restricted interpreter context configuration
//!
//! This module builds the capability surface a script sees:
//! - Registers enumerated native functions under a `_host` namespace
//!   (variable access, assertion recording, test grouping, console)
//! - Runs a setup prelude that assembles the public `pw` object from
//!   those natives and installs console capture
//! - Strips every global not on the language whitelist and freezes the
//!   primordial prototypes
//!
//! The engine itself has no filesystem, network, timer, or process
//! bindings registered on the context, so the whitelist only has to
//! cover pure-language builtins.

use std::cell::RefCell;

use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{
    js_string, Context, JsArgs, JsNativeError, JsResult, JsString, JsValue, NativeFunction, Source,
};

use crate::environment;
use crate::protocol::{
    ConsoleEntry, ConsoleLevel, EnvEntry, ExpectResult, ResponseSnapshot, TestNode,
};

/// Per-invocation state the native functions operate on.
///
/// The active test nodes form an explicit stack; index 0 is always the
/// implicit root node that collects `pw.expect` calls made outside any
/// `pw.test` block.
#[derive(Debug, Default)]
pub struct ScriptState {
    pub envs: Vec<EnvEntry>,
    pub stack: Vec<TestNode>,
    pub console: Vec<ConsoleEntry>,
}

/// State drained from a finished execution.
#[derive(Debug)]
pub struct FinishedState {
    pub envs: Vec<EnvEntry>,
    pub root: TestNode,
    pub console: Vec<ConsoleEntry>,
}

// The natives are plain fn pointers, so they reach the per-invocation
// state through the interpreter thread's slot. `reset_state` installs
// it before every execution and `take_state` drains it afterwards;
// nothing survives between invocations.
thread_local! {
    static SCRIPT_STATE: RefCell<ScriptState> = RefCell::new(ScriptState::default());
}

/// Install fresh state for one execution. Must be called before every
/// run on this thread.
pub fn reset_state(envs: Vec<EnvEntry>) {
    SCRIPT_STATE.with(|s| {
        *s.borrow_mut() = ScriptState {
            envs,
            stack: vec![TestNode::new("root")],
            console: Vec::new(),
        };
    });
}

/// Drain the state an execution left behind.
///
/// Unbalanced test nodes (a script that escaped `pw.test` abnormally)
/// are folded back into their parents so no recorded result is lost.
pub fn take_state() -> FinishedState {
    let mut state = SCRIPT_STATE.with(|s| std::mem::take(&mut *s.borrow_mut()));
    while state.stack.len() > 1 {
        if let Some(node) = state.stack.pop() {
            if let Some(parent) = state.stack.last_mut() {
                parent.children.push(node);
            }
        }
    }
    FinishedState {
        envs: state.envs,
        root: state.stack.pop().unwrap_or_else(|| TestNode::new("root")),
        console: state.console,
    }
}

/// Register the `_host` natives, inject the response snapshot (if any),
/// and run the setup prelude. Setup failures are host-side bugs, never
/// script errors, so they are reported as plain messages.
pub fn install_capabilities(
    context: &mut Context,
    response: Option<&ResponseSnapshot>,
) -> Result<(), String> {
    let host = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(env_get), js_string!("env_get"), 1)
        .function(
            NativeFunction::from_fn_ptr(env_get_resolve),
            js_string!("env_get_resolve"),
            1,
        )
        .function(NativeFunction::from_fn_ptr(env_set), js_string!("env_set"), 2)
        .function(
            NativeFunction::from_fn_ptr(env_unset),
            js_string!("env_unset"),
            1,
        )
        .function(
            NativeFunction::from_fn_ptr(test_enter),
            js_string!("test_enter"),
            1,
        )
        .function(
            NativeFunction::from_fn_ptr(test_exit),
            js_string!("test_exit"),
            0,
        )
        .function(
            NativeFunction::from_fn_ptr(expect_result),
            js_string!("expect_result"),
            2,
        )
        .function(
            NativeFunction::from_fn_ptr(console_entry),
            js_string!("console_entry"),
            2,
        )
        .build();

    context
        .register_global_property(js_string!("_host"), host, Attribute::all())
        .map_err(|e| format!("failed to register host namespace: {e}"))?;

    if let Some(response) = response {
        let json = serde_json::to_string(response)
            .map_err(|e| format!("failed to encode response snapshot: {e}"))?;
        context
            .register_global_property(
                js_string!("__response_json"),
                JsValue::from(JsString::from(json.as_str())),
                Attribute::all(),
            )
            .map_err(|e| format!("failed to inject response snapshot: {e}"))?;
    }

    context
        .eval(Source::from_bytes(SETUP_PRELUDE.as_bytes()))
        .map_err(|e| format!("sandbox setup failed: {e}"))?;

    Ok(())
}

// ============ Native functions ============

fn string_arg(args: &[JsValue], index: usize, op: &str) -> JsResult<String> {
    match args.get_or_undefined(index).as_string() {
        Some(s) => Ok(s.to_std_string_escaped()),
        None => Err(JsNativeError::typ()
            .with_message(format!("{op}: argument {} must be a string", index + 1))
            .into()),
    }
}

/// Coerce a scalar script value to its string form; anything else is a
/// capability misuse.
fn scalar_arg(args: &[JsValue], index: usize, op: &str, context: &mut Context) -> JsResult<String> {
    let value = args.get_or_undefined(index);
    if value.is_string() || value.is_number() || value.is_boolean() {
        Ok(value.to_string(context)?.to_std_string_escaped())
    } else {
        Err(JsNativeError::typ()
            .with_message(format!(
                "{op}: argument {} must be a string, number or boolean",
                index + 1
            ))
            .into())
    }
}

fn env_get(_this: &JsValue, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    let key = string_arg(args, 0, "pw.env.get")?;
    let value =
        SCRIPT_STATE.with(|s| environment::resolve(&s.borrow().envs, &key).map(str::to_owned));
    // A missing key is an explicit null, never an exception.
    Ok(match value {
        Some(v) => JsValue::from(JsString::from(v.as_str())),
        None => JsValue::null(),
    })
}

fn env_get_resolve(_this: &JsValue, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    let key = string_arg(args, 0, "pw.env.getResolve")?;
    let value = SCRIPT_STATE.with(|s| {
        let state = s.borrow();
        environment::resolve(&state.envs, &key)
            .map(|v| environment::resolve_placeholders(&state.envs, v))
    });
    Ok(match value {
        Some(v) => JsValue::from(JsString::from(v.as_str())),
        None => JsValue::null(),
    })
}

fn env_set(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let key = string_arg(args, 0, "pw.env.set")?;
    let value = scalar_arg(args, 1, "pw.env.set", context)?;
    SCRIPT_STATE.with(|s| {
        let mut state = s.borrow_mut();
        state.envs = environment::set(&state.envs, &key, &value);
    });
    Ok(JsValue::undefined())
}

fn env_unset(_this: &JsValue, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    let key = string_arg(args, 0, "pw.env.unset")?;
    SCRIPT_STATE.with(|s| {
        let mut state = s.borrow_mut();
        state.envs = environment::unset(&state.envs, &key);
    });
    Ok(JsValue::undefined())
}

fn test_enter(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let label = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    SCRIPT_STATE.with(|s| s.borrow_mut().stack.push(TestNode::new(label)));
    Ok(JsValue::undefined())
}

fn test_exit(_this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    SCRIPT_STATE.with(|s| {
        let mut state = s.borrow_mut();
        // The root node is never popped.
        if state.stack.len() > 1 {
            if let Some(node) = state.stack.pop() {
                if let Some(parent) = state.stack.last_mut() {
                    parent.children.push(node);
                }
            }
        }
    });
    Ok(JsValue::undefined())
}

fn expect_result(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let passed = args.get_or_undefined(0).to_boolean();
    let message = args
        .get_or_undefined(1)
        .to_string(context)?
        .to_std_string_escaped();
    SCRIPT_STATE.with(|s| {
        let mut state = s.borrow_mut();
        if let Some(active) = state.stack.last_mut() {
            active.results.push(ExpectResult { passed, message });
        }
    });
    Ok(JsValue::undefined())
}

fn console_entry(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let level = match string_arg(args, 0, "console")?.as_str() {
        "info" => ConsoleLevel::Info,
        "warn" => ConsoleLevel::Warn,
        "error" => ConsoleLevel::Error,
        _ => ConsoleLevel::Log,
    };
    let message = args
        .get_or_undefined(1)
        .to_string(context)?
        .to_std_string_escaped();
    SCRIPT_STATE.with(|s| s.borrow_mut().console.push(ConsoleEntry { level, message }));
    Ok(JsValue::undefined())
}

// ============ Setup prelude ============

/// Builds `pw` and `console` from the `_host` natives, then strips the
/// global scope down to the whitelist and freezes the primordials.
/// `_host` itself is deleted at the end; the closures keep the natives.
pub const SETUP_PRELUDE: &str = r#"
"use strict";
(function (host) {
  function stringify(value) {
    if (typeof value === "string") {
      return value;
    }
    try {
      var json = JSON.stringify(value);
      if (json !== undefined) {
        return json;
      }
    } catch (ignored) {}
    return String(value);
  }

  var env = {
    get: function (key) {
      return host.env_get(key);
    },
    getResolve: function (key) {
      return host.env_get_resolve(key);
    },
    set: function (key, value) {
      host.env_set(key, value);
    },
    unset: function (key) {
      host.env_unset(key);
    },
  };

  var TYPE_NAMES = ["string", "boolean", "number", "object", "undefined", "bigint", "symbol", "function"];

  function makeChain(value, negated) {
    var phrase = negated ? "to not" : "to";
    function record(pass, message) {
      host.expect_result(negated ? !pass : pass, message);
    }
    function statusLevel(level) {
      var num = Number(value);
      if (isNaN(num)) {
        host.expect_result(false,
          "Expected '" + stringify(value) + "' to be a numeric status code");
        return;
      }
      record(Math.floor(num / 100) === level,
        "Expected '" + stringify(value) + "' " + phrase + " be " + level + "00-level status");
    }
    var chain = {
      toBe: function (expected) {
        record(value === expected,
          "Expected '" + stringify(value) + "' " + phrase + " be '" + stringify(expected) + "'");
      },
      toBeType: function (expected) {
        if (TYPE_NAMES.indexOf(expected) === -1) {
          host.expect_result(false,
            "Argument for toBeType should be one of: " + TYPE_NAMES.join(", "));
          return;
        }
        record(typeof value === expected,
          "Expected '" + stringify(value) + "' " + phrase + " be type '" + expected + "'");
      },
      toHaveLength: function (expected) {
        if (typeof expected !== "number") {
          host.expect_result(false, "Argument for toHaveLength should be a number");
          return;
        }
        if (typeof value !== "string" && !Array.isArray(value)) {
          host.expect_result(false,
            "Expected toHaveLength to be called on a string or array");
          return;
        }
        record(value.length === expected,
          "Expected '" + stringify(value) + "' " + phrase + " have length '" + expected + "'");
      },
      toInclude: function (member) {
        if (member === null || member === undefined) {
          host.expect_result(false, "Argument for toInclude should not be null or undefined");
          return;
        }
        if (typeof value !== "string" && !Array.isArray(value)) {
          host.expect_result(false,
            "Expected toInclude to be called on a string or array");
          return;
        }
        record(value.indexOf(member) !== -1,
          "Expected '" + stringify(value) + "' " + phrase + " include '" + stringify(member) + "'");
      },
      toBeLevel2xx: function () { statusLevel(2); },
      toBeLevel3xx: function () { statusLevel(3); },
      toBeLevel4xx: function () { statusLevel(4); },
      toBeLevel5xx: function () { statusLevel(5); },
    };
    Object.defineProperty(chain, "not", {
      get: function () {
        return makeChain(value, !negated);
      },
    });
    return chain;
  }

  function expect(value) {
    return makeChain(value, false);
  }

  function test(label, fn) {
    if (typeof fn !== "function") {
      throw new TypeError("pw.test: second argument must be a function");
    }
    host.test_enter(String(label));
    try {
      fn();
    } finally {
      host.test_exit();
    }
  }

  function joinArgs(args) {
    var parts = [];
    for (var i = 0; i < args.length; i++) {
      parts.push(stringify(args[i]));
    }
    return parts.join(" ");
  }

  var pw = {
    env: Object.freeze(env),
    expect: expect,
    test: test,
  };
  if (typeof __response_json === "string") {
    pw.response = Object.freeze(JSON.parse(__response_json));
  }
  globalThis.pw = Object.freeze(pw);

  globalThis.console = Object.freeze({
    log: function () { host.console_entry("log", joinArgs(arguments)); },
    info: function () { host.console_entry("info", joinArgs(arguments)); },
    warn: function () { host.console_entry("warn", joinArgs(arguments)); },
    error: function () { host.console_entry("error", joinArgs(arguments)); },
  });
})(_host);

(function () {
  var allowed = [
    "pw", "console", "globalThis", "undefined", "NaN", "Infinity",
    "JSON", "Math", "String", "Number", "Boolean", "Array", "Object",
    "Error", "TypeError", "RangeError", "SyntaxError", "RegExp",
    "parseInt", "parseFloat", "isNaN", "isFinite",
    "encodeURIComponent", "decodeURIComponent", "encodeURI", "decodeURI",
  ];
  var names = Object.getOwnPropertyNames(globalThis);
  for (var i = 0; i < names.length; i++) {
    if (allowed.indexOf(names[i]) === -1) {
      try {
        delete globalThis[names[i]];
      } catch (ignored) {
        try { globalThis[names[i]] = undefined; } catch (ignored2) {}
      }
    }
  }
  Object.freeze(Object.prototype);
  Object.freeze(Array.prototype);
  Object.freeze(String.prototype);
  Object.freeze(Number.prototype);
  Object.freeze(Boolean.prototype);
})();
"#;
