//! The sandboxed JavaScript context shared by the `local-inproc` adapter
//! and the `cg-sandbox-host` child-process binary (§4.G).
//!
//! boa_engine is synchronous and single-threaded, so the `tools.*` Proxy
//! is built entirely in JS (boa implements ES `Proxy`); the only native
//! surface is one blocking `__tool_call(path, input)` function that hands
//! off to a [`ToolBridge`] and one `__console_log` sink. A call result
//! that carries `{ok:false}` is turned into a JS `throw` by the prelude,
//! prefixed with a stable marker so the caller can tell policy/approval
//! denials apart from ordinary runtime errors (§7 propagation policy).
use std::cell::RefCell;

use boa_engine::object::builtins::{JsPromise, PromiseState};
use boa_engine::{Context, JsError, JsResult, JsValue, Source};

use crate::bridge::ToolBridge;

pub const DENIED_PREFIX: &str = "TOOLS_DENIED:";
pub const FAILED_PREFIX: &str = "TOOLS_FAILED:";

thread_local! {
    static BRIDGE: RefCell<Option<Box<dyn ToolBridge>>> = const { RefCell::new(None) };
    static STDOUT: RefCell<String> = const { RefCell::new(String::new()) };
    static STDERR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Prelude that wires `globalThis.tools` to `__tool_call` via a chained
/// `Proxy`, and gives user code a minimal `console`/`setTimeout` surface
/// (§4.G). `setTimeout` runs its callback immediately — boa has no event
/// loop to drive real timer delays, so this sandbox only honors ordering,
/// not wall-clock delay; see DESIGN.md.
const PRELUDE: &str = r#"
(function () {
  function buildProxy(path) {
    return new Proxy(function () {}, {
      get(_target, prop) {
        if (prop === "then" || typeof prop === "symbol") return undefined;
        return buildProxy(path.concat(String(prop)));
      },
      apply(_target, _thisArg, args) {
        const input = args.length ? args[0] : {};
        const envelope = __tool_call(path.join("."), input);
        if (envelope && envelope.ok === false) {
          const prefix = envelope.kind === "denied" ? "TOOLS_DENIED:" : "TOOLS_FAILED:";
          throw new Error(prefix + envelope.error);
        }
        return envelope ? envelope.value : undefined;
      },
    });
  }
  globalThis.tools = buildProxy([]);
  globalThis.console = {
    log: (...args) => __console_log(args.map((a) => typeof a === "string" ? a : JSON.stringify(a)).join(" ")),
    error: (...args) => __console_error(args.map((a) => typeof a === "string" ? a : JSON.stringify(a)).join(" ")),
  };
  globalThis.setTimeout = (fn, _ms, ...rest) => { fn(...rest); return 0; };
  globalThis.clearTimeout = () => {};
})();
"#;

fn native_tool_call(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = args
        .first()
        .cloned()
        .unwrap_or(JsValue::undefined())
        .to_string(context)?
        .to_std_string_escaped();
    let input_json = args
        .get(1)
        .cloned()
        .unwrap_or(JsValue::undefined())
        .to_json(context)
        .unwrap_or(serde_json::Value::Object(Default::default()));

    let result = BRIDGE.with(|b| {
        b.borrow_mut()
            .as_mut()
            .expect("bridge installed before code runs")
            .call(&path, input_json)
    });
    JsValue::from_json(&result, context)
}

fn native_console_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let line = args
        .first()
        .cloned()
        .unwrap_or(JsValue::undefined())
        .to_string(context)?
        .to_std_string_escaped();
    STDOUT.with(|s| {
        let mut s = s.borrow_mut();
        s.push_str(&line);
        s.push('\n');
    });
    Ok(JsValue::undefined())
}

fn native_console_error(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let line = args
        .first()
        .cloned()
        .unwrap_or(JsValue::undefined())
        .to_string(context)?
        .to_std_string_escaped();
    STDERR.with(|s| {
        let mut s = s.borrow_mut();
        s.push_str(&line);
        s.push('\n');
    });
    Ok(JsValue::undefined())
}

/// Result of running one snippet to completion (or to a thrown/denied
/// error) inside the sandbox. Does not itself carry timeout/exit-code
/// framing — the adapter wraps this into the wire-stable `execute()`
/// result shape (§4.G).
pub struct SandboxOutcome {
    pub value: Option<serde_json::Value>,
    pub error: Option<String>,
    pub denied: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run `code` to completion inside a fresh boa context on the calling
/// thread. Blocking and synchronous; callers needing a deadline must run
/// this on a dedicated thread (`spawn_blocking`) and race it externally —
/// boa has no built-in instruction-count or wall-clock interruption hook
/// usable across an await point.
pub fn run(code: &str, bridge: Box<dyn ToolBridge>) -> SandboxOutcome {
    BRIDGE.with(|b| *b.borrow_mut() = Some(bridge));
    STDOUT.with(|s| s.borrow_mut().clear());
    STDERR.with(|s| s.borrow_mut().clear());

    let mut context = Context::default();
    let install = context
        .register_global_callable(
            "__tool_call",
            2,
            boa_engine::native_function::NativeFunction::from_fn_ptr(native_tool_call),
        )
        .and_then(|_| {
            context.register_global_callable(
                "__console_log",
                1,
                boa_engine::native_function::NativeFunction::from_fn_ptr(native_console_log),
            )
        })
        .and_then(|_| {
            context.register_global_callable(
                "__console_error",
                1,
                boa_engine::native_function::NativeFunction::from_fn_ptr(native_console_error),
            )
        });

    if let Err(e) = install {
        return finish(None, Some(format!("internal: failed to install sandbox globals: {e}")), false);
    }

    if let Err(e) = context.eval(Source::from_bytes(PRELUDE)) {
        return finish(None, Some(format!("internal: prelude failed: {e}")), false);
    }

    let wrapped = format!("(async () => {{\n{code}\n}})();");
    let promise_value = match context.eval(Source::from_bytes(wrapped.as_bytes())) {
        Ok(v) => v,
        Err(e) => return classify_error(e),
    };

    // Drain the microtask queue so the async IIFE's continuations (and any
    // `tools.*` calls it awaits, which settle synchronously inside
    // __tool_call) actually run before we inspect the promise.
    if let Err(e) = context.run_jobs() {
        return classify_error(e);
    }

    let Some(obj) = promise_value.as_object().cloned() else {
        // A non-async snippet (no `await`, nothing to wrap) can return a
        // bare value rather than a Promise; treat it as already settled.
        let value = promise_value.to_json(&mut context).ok();
        return finish(value, None, false);
    };

    match JsPromise::from_object(obj) {
        Ok(promise) => match promise.state() {
            Ok(PromiseState::Fulfilled(v)) => {
                let value = v.to_json(&mut context).ok();
                finish(value, None, false)
            }
            Ok(PromiseState::Rejected(v)) => classify_rejection(v, &mut context),
            Ok(PromiseState::Pending) => {
                finish(None, Some("runtime code never settled (unresolved promise)".into()), false)
            }
            Err(e) => finish(None, Some(format!("internal: {e}")), false),
        },
        Err(_) => {
            let value = promise_value.to_json(&mut context).ok();
            finish(value, None, false)
        }
    }
}

fn classify_error(err: JsError) -> SandboxOutcome {
    let msg = err.to_string();
    classify_message(msg)
}

fn classify_rejection(value: JsValue, context: &mut Context) -> SandboxOutcome {
    let msg = value
        .to_string(context)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|_| "unknown rejection".into());
    classify_message(msg)
}

fn classify_message(msg: String) -> SandboxOutcome {
    if let Some(rest) = msg.strip_prefix(DENIED_PREFIX) {
        finish(None, Some(rest.trim().to_string()), true)
    } else if let Some(rest) = msg.strip_prefix(FAILED_PREFIX) {
        finish(None, Some(rest.trim().to_string()), false)
    } else {
        finish(None, Some(msg), false)
    }
}

fn finish(value: Option<serde_json::Value>, error: Option<String>, denied: bool) -> SandboxOutcome {
    let stdout = STDOUT.with(|s| s.borrow().clone());
    let stderr = STDERR.with(|s| s.borrow().clone());
    BRIDGE.with(|b| *b.borrow_mut() = None);
    SandboxOutcome {
        value,
        error,
        denied,
        stdout,
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct EchoBridge;
    impl ToolBridge for EchoBridge {
        fn call(&mut self, tool_path: &str, input: Value) -> Value {
            serde_json::json!({"ok": true, "value": {"path": tool_path, "echo": input}})
        }
    }

    struct DenyBridge;
    impl ToolBridge for DenyBridge {
        fn call(&mut self, _tool_path: &str, _input: Value) -> Value {
            serde_json::json!({"ok": false, "kind": "denied", "error": "policy_deny"})
        }
    }

    #[test]
    fn plain_return_without_await_settles() {
        let outcome = run("return 1 + 1;", Box::new(EchoBridge));
        assert_eq!(outcome.value, Some(serde_json::json!(2)));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn tool_call_round_trips_through_the_bridge() {
        let outcome = run(
            "return await tools.calendar.list({limit: 5});",
            Box::new(EchoBridge),
        );
        assert_eq!(
            outcome.value,
            Some(serde_json::json!({"path": "calendar.list", "echo": {"limit": 5}}))
        );
    }

    #[test]
    fn denied_call_is_catchable() {
        let outcome = run(
            r#"try { await tools.calendar.update({}); return "no"; } catch (e) { return "caught: " + e.message; }"#,
            Box::new(DenyBridge),
        );
        assert_eq!(outcome.value, Some(serde_json::json!("caught: policy_deny")));
    }

    #[test]
    fn uncaught_denial_surfaces_as_denied_error() {
        let outcome = run("await tools.calendar.update({}); return 1;", Box::new(DenyBridge));
        assert!(outcome.denied);
        assert_eq!(outcome.error.as_deref(), Some("policy_deny"));
    }

    #[test]
    fn console_log_is_captured() {
        let outcome = run(r#"console.log("hello", 1); return 0;"#, Box::new(EchoBridge));
        assert!(outcome.stdout.contains("hello 1"));
    }
}
