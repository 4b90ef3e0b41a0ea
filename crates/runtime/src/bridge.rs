//! The synchronous hand-off between a sandboxed JS call site and
//! whatever actually routes a `tools.*` call to component F.
//!
//! The sandbox (boa_engine) is single-threaded and synchronous; a native
//! function it calls must block until an answer is ready rather than
//! return a future. `ToolBridge` is that blocking seam — each runtime
//! adapter supplies a different implementation depending on where F
//! actually lives relative to the sandbox (in-process vs. over stdio).

use serde_json::Value;

/// Blocking call from inside the sandbox out to component F. Returns the
/// wire-shaped envelope from §6.1 (`{ok, value}` / `{ok:false, kind,
/// error}`) as a raw JSON value — the sandbox's JS prelude interprets it.
pub trait ToolBridge {
    fn call(&mut self, tool_path: &str, input: Value) -> Value;
}

/// Bridges the sandbox thread into the async `ToolInvocationService`
/// living on the tokio runtime, for the `local-inproc` adapter.
///
/// Must be constructed and used from a thread that is *not* itself a
/// tokio worker thread driving the same runtime (the adapter spawns the
/// sandbox via `spawn_blocking`, which satisfies this).
pub struct InProcBridge {
    handle: tokio::runtime::Handle,
    invocation: std::sync::Arc<cg_invocation::ToolInvocationService>,
    run_id: String,
}

impl InProcBridge {
    pub fn new(
        handle: tokio::runtime::Handle,
        invocation: std::sync::Arc<cg_invocation::ToolInvocationService>,
        run_id: String,
    ) -> Self {
        Self {
            handle,
            invocation,
            run_id,
        }
    }
}

impl ToolBridge for InProcBridge {
    fn call(&mut self, tool_path: &str, input: Value) -> Value {
        let call = cg_invocation::ToolCallRequest {
            run_id: self.run_id.clone(),
            call_id: uuid::Uuid::new_v4().to_string(),
            tool_path: tool_path.to_string(),
            input,
        };
        let invocation = self.invocation.clone();
        let response = self
            .handle
            .block_on(async move { invocation.handle_call(call).await });
        serde_json::to_value(response).unwrap_or_else(|_| {
            serde_json::json!({"ok": false, "kind": "failed", "error": "internal"})
        })
    }
}

/// Bridges the sandbox running inside `cg-sandbox-host` out to its own
/// stdin/stdout, one JSON-RPC request per `tools.*` call, matched to the
/// reply by id (§4.G subprocess adapter). Entirely synchronous — the
/// sandbox that calls it is itself synchronous and single-threaded, so
/// there is no tokio runtime to hop through here.
pub struct StdioBridge {
    next_id: std::cell::Cell<u64>,
}

impl StdioBridge {
    pub fn new() -> Self {
        Self {
            next_id: std::cell::Cell::new(1),
        }
    }
}

impl Default for StdioBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn bridge_internal_error() -> Value {
    serde_json::json!({"ok": false, "kind": "failed", "error": "internal"})
}

impl ToolBridge for StdioBridge {
    fn call(&mut self, tool_path: &str, input: Value) -> Value {
        use std::io::{BufRead, Write};

        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let call_id = uuid::Uuid::new_v4().to_string();
        let request = cg_mcp_client::protocol::JsonRpcRequest::new(
            id,
            "tools.call",
            Some(serde_json::json!({
                "callId": call_id,
                "toolPath": tool_path,
                "input": input,
            })),
        );
        let Ok(line) = serde_json::to_string(&request) else {
            return bridge_internal_error();
        };

        {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if writeln!(out, "{line}").is_err() || out.flush().is_err() {
                return bridge_internal_error();
            }
        }

        let stdin = std::io::stdin();
        let mut buf = String::new();
        loop {
            buf.clear();
            match stdin.lock().read_line(&mut buf) {
                Ok(0) => return serde_json::json!({"ok": false, "kind": "failed", "error": "parent closed stdin"}),
                Ok(_) => {}
                Err(_) => return bridge_internal_error(),
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(response) = serde_json::from_str::<cg_mcp_client::protocol::JsonRpcResponse>(trimmed) else {
                continue;
            };
            if response.id != id {
                continue;
            }
            return response.result.unwrap_or_else(bridge_internal_error);
        }
    }
}
