//! `cg-sandbox-host` — the child process the `subprocess` runtime
//! adapter spawns (§4.G). Reads one `run` request from stdin, runs the
//! sandbox synchronously on the main thread, routing every `tools.*`
//! call back to the parent as a `tools.call` JSON-RPC request over its
//! own stdout, and finally writes one `result` response before exiting.
//!
//! Deliberately has no tokio runtime of its own: boa_engine is
//! single-threaded and synchronous, and so is every line of this file.

use std::io::{BufRead, Write};

use cg_mcp_client::protocol::{JsonRpcRequest, JsonRpcResponse};
use cg_runtime::bridge::StdioBridge;
use cg_runtime::{sandbox, ExecuteResult, ExecuteStatus};

fn main() {
    let stdin = std::io::stdin();
    let mut line = String::new();
    if stdin.lock().read_line(&mut line).is_err() || line.trim().is_empty() {
        std::process::exit(1);
    }

    let Ok(request) = serde_json::from_str::<JsonRpcRequest>(line.trim()) else {
        std::process::exit(1);
    };

    let params = request.params.unwrap_or(serde_json::json!({}));
    let code = params
        .get("code")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let started = std::time::Instant::now();
    let outcome = sandbox::run(&code, Box::new(StdioBridge::new()));
    let duration_ms = started.elapsed().as_millis() as u64;

    let result = if outcome.denied {
        ExecuteResult {
            status: ExecuteStatus::Denied,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            value: None,
            error: outcome.error,
            exit_code: None,
            duration_ms,
        }
    } else if let Some(error) = outcome.error {
        ExecuteResult {
            status: ExecuteStatus::Failed,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            value: None,
            error: Some(error),
            exit_code: None,
            duration_ms,
        }
    } else {
        ExecuteResult {
            status: ExecuteStatus::Completed,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            value: outcome.value,
            error: None,
            exit_code: None,
            duration_ms,
        }
    };

    let response = JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id: 0,
        result: serde_json::to_value(result).ok(),
        error: None,
    };

    if let Ok(line) = serde_json::to_string(&response) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}
