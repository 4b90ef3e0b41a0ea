//! The `subprocess` adapter (§4.G): hosts the sandbox in a
//! `cg-sandbox-host` child process and speaks JSON-RPC over stdio —
//! the child's one `tools.*` call becomes one `tools.call` request back
//! to us, which we answer by routing straight into F, exactly as the
//! `local-inproc` adapter does, just with an extra line of JSON in
//! between.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cg_domain::config::SubprocessRuntimeConfig;
use cg_domain::RuntimeKind;
use cg_invocation::{ToolCallRequest, ToolInvocationService};
use cg_mcp_client::protocol::{JsonRpcRequest, JsonRpcResponse};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::{ExecuteRequest, ExecuteResult, ExecuteStatus, RuntimeAdapter};

/// Extra time beyond the run's own deadline allowed for process spawn
/// and teardown overhead before we give up on the child entirely.
const SPAWN_GRACE_MS: u64 = 2_000;

pub struct SubprocessAdapter {
    invocation: Arc<ToolInvocationService>,
    config: SubprocessRuntimeConfig,
}

impl SubprocessAdapter {
    pub fn new(invocation: Arc<ToolInvocationService>, config: SubprocessRuntimeConfig) -> Self {
        Self { invocation, config }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolsCallParams {
    call_id: String,
    tool_path: String,
    #[serde(default)]
    input: serde_json::Value,
}

fn failed_result(error: impl Into<String>, started: Instant) -> ExecuteResult {
    ExecuteResult {
        status: ExecuteStatus::Failed,
        stdout: String::new(),
        stderr: String::new(),
        value: None,
        error: Some(error.into()),
        exit_code: None,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

#[async_trait]
impl RuntimeAdapter for SubprocessAdapter {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Subprocess
    }

    fn is_available(&self) -> bool {
        self.config.enabled && self.config.host_binary.is_some()
    }

    async fn execute(&self, request: ExecuteRequest) -> ExecuteResult {
        let started = Instant::now();
        let Some(binary) = self.config.host_binary.clone() else {
            return failed_result("subprocess adapter not configured", started);
        };

        let mut child = match Command::new(&binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return failed_result(format!("failed to spawn sandbox host: {e}"), started),
        };

        let Some(mut stdin) = child.stdin.take() else {
            return failed_result("failed to capture sandbox host stdin", started);
        };
        let Some(stdout) = child.stdout.take() else {
            return failed_result("failed to capture sandbox host stdout", started);
        };
        let mut lines = BufReader::new(stdout).lines();

        let run_request = JsonRpcRequest::new(
            0,
            "run",
            Some(serde_json::json!({
                "runId": request.run_id,
                "code": request.code,
                "timeoutMs": request.timeout_ms,
            })),
        );
        let Ok(line) = serde_json::to_string(&run_request) else {
            let _ = child.start_kill();
            return failed_result("internal: failed to encode run request", started);
        };
        if let Err(e) = write_line(&mut stdin, &line).await {
            let _ = child.start_kill();
            return failed_result(format!("failed to write to sandbox host: {e}"), started);
        }

        let deadline = Duration::from_millis(request.timeout_ms + SPAWN_GRACE_MS);
        let run_id = request.run_id.clone();
        let invocation = self.invocation.clone();

        let conversation = async move {
            loop {
                let Some(text) = lines.next_line().await.map_err(|e| e.to_string())? else {
                    return Err("sandbox host closed stdout before returning a result".to_string());
                };
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let value: serde_json::Value =
                    serde_json::from_str(trimmed).map_err(|e| e.to_string())?;

                if value.get("method").is_some() {
                    let req: JsonRpcRequest = serde_json::from_value(value).map_err(|e| e.to_string())?;
                    let params: ToolsCallParams = req
                        .params
                        .and_then(|p| serde_json::from_value(p).ok())
                        .ok_or_else(|| "malformed tools.call request".to_string())?;

                    let response = invocation
                        .handle_call(ToolCallRequest {
                            run_id: run_id.clone(),
                            call_id: params.call_id,
                            tool_path: params.tool_path,
                            input: params.input,
                        })
                        .await;

                    let reply = JsonRpcResponse {
                        jsonrpc: "2.0".into(),
                        id: req.id,
                        result: Some(serde_json::to_value(response).map_err(|e| e.to_string())?),
                        error: None,
                    };
                    let reply_line = serde_json::to_string(&reply).map_err(|e| e.to_string())?;
                    write_line(&mut stdin, &reply_line).await.map_err(|e| e.to_string())?;
                } else {
                    let resp: JsonRpcResponse = serde_json::from_value(value).map_err(|e| e.to_string())?;
                    if resp.id == 0 {
                        return Ok(resp);
                    }
                }
            }
        };

        let outcome = tokio::time::timeout(deadline, conversation).await;
        let _ = child.start_kill();

        match outcome {
            Ok(Ok(resp)) => match resp.error {
                Some(e) => failed_result(e.to_string(), started),
                None => match resp.result.and_then(|v| serde_json::from_value::<ExecuteResult>(v).ok()) {
                    Some(result) => result,
                    None => failed_result("sandbox host returned a malformed result", started),
                },
            },
            Ok(Err(e)) => failed_result(e, started),
            Err(_elapsed) => ExecuteResult {
                status: ExecuteStatus::TimedOut,
                stdout: String::new(),
                stderr: String::new(),
                value: None,
                error: Some("run deadline elapsed".into()),
                exit_code: None,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        }
    }
}

async fn write_line(stdin: &mut tokio::process::ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}
