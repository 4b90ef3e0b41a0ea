//! `codegate run` — submit a single code run from the command line and
//! print its result. Useful for scripting and quick sanity checks without
//! standing up the HTTP server.

use std::io::Read as _;
use std::sync::Arc;

use cg_domain::config::Config;
use cg_domain::{Actor, ExecutionContext, RunEventKind, RuntimeKind};

use crate::bootstrap::{self, DEFAULT_WORKSPACE};

fn parse_runtime_kind(raw: &str) -> anyhow::Result<RuntimeKind> {
    match raw {
        "local_inproc" => Ok(RuntimeKind::LocalInproc),
        "subprocess" => Ok(RuntimeKind::Subprocess),
        "remote_worker" => Ok(RuntimeKind::RemoteWorker),
        other => anyhow::bail!("unknown runtime kind '{other}' (expected local_inproc, subprocess, or remote_worker)"),
    }
}

fn read_code(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))
    }
}

pub async fn run(
    config: Arc<Config>,
    path: String,
    runtime: Option<String>,
    timeout_ms: Option<u64>,
    json_output: bool,
) -> anyhow::Result<()> {
    let code = read_code(&path)?;
    let runtime_kind = match runtime {
        Some(raw) => parse_runtime_kind(&raw)?,
        None => config.runtime.default_adapter,
    };
    let timeout_ms = timeout_ms
        .unwrap_or(config.runtime.default_timeout_ms)
        .min(config.runtime.max_timeout_ms);

    let state = bootstrap::build_app_state(config).await?;

    let context = ExecutionContext {
        actor: Actor::Service { id: "cli".into() },
        workspace_id: DEFAULT_WORKSPACE.to_string(),
        organization_id: None,
        client_id: Some("cli".into()),
        tags: Vec::new(),
    };

    let submitted = state.lifecycle.submit(context, code, runtime_kind, timeout_ms).await?;
    let run_id = submitted.id.clone();

    let orchestrator = state.orchestrator.clone();
    let driven = submitted.clone();
    tokio::spawn(async move {
        orchestrator.drive(driven).await;
    });

    let mut after_seq: u64 = 0;
    let mut exit_code: i32 = 0;
    let mut collected = Vec::new();

    loop {
        let events = state.lifecycle.wait_for_next(&run_id, after_seq).await?;
        let mut terminal = false;
        for event in events {
            after_seq = event.seq;
            if json_output {
                collected.push(serde_json::to_value(&event)?);
            } else {
                print_event(&event.kind, &mut exit_code);
            }
            terminal = terminal || event.kind.is_terminal();
        }
        if terminal {
            break;
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&collected)?);
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

fn print_event(kind: &RunEventKind, exit_code: &mut i32) {
    match kind {
        RunEventKind::AwaitingApproval { tool_path, .. } => {
            eprintln!("\x1b[2m[awaiting approval: {tool_path}]\x1b[0m");
        }
        RunEventKind::CodeRun { stdout, stderr, .. } => {
            if !stdout.is_empty() {
                print!("{stdout}");
            }
            if !stderr.is_empty() {
                eprint!("{stderr}");
            }
        }
        RunEventKind::Completed { value, .. } => {
            if let Some(value) = value {
                println!("{value}");
            }
        }
        RunEventKind::Failed { error } => {
            eprintln!("error: {error}");
            *exit_code = 1;
        }
        RunEventKind::TimedOut => {
            eprintln!("run timed out");
            *exit_code = 1;
        }
        RunEventKind::Denied { reason } => {
            eprintln!("run denied: {}", reason.as_deref().unwrap_or("policy"));
            *exit_code = 1;
        }
        RunEventKind::Backpressure { dropped } => {
            eprintln!("\x1b[2m[dropped {dropped} events under backpressure]\x1b[0m");
        }
    }
}
