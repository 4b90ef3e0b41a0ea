//! Ties H (lifecycle), the registry's pinned snapshot, F (invocation),
//! and G (this crate's `RuntimeDispatcher`) into the one end-to-end path
//! a submitted Run actually takes (§4.G, §4.H, §5 concurrency model).

use std::sync::Arc;
use std::time::Instant;

use cg_domain::{Run, RunEventKind, RunStatus};
use cg_invocation::ToolInvocationService;
use cg_lifecycle::RunLifecycleManager;
use cg_registry::WorkspaceRegistry;

use crate::{ExecuteRequest, ExecuteStatus, RuntimeDispatcher};

/// Drives one Run from `queued` to a terminal status: pins the
/// workspace's current tool snapshot for the duration of the run,
/// dispatches to the adapter the run requested, and maps the adapter's
/// outcome back onto H's state machine and event stream.
pub struct RuntimeOrchestrator {
    lifecycle: Arc<RunLifecycleManager>,
    invocation: Arc<ToolInvocationService>,
    registry: Arc<WorkspaceRegistry>,
    dispatcher: Arc<RuntimeDispatcher>,
}

impl RuntimeOrchestrator {
    pub fn new(
        lifecycle: Arc<RunLifecycleManager>,
        invocation: Arc<ToolInvocationService>,
        registry: Arc<WorkspaceRegistry>,
        dispatcher: Arc<RuntimeDispatcher>,
    ) -> Self {
        Self {
            lifecycle,
            invocation,
            registry,
            dispatcher,
        }
    }

    /// Run a single submitted Run to completion. Intended to be spawned
    /// as its own task immediately after `RunLifecycleManager::submit`
    /// returns, so the HTTP/MCP caller that submitted the run never
    /// blocks on its execution.
    pub async fn drive(&self, run: Run) {
        let run_id = run.id.clone();
        let snapshot = self.registry.current_snapshot(&run.context.workspace_id);
        self.invocation.pin_snapshot(&run_id, snapshot);

        if self.lifecycle.transition(&run_id, RunStatus::Running).await.is_err() {
            self.invocation.unpin_snapshot(&run_id);
            return;
        }

        let adapter = self.dispatcher.adapter_for(Some(run.runtime_kind));
        if !adapter.is_available() {
            self.finish_failed(&run_id, "runtime_error: adapter unavailable").await;
            return;
        }

        let started = Instant::now();
        let result = adapter
            .execute(ExecuteRequest {
                run_id: run_id.clone(),
                code: run.code.clone(),
                timeout_ms: run.timeout_ms,
            })
            .await;

        // A cancellation or separate timeout could have already moved the
        // run to a terminal state (e.g. via `cancel()`) while the adapter
        // was running; don't clobber it with the adapter's own outcome.
        let still_live = self.lifecycle.get(&run_id).map(|r| !r.status.is_terminal()).unwrap_or(false);
        if !still_live {
            self.invocation.unpin_snapshot(&run_id);
            return;
        }

        self.lifecycle
            .emit_event(
                &run_id,
                RunEventKind::CodeRun {
                    index: 0,
                    stdout: result.stdout,
                    stderr: result.stderr,
                    duration_ms: started.elapsed().as_millis() as u64,
                },
            )
            .await
            .ok();

        match result.status {
            ExecuteStatus::Completed => {
                let _ = self.lifecycle.transition(&run_id, RunStatus::Completed).await;
                let _ = self
                    .lifecycle
                    .emit_event(
                        &run_id,
                        RunEventKind::Completed {
                            value: result.value,
                            message: None,
                            code_runs: 1,
                        },
                    )
                    .await;
            }
            ExecuteStatus::Denied => {
                let _ = self.lifecycle.transition(&run_id, RunStatus::Denied).await;
                let _ = self
                    .lifecycle
                    .emit_event(&run_id, RunEventKind::Denied { reason: result.error })
                    .await;
            }
            ExecuteStatus::Failed => {
                self.finish_failed(&run_id, result.error.as_deref().unwrap_or("runtime_error")).await;
            }
            ExecuteStatus::TimedOut => {
                let _ = self.lifecycle.timeout(&run_id).await;
            }
        }

        self.invocation.unpin_snapshot(&run_id);
    }

    async fn finish_failed(&self, run_id: &str, message: &str) {
        let _ = self.lifecycle.transition(run_id, RunStatus::Failed).await;
        let _ = self
            .lifecycle
            .emit_event(run_id, RunEventKind::Failed { error: message.to_string() })
            .await;
    }
}
