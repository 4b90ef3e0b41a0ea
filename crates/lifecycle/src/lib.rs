//! Run lifecycle manager (component H, SPEC_FULL §4.H).
//!
//! Owns the Run state machine, event emission, cancellation, and output
//! streaming. Only this crate writes a Run's status; every other
//! component reads a Run (or its `RunSession`) through the accessors
//! here.

mod store;

pub use store::{InMemoryStateStore, JsonlStateStore, StateStore};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cg_approval::ApprovalCoordinator;
use cg_domain::{Error, ExecutionContext, Result, Run, RunEvent, RunEventKind, RunStatus, RuntimeKind, TraceEvent};
use parking_lot::Mutex;
use tokio::sync::Notify;

const EVENT_QUEUE_HIGH_WATER_MARK: usize = 10_000;

/// Per-run in-memory handle held by H while the run is live (§3
/// `RunSession`). Destroyed on terminal drain (after a retention TTL).
struct RunSession {
    events: VecDeque<RunEvent>,
    notify: Arc<Notify>,
    completed: bool,
    dropped_events: u64,
    /// Receipts recorded by F for at-most-once callback replay (§4.F).
    receipts: HashMap<String, serde_json::Value>,
    terminal_drained_at: Option<Instant>,
}

impl RunSession {
    fn new() -> Self {
        Self {
            events: VecDeque::new(),
            notify: Arc::new(Notify::new()),
            completed: false,
            dropped_events: 0,
            receipts: HashMap::new(),
            terminal_drained_at: None,
        }
    }
}

pub struct RunLifecycleManager {
    store: Arc<dyn StateStore>,
    approvals: Arc<ApprovalCoordinator>,
    runs: Mutex<HashMap<String, Run>>,
    sessions: Mutex<HashMap<String, RunSession>>,
    retention: Duration,
}

impl RunLifecycleManager {
    pub fn new(store: Arc<dyn StateStore>, approvals: Arc<ApprovalCoordinator>, retention: Duration) -> Self {
        Self {
            store,
            approvals,
            runs: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            retention,
        }
    }

    pub async fn submit(
        &self,
        context: ExecutionContext,
        code: String,
        runtime_kind: RuntimeKind,
        timeout_ms: u64,
    ) -> Result<Run> {
        let run = Run {
            id: uuid::Uuid::new_v4().to_string(),
            context,
            runtime_kind,
            code,
            timeout_ms,
            status: RunStatus::Queued,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            terminal_payload: None,
            code_run_count: 0,
            event_seq: 0,
        };

        self.runs.lock().insert(run.id.clone(), run.clone());
        self.sessions.lock().insert(run.id.clone(), RunSession::new());
        self.store.save_run(&run).await.map_err(|e| Error::Internal(e.to_string()))?;

        TraceEvent::RunSubmitted {
            run_id: run.id.clone(),
            workspace_id: run.context.workspace_id.clone(),
            adapter: run.runtime_kind.to_string(),
        }
        .emit();

        Ok(run)
    }

    pub fn get(&self, run_id: &str) -> Option<Run> {
        self.runs.lock().get(run_id).cloned()
    }

    /// Runs currently held in memory for a workspace, newest first. Used
    /// by the control plane's listing endpoint; does not consult the
    /// durable store, so a run reaped after its retention TTL (§4.H)
    /// drops out of this list along with its session.
    pub fn list(&self, workspace_id: &str) -> Vec<Run> {
        let mut runs: Vec<Run> = self
            .runs
            .lock()
            .values()
            .filter(|r| r.context.workspace_id == workspace_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs
    }

    /// Transition a run's status, enforcing the §4.H state machine and
    /// persisting the new status. Returns `internal` if the transition is
    /// illegal — a violated invariant, never a normal-path error.
    pub async fn transition(&self, run_id: &str, next: RunStatus) -> Result<()> {
        let from = {
            let mut runs = self.runs.lock();
            let run = runs
                .get_mut(run_id)
                .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
            if !run.status.can_transition_to(next) {
                return Err(Error::Internal(format!(
                    "illegal run transition {:?} -> {:?}",
                    run.status, next
                )));
            }
            let from = run.status;
            run.status = next;
            match next {
                RunStatus::Running if run.started_at.is_none() => {
                    run.started_at = Some(chrono::Utc::now());
                }
                _ if next.is_terminal() => {
                    run.completed_at = Some(chrono::Utc::now());
                }
                _ => {}
            }
            from
        };

        TraceEvent::RunTransitioned {
            run_id: run_id.to_string(),
            from: format!("{from:?}"),
            to: format!("{next:?}"),
        }
        .emit();

        let run = self.get(run_id).expect("run exists, just transitioned");
        self.store.save_run(&run).await.map_err(|e| Error::Internal(e.to_string()))?;
        Ok(())
    }

    /// Append an event to a run's ordered stream, waking any consumer
    /// blocked on `wait_for_next`. Terminal events are never dropped under
    /// backpressure; the oldest non-terminal event is dropped instead and
    /// a `Backpressure` marker event is appended in its place.
    pub async fn emit_event(&self, run_id: &str, kind: RunEventKind) -> Result<()> {
        let event = {
            let mut runs = self.runs.lock();
            let run = runs
                .get_mut(run_id)
                .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
            run.event_seq += 1;
            RunEvent {
                run_id: run_id.to_string(),
                seq: run.event_seq,
                kind,
            }
        };

        self.store.append_event(&event).await.map_err(|e| Error::Internal(e.to_string()))?;

        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(run_id) {
            let is_terminal = event.kind.is_terminal();
            if session.events.len() >= EVENT_QUEUE_HIGH_WATER_MARK && !is_terminal {
                session.events.pop_front();
                session.dropped_events += 1;
            }
            session.events.push_back(event);
            if is_terminal {
                session.completed = true;
            }
            session.notify.notify_waiters();
        }
        Ok(())
    }

    /// Block until at least one new event is available for `run_id`,
    /// returning every event emitted since `after_seq` (FIFO order).
    pub async fn wait_for_next(&self, run_id: &str, after_seq: u64) -> Result<Vec<RunEvent>> {
        loop {
            let notify = {
                let sessions = self.sessions.lock();
                let session = sessions
                    .get(run_id)
                    .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
                let pending: Vec<RunEvent> = session
                    .events
                    .iter()
                    .filter(|e| e.seq > after_seq)
                    .cloned()
                    .collect();
                if !pending.is_empty() {
                    return Ok(pending);
                }
                session.notify.clone()
            };
            notify.notified().await;
        }
    }

    /// At-most-once receipt recording for F (§4.F, §8 property 3).
    pub fn record_receipt(&self, run_id: &str, call_id: &str, value: serde_json::Value) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(run_id) {
            session.receipts.entry(call_id.to_string()).or_insert(value);
        }
    }

    pub fn get_receipt(&self, run_id: &str, call_id: &str) -> Option<serde_json::Value> {
        self.sessions.lock().get(run_id)?.receipts.get(call_id).cloned()
    }

    /// `cancel(runId, actorId)` — transitions to `denied`, resolves every
    /// outstanding approval for the run as `denied`, and lets the runtime
    /// adapter's cooperative cancellation signal handle aborting the
    /// in-flight execution (the adapter owns that handle, not H).
    pub async fn cancel(&self, run_id: &str, actor_id: &str) -> Result<()> {
        let run = self.get(run_id).ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if run.context.actor.id() != actor_id {
            return Err(Error::Unauthorized(format!(
                "actor {actor_id} may not cancel run {run_id}"
            )));
        }
        if run.status.is_terminal() {
            return Ok(());
        }

        self.approvals.deny_all(run_id);
        self.transition(run_id, RunStatus::Denied).await?;
        self.emit_event(run_id, RunEventKind::Denied { reason: Some("cancelled".into()) })
            .await?;

        TraceEvent::RunCancelled {
            run_id: run_id.to_string(),
            reason: "cancelled_by_actor".into(),
        }
        .emit();
        Ok(())
    }

    /// Called by G when a run's deadline elapses.
    pub async fn timeout(&self, run_id: &str) -> Result<()> {
        let run = self.get(run_id).ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if run.status.is_terminal() {
            return Ok(());
        }

        self.approvals.deny_all(run_id);
        self.transition(run_id, RunStatus::TimedOut).await?;
        self.emit_event(run_id, RunEventKind::TimedOut).await?;

        TraceEvent::RunTimedOut {
            run_id: run_id.to_string(),
            timeout_ms: run.timeout_ms,
        }
        .emit();
        Ok(())
    }

    /// Reclaim sessions whose terminal event has been drained for longer
    /// than the configured retention TTL. Call periodically from a
    /// background task; never blocks on I/O other than the store-free
    /// in-memory sweep.
    pub fn reap_expired_sessions(&self) {
        let mut sessions = self.sessions.lock();
        let retention = self.retention;
        sessions.retain(|run_id, session| {
            let expired = session
                .terminal_drained_at
                .is_some_and(|at| at.elapsed() > retention);
            if expired {
                self.approvals.forget_run(run_id);
            }
            !expired
        });
    }

    /// Mark a session's terminal event as drained by a consumer, starting
    /// the retention countdown.
    pub fn mark_drained(&self, run_id: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(run_id) {
            if session.completed && session.terminal_drained_at.is_none() {
                session.terminal_drained_at = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::Actor;

    fn context() -> ExecutionContext {
        ExecutionContext {
            actor: Actor::User { id: "u1".into() },
            workspace_id: "ws1".into(),
            organization_id: None,
            client_id: None,
            tags: vec![],
        }
    }

    fn manager() -> RunLifecycleManager {
        RunLifecycleManager::new(
            Arc::new(InMemoryStateStore::default()),
            Arc::new(ApprovalCoordinator::new(500)),
            Duration::from_secs(120),
        )
    }

    #[tokio::test]
    async fn submit_then_transition_to_running() {
        let m = manager();
        let run = m.submit(context(), "return 1;".into(), RuntimeKind::LocalInproc, 5000).await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        m.transition(&run.id, RunStatus::Running).await.unwrap();
        assert_eq!(m.get(&run.id).unwrap().status, RunStatus::Running);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let m = manager();
        let run = m.submit(context(), "x".into(), RuntimeKind::LocalInproc, 1000).await.unwrap();
        let err = m.transition(&run.id, RunStatus::Completed).await.unwrap_err();
        assert_eq!(err.kind(), "internal");
    }

    #[tokio::test]
    async fn cancel_by_wrong_actor_is_unauthorized() {
        let m = manager();
        let run = m.submit(context(), "x".into(), RuntimeKind::LocalInproc, 1000).await.unwrap();
        let err = m.cancel(&run.id, "someone-else").await.unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }

    #[tokio::test]
    async fn cancel_transitions_to_denied() {
        let m = manager();
        let run = m.submit(context(), "x".into(), RuntimeKind::LocalInproc, 1000).await.unwrap();
        m.transition(&run.id, RunStatus::Running).await.unwrap();
        m.cancel(&run.id, "u1").await.unwrap();
        assert_eq!(m.get(&run.id).unwrap().status, RunStatus::Denied);
    }

    #[tokio::test]
    async fn receipts_are_recorded_once() {
        let m = manager();
        let run = m.submit(context(), "x".into(), RuntimeKind::LocalInproc, 1000).await.unwrap();
        m.record_receipt(&run.id, "call1", serde_json::json!({"ok": true}));
        m.record_receipt(&run.id, "call1", serde_json::json!({"ok": false}));
        assert_eq!(m.get_receipt(&run.id, "call1"), Some(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn events_delivered_in_order() {
        let m = manager();
        let run = m.submit(context(), "x".into(), RuntimeKind::LocalInproc, 1000).await.unwrap();
        m.transition(&run.id, RunStatus::Running).await.unwrap();
        m.emit_event(&run.id, RunEventKind::CodeRun { index: 0, stdout: "hi".into(), stderr: String::new(), duration_ms: 5 }).await.unwrap();
        m.emit_event(&run.id, RunEventKind::Completed { value: Some(serde_json::json!(1)), message: None, code_runs: 1 }).await.unwrap();
        let events = m.wait_for_next(&run.id, 0).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].seq < events[1].seq);
    }
}
