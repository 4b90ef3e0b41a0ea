//! Approval coordinator (component E, SPEC_FULL §4.E).
//!
//! Per-Run state: at most one outstanding [`ApprovalRequest`], plus a
//! waiter queue for callers that arrive while one is pending. Resolution
//! is exposed as `resolve(run_id, approval_id, actor_id, outcome)`,
//! rejecting mismatched actors and stale/duplicate resolutions.

mod sanitize;

pub use sanitize::sanitize_preview;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use cg_domain::{ApprovalDecision, ApprovalOutcome, ApprovalRequest, ApprovalStatus};
use parking_lot::Mutex;
use tokio::sync::oneshot;

struct PendingSlot {
    request: ApprovalRequest,
    requester_actor_id: String,
    decision_tx: oneshot::Sender<ApprovalOutcome>,
}

#[derive(Default)]
struct RunApprovals {
    pending: Option<PendingSlot>,
    /// FIFO of callers waiting for the slot to free. Each entry is woken
    /// (sent `()`) when the current pending request resolves.
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Emitted whenever a request becomes the run's pending approval, so an
/// external UI (dashboard, MCP elicitation) can render it. The coordinator
/// does not itself own delivery of this event to clients.
pub trait ApprovalEventSink: Send + Sync {
    fn on_awaiting_approval(&self, run_id: &str, request: &ApprovalRequest);
}

pub struct NullEventSink;
impl ApprovalEventSink for NullEventSink {
    fn on_awaiting_approval(&self, _: &str, _: &ApprovalRequest) {}
}

pub enum ResolveOutcome {
    Resolved,
    NotFound,
    Unauthorized,
}

pub struct ApprovalCoordinator {
    runs: Mutex<HashMap<String, RunApprovals>>,
    preview_char_limit: usize,
    sink: Mutex<Arc<dyn ApprovalEventSink>>,
}

impl ApprovalCoordinator {
    pub fn new(preview_char_limit: usize) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            preview_char_limit,
            sink: Mutex::new(Arc::new(NullEventSink)),
        }
    }

    pub fn with_sink(self, sink: Arc<dyn ApprovalEventSink>) -> Self {
        *self.sink.lock() = sink;
        self
    }

    /// Replace the event sink after construction. Used by the gateway's
    /// bootstrap to close the cycle between this coordinator and the
    /// lifecycle manager that owns it, without needing both wrapped in
    /// the same `Arc` up front.
    pub fn set_sink(&self, sink: Arc<dyn ApprovalEventSink>) {
        *self.sink.lock() = sink;
    }

    /// Acquire the approval slot for `run_id` (enqueueing behind any
    /// currently pending request), materialize an `ApprovalRequest`, emit
    /// the `awaiting_approval` event, then suspend until a decision
    /// arrives. The Run's own deadline is the only timeout — this call has
    /// none of its own.
    pub async fn request_approval(
        &self,
        run_id: &str,
        tool_id: &str,
        requester_actor_id: &str,
        raw_input: &serde_json::Value,
    ) -> ApprovalOutcome {
        loop {
            let wait = {
                let mut runs = self.runs.lock();
                let state = runs.entry(run_id.to_string()).or_default();
                if state.pending.is_none() {
                    None
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Some(rx)
                }
            };
            match wait {
                None => break,
                Some(rx) => {
                    // Woken when the current pending request resolves;
                    // loop back to re-check (another waiter may have won
                    // the race).
                    let _ = rx.await;
                }
            }
        }

        let approval_id = uuid::Uuid::new_v4().to_string();
        let preview = sanitize_preview(raw_input, self.preview_char_limit);
        let request = ApprovalRequest {
            id: approval_id.clone(),
            run_id: run_id.to_string(),
            tool_id: tool_id.to_string(),
            input_preview: preview,
            status: ApprovalStatus::Pending,
        };

        let (decision_tx, decision_rx) = oneshot::channel();
        {
            let mut runs = self.runs.lock();
            let state = runs.entry(run_id.to_string()).or_default();
            state.pending = Some(PendingSlot {
                request: request.clone(),
                requester_actor_id: requester_actor_id.to_string(),
                decision_tx,
            });
        }

        self.sink.lock().clone().on_awaiting_approval(run_id, &request);

        decision_rx.await.unwrap_or(ApprovalOutcome::Denied)
    }

    /// Submit a decision for `run_id`'s currently pending approval.
    pub fn resolve_for_run(&self, run_id: &str, decision: ApprovalDecision) -> ResolveOutcome {
        let mut runs = self.runs.lock();
        let Some(state) = runs.get_mut(run_id) else {
            return ResolveOutcome::NotFound;
        };
        self.resolve_in_state(state, decision)
    }

    fn resolve_in_state(&self, state: &mut RunApprovals, decision: ApprovalDecision) -> ResolveOutcome {
        let Some(pending) = &state.pending else {
            return ResolveOutcome::NotFound;
        };
        if pending.request.id != decision.approval_id {
            return ResolveOutcome::NotFound;
        }
        if pending.requester_actor_id != decision.actor.id() {
            return ResolveOutcome::Unauthorized;
        }

        let slot = state.pending.take().unwrap();
        let _ = slot.decision_tx.send(decision.outcome);
        if let Some(next) = state.waiters.pop_front() {
            let _ = next.send(());
        }
        ResolveOutcome::Resolved
    }

    /// Resolve the run's pending approval (if any) as denied, and release
    /// every queued waiter so they re-observe the slot as free and then
    /// fail on the run's own terminal-state check. Used by cancellation
    /// and timeout (§4.H).
    pub fn deny_all(&self, run_id: &str) {
        let mut runs = self.runs.lock();
        if let Some(state) = runs.get_mut(run_id) {
            if let Some(slot) = state.pending.take() {
                let _ = slot.decision_tx.send(ApprovalOutcome::Denied);
            }
            while let Some(waiter) = state.waiters.pop_front() {
                let _ = waiter.send(());
            }
        }
    }

    pub fn forget_run(&self, run_id: &str) {
        self.runs.lock().remove(run_id);
    }

    /// The run's currently pending approval request, if any. Used by the
    /// control plane to list outstanding approvals across runs without
    /// exposing the coordinator's internal waiter queues.
    pub fn pending_for_run(&self, run_id: &str) -> Option<ApprovalRequest> {
        self.runs.lock().get(run_id)?.pending.as_ref().map(|p| p.request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::Actor;

    fn decision(approval_id: &str, actor_id: &str, outcome: ApprovalOutcome) -> ApprovalDecision {
        ApprovalDecision {
            approval_id: approval_id.into(),
            outcome,
            actor: Actor::User {
                id: actor_id.into(),
            },
        }
    }

    #[tokio::test]
    async fn approve_resolves_the_waiting_future() {
        let coordinator = Arc::new(ApprovalCoordinator::new(500));
        let c2 = coordinator.clone();
        let handle = tokio::spawn(async move {
            c2.request_approval("run1", "calendar.update", "u1", &serde_json::json!({}))
                .await
        });

        // Give the request a moment to register as pending.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let approval_id = {
            let runs = coordinator.runs.lock();
            runs.get("run1").unwrap().pending.as_ref().unwrap().request.id.clone()
        };

        let outcome = coordinator.resolve_for_run(
            "run1",
            decision(&approval_id, "u1", ApprovalOutcome::Approved),
        );
        assert!(matches!(outcome, ResolveOutcome::Resolved));
        assert!(matches!(handle.await.unwrap(), ApprovalOutcome::Approved));
    }

    #[tokio::test]
    async fn wrong_actor_is_unauthorized() {
        let coordinator = Arc::new(ApprovalCoordinator::new(500));
        let c2 = coordinator.clone();
        let handle = tokio::spawn(async move {
            c2.request_approval("run1", "calendar.update", "u1", &serde_json::json!({}))
                .await
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let approval_id = {
            let runs = coordinator.runs.lock();
            runs.get("run1").unwrap().pending.as_ref().unwrap().request.id.clone()
        };

        let outcome = coordinator.resolve_for_run(
            "run1",
            decision(&approval_id, "someone-else", ApprovalOutcome::Approved),
        );
        assert!(matches!(outcome, ResolveOutcome::Unauthorized));
        coordinator.deny_all("run1");
        let _ = handle.await;
    }

    #[tokio::test]
    async fn duplicate_resolution_is_not_found() {
        let coordinator = Arc::new(ApprovalCoordinator::new(500));
        let c2 = coordinator.clone();
        let handle = tokio::spawn(async move {
            c2.request_approval("run1", "calendar.update", "u1", &serde_json::json!({}))
                .await
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let approval_id = {
            let runs = coordinator.runs.lock();
            runs.get("run1").unwrap().pending.as_ref().unwrap().request.id.clone()
        };

        coordinator.resolve_for_run("run1", decision(&approval_id, "u1", ApprovalOutcome::Approved));
        let second = coordinator.resolve_for_run("run1", decision(&approval_id, "u1", ApprovalOutcome::Approved));
        assert!(matches!(second, ResolveOutcome::NotFound));
        let _ = handle.await;
    }

    #[tokio::test]
    async fn second_request_queues_behind_first() {
        let coordinator = Arc::new(ApprovalCoordinator::new(500));
        let c1 = coordinator.clone();
        let first = tokio::spawn(async move {
            c1.request_approval("run1", "a", "u1", &serde_json::json!({})).await
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let c2 = coordinator.clone();
        let second = tokio::spawn(async move {
            c2.request_approval("run1", "b", "u1", &serde_json::json!({})).await
        });
        tokio::task::yield_now().await;

        // The second call must still be queued; only one pending slot exists.
        {
            let runs = coordinator.runs.lock();
            let state = runs.get("run1").unwrap();
            assert_eq!(state.pending.as_ref().unwrap().request.tool_id, "a");
            assert_eq!(state.waiters.len(), 1);
        }

        let first_id = {
            let runs = coordinator.runs.lock();
            runs.get("run1").unwrap().pending.as_ref().unwrap().request.id.clone()
        };
        coordinator.resolve_for_run("run1", decision(&first_id, "u1", ApprovalOutcome::Approved));
        assert!(matches!(first.await.unwrap(), ApprovalOutcome::Approved));

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        let second_id = {
            let runs = coordinator.runs.lock();
            runs.get("run1").unwrap().pending.as_ref().unwrap().request.id.clone()
        };
        coordinator.resolve_for_run("run1", decision(&second_id, "u1", ApprovalOutcome::Denied));
        assert!(matches!(second.await.unwrap(), ApprovalOutcome::Denied));
    }
}
