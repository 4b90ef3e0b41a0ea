//! Maps an `ApprovalRequest.id` back to the Run it belongs to.
//!
//! `cg-approval` only exposes accessors keyed by `run_id` (by design — a
//! run owns at most one pending approval at a time, so that's the natural
//! key for the coordinator itself). The control plane's
//! `POST /v1/approvals/:id` route is keyed by approval id instead, so this
//! small index bridges the two. Entries are never removed individually;
//! stale entries left behind by a resolved or cancelled run cost one
//! `String` pair each and are harmless to keep around.

use std::collections::HashMap;
use std::sync::Arc;

use cg_approval::ApprovalEventSink;
use cg_domain::ApprovalRequest;
use parking_lot::Mutex;

#[derive(Default)]
pub struct ApprovalIndex {
    run_for_approval: Mutex<HashMap<String, String>>,
}

impl ApprovalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_for(&self, approval_id: &str) -> Option<String> {
        self.run_for_approval.lock().get(approval_id).cloned()
    }

    fn record(&self, approval_id: &str, run_id: &str) {
        self.run_for_approval
            .lock()
            .insert(approval_id.to_string(), run_id.to_string());
    }
}

/// Wraps another [`ApprovalEventSink`], recording the approval→run mapping
/// before delegating. Lets the gateway observe every newly-pending
/// approval without `cg-approval` or `cg-invocation` knowing this index
/// exists.
pub struct IndexingApprovalSink {
    index: Arc<ApprovalIndex>,
    inner: Arc<dyn ApprovalEventSink>,
}

impl IndexingApprovalSink {
    pub fn new(index: Arc<ApprovalIndex>, inner: Arc<dyn ApprovalEventSink>) -> Self {
        Self { index, inner }
    }
}

impl ApprovalEventSink for IndexingApprovalSink {
    fn on_awaiting_approval(&self, run_id: &str, request: &ApprovalRequest) {
        self.index.record(&request.id, run_id);
        self.inner.on_awaiting_approval(run_id, request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_approval::NullEventSink;
    use cg_domain::ApprovalStatus;

    #[test]
    fn records_mapping_before_delegating() {
        let index = Arc::new(ApprovalIndex::new());
        let sink = IndexingApprovalSink::new(index.clone(), Arc::new(NullEventSink));
        let request = ApprovalRequest {
            id: "a1".into(),
            run_id: "r1".into(),
            tool_id: "builtin:exec.run".into(),
            input_preview: "{}".into(),
            status: ApprovalStatus::Pending,
        };
        sink.on_awaiting_approval("r1", &request);
        assert_eq!(index.run_for("a1").as_deref(), Some("r1"));
    }

    #[test]
    fn unknown_approval_is_none() {
        let index = ApprovalIndex::new();
        assert!(index.run_for("missing").is_none());
    }
}
