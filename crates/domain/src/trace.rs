use serde::Serialize;

/// Structured trace events emitted across all codegate crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RunSubmitted {
        run_id: String,
        workspace_id: String,
        adapter: String,
    },
    RunTransitioned {
        run_id: String,
        from: String,
        to: String,
    },
    RunCancelled {
        run_id: String,
        reason: String,
    },
    RunTimedOut {
        run_id: String,
        timeout_ms: u64,
    },
    PolicyEvaluated {
        run_id: String,
        tool_id: String,
        decision: String,
        matched_rule: Option<String>,
    },
    ApprovalRequested {
        run_id: String,
        approval_id: String,
        tool_id: String,
    },
    ApprovalResolved {
        run_id: String,
        approval_id: String,
        outcome: String,
        actor: String,
    },
    CredentialResolved {
        source_id: String,
        scope: String,
        cache_hit: bool,
    },
    ProviderInvoked {
        run_id: String,
        tool_id: String,
        provider: String,
        duration_ms: u64,
        is_error: bool,
    },
    SnapshotPublished {
        version: u64,
        tool_count: usize,
    },
    NodeConnected {
        node_id: String,
        capabilities: Vec<String>,
    },
    NodeDisconnected {
        node_id: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cg_event");
    }
}
