use serde::{Deserialize, Serialize};

use crate::actor::Actor;

/// A single pending approval on a Run (component E). A run holds at most
/// one pending request at a time; concurrent callers waiting on the same
/// request queue behind it rather than creating a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub run_id: String,
    pub tool_id: String,
    /// Truncated, sanitized view of the call arguments shown to an
    /// approver (§4.E — never the raw resolved credentials).
    pub input_preview: String,
    pub status: ApprovalStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Resolved,
}

/// The decision an approver submits for a pending `ApprovalRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approval_id: String,
    pub outcome: ApprovalOutcome,
    pub actor: Actor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved,
    Denied,
}
