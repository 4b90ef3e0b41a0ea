use serde::{Deserialize, Serialize};

use crate::actor::ExecutionContext;
use crate::config::RuntimeKind;

/// One submission of user code with a bounded deadline, yielding a single
/// terminal outcome (§3). Exclusively owned by H; every mutation goes
/// through the lifecycle manager's mutator API — no other component
/// writes a Run's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub context: ExecutionContext,
    pub runtime_kind: RuntimeKind,
    pub code: String,
    pub timeout_ms: u64,
    pub status: RunStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Result value on `completed`, or a one-line reason on any other
    /// terminal status.
    pub terminal_payload: Option<serde_json::Value>,
    pub code_run_count: u32,
    pub event_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    TimedOut,
    Denied,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::TimedOut | RunStatus::Denied
        )
    }

    /// Whether `self -> next` is a legal transition in the §4.H state
    /// machine. Status only ever moves forward toward exactly one
    /// terminal state.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Queued, Running) => true,
            (Running, AwaitingApproval) => true,
            (Running, Completed | Failed | TimedOut | Denied) => true,
            (AwaitingApproval, Running) => true,
            (AwaitingApproval, Denied | TimedOut) => true,
            (Queued, Denied) => true,
            _ => false,
        }
    }
}

/// A single totally-ordered event emitted on a Run's stream (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub seq: u64,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunEventKind {
    AwaitingApproval {
        approval_id: String,
        tool_path: String,
        input_preview: Option<String>,
    },
    CodeRun {
        index: u32,
        stdout: String,
        stderr: String,
        duration_ms: u64,
    },
    Completed {
        value: Option<serde_json::Value>,
        message: Option<String>,
        code_runs: u32,
    },
    Failed {
        error: String,
    },
    TimedOut,
    Denied {
        reason: Option<String>,
    },
    Backpressure {
        dropped: u64,
    },
}

impl RunEventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEventKind::Completed { .. }
                | RunEventKind::Failed { .. }
                | RunEventKind::TimedOut
                | RunEventKind::Denied { .. }
        )
    }
}
