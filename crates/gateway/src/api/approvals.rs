//! `/v1/approvals` — human-in-the-loop resolution (component E, §6.2).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use cg_approval::ResolveOutcome;
use cg_domain::{Actor, ApprovalDecision, ApprovalOutcome, Error};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::state::AppState;

/// `GET /v1/approvals/:id` — the pending approval's sanitized preview, if
/// it still belongs to a live run.
pub async fn get_approval(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
) -> Result<Response, ApiError> {
    let run_id = state
        .approval_index
        .run_for(&approval_id)
        .ok_or_else(|| Error::NotFound(format!("approval {approval_id}")))?;

    let pending = state
        .approvals
        .pending_for_run(&run_id)
        .filter(|a| a.id == approval_id)
        .ok_or_else(|| Error::NotFound(format!("approval {approval_id}")))?;

    Ok(Json(pending).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ResolveApprovalRequest {
    pub outcome: ApprovalOutcomeWire,
    pub actor_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcomeWire {
    Approved,
    Denied,
}

impl From<ApprovalOutcomeWire> for ApprovalOutcome {
    fn from(wire: ApprovalOutcomeWire) -> Self {
        match wire {
            ApprovalOutcomeWire::Approved => ApprovalOutcome::Approved,
            ApprovalOutcomeWire::Denied => ApprovalOutcome::Denied,
        }
    }
}

/// `POST /v1/approvals/:id` — an approver resolves a pending approval.
pub async fn resolve_approval(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
    Json(req): Json<ResolveApprovalRequest>,
) -> Result<Response, ApiError> {
    let run_id = state
        .approval_index
        .run_for(&approval_id)
        .ok_or_else(|| Error::NotFound(format!("approval {approval_id}")))?;

    let decision = ApprovalDecision {
        approval_id: approval_id.clone(),
        outcome: req.outcome.into(),
        actor: Actor::User { id: req.actor_id },
    };

    match state.approvals.resolve_for_run(&run_id, decision) {
        ResolveOutcome::Resolved => Ok(axum::http::StatusCode::NO_CONTENT.into_response()),
        ResolveOutcome::NotFound => Err(Error::NotFound(format!("approval {approval_id}")).into()),
        ResolveOutcome::Unauthorized => Err(Error::Unauthorized(format!(
            "approval {approval_id} does not match its run's current pending request"
        ))
        .into()),
    }
}
