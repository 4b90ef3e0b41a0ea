//! `/v1/runs` — submit, inspect, cancel, and stream a Run (§6.2).
//!
//! - `POST /v1/runs`              — submit code, return the queued Run
//! - `GET  /v1/runs`              — list runs for a workspace
//! - `GET  /v1/runs/:id`          — get a single run
//! - `POST /v1/runs/:id/cancel`   — cancel a live run
//! - `GET  /v1/runs/:id/events`   — SSE stream of run events (live updates)

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use cg_domain::{Actor, ExecutionContext, RuntimeKind};
use futures_util::stream::Stream;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::bootstrap::DEFAULT_WORKSPACE;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRunRequest {
    pub code: String,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
}

fn parse_runtime_kind(raw: &str) -> Result<RuntimeKind, ApiError> {
    match raw {
        "local_inproc" => Ok(RuntimeKind::LocalInproc),
        "subprocess" => Ok(RuntimeKind::Subprocess),
        "remote_worker" => Ok(RuntimeKind::RemoteWorker),
        other => Err(cg_domain::Error::Validation(format!("unknown runtime kind '{other}'")).into()),
    }
}

pub async fn submit_run(
    State(state): State<AppState>,
    Json(req): Json<SubmitRunRequest>,
) -> Result<Response, ApiError> {
    let runtime_kind = match req.runtime.as_deref() {
        Some(raw) => parse_runtime_kind(raw)?,
        None => state.config.runtime.default_adapter,
    };
    let timeout_ms = req
        .timeout_ms
        .unwrap_or(state.config.runtime.default_timeout_ms)
        .min(state.config.runtime.max_timeout_ms);

    let actor = match req.actor_id {
        Some(id) => Actor::User { id },
        None => Actor::Anonymous,
    };
    let context = ExecutionContext {
        actor,
        workspace_id: req.workspace_id.unwrap_or_else(|| DEFAULT_WORKSPACE.to_string()),
        organization_id: req.organization_id,
        client_id: req.client_id,
        tags: Vec::new(),
    };

    let run = state
        .lifecycle
        .submit(context, req.code, runtime_kind, timeout_ms)
        .await?;

    let orchestrator = state.orchestrator.clone();
    let spawned = run.clone();
    tokio::spawn(async move {
        orchestrator.drive(spawned).await;
    });

    Ok((axum::http::StatusCode::ACCEPTED, Json(run)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    pub workspace_id: Option<String>,
}

pub async fn list_runs(State(state): State<AppState>, Query(q): Query<ListRunsQuery>) -> Json<serde_json::Value> {
    let workspace_id = q.workspace_id.unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());
    let runs = state.lifecycle.list(&workspace_id);
    Json(serde_json::json!({ "runs": runs }))
}

pub async fn get_run(State(state): State<AppState>, Path(run_id): Path<String>) -> Result<Response, ApiError> {
    match state.lifecycle.get(&run_id) {
        Some(run) => Ok(Json(run).into_response()),
        None => Err(cg_domain::Error::NotFound(format!("run {run_id}")).into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelRunRequest {
    pub actor_id: String,
}

pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(req): Json<CancelRunRequest>,
) -> Result<Response, ApiError> {
    state.lifecycle.cancel(&run_id, &req.actor_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

#[derive(Debug, Deserialize)]
pub struct RunEventsQuery {
    #[serde(default)]
    pub after_seq: Option<u64>,
}

/// SSE stream of every event emitted on a run from `afterSeq` (default 0)
/// onward, one `RunEvent` frame at a time. Closes once a terminal event
/// has been sent and marks the session drained, starting its retention
/// countdown (§4.H).
pub async fn run_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(q): Query<RunEventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, ApiError> {
    if state.lifecycle.get(&run_id).is_none() {
        return Err(cg_domain::Error::NotFound(format!("run {run_id}")).into());
    }

    let lifecycle = state.lifecycle.clone();
    let mut after_seq = q.after_seq.unwrap_or(0);

    let stream = async_stream::stream! {
        loop {
            let events = match lifecycle.wait_for_next(&run_id, after_seq).await {
                Ok(events) => events,
                Err(_) => break,
            };
            let mut terminal = false;
            for event in &events {
                after_seq = event.seq;
                terminal = terminal || event.kind.is_terminal();
                let data = serde_json::to_string(event).unwrap_or_default();
                yield Ok(Event::default().event("run.event").data(data));
            }
            if terminal {
                lifecycle.mark_drained(&run_id);
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
