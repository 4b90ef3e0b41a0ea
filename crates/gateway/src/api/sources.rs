//! `/v1/tool-sources` — register/remove a tool provider source and
//! rebuild the affected workspace's catalog (component A/I, §6.5).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use cg_domain::{Error, Source, SourceKind};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::bootstrap::DEFAULT_WORKSPACE;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListSourcesQuery {
    #[serde(default)]
    pub workspace_id: Option<String>,
}

pub async fn list_sources(State(state): State<AppState>, Query(q): Query<ListSourcesQuery>) -> Json<Vec<Source>> {
    let workspace_id = q.workspace_id.unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());
    Json(state.sources.list_for_workspace(&workspace_id))
}

#[derive(Debug, Deserialize)]
pub struct CreateSourceRequest {
    #[serde(default)]
    pub workspace_id: Option<String>,
    pub name: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

pub async fn create_source(
    State(state): State<AppState>,
    Json(req): Json<CreateSourceRequest>,
) -> Result<Response, ApiError> {
    let workspace_id = req.workspace_id.unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());
    let source_hash = Source::compute_hash(req.kind, req.endpoint.as_deref(), &req.config);
    let source = Source {
        id: uuid::Uuid::new_v4().to_string(),
        workspace_id: workspace_id.clone(),
        name: req.name,
        kind: req.kind,
        endpoint: req.endpoint,
        config: req.config,
        enabled: true,
        source_hash,
    };

    state
        .sources
        .upsert(source.clone())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    rebuild_workspace(&state, &workspace_id).await?;

    Ok((axum::http::StatusCode::CREATED, Json(source)).into_response())
}

pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(source) = state.sources.get(&id) else {
        return Err(Error::NotFound(format!("source {id}")).into());
    };

    state
        .sources
        .remove(&id)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    rebuild_workspace(&state, &source.workspace_id).await?;

    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

/// Rebuilds the registry snapshot and the provider registry together —
/// they must always reflect the same source list, since F resolves a
/// descriptor from one and dispatches through the other.
async fn rebuild_workspace(state: &AppState, workspace_id: &str) -> Result<(), ApiError> {
    let sources = state.sources.list_for_workspace(workspace_id);

    state
        .registry
        .rebuild(workspace_id, &sources)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    let providers = cg_providers::ProviderRegistry::from_sources(
        &sources,
        state.mcp.clone(),
        state.processes.clone(),
        std::path::PathBuf::from(&state.config.tools.workspace_root),
    );
    for init_error in providers.init_errors() {
        tracing::warn!(source_id = %init_error.source_id, error = %init_error.error, "provider init failed");
    }
    state.invocation.swap_providers(Arc::new(providers));

    Ok(())
}
