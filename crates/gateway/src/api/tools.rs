//! `/v1/tools` — the visible tool catalog for a workspace+actor (§4.A
//! `listVisible`, §6.2).
//!
//! A tool masked by an explicit `deny` policy decision never appears:
//! code in the sandbox can't even discover a tool it has no chance of
//! calling. `require_approval` tools stay listed — the catalog is not
//! where that gate is enforced, `tools.*` dispatch (component F) is.

use axum::extract::{Query, State};
use axum::response::Json;
use cg_domain::{ApprovalMode, Error};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::bootstrap::DEFAULT_WORKSPACE;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListToolsQuery {
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

pub async fn list_tools(
    State(state): State<AppState>,
    Query(q): Query<ListToolsQuery>,
) -> Result<Json<Value>, ApiError> {
    let workspace_id = q.workspace_id.unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());
    let actor = match q.actor_id {
        Some(id) => cg_domain::Actor::User { id },
        None => cg_domain::Actor::Anonymous,
    };
    let context = cg_domain::ExecutionContext {
        actor,
        workspace_id: workspace_id.clone(),
        organization_id: q.organization_id,
        client_id: q.client_id,
        tags: Vec::new(),
    };

    let snapshot = state.registry.current_snapshot(&workspace_id);
    let candidates: Vec<&cg_domain::ToolDescriptor> = match q.search {
        Some(ref raw) => {
            let keywords: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
            snapshot.search(&keywords)
        }
        None => snapshot.tools.iter().collect(),
    };

    let mut visible = Vec::with_capacity(candidates.len());
    for tool in candidates {
        let decision = state
            .policy
            .evaluate(&context, &tool.name, &Value::Null, tool)
            .await;
        if decision.effect == ApprovalMode::Deny {
            continue;
        }
        visible.push(json!({
            "id": tool.id,
            "name": tool.name,
            "description": tool.description,
            "inputSchema": tool.input_schema,
            "provider": tool.provider.label(),
            "approvalMode": decision.effect,
        }));
    }

    Ok(Json(json!({
        "version": snapshot.version,
        "tools": visible,
    })))
}

#[derive(Debug, Deserialize)]
pub struct GetToolQuery {
    #[serde(default)]
    pub workspace_id: Option<String>,
}

pub async fn get_tool(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
    Query(q): Query<GetToolQuery>,
) -> Result<Json<cg_domain::ToolDescriptor>, ApiError> {
    let workspace_id = q.workspace_id.unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());
    let snapshot = state.registry.current_snapshot(&workspace_id);
    snapshot
        .tools
        .iter()
        .find(|t| t.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("tool {id}")).into())
}
