//! `/v1/credentials` — register/remove a stored credential (component C,
//! §6.5). Secret values never round-trip back out of this API; only
//! metadata (scope, auth profile, `secret_ref`) is ever returned.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use cg_domain::{AuthProfile, CredentialRecord, CredentialScope, Error};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListCredentialsQuery {
    pub source_id: String,
}

pub async fn list_credentials(
    State(state): State<AppState>,
    Query(q): Query<ListCredentialsQuery>,
) -> Json<Vec<CredentialRecord>> {
    Json(state.credential_store.list_for_source(&q.source_id))
}

#[derive(Debug, Deserialize)]
pub struct CreateCredentialRequest {
    pub source_id: String,
    pub scope: CredentialScope,
    pub profile: AuthProfile,
    pub secret_value: String,
}

pub async fn create_credential(
    State(state): State<AppState>,
    Json(req): Json<CreateCredentialRequest>,
) -> Result<Response, ApiError> {
    let record = CredentialRecord {
        id: uuid::Uuid::new_v4().to_string(),
        scope: req.scope,
        profile: req.profile,
        secret_ref: uuid::Uuid::new_v4().to_string(),
    };

    state
        .credential_store
        .put(&req.source_id, record.clone(), &req.secret_value)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    state.credentials.invalidate_source(&req.source_id);

    Ok((axum::http::StatusCode::CREATED, Json(record)).into_response())
}

/// Body rather than query params: `CredentialScope` is an internally
/// tagged enum and doesn't round-trip through `application/x-www-form-urlencoded`.
#[derive(Debug, Deserialize)]
pub struct DeleteCredentialRequest {
    pub source_id: String,
    pub scope: CredentialScope,
}

pub async fn delete_credential(
    State(state): State<AppState>,
    Json(req): Json<DeleteCredentialRequest>,
) -> Result<Response, ApiError> {
    let removed = state
        .credential_store
        .remove(&req.source_id, &req.scope)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    state.credentials.invalidate_source(&req.source_id);

    if removed {
        Ok(axum::http::StatusCode::NO_CONTENT.into_response())
    } else {
        Err(Error::NotFound(format!("credential for source {}", req.source_id)).into())
    }
}
