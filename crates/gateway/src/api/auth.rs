//! Control-plane bearer-token auth middleware.
//!
//! Gates every route under `/v1/*` except `/v1/health` and the runtime
//! callback endpoint (which authenticates separately via the per-run
//! callback token, §6.1). Disabled entirely when `CODEGATE_API_TOKEN`
//! was unset at boot — `state.api_token_hash` is `None` — so a fresh
//! `codegate init` works before the operator has wired in a token.

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::api::error::plain_error;
use crate::state::AppState;

pub async fn require_api_token<B>(
    State(state): State<AppState>,
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, Response> {
    let Some(expected_hash) = state.api_token_hash.as_ref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = provided else {
        return Err(plain_error(StatusCode::UNAUTHORIZED, "missing bearer token"));
    };

    let actual_hash = Sha256::digest(token.as_bytes());
    if actual_hash.as_slice().ct_eq(expected_hash).unwrap_u8() != 1 {
        return Err(plain_error(StatusCode::UNAUTHORIZED, "invalid bearer token"));
    }

    Ok(next.run(request).await)
}
