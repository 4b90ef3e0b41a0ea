//! `POST /v1/runtime/tool-call` — the runtime adapter's `tools.*`
//! callback (§6.1). Authenticated separately from the rest of the control
//! plane: the caller presents the per-run callback token minted by
//! [`cg_runtime::token::CallbackTokenizer`], not the operator's API token.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use cg_invocation::ToolCallRequest;

use crate::api::error::plain_error;
use crate::state::AppState;

pub async fn tool_call(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<ToolCallRequest>,
) -> Response {
    let Some(tokenizer) = state.callback_tokenizer.as_ref() else {
        return plain_error(StatusCode::SERVICE_UNAVAILABLE, "remote callback auth not configured");
    };

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return plain_error(StatusCode::UNAUTHORIZED, "missing callback token");
    };

    if tokenizer.verify(token, &req.run_id).is_err() {
        return plain_error(StatusCode::UNAUTHORIZED, "invalid callback token");
    }

    Json(state.invocation.handle_call(req).await).into_response()
}
