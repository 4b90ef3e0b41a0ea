//! Maps `cg_domain::Error` onto the transport boundary (§7): every
//! handler that can fail returns this instead of hand-rolling a status
//! code + JSON body each time.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use cg_domain::{Error, ErrorEnvelope};

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for_kind(self.0.kind());
        let envelope = ErrorEnvelope::from(&self.0);
        (status, Json(envelope)).into_response()
    }
}

fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "validation_error" | "invocation_invalid" => StatusCode::BAD_REQUEST,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "not_found" => StatusCode::NOT_FOUND,
        "policy_denied" | "approval_denied" => StatusCode::FORBIDDEN,
        "auth_missing" => StatusCode::FAILED_DEPENDENCY,
        "provider_error" => StatusCode::BAD_GATEWAY,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build a standalone `{"error": "..."}` body for handlers that fail
/// before they have a `cg_domain::Error` to work with (bad query params,
/// malformed bodies).
pub fn plain_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}
