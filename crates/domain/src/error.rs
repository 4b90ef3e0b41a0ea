use serde::Serialize;

/// Shared error type used across all codegate crates.
///
/// One variant per error kind named in the error-handling design: each
/// variant maps to a stable `kind()` string and HTTP status at the
/// transport boundary (see `cg-gateway::api::error_response`).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("approval denied: {0}")]
    ApprovalDenied(String),

    #[error("missing credential: {0}")]
    AuthMissing(String),

    #[error("invalid invocation: {0}")]
    InvocationInvalid(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("runtime error: {0}")]
    RuntimeError(String),

    #[error("run timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// The stable error-kind tag carried in transport envelopes (§7).
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Unauthorized(_) => "unauthorized",
            Error::NotFound(_) => "not_found",
            Error::PolicyDenied(_) => "policy_denied",
            Error::ApprovalDenied(_) => "approval_denied",
            Error::AuthMissing(_) => "auth_missing",
            Error::InvocationInvalid(_) => "invocation_invalid",
            Error::ProviderError(_) => "provider_error",
            Error::RuntimeError(_) => "runtime_error",
            Error::Timeout => "timeout",
            Error::Internal(_) | Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Http(_) => {
                "internal"
            }
        }
    }

    /// Whether this error should be surfaced to running user code as a
    /// catchable `throw` (policy/approval denials) rather than an
    /// unconditional run failure (§7 propagation policy).
    pub fn is_catchable_denial(&self) -> bool {
        matches!(self, Error::PolicyDenied(_) | Error::ApprovalDenied(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Wire shape of an error as it appears in API responses and callback
/// envelopes — `kind` is stable, `error` is a human-readable message.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub kind: &'static str,
    pub error: String,
}

impl From<&Error> for ErrorEnvelope {
    fn from(err: &Error) -> Self {
        ErrorEnvelope {
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}
