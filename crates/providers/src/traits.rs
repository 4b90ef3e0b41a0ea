//! The `Provider` trait (component D) every transport adapter implements.

use cg_domain::ToolDescriptor;
use serde_json::Value;
use std::time::Duration;

/// Per-call context handed to a provider: resolved credential headers
/// (component C's output) and the deadline this particular call must
/// respect, independent of the Run's overall deadline.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid invocation: {0}")]
    Invalid(String),
    #[error("request error: {0}")]
    Request(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// A transport that knows how to dispatch one `ToolDescriptor`'s
/// `providerKind` to its backing system and normalize the response into
/// `ToolInvocationResult` (§4.D).
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        args: Value,
        context: &InvocationContext,
    ) -> Result<cg_domain::ToolInvocationResult, ProviderError>;
}
