//! Provider registry (component D).
//!
//! Constructed once per workspace from its enabled `Source` records. Each
//! source gets its own provider instance (and, for HTTP/GraphQL, its own
//! pooled `reqwest::Client`); a source that fails to construct a provider
//! (bad endpoint, unreachable MCP server at startup) is recorded and
//! skipped rather than aborting construction of the others.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use cg_domain::{Source, SourceKind, ToolDescriptor, ToolInvocationResult};
use cg_exec::manager::ProcessManager;
use cg_mcp_client::McpManager;
use serde_json::Value;

use crate::builtin::BuiltinProvider;
use crate::graphql::GraphQlProvider;
use crate::http::HttpProvider;
use crate::mcp::McpProvider;
use crate::traits::{InvocationContext, Provider, ProviderError};

/// Records a source whose provider failed to construct.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub source_id: String,
    pub kind: SourceKind,
    /// Error message with any potential secrets masked.
    pub error: String,
}

/// Mask substrings that look like API keys or bearer tokens before they
/// land in logs or the control-plane's readiness endpoint.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    init_errors: Vec<ProviderInitError>,
}

impl ProviderRegistry {
    /// Build the registry from a workspace's enabled sources. `mcp_manager`
    /// is shared (one manager owns every configured MCP server connection
    /// regardless of which workspace's sources reference it); `exec_root`
    /// is the workspace directory the builtin provider's file/process
    /// tools are sandboxed to.
    pub fn from_sources(
        sources: &[Source],
        mcp_manager: Arc<McpManager>,
        process_manager: Arc<ProcessManager>,
        exec_root: PathBuf,
    ) -> Self {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        let mut init_errors = Vec::new();

        for source in sources.iter().filter(|s| s.enabled) {
            let result: Result<Arc<dyn Provider>, ProviderError> = match source.kind {
                SourceKind::Http => {
                    let base = source.endpoint.clone().unwrap_or_default();
                    HttpProvider::new(base).map(|p| Arc::new(p) as Arc<dyn Provider>)
                }
                SourceKind::GraphQl => {
                    GraphQlProvider::new().map(|p| Arc::new(p) as Arc<dyn Provider>)
                }
                SourceKind::Mcp => Ok(Arc::new(McpProvider::new(mcp_manager.clone())) as Arc<dyn Provider>),
                SourceKind::Builtin => Ok(Arc::new(BuiltinProvider::new(
                    process_manager.clone(),
                    exec_root.clone(),
                )) as Arc<dyn Provider>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(source_id = %source.id, kind = ?source.kind, "registered tool provider");
                    providers.insert(source.id.clone(), provider);
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        source_id = %source.id,
                        kind = ?source.kind,
                        error = %safe_error,
                        "failed to construct provider, source will have no callable tools"
                    );
                    init_errors.push(ProviderInitError {
                        source_id: source.id.clone(),
                        kind: source.kind,
                        error: safe_error,
                    });
                }
            }
        }

        Self {
            providers,
            init_errors,
        }
    }

    /// Dispatch one call. The descriptor's `source_id` selects the
    /// provider instance; `descriptor.provider` selects the dispatch path
    /// within it.
    pub async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        args: Value,
        context: &InvocationContext,
    ) -> Result<ToolInvocationResult, ProviderError> {
        let provider = self.providers.get(&descriptor.source_id).ok_or_else(|| {
            ProviderError::Unavailable(format!(
                "no provider available for source {}",
                descriptor.source_id
            ))
        })?;
        provider.invoke(descriptor, args, context).await
    }

    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }

    pub fn is_available(&self, source_id: &str) -> bool {
        self.providers.contains_key(source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::ProviderKind;

    fn http_source(id: &str, endpoint: &str) -> Source {
        Source {
            id: id.into(),
            workspace_id: "ws1".into(),
            name: id.into(),
            kind: SourceKind::Http,
            endpoint: Some(endpoint.into()),
            config: serde_json::Value::Null,
            enabled: true,
            source_hash: "h".into(),
        }
    }

    fn builtin_descriptor(source_id: &str, tool: &str) -> ToolDescriptor {
        ToolDescriptor {
            id: format!("{source_id}:{tool}"),
            source_id: source_id.into(),
            name: tool.into(),
            description: "".into(),
            input_schema: serde_json::json!({"type": "object"}),
            provider: ProviderKind::Builtin { name: tool.into() },
            approval_mode: None,
        }
    }

    #[tokio::test]
    async fn unknown_source_is_reported_unavailable() {
        let registry = ProviderRegistry::from_sources(
            &[http_source("s1", "https://example.com")],
            Arc::new(McpManager::empty()),
            Arc::new(ProcessManager::new(Default::default())),
            std::env::temp_dir(),
        );
        assert!(registry.is_available("s1"));
        let desc = builtin_descriptor("missing", "exec.run");
        let err = registry
            .invoke(&desc, serde_json::json!({}), &InvocationContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
