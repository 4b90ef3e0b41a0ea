use serde::{Deserialize, Serialize};

/// A registered tool provider (an HTTP/OpenAPI backend, an MCP server, a
/// GraphQL endpoint, or a built-in) that the registry (component A) expands
/// into zero or more `ToolDescriptor`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub kind: SourceKind,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "d_enabled")]
    pub enabled: bool,
    /// Hash of `(kind, endpoint, config)` — changes invalidate any cached
    /// expansion and force a rebuild on next snapshot publication.
    pub source_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Http,
    Mcp,
    GraphQl,
    Builtin,
}

fn d_enabled() -> bool {
    true
}

impl Source {
    pub fn compute_hash(kind: SourceKind, endpoint: Option<&str>, config: &serde_json::Value) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{kind:?}").as_bytes());
        hasher.update(endpoint.unwrap_or_default().as_bytes());
        hasher.update(config.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}
