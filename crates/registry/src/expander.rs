//! Normalizes a `Source` record into zero or more `ToolDescriptor`s.

use cg_domain::{ApprovalMode, ProviderKind, Source, ToolDescriptor};
use serde::Deserialize;

/// Expands one `Source` into the `ToolDescriptor`s it contributes. Kept
/// narrow and synchronous-friendly: a source whose manifest is already
/// materialized in `Source.config` (the common case — the OpenAPI/GraphQL
/// manifest parser and MCP `tools/list` discovery are external
/// collaborators per §1 that populate `config` ahead of time) expands
/// without any I/O, which is what lets `rebuild` skip network calls for
/// sources whose `source_hash` hasn't changed.
#[async_trait::async_trait]
pub trait SourceExpander: Send + Sync {
    async fn expand(&self, source: &Source) -> anyhow::Result<Vec<ToolDescriptor>>;
}

/// Raw tool entry shape read out of `Source.config.tools`. The `provider`
/// field reuses `ProviderKind`'s own tagged representation directly, so
/// one manifest format covers every source kind without per-kind parsing
/// logic living in this crate.
#[derive(Debug, Deserialize)]
struct ManifestTool {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_schema")]
    input_schema: serde_json::Value,
    provider: ProviderKind,
    #[serde(default)]
    approval_mode: Option<ApprovalMode>,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

#[derive(Debug, Deserialize, Default)]
struct Manifest {
    #[serde(default)]
    tools: Vec<ManifestTool>,
}

/// The default (and, at present, only) expander: reads `Source.config`
/// as a `{ "tools": [...] }` manifest and stamps each entry with a stable
/// id derived from `(source_id, name)`.
pub struct ConfigManifestExpander;

#[async_trait::async_trait]
impl SourceExpander for ConfigManifestExpander {
    async fn expand(&self, source: &Source) -> anyhow::Result<Vec<ToolDescriptor>> {
        if source.config.is_null() {
            return Ok(Vec::new());
        }
        let manifest: Manifest = serde_json::from_value(source.config.clone())
            .map_err(|e| anyhow::anyhow!("source {} has an invalid tool manifest: {e}", source.id))?;

        Ok(manifest
            .tools
            .into_iter()
            .map(|t| ToolDescriptor {
                id: format!("{}:{}", source.id, t.name),
                source_id: source.id.clone(),
                name: t.name,
                description: t.description,
                input_schema: t.input_schema,
                provider: t.provider,
                approval_mode: t.approval_mode,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::SourceKind;

    fn source_with_tools(json: serde_json::Value) -> Source {
        Source {
            id: "s1".into(),
            workspace_id: "ws1".into(),
            name: "test".into(),
            kind: SourceKind::Http,
            endpoint: Some("https://example.com".into()),
            config: json,
            enabled: true,
            source_hash: "h1".into(),
        }
    }

    #[tokio::test]
    async fn expands_manifest_tools_with_namespaced_ids() {
        let source = source_with_tools(serde_json::json!({
            "tools": [{
                "name": "issues.close",
                "description": "close an issue",
                "provider": {"kind": "http", "method": "POST", "url_template": "/issues/{id}/close"}
            }]
        }));
        let descriptors = ConfigManifestExpander.expand(&source).await.unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].id, "s1:issues.close");
        assert_eq!(descriptors[0].source_id, "s1");
    }

    #[tokio::test]
    async fn null_config_expands_to_no_tools() {
        let source = source_with_tools(serde_json::Value::Null);
        let descriptors = ConfigManifestExpander.expand(&source).await.unwrap();
        assert!(descriptors.is_empty());
    }

    #[tokio::test]
    async fn malformed_manifest_is_an_error() {
        let source = source_with_tools(serde_json::json!({"tools": [{"name": "x"}]}));
        assert!(ConfigManifestExpander.expand(&source).await.is_err());
    }
}
