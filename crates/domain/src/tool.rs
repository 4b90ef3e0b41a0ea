use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single callable tool surfaced to sandboxed code as `tools.<name>(args)`.
///
/// Built by the registry (component A) from `Source` records and kept in a
/// versioned, immutable snapshot (`ToolRegistrySnapshot`) that invocation
/// (component F) and the sandboxed runtime read without locking the writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub source_id: String,
    pub name: String,
    pub description: String,
    /// JSON Schema the call arguments are validated against before dispatch.
    pub input_schema: serde_json::Value,
    pub provider: ProviderKind,
    /// Approval requirement this descriptor carries absent an overriding
    /// policy rule (§4.B precedence: rule > descriptor > system default).
    #[serde(default)]
    pub approval_mode: Option<ApprovalMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Allow,
    RequireApproval,
    Deny,
}

/// The transport a `ToolDescriptor` dispatches through (component D).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    Http {
        method: String,
        url_template: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Mcp {
        server_id: String,
        remote_name: String,
    },
    GraphQl {
        endpoint: String,
        query: String,
    },
    Builtin {
        name: String,
    },
}

impl ProviderKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Http { .. } => "http",
            ProviderKind::Mcp { .. } => "mcp",
            ProviderKind::GraphQl { .. } => "graphql",
            ProviderKind::Builtin { .. } => "builtin",
        }
    }
}

/// An immutable, versioned view of the tool registry (§4.A/§4.I).
///
/// Every invocation and every `tools.*` namespace built for sandboxed code
/// reads one of these by `Arc` clone; a rebuild swaps the registry's
/// `ArcSwap` pointer atomically and never mutates a published snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistrySnapshot {
    pub version: u64,
    pub tools: Vec<ToolDescriptor>,
}

impl ToolRegistrySnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            tools: Vec::new(),
        }
    }

    pub fn find(&self, source_id: &str, name: &str) -> Option<&ToolDescriptor> {
        self.tools
            .iter()
            .find(|t| t.source_id == source_id && t.name == name)
    }

    /// Keyword search over name/description (§4.A `search`): an exact
    /// path-segment match on `name` outranks a plain description
    /// substring hit, and ties within a tier are broken by `name`.
    pub fn search(&self, keywords: &[String]) -> Vec<&ToolDescriptor> {
        let lower_keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let mut scored: Vec<(u8, &ToolDescriptor)> = self
            .tools
            .iter()
            .filter_map(|t| {
                let segments: Vec<String> = t.name.split('.').map(str::to_lowercase).collect();
                let description = t.description.to_lowercase();
                let segment_hit = lower_keywords.iter().any(|k| segments.iter().any(|s| s == k));
                let description_hit = lower_keywords.iter().any(|k| description.contains(k.as_str()));
                let score = if segment_hit {
                    2
                } else if description_hit {
                    1
                } else {
                    0
                };
                (score > 0).then_some((score, t))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
        scored.into_iter().map(|(_, t)| t).collect()
    }
}

/// Result shape every provider adapter normalizes its response into before
/// it crosses back through the invocation pipeline (§4.D, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub status: Option<u16>,
    pub body: serde_json::Value,
    pub is_error: bool,
}

impl ToolInvocationResult {
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: None,
            body,
            is_error: false,
        }
    }

    pub fn error(body: serde_json::Value) -> Self {
        Self {
            status: None,
            body,
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor {
            id: format!("id-{name}"),
            source_id: "src-1".into(),
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object"}),
            provider: ProviderKind::Builtin { name: name.into() },
            approval_mode: None,
        }
    }

    #[test]
    fn search_ranks_segment_match_over_description_match() {
        let snapshot = ToolRegistrySnapshot {
            version: 1,
            tools: vec![
                descriptor("calendar.list", "enumerate upcoming meetings"),
                descriptor("notes.search", "find notes mentioning a calendar event"),
            ],
        };
        let results = snapshot.search(&["calendar".into()]);
        assert_eq!(results.len(), 2);
        // "calendar.list" matches a whole path segment, outranking
        // "notes.search"'s mere description substring hit.
        assert_eq!(results[0].name, "calendar.list");
        assert_eq!(results[1].name, "notes.search");
    }

    #[test]
    fn search_breaks_ties_by_name() {
        let snapshot = ToolRegistrySnapshot {
            version: 1,
            tools: vec![
                descriptor("notes.email", "handles email"),
                descriptor("mail.email", "handles email"),
            ],
        };
        let results = snapshot.search(&["email".into()]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "mail.email");
        assert_eq!(results[1].name, "notes.email");
    }

    #[test]
    fn find_matches_source_and_name() {
        let snapshot = ToolRegistrySnapshot {
            version: 1,
            tools: vec![descriptor("send_email", "send an email")],
        };
        assert!(snapshot.find("src-1", "send_email").is_some());
        assert!(snapshot.find("src-2", "send_email").is_none());
    }
}
