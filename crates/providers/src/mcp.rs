//! MCP provider adapter (§4.D) — wraps `cg-mcp-client`'s `McpManager`.

use std::sync::Arc;

use cg_domain::{ProviderKind, ToolDescriptor, ToolInvocationResult};
use cg_mcp_client::McpManager;
use serde_json::Value;

use crate::traits::{InvocationContext, Provider, ProviderError};

pub struct McpProvider {
    manager: Arc<McpManager>,
}

impl McpProvider {
    pub fn new(manager: Arc<McpManager>) -> Self {
        Self { manager }
    }
}

#[async_trait::async_trait]
impl Provider for McpProvider {
    async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        args: Value,
        _context: &InvocationContext,
    ) -> Result<ToolInvocationResult, ProviderError> {
        let ProviderKind::Mcp {
            server_id,
            remote_name,
        } = &descriptor.provider
        else {
            return Err(ProviderError::Invalid(format!(
                "descriptor {} is not an mcp provider",
                descriptor.id
            )));
        };

        let result = self
            .manager
            .call_tool(server_id, remote_name, args)
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let body = collapse_content(&result.content);
        Ok(ToolInvocationResult {
            status: None,
            body,
            is_error: result.is_error,
        })
    }
}

/// "single text → string, many texts → array, otherwise raw content" (§4.D).
fn collapse_content(content: &[cg_mcp_client::protocol::ToolCallContent]) -> Value {
    let texts: Vec<&str> = content
        .iter()
        .filter(|c| c.content_type == "text")
        .map(|c| c.text.as_str())
        .collect();

    if texts.len() == content.len() {
        return match texts.len() {
            0 => Value::Null,
            1 => Value::String(texts[0].to_string()),
            _ => Value::Array(texts.into_iter().map(|t| Value::String(t.to_string())).collect()),
        };
    }

    serde_json::to_value(content).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_mcp_client::protocol::ToolCallContent;

    fn text(s: &str) -> ToolCallContent {
        ToolCallContent {
            content_type: "text".into(),
            text: s.to_string(),
        }
    }

    #[test]
    fn single_text_collapses_to_string() {
        let v = collapse_content(&[text("hello")]);
        assert_eq!(v, Value::String("hello".into()));
    }

    #[test]
    fn multiple_texts_collapse_to_array() {
        let v = collapse_content(&[text("a"), text("b")]);
        assert_eq!(v, serde_json::json!(["a", "b"]));
    }

    #[test]
    fn no_content_is_null() {
        let v = collapse_content(&[]);
        assert_eq!(v, Value::Null);
    }
}
