//! GraphQL provider adapter (§4.D).

use std::time::Duration;

use cg_domain::{ProviderKind, ToolDescriptor, ToolInvocationResult};
use serde_json::Value;

use crate::traits::{InvocationContext, Provider, ProviderError};

pub struct GraphQlProvider {
    client: reqwest::Client,
}

impl GraphQlProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Default for GraphQlProvider {
    fn default() -> Self {
        Self::new().expect("default reqwest client construction cannot fail")
    }
}

/// The root operation keyword (`query` | `mutation` | `subscription`), used
/// by policy routing to distinguish read from write operations without a
/// full GraphQL parser.
pub fn root_operation(query: &str) -> &'static str {
    let trimmed = query.trim_start();
    if trimmed.starts_with("mutation") {
        "mutation"
    } else if trimmed.starts_with("subscription") {
        "subscription"
    } else {
        "query"
    }
}

#[async_trait::async_trait]
impl Provider for GraphQlProvider {
    async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        args: Value,
        context: &InvocationContext,
    ) -> Result<ToolInvocationResult, ProviderError> {
        let ProviderKind::GraphQl { endpoint, query } = &descriptor.provider else {
            return Err(ProviderError::Invalid(format!(
                "descriptor {} is not a graphql provider",
                descriptor.id
            )));
        };

        let body = serde_json::json!({
            "query": query,
            "variables": args,
        });

        let mut builder = self.client.post(endpoint).json(&body);
        for (name, value) in &context.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = context.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let has_errors = payload
            .get("errors")
            .map(|e| !e.is_null() && e.as_array().map(|a| !a.is_empty()).unwrap_or(true))
            .unwrap_or(false);

        Ok(ToolInvocationResult {
            status: Some(status),
            body: payload,
            is_error: has_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_operation_detects_mutation() {
        assert_eq!(root_operation("mutation { createIssue }"), "mutation");
        assert_eq!(root_operation("  query { viewer }"), "query");
        assert_eq!(root_operation("{ viewer }"), "query");
    }
}
