//! HTTP (OpenAPI-derived) provider adapter (§4.D).
//!
//! Descriptors of this kind carry a path template and method; the
//! manifest that produced them (out of scope here — see the registry
//! crate) is responsible for having already resolved content types and
//! parameter locations into `url_template`'s `{name}` placeholders plus
//! whatever's left in `args`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cg_domain::{ProviderKind, ToolDescriptor, ToolInvocationResult};
use serde_json::Value;

use crate::traits::{InvocationContext, Provider, ProviderError};

/// Shared per-source HTTP client. One instance serves every descriptor
/// whose `Source` it was built from — constructing a new client per call
/// is disallowed (§4.D).
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn resolve_url(&self, url_template: &str, path_params: &HashMap<String, Value>) -> String {
        let mut url = url_template.to_string();
        for (name, value) in path_params {
            let encoded = urlencode(&value_to_string(value));
            url = url.replace(&format!("{{{name}}}"), &encoded);
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            url
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Minimal percent-encoding for path segments — the charset used by path
/// templates here never needs more than reserved-character escaping.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[async_trait::async_trait]
impl Provider for HttpProvider {
    async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        args: Value,
        context: &InvocationContext,
    ) -> Result<ToolInvocationResult, ProviderError> {
        let ProviderKind::Http {
            method,
            url_template,
            headers: descriptor_headers,
        } = &descriptor.provider
        else {
            return Err(ProviderError::Invalid(format!(
                "descriptor {} is not an http provider",
                descriptor.id
            )));
        };

        let mut args_obj = match args {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            _ => {
                return Err(ProviderError::Invalid(
                    "http provider args must be a JSON object".into(),
                ))
            }
        };

        // Path params: any top-level arg whose name appears as `{name}`
        // in the template is consumed from the body/query set.
        let mut path_params = HashMap::new();
        for (key, value) in args_obj.clone() {
            if url_template.contains(&format!("{{{key}}}")) {
                path_params.insert(key.clone(), value);
                args_obj.remove(&key);
            }
        }

        let url = self.resolve_url(url_template, &path_params);
        let method = method.to_uppercase();
        let mut builder = match method.as_str() {
            "GET" => self.client.get(&url),
            "DELETE" => self.client.delete(&url),
            "PUT" => self.client.put(&url),
            "PATCH" => self.client.patch(&url),
            "POST" => self.client.post(&url),
            other => {
                return Err(ProviderError::Invalid(format!(
                    "unsupported http method {other}"
                )))
            }
        };

        for (name, value) in descriptor_headers {
            builder = builder.header(name, value);
        }
        for (name, value) in &context.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = context.timeout {
            builder = builder.timeout(timeout);
        }

        let remaining = Value::Object(args_obj);
        builder = if matches!(method.as_str(), "GET" | "DELETE") {
            let query: Vec<(String, String)> = match &remaining {
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| (k.clone(), value_to_string(v)))
                    .collect(),
                _ => Vec::new(),
            };
            builder.query(&query)
        } else {
            builder.json(&remaining)
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let is_error = status >= 400;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = if content_type.contains("application/json") {
            response
                .json::<Value>()
                .await
                .unwrap_or(Value::String(String::new()))
        } else {
            let text = response.text().await.unwrap_or_default();
            Value::String(text)
        };

        Ok(ToolInvocationResult {
            status: Some(status),
            body,
            is_error,
        })
    }
}

/// Shared HTTP client pool, keyed by source id, so every descriptor from
/// the same source dispatches through one connection-pooled client.
pub struct HttpProviderRegistry {
    providers: HashMap<String, Arc<HttpProvider>>,
}

impl HttpProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn insert(&mut self, source_id: impl Into<String>, provider: Arc<HttpProvider>) {
        self.providers.insert(source_id.into(), provider);
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<HttpProvider>> {
        self.providers.get(source_id).cloned()
    }
}

impl Default for HttpProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
