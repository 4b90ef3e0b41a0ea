use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credential resolver (component C)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Seconds a resolved credential stays in the read-through cache
    /// before it is considered stale. Invalidated early on upsert/delete
    /// regardless of this TTL.
    #[serde(default = "d_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Header name used for `apiKey` auth profiles that don't specify
    /// their own header name.
    #[serde(default = "d_default_api_key_header")]
    pub default_api_key_header: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: d_cache_ttl_secs(),
            default_api_key_header: d_default_api_key_header(),
        }
    }
}

fn d_cache_ttl_secs() -> u64 {
    300
}
fn d_default_api_key_header() -> String {
    "x-api-key".into()
}
