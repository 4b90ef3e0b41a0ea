use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime dispatch (component G)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which `RuntimeAdapter` kind a Run executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    LocalInproc,
    Subprocess,
    RemoteWorker,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuntimeKind::LocalInproc => "local_inproc",
            RuntimeKind::Subprocess => "subprocess",
            RuntimeKind::RemoteWorker => "remote_worker",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Adapter used when a run submission does not name one explicitly.
    #[serde(default = "d_default_adapter")]
    pub default_adapter: RuntimeKind,
    /// Default per-run deadline in milliseconds when unspecified.
    #[serde(default = "d_default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Hard ceiling a run's requested timeout is clamped to.
    #[serde(default = "d_max_timeout_ms")]
    pub max_timeout_ms: u64,
    #[serde(default)]
    pub subprocess: SubprocessRuntimeConfig,
    #[serde(default)]
    pub remote_worker: RemoteWorkerRuntimeConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_adapter: d_default_adapter(),
            default_timeout_ms: d_default_timeout_ms(),
            max_timeout_ms: d_max_timeout_ms(),
            subprocess: SubprocessRuntimeConfig::default(),
            remote_worker: RemoteWorkerRuntimeConfig::default(),
        }
    }
}

/// Settings for the `subprocess` adapter — hosts the JS VM in a child
/// process and speaks JSON-RPC over stdio for `tools.*` callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubprocessRuntimeConfig {
    /// Path to the sandboxed-runtime host binary. When `None`, the
    /// subprocess adapter reports `is_available() == false`.
    #[serde(default)]
    pub host_binary: Option<String>,
    #[serde(default = "d_true")]
    pub enabled: bool,
}

impl Default for SubprocessRuntimeConfig {
    fn default() -> Self {
        Self {
            host_binary: None,
            enabled: true,
        }
    }
}

/// Settings for the `remote_worker` adapter — POSTs run payloads to a
/// worker pool that executes code in its own isolate and calls back
/// into this gateway's `/v1/runtime/tool-call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteWorkerRuntimeConfig {
    #[serde(default)]
    pub worker_url: Option<String>,
    /// This gateway's own externally-reachable base URL, handed to the
    /// worker so its `tools.*` calls know where to POST
    /// `/v1/runtime/tool-call`.
    #[serde(default)]
    pub callback_base_url: Option<String>,
    /// Shared HMAC key used to sign and verify callback tokens (§6.1).
    /// Read from an environment variable, never stored in the TOML file
    /// directly in a production deployment.
    #[serde(default = "d_callback_signing_key_env")]
    pub callback_signing_key_env: String,
    #[serde(default = "d_true")]
    pub enabled: bool,
}

impl Default for RemoteWorkerRuntimeConfig {
    fn default() -> Self {
        Self {
            worker_url: None,
            callback_base_url: None,
            callback_signing_key_env: d_callback_signing_key_env(),
            enabled: true,
        }
    }
}

fn d_default_adapter() -> RuntimeKind {
    RuntimeKind::LocalInproc
}
fn d_default_timeout_ms() -> u64 {
    30_000
}
fn d_max_timeout_ms() -> u64 {
    300_000
}
fn d_true() -> bool {
    true
}
fn d_callback_signing_key_env() -> String {
    "CODEGATE_CALLBACK_SIGNING_KEY".into()
}
