mod approval;
mod credentials;
mod mcp;
mod observability;
mod policy;
mod runtime;
mod server;
mod store;
mod tools;

pub use approval::*;
pub use credentials::*;
pub use mcp::*;
pub use observability::*;
pub use policy::*;
pub use runtime::*;
pub use server::*;
pub use store::*;
pub use tools::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any section (or the whole file) that is absent.
    pub fn load_from_path(path: &std::path::Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| crate::error::Error::Config(e.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. Used by
    /// `codegate doctor` and at startup (errors abort the boot).
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        if self.runtime.max_timeout_ms < self.runtime.default_timeout_ms {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "runtime.max_timeout_ms".into(),
                message: "max_timeout_ms must be >= default_timeout_ms".into(),
            });
        }
        if self.runtime.default_adapter == RuntimeKind::Subprocess
            && self.runtime.subprocess.host_binary.is_none()
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "runtime.subprocess.host_binary".into(),
                message: "default_adapter is subprocess but no host_binary is configured; \
                          the adapter will report itself unavailable"
                    .into(),
            });
        }
        if self.runtime.default_adapter == RuntimeKind::RemoteWorker
            && self.runtime.remote_worker.worker_url.is_none()
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "runtime.remote_worker.worker_url".into(),
                message: "default_adapter is remote_worker but no worker_url is configured; \
                          the adapter will report itself unavailable"
                    .into(),
            });
        }

        if self.approval.preview_char_limit == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "approval.preview_char_limit".into(),
                message: "preview_char_limit must be greater than 0".into(),
            });
        }

        for (i, pattern) in self.tools.exec_security.denied_patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("tools.exec_security.denied_patterns[{i}]"),
                    message: format!("invalid regex \"{pattern}\": {e}"),
                });
            }
        }

        if self.store.data_dir.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.data_dir".into(),
                message: "data_dir must not be empty".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn default_config_passes() {
        let issues = Config::default().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").expect("expected server.port error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = Config::default();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.cors.allowed_origins")
            .expect("expected CORS wildcard warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn subprocess_default_without_binary_is_warning() {
        let mut cfg = Config::default();
        cfg.runtime.default_adapter = RuntimeKind::Subprocess;
        cfg.runtime.subprocess.host_binary = None;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "runtime.subprocess.host_binary")
            .expect("expected host_binary warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn max_timeout_below_default_is_error() {
        let mut cfg = Config::default();
        cfg.runtime.max_timeout_ms = 1000;
        cfg.runtime.default_timeout_ms = 30_000;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "runtime.max_timeout_ms").is_some());
    }

    #[test]
    fn invalid_denied_pattern_is_error() {
        let mut cfg = Config::default();
        cfg.tools.exec_security.denied_patterns = vec![r"[invalid".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "tools.exec_security.denied_patterns[0]")
            .expect("expected regex error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn load_from_missing_path_uses_defaults() {
        let cfg =
            Config::load_from_path(std::path::Path::new("/nonexistent/codegate.toml")).unwrap();
        assert_eq!(cfg.server.port, 3210);
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codegate.toml");
        std::fs::write(&path, "[server]\nport = 9999\n").unwrap();
        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.server.port, 9999);
    }
}
