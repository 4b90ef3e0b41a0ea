pub mod config;
pub mod credential;
pub mod doctor;
pub mod init;
pub mod pid;
pub mod run;
pub mod systemd;

use clap::{Parser, Subcommand};

/// codegate — a multi-tenant code-mode tool execution gateway.
#[derive(Debug, Parser)]
#[command(name = "codegate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Initialize a new codegate project in the current directory.
    Init {
        /// Skip interactive prompts and use sensible defaults.
        #[arg(long)]
        defaults: bool,
    },
    /// Submit a single code run and print the result.
    Run {
        /// Path to a JS file to execute, or "-" to read from stdin.
        path: String,
        /// Runtime adapter to execute under.
        #[arg(long)]
        runtime: Option<String>,
        /// Run deadline in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Output the full event stream as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Print version information.
    Version,
    /// Systemd service management.
    #[command(subcommand)]
    Systemd(SystemdCommand),
    /// Local credential store utilities (OS keychain).
    #[command(subcommand)]
    Credential(CredentialCommand),
}

#[derive(Debug, Subcommand)]
pub enum SystemdCommand {
    /// Generate a systemd unit file and print it to stdout.
    Generate {
        /// Linux user to run the service as.
        #[arg(long, default_value = "codegate")]
        user: String,
        /// Working directory for the service.
        #[arg(long)]
        working_dir: Option<String>,
        /// Path to the config file.
        #[arg(long, default_value = "config.toml")]
        config: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum CredentialCommand {
    /// Store a secret value in the OS keychain under a vault reference.
    Set {
        /// Opaque vault reference (matches a `CredentialRecord.secret_ref`).
        secret_ref: String,
    },
    /// Check whether a vault reference has a stored secret (masked).
    Get {
        /// Opaque vault reference.
        secret_ref: String,
    },
    /// Remove a secret from the OS keychain.
    Delete {
        /// Opaque vault reference.
        secret_ref: String,
    },
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `CODEGATE_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the path
/// that was used.
///
/// Shared by `serve`, `doctor`, and `config` subcommands so the logic
/// lives in one place.
pub fn load_config() -> anyhow::Result<(cg_domain::config::Config, String)> {
    let config_path =
        std::env::var("CODEGATE_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        cg_domain::config::Config::default()
    };

    Ok((config, config_path))
}
