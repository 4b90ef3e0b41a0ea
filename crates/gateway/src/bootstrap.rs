//! `AppState` construction, extracted from `main.rs` so `serve`, `run`,
//! and `doctor` share one boot path (composition root, SPEC_FULL §5).
//!
//! Wiring order matters: the approval coordinator and the lifecycle
//! manager each need the other (the coordinator notifies H when a call
//! starts waiting; H denies every pending approval on cancel/timeout), so
//! the coordinator is built with a no-op sink and `set_sink` closes the
//! cycle once the lifecycle manager exists.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cg_approval::ApprovalCoordinator;
use cg_credentials::CredentialResolver;
use cg_domain::config::{Config, ConfigSeverity, SystemDefaultEffect};
use cg_domain::{ApprovalMode, Source, SourceKind};
use cg_exec::ProcessManager;
use cg_invocation::{LifecycleApprovalSink, ToolInvocationService};
use cg_lifecycle::RunLifecycleManager;
use cg_mcp_client::McpManager;
use cg_policy::PolicyEvaluator;
use cg_providers::ProviderRegistry;
use cg_registry::{ConfigManifestExpander, SourceExpander, WorkspaceRegistry, WorkspaceToolBuilder};
use cg_runtime::local_inproc::LocalInprocAdapter;
use cg_runtime::remote_worker::RemoteWorkerAdapter;
use cg_runtime::subprocess::SubprocessAdapter;
use cg_runtime::token::CallbackTokenizer;
use cg_runtime::{RuntimeDispatcher, RuntimeOrchestrator};

use crate::approval_index::{ApprovalIndex, IndexingApprovalSink};
use crate::state::AppState;
use crate::store::{JsonlPolicyStore, KeyringCredentialStore, SourceStore};

/// The workspace every CLI-submitted run and the builtin source seed use
/// absent an explicit tenant. Multi-tenant deployments name their own
/// workspace ids when creating `Source` records through the API.
pub const DEFAULT_WORKSPACE: &str = "default";

/// Validate config, initialize every subsystem, and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let data_dir = PathBuf::from(&config.store.data_dir);
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("creating state dir {}", data_dir.display()))?;

    // ── Run lifecycle + approvals (H, E) ─────────────────────────────
    let state_store = cg_lifecycle::open_configured(&data_dir)
        .await
        .context("opening run state store")?;
    let approvals = Arc::new(ApprovalCoordinator::new(config.approval.preview_char_limit));
    let retention = Duration::from_millis(config.store.run_session_retention_ms);
    let lifecycle = Arc::new(RunLifecycleManager::new(state_store, approvals.clone(), retention));
    let approval_index = Arc::new(ApprovalIndex::new());
    approvals.set_sink(Arc::new(IndexingApprovalSink::new(
        approval_index.clone(),
        Arc::new(LifecycleApprovalSink::new(lifecycle.clone())),
    )));
    tracing::info!("run lifecycle + approval coordinator ready");

    // ── Tool sources (A/I's input, persisted by the gateway) ─────────
    let sources = Arc::new(SourceStore::open(&data_dir).await.context("opening source store")?);
    ensure_builtin_source(&sources).await.context("seeding builtin tool source")?;
    tracing::info!(count = sources.list_all().len(), "tool sources loaded");

    // ── Policy (B) ────────────────────────────────────────────────────
    let policy_store = Arc::new(JsonlPolicyStore::open(&data_dir).await.context("opening policy store")?);
    let system_default = system_default_mode(config.policy.system_default);
    let policy = Arc::new(PolicyEvaluator::new(policy_store.clone(), system_default));
    tracing::info!(?system_default, "policy evaluator ready");

    // ── Credentials (C) ───────────────────────────────────────────────
    let credential_store = Arc::new(
        KeyringCredentialStore::open(&data_dir)
            .await
            .context("opening credential store")?,
    );
    let credentials = Arc::new(CredentialResolver::new(
        credential_store.clone(),
        config.credentials.default_api_key_header.clone(),
        Duration::from_secs(config.credentials.cache_ttl_secs),
    ));
    tracing::info!("credential resolver ready");

    // ── MCP servers (D's Mcp transport) ──────────────────────────────
    let mcp = if config.mcp.servers.is_empty() {
        tracing::info!("no MCP servers configured");
        Arc::new(McpManager::empty())
    } else {
        tracing::info!(count = config.mcp.servers.len(), "initializing MCP servers");
        Arc::new(McpManager::from_config(&config.mcp).await)
    };
    if mcp.tool_count() > 0 {
        tracing::info!(servers = mcp.server_count(), tools = mcp.tool_count(), "MCP tools discovered");
    }

    // ── Process manager + provider registry (D) ──────────────────────
    let processes = Arc::new(ProcessManager::new(config.tools.exec.clone()));
    let workspace_root = PathBuf::from(&config.tools.workspace_root);
    tokio::fs::create_dir_all(&workspace_root)
        .await
        .with_context(|| format!("creating workspace root {}", workspace_root.display()))?;
    let providers = Arc::new(ProviderRegistry::from_sources(
        &sources.list_all(),
        mcp.clone(),
        processes.clone(),
        workspace_root,
    ));
    for init_err in providers.init_errors() {
        tracing::warn!(
            source_id = %init_err.source_id,
            kind = %init_err.kind,
            error = %init_err.error,
            "provider failed to initialize, its tools are unavailable"
        );
    }
    tracing::info!("provider registry ready");

    // ── Tool registry (A/I) ──────────────────────────────────────────
    let mut expanders: HashMap<SourceKind, Arc<dyn SourceExpander>> = HashMap::new();
    let manifest_expander: Arc<dyn SourceExpander> = Arc::new(ConfigManifestExpander);
    for kind in [SourceKind::Http, SourceKind::Mcp, SourceKind::GraphQl, SourceKind::Builtin] {
        expanders.insert(kind, manifest_expander.clone());
    }
    let registry = Arc::new(WorkspaceRegistry::new(WorkspaceToolBuilder::new(expanders)));
    for workspace_id in workspace_ids(&sources.list_all()) {
        let workspace_sources = sources.list_for_workspace(&workspace_id);
        match registry.rebuild(&workspace_id, &workspace_sources).await {
            Ok(diff) => tracing::info!(
                workspace_id = %workspace_id,
                added = diff.added.len(),
                changed = diff.changed.len(),
                removed = diff.removed.len(),
                "tool registry snapshot built"
            ),
            Err(e) => tracing::error!(workspace_id = %workspace_id, error = %e, "tool registry build failed"),
        }
    }

    // ── Invocation (F) ────────────────────────────────────────────────
    let call_timeout = Duration::from_millis(config.runtime.default_timeout_ms);
    let invocation = Arc::new(ToolInvocationService::new(
        policy.clone(),
        approvals.clone(),
        credentials.clone(),
        providers,
        lifecycle.clone(),
        call_timeout,
    ));

    // ── Runtime adapters + dispatcher (G) ─────────────────────────────
    let local_inproc = LocalInprocAdapter::new(invocation.clone());
    let subprocess = SubprocessAdapter::new(invocation.clone(), config.runtime.subprocess.clone());
    let remote_worker = RemoteWorkerAdapter::new(reqwest::Client::new(), config.runtime.remote_worker.clone());
    let callback_tokenizer = std::env::var(&config.runtime.remote_worker.callback_signing_key_env)
        .ok()
        .map(|key| Arc::new(CallbackTokenizer::new(key.into_bytes())));
    if callback_tokenizer.is_none() {
        tracing::warn!(
            env_var = %config.runtime.remote_worker.callback_signing_key_env,
            "no callback signing key set — remote-worker adapter's callbacks cannot be verified"
        );
    }
    let dispatcher = Arc::new(RuntimeDispatcher::new(
        local_inproc,
        subprocess,
        remote_worker,
        config.runtime.default_adapter,
    ));
    tracing::info!(default_adapter = %config.runtime.default_adapter, "runtime dispatcher ready");

    let orchestrator = Arc::new(RuntimeOrchestrator::new(
        lifecycle.clone(),
        invocation.clone(),
        registry.clone(),
        dispatcher,
    ));

    // ── Control-plane bearer token ─────────────────────────────────────
    let api_token_hash = {
        use sha2::{Digest, Sha256};
        match std::env::var("CODEGATE_API_TOKEN") {
            Ok(token) if !token.is_empty() => {
                tracing::info!("API bearer-token auth enabled");
                Some(Sha256::digest(token.as_bytes()).to_vec())
            }
            _ => {
                tracing::warn!("API bearer-token auth DISABLED — set CODEGATE_API_TOKEN to enable");
                None
            }
        }
    };

    let denied_command_set = Arc::new(
        regex::RegexSet::new(&config.tools.exec_security.denied_patterns)
            .context("invalid regex in tools.exec_security.denied_patterns")?,
    );

    Ok(AppState {
        config,
        lifecycle,
        approvals,
        policy,
        credentials,
        registry,
        invocation,
        orchestrator,
        approval_index,
        sources,
        policy_store,
        credential_store,
        mcp,
        processes,
        callback_tokenizer,
        api_token_hash,
        denied_command_set,
    })
}

/// If no builtin source exists yet for [`DEFAULT_WORKSPACE`], seed one
/// exposing `exec.run` and the `fs.*` file tools — the always-available
/// baseline every fresh install has something to run code against.
async fn ensure_builtin_source(sources: &SourceStore) -> anyhow::Result<()> {
    let already_seeded = sources
        .list_for_workspace(DEFAULT_WORKSPACE)
        .iter()
        .any(|s| matches!(s.kind, SourceKind::Builtin));
    if already_seeded {
        return Ok(());
    }

    let config = serde_json::json!({
        "tools": [
            {
                "name": "exec.run",
                "description": "Run a shell command inside the workspace sandbox.",
                "input_schema": {
                    "type": "object",
                    "properties": { "command": { "type": "string" } },
                    "required": ["command"],
                },
                "provider": { "kind": "builtin", "name": "exec.run" },
                "approval_mode": "require_approval",
            },
            {
                "name": "fs.read",
                "description": "Read a file from the workspace sandbox.",
                "input_schema": {
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"],
                },
                "provider": { "kind": "builtin", "name": "fs.read" },
                "approval_mode": "allow",
            },
            {
                "name": "fs.write",
                "description": "Write a file in the workspace sandbox.",
                "input_schema": {
                    "type": "object",
                    "properties": { "path": { "type": "string" }, "content": { "type": "string" } },
                    "required": ["path", "content"],
                },
                "provider": { "kind": "builtin", "name": "fs.write" },
                "approval_mode": "require_approval",
            },
            {
                "name": "fs.list",
                "description": "List a directory in the workspace sandbox.",
                "input_schema": {
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"],
                },
                "provider": { "kind": "builtin", "name": "fs.list" },
                "approval_mode": "allow",
            },
            {
                "name": "process.list",
                "description": "List background process sessions started by exec.run.",
                "input_schema": { "type": "object" },
                "provider": { "kind": "builtin", "name": "process.list" },
                "approval_mode": "allow",
            },
        ],
    });

    let source = Source {
        id: "builtin".into(),
        workspace_id: DEFAULT_WORKSPACE.into(),
        name: "builtin".into(),
        kind: SourceKind::Builtin,
        endpoint: None,
        source_hash: Source::compute_hash(SourceKind::Builtin, None, &config),
        config,
        enabled: true,
    };
    sources.upsert(source).await
}

fn workspace_ids(sources: &[Source]) -> Vec<String> {
    let mut ids: Vec<String> = sources.iter().map(|s| s.workspace_id.clone()).collect();
    ids.push(DEFAULT_WORKSPACE.to_string());
    ids.sort();
    ids.dedup();
    ids
}

fn system_default_mode(effect: SystemDefaultEffect) -> ApprovalMode {
    match effect {
        SystemDefaultEffect::Allow => ApprovalMode::Allow,
        SystemDefaultEffect::RequireApproval => ApprovalMode::RequireApproval,
        SystemDefaultEffect::Deny => ApprovalMode::Deny,
    }
}
