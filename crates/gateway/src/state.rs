use std::sync::Arc;

use cg_approval::ApprovalCoordinator;
use cg_credentials::CredentialResolver;
use cg_domain::config::Config;
use cg_exec::ProcessManager;
use cg_invocation::ToolInvocationService;
use cg_lifecycle::RunLifecycleManager;
use cg_mcp_client::McpManager;
use cg_policy::PolicyEvaluator;
use cg_registry::WorkspaceRegistry;
use cg_runtime::token::CallbackTokenizer;
use cg_runtime::RuntimeOrchestrator;

use crate::approval_index::ApprovalIndex;
use crate::store::{JsonlPolicyStore, KeyringCredentialStore, SourceStore};

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by the component (§4) that owns the underlying
/// service; the composition root wires all of it together in
/// [`crate::bootstrap`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Run lifecycle & approvals (H, E) ────────────────────────────────
    pub lifecycle: Arc<RunLifecycleManager>,
    pub approvals: Arc<ApprovalCoordinator>,

    // ── Policy & credentials (B, C) ──────────────────────────────────────
    pub policy: Arc<PolicyEvaluator>,
    pub credentials: Arc<CredentialResolver>,

    // ── Registry, invocation, runtime dispatch (A/I, F, D, G) ────────────
    pub registry: Arc<WorkspaceRegistry>,
    pub invocation: Arc<ToolInvocationService>,
    pub orchestrator: Arc<RuntimeOrchestrator>,

    /// Approval id → run id, so `POST /v1/approvals/:id` can find the run
    /// an approval belongs to without widening `cg-approval`'s own API.
    pub approval_index: Arc<ApprovalIndex>,

    // ── Persistence adapters backing the admin CRUD surface (§6.5) ──────
    pub sources: Arc<SourceStore>,
    pub policy_store: Arc<JsonlPolicyStore>,
    pub credential_store: Arc<KeyringCredentialStore>,

    // ── External integrations ────────────────────────────────────────────
    pub mcp: Arc<McpManager>,
    pub processes: Arc<ProcessManager>,

    /// Verifies the `Authorization: Bearer <token>` a runtime adapter
    /// attaches to callbacks at `/v1/runtime/tool-call` (§6.1). `None`
    /// when no signing key is configured for this process — the
    /// remote-worker adapter reports itself unavailable in that case.
    pub callback_tokenizer: Option<Arc<CallbackTokenizer>>,

    /// SHA-256 hash of the control-plane API bearer token, read once at
    /// startup. `None` disables auth enforcement (dev mode).
    pub api_token_hash: Option<Vec<u8>>,

    /// Precompiled exec denied-pattern regexes, compiled once at startup.
    pub denied_command_set: Arc<regex::RegexSet>,
}
