//! Runtime dispatcher (component G, SPEC_FULL §4.G).
//!
//! Selects and drives one of three `RuntimeAdapter` implementations per
//! Run — `local-inproc` (in-process boa_engine sandbox), `subprocess`
//! (same sandbox hosted in a child process, JSON-RPC over stdio), or
//! `remote-worker` (an HTTPS-reachable worker pool) — and normalizes
//! their outcome into the wire-stable result shape every caller sees.

pub mod bridge;
pub mod local_inproc;
pub mod orchestrator;
pub mod remote_worker;
pub mod sandbox;
pub mod subprocess;
pub mod token;

pub use orchestrator::RuntimeOrchestrator;

use async_trait::async_trait;
use cg_domain::RuntimeKind;
use serde::{Deserialize, Serialize};

/// Input to one `execute()` call, shared by every adapter (§4.G).
pub struct ExecuteRequest {
    pub run_id: String,
    pub code: String,
    pub timeout_ms: u64,
}

/// Terminal outcome of an `execute()` call. Every adapter produces this
/// exact shape regardless of where the code actually ran (§4.G: "all
/// three adapters must produce results with identical shape").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub status: ExecuteStatus,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteStatus {
    Completed,
    Denied,
    Failed,
    TimedOut,
}

/// One execution backend (§4.G). `kind()` and `is_available()` let G pick
/// an adapter and fail fast with `runtime_error` rather than hang when a
/// backend isn't reachable.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    fn kind(&self) -> RuntimeKind;
    fn is_available(&self) -> bool;
    async fn execute(&self, request: ExecuteRequest) -> ExecuteResult;
}

/// Selects the adapter for a Run's requested `runtimeKind`, holding one
/// instance of each backend for the lifetime of the process.
pub struct RuntimeDispatcher {
    local_inproc: local_inproc::LocalInprocAdapter,
    subprocess: subprocess::SubprocessAdapter,
    remote_worker: remote_worker::RemoteWorkerAdapter,
    default_adapter: RuntimeKind,
}

impl RuntimeDispatcher {
    pub fn new(
        local_inproc: local_inproc::LocalInprocAdapter,
        subprocess: subprocess::SubprocessAdapter,
        remote_worker: remote_worker::RemoteWorkerAdapter,
        default_adapter: RuntimeKind,
    ) -> Self {
        Self {
            local_inproc,
            subprocess,
            remote_worker,
            default_adapter,
        }
    }

    pub fn adapter_for(&self, requested: Option<RuntimeKind>) -> &dyn RuntimeAdapter {
        match requested.unwrap_or(self.default_adapter) {
            RuntimeKind::LocalInproc => &self.local_inproc,
            RuntimeKind::Subprocess => &self.subprocess,
            RuntimeKind::RemoteWorker => &self.remote_worker,
        }
    }
}
