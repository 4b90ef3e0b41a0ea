//! Tool invocation service (component F, SPEC_FULL §4.F).
//!
//! The single path every `tools.*` call made by running code takes:
//! resolve the Run, look the call up in the Run's pinned snapshot, ask
//! policy (B), gate on approval (E) when required, resolve credentials
//! (C), dispatch to a provider (D), and record a receipt on the Run (H)
//! for at-most-once replay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cg_approval::{ApprovalCoordinator, ApprovalEventSink};
use cg_credentials::CredentialResolver;
use cg_domain::{
    ApprovalMode, ApprovalOutcome, ApprovalRequest, Error, ProviderKind, RunEventKind, RunStatus,
    ToolRegistrySnapshot, TraceEvent,
};
use cg_lifecycle::RunLifecycleManager;
use cg_policy::PolicyEvaluator;
use cg_providers::{InvocationContext, ProviderRegistry};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single `tools.*` call surfaced by a runtime adapter (§6.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub run_id: String,
    pub call_id: String,
    pub tool_path: String,
    #[serde(default)]
    pub input: Value,
}

/// Wire-stable callback response envelope (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvocationResponse {
    Ok {
        ok: bool,
        value: Value,
    },
    Denied {
        ok: bool,
        kind: &'static str,
        error: String,
    },
    Failed {
        ok: bool,
        kind: &'static str,
        error: String,
    },
}

impl InvocationResponse {
    pub fn ok(value: Value) -> Self {
        InvocationResponse::Ok { ok: true, value }
    }

    pub fn denied(error: impl Into<String>) -> Self {
        InvocationResponse::Denied {
            ok: false,
            kind: "denied",
            error: error.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        InvocationResponse::Failed {
            ok: false,
            kind: "failed",
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, InvocationResponse::Ok { .. })
    }
}

/// Bridges E's "a request just became the run's pending approval" callback
/// into H: transitions the run to `awaiting_approval` and emits the
/// matching event, both fire-and-forget from the coordinator's point of
/// view (the coordinator does not await this).
pub struct LifecycleApprovalSink {
    lifecycle: Arc<RunLifecycleManager>,
}

impl LifecycleApprovalSink {
    pub fn new(lifecycle: Arc<RunLifecycleManager>) -> Self {
        Self { lifecycle }
    }
}

impl ApprovalEventSink for LifecycleApprovalSink {
    fn on_awaiting_approval(&self, run_id: &str, request: &ApprovalRequest) {
        let lifecycle = self.lifecycle.clone();
        let run_id = run_id.to_string();
        let approval_id = request.id.clone();
        let tool_id = request.tool_id.clone();
        let preview = request.input_preview.clone();

        TraceEvent::ApprovalRequested {
            run_id: run_id.clone(),
            approval_id: approval_id.clone(),
            tool_id: tool_id.clone(),
        }
        .emit();

        tokio::spawn(async move {
            if lifecycle.transition(&run_id, RunStatus::AwaitingApproval).await.is_ok() {
                let _ = lifecycle
                    .emit_event(
                        &run_id,
                        RunEventKind::AwaitingApproval {
                            approval_id,
                            tool_path: tool_id,
                            input_preview: Some(preview),
                        },
                    )
                    .await;
            }
        });
    }
}

/// Per-run receipt wrapper, stored on H for at-most-once replay (§3
/// invariant 6, §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Receipt {
    tool_path: String,
    decision: String,
    duration_ms: u64,
    response: InvocationResponse,
}

pub struct ToolInvocationService {
    policy: Arc<PolicyEvaluator>,
    approvals: Arc<ApprovalCoordinator>,
    credentials: Arc<CredentialResolver>,
    /// Swappable so a workspace's tool sources can be reconfigured (new
    /// provider constructed from the new source list) without tearing
    /// down runs that have this service's `run_snapshots` pinned.
    providers: Mutex<Arc<ProviderRegistry>>,
    lifecycle: Arc<RunLifecycleManager>,
    /// The exact ToolRegistrySnapshot pinned at Run start (§3 invariant 4).
    /// Populated once via `pin_snapshot` when H submits the run, removed
    /// once the run is reaped.
    run_snapshots: Mutex<HashMap<String, Arc<ToolRegistrySnapshot>>>,
    call_timeout: Duration,
}

impl ToolInvocationService {
    pub fn new(
        policy: Arc<PolicyEvaluator>,
        approvals: Arc<ApprovalCoordinator>,
        credentials: Arc<CredentialResolver>,
        providers: Arc<ProviderRegistry>,
        lifecycle: Arc<RunLifecycleManager>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            approvals,
            credentials,
            providers: Mutex::new(providers),
            lifecycle,
            run_snapshots: Mutex::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Swap the provider registry in place, e.g. after a tool source was
    /// added or removed. Runs with a snapshot already pinned are
    /// unaffected by this call; only their next dispatch sees the new
    /// registry.
    pub fn swap_providers(&self, providers: Arc<ProviderRegistry>) {
        *self.providers.lock() = providers;
    }

    /// Pin the snapshot a run's `tools.*` calls resolve against. Must be
    /// called once, at submission, before the runtime starts executing.
    pub fn pin_snapshot(&self, run_id: &str, snapshot: Arc<ToolRegistrySnapshot>) {
        self.run_snapshots.lock().insert(run_id.to_string(), snapshot);
    }

    /// Release a run's pinned snapshot. Safe to call once the run has
    /// reached a terminal state and its receipts are no longer needed.
    pub fn unpin_snapshot(&self, run_id: &str) {
        self.run_snapshots.lock().remove(run_id);
    }

    pub async fn handle_call(&self, call: ToolCallRequest) -> InvocationResponse {
        // callId replay: satisfied from the recorded receipt regardless of
        // the run's current status, so a retried callback after the run
        // already went terminal still gets the original answer.
        if let Some(receipt) = self.lifecycle.get_receipt(&call.run_id, &call.call_id) {
            if let Ok(receipt) = serde_json::from_value::<Receipt>(receipt) {
                return receipt.response;
            }
        }

        let started = Instant::now();

        let Some(run) = self.lifecycle.get(&call.run_id) else {
            return InvocationResponse::failed("run_not_live");
        };
        if run.status.is_terminal() {
            return InvocationResponse::failed("run_not_live");
        }

        let Some(snapshot) = self.run_snapshots.lock().get(&call.run_id).cloned() else {
            return InvocationResponse::failed("run_not_live");
        };
        let Some(descriptor) = snapshot.tools.iter().find(|d| d.name == call.tool_path).cloned() else {
            return self.finish(&call, InvocationResponse::failed("unknown_tool"), "unknown_tool", started).await;
        };

        let decision = self
            .policy
            .evaluate(&run.context, &call.tool_path, &call.input, &descriptor)
            .await;
        TraceEvent::PolicyEvaluated {
            run_id: call.run_id.clone(),
            tool_id: descriptor.id.clone(),
            decision: format!("{:?}", decision.effect),
            matched_rule: decision.matched_rule_id.clone(),
        }
        .emit();

        if decision.effect == ApprovalMode::Deny {
            return self
                .finish(&call, InvocationResponse::denied("policy_deny"), "policy_deny", started)
                .await;
        }

        if decision.effect == ApprovalMode::RequireApproval {
            let outcome = self
                .approvals
                .request_approval(&call.run_id, &descriptor.id, run.context.actor.id(), &call.input)
                .await;
            // Both approved and denied rejoin `running`; a denial fails
            // only this call, not the whole run (§7 catchable denial).
            let _ = self.lifecycle.transition(&call.run_id, RunStatus::Running).await;
            if matches!(outcome, ApprovalOutcome::Denied) {
                return self
                    .finish(&call, InvocationResponse::denied("approval_denied"), "approval_denied", started)
                    .await;
            }
        }

        let mut headers = Vec::new();
        if !matches!(descriptor.provider, ProviderKind::Builtin { .. }) {
            match self
                .credentials
                .resolve(
                    &descriptor.source_id,
                    &run.context.workspace_id,
                    run.context.organization_id.as_deref(),
                    run.context.actor.id(),
                )
                .await
            {
                Ok(resolved) => {
                    if !resolved.header_name.is_empty() {
                        headers.push((resolved.header_name, resolved.header_value));
                    }
                }
                Err(Error::AuthMissing(_)) => {
                    return self
                        .finish(&call, InvocationResponse::failed("auth_missing"), "auth_missing", started)
                        .await;
                }
                Err(e) => {
                    return self
                        .finish(&call, InvocationResponse::failed(e.to_string()), "failed", started)
                        .await;
                }
            }
        }

        let context = InvocationContext {
            headers,
            timeout: Some(self.call_timeout),
        };

        let providers = self.providers.lock().clone();
        let response = match providers.invoke(&descriptor, call.input.clone(), &context).await {
            Ok(result) => {
                TraceEvent::ProviderInvoked {
                    run_id: call.run_id.clone(),
                    tool_id: descriptor.id.clone(),
                    provider: descriptor.provider.label().to_string(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    is_error: result.is_error,
                }
                .emit();
                InvocationResponse::ok(serde_json::json!({
                    "status": result.status,
                    "body": result.body,
                    "isError": result.is_error,
                }))
            }
            Err(e) => InvocationResponse::failed(e.to_string()),
        };

        let decision_label = if response.is_ok() { "allow" } else { "failed" };
        self.finish(&call, response, decision_label, started).await
    }

    async fn finish(
        &self,
        call: &ToolCallRequest,
        response: InvocationResponse,
        decision: &str,
        started: Instant,
    ) -> InvocationResponse {
        let receipt = Receipt {
            tool_path: call.tool_path.clone(),
            decision: decision.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            response: response.clone(),
        };
        if let Ok(value) = serde_json::to_value(&receipt) {
            self.lifecycle.record_receipt(&call.run_id, &call.call_id, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_credentials::SecretVault;
    use cg_domain::{CredentialRecord, CredentialScope, ExecutionContext, PolicyRule, RuntimeKind, ToolDescriptor};
    use cg_lifecycle::InMemoryStateStore;
    use cg_policy::PolicyStore;
    use std::path::PathBuf;

    struct NoRulesStore;
    #[async_trait::async_trait]
    impl PolicyStore for NoRulesStore {
        async fn rules_for_workspace(&self, _workspace_id: &str) -> anyhow::Result<Vec<PolicyRule>> {
            Ok(vec![])
        }
    }

    struct EmptyVault;
    #[async_trait::async_trait]
    impl SecretVault for EmptyVault {
        async fn read_secret(&self, _secret_ref: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
        async fn find_record(
            &self,
            _source_id: &str,
            _scope: &CredentialScope,
        ) -> anyhow::Result<Option<CredentialRecord>> {
            Ok(None)
        }
    }

    fn builtin_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            id: "builtin:exec.run".into(),
            source_id: "builtin".into(),
            name: "exec.run".into(),
            description: "".into(),
            input_schema: serde_json::json!({"type": "object"}),
            provider: ProviderKind::Builtin { name: "process.list".into() },
            approval_mode: None,
        }
    }

    async fn service() -> (Arc<ToolInvocationService>, Arc<RunLifecycleManager>) {
        let lifecycle = Arc::new(RunLifecycleManager::new(
            Arc::new(InMemoryStateStore::default()),
            Arc::new(ApprovalCoordinator::new(500)),
            Duration::from_secs(60),
        ));
        let policy = Arc::new(PolicyEvaluator::new(Arc::new(NoRulesStore), ApprovalMode::Allow));
        let approvals = Arc::new(ApprovalCoordinator::new(500));
        let credentials = Arc::new(CredentialResolver::new(
            Arc::new(EmptyVault),
            "x-api-key".into(),
            Duration::from_secs(60),
        ));
        let providers = Arc::new(ProviderRegistry::from_sources(
            &[],
            Arc::new(cg_mcp_client::McpManager::empty()),
            Arc::new(cg_exec::ProcessManager::new(Default::default())),
            PathBuf::from("."),
        ));
        let svc = Arc::new(ToolInvocationService::new(
            policy,
            approvals,
            credentials,
            providers,
            lifecycle.clone(),
            Duration::from_secs(5),
        ));
        (svc, lifecycle)
    }

    #[tokio::test]
    async fn absent_run_fails_with_run_not_live() {
        let (svc, _lifecycle) = service().await;
        let resp = svc
            .handle_call(ToolCallRequest {
                run_id: "missing".into(),
                call_id: "c1".into(),
                tool_path: "exec.run".into(),
                input: serde_json::json!({}),
            })
            .await;
        assert!(matches!(resp, InvocationResponse::Failed { ref error, .. } if error == "run_not_live"));
    }

    #[tokio::test]
    async fn unknown_tool_in_pinned_snapshot_fails() {
        let (svc, lifecycle) = service().await;
        let ctx = ExecutionContext {
            actor: cg_domain::Actor::User { id: "u1".into() },
            workspace_id: "ws1".into(),
            organization_id: None,
            client_id: None,
            tags: vec![],
        };
        let run = lifecycle.submit(ctx, "x".into(), RuntimeKind::LocalInproc, 1000).await.unwrap();
        lifecycle.transition(&run.id, RunStatus::Running).await.unwrap();
        svc.pin_snapshot(&run.id, Arc::new(ToolRegistrySnapshot::empty()));

        let resp = svc
            .handle_call(ToolCallRequest {
                run_id: run.id,
                call_id: "c1".into(),
                tool_path: "nope".into(),
                input: serde_json::json!({}),
            })
            .await;
        assert!(matches!(resp, InvocationResponse::Failed { ref error, .. } if error == "unknown_tool"));
    }

    #[tokio::test]
    async fn duplicate_call_id_replays_the_receipt() {
        let (svc, lifecycle) = service().await;
        let ctx = ExecutionContext {
            actor: cg_domain::Actor::User { id: "u1".into() },
            workspace_id: "ws1".into(),
            organization_id: None,
            client_id: None,
            tags: vec![],
        };
        let run = lifecycle.submit(ctx, "x".into(), RuntimeKind::LocalInproc, 1000).await.unwrap();
        lifecycle.transition(&run.id, RunStatus::Running).await.unwrap();
        svc.pin_snapshot(
            &run.id,
            Arc::new(ToolRegistrySnapshot {
                version: 1,
                tools: vec![builtin_descriptor()],
            }),
        );

        let call = ToolCallRequest {
            run_id: run.id.clone(),
            call_id: "c1".into(),
            tool_path: "exec.run".into(),
            input: serde_json::json!({}),
        };
        let first = svc.handle_call(call.clone()).await;
        let second = svc.handle_call(call).await;
        assert_eq!(serde_json::to_value(&first).unwrap(), serde_json::to_value(&second).unwrap());
    }

    #[tokio::test]
    async fn policy_deny_short_circuits_before_dispatch() {
        struct DenyStore;
        #[async_trait::async_trait]
        impl PolicyStore for DenyStore {
            async fn rules_for_workspace(&self, _workspace_id: &str) -> anyhow::Result<Vec<PolicyRule>> {
                Ok(vec![])
            }
        }

        let lifecycle = Arc::new(RunLifecycleManager::new(
            Arc::new(InMemoryStateStore::default()),
            Arc::new(ApprovalCoordinator::new(500)),
            Duration::from_secs(60),
        ));
        let policy = Arc::new(PolicyEvaluator::new(Arc::new(DenyStore), ApprovalMode::Deny));
        let approvals = Arc::new(ApprovalCoordinator::new(500));
        let credentials = Arc::new(CredentialResolver::new(
            Arc::new(EmptyVault),
            "x-api-key".into(),
            Duration::from_secs(60),
        ));
        let providers = Arc::new(ProviderRegistry::from_sources(
            &[],
            Arc::new(cg_mcp_client::McpManager::empty()),
            Arc::new(cg_exec::ProcessManager::new(Default::default())),
            PathBuf::from("."),
        ));
        let svc = ToolInvocationService::new(
            policy,
            approvals,
            credentials,
            providers,
            lifecycle.clone(),
            Duration::from_secs(5),
        );

        let ctx = ExecutionContext {
            actor: cg_domain::Actor::User { id: "u1".into() },
            workspace_id: "ws1".into(),
            organization_id: None,
            client_id: None,
            tags: vec![],
        };
        let run = lifecycle.submit(ctx, "x".into(), RuntimeKind::LocalInproc, 1000).await.unwrap();
        lifecycle.transition(&run.id, RunStatus::Running).await.unwrap();
        svc.pin_snapshot(
            &run.id,
            Arc::new(ToolRegistrySnapshot {
                version: 1,
                tools: vec![builtin_descriptor()],
            }),
        );

        let resp = svc
            .handle_call(ToolCallRequest {
                run_id: run.id,
                call_id: "c1".into(),
                tool_path: "exec.run".into(),
                input: serde_json::json!({}),
            })
            .await;
        assert!(matches!(resp, InvocationResponse::Denied { ref error, .. } if error == "policy_deny"));
    }
}
