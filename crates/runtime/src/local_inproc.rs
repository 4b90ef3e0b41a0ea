//! The `local-inproc` adapter (§4.G): runs the sandbox on a blocking
//! thread of this process and bridges its `tools.*` calls straight into
//! component F over a tokio `Handle::block_on` hop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cg_domain::RuntimeKind;
use cg_invocation::ToolInvocationService;

use crate::bridge::InProcBridge;
use crate::sandbox;
use crate::{ExecuteRequest, ExecuteResult, ExecuteStatus, RuntimeAdapter};

pub struct LocalInprocAdapter {
    invocation: Arc<ToolInvocationService>,
}

impl LocalInprocAdapter {
    pub fn new(invocation: Arc<ToolInvocationService>) -> Self {
        Self { invocation }
    }
}

#[async_trait]
impl RuntimeAdapter for LocalInprocAdapter {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::LocalInproc
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn execute(&self, request: ExecuteRequest) -> ExecuteResult {
        let started = Instant::now();
        let handle = tokio::runtime::Handle::current();
        let invocation = self.invocation.clone();
        let run_id = request.run_id.clone();
        let code = request.code.clone();

        let task = tokio::task::spawn_blocking(move || {
            let bridge = Box::new(InProcBridge::new(handle, invocation, run_id));
            sandbox::run(&code, bridge)
        });

        let deadline = Duration::from_millis(request.timeout_ms);
        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(outcome)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                if outcome.denied {
                    ExecuteResult {
                        status: ExecuteStatus::Denied,
                        stdout: outcome.stdout,
                        stderr: outcome.stderr,
                        value: None,
                        error: outcome.error,
                        exit_code: None,
                        duration_ms,
                    }
                } else if let Some(error) = outcome.error {
                    ExecuteResult {
                        status: ExecuteStatus::Failed,
                        stdout: outcome.stdout,
                        stderr: outcome.stderr,
                        value: None,
                        error: Some(error),
                        exit_code: None,
                        duration_ms,
                    }
                } else {
                    ExecuteResult {
                        status: ExecuteStatus::Completed,
                        stdout: outcome.stdout,
                        stderr: outcome.stderr,
                        value: outcome.value,
                        error: None,
                        exit_code: None,
                        duration_ms,
                    }
                }
            }
            Ok(Err(join_err)) => ExecuteResult {
                status: ExecuteStatus::Failed,
                stdout: String::new(),
                stderr: String::new(),
                value: None,
                error: Some(format!("internal: sandbox task panicked: {join_err}")),
                exit_code: None,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(_elapsed) => {
                // The blocking task is left to finish on its own thread;
                // boa has no interruption hook we can use from here, so
                // its eventual result is simply discarded.
                ExecuteResult {
                    status: ExecuteStatus::TimedOut,
                    stdout: String::new(),
                    stderr: String::new(),
                    value: None,
                    error: Some("run deadline elapsed".into()),
                    exit_code: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_approval::ApprovalCoordinator;
    use cg_credentials::CredentialResolver;
    use cg_domain::{ApprovalMode, ExecutionContext, RunStatus};
    use cg_lifecycle::{InMemoryStateStore, RunLifecycleManager};
    use cg_policy::PolicyEvaluator;
    use cg_providers::ProviderRegistry;
    use std::path::PathBuf;

    struct NoRulesStore;
    #[async_trait::async_trait]
    impl cg_policy::PolicyStore for NoRulesStore {
        async fn rules_for_workspace(&self, _workspace_id: &str) -> anyhow::Result<Vec<cg_domain::PolicyRule>> {
            Ok(vec![])
        }
    }

    struct EmptyVault;
    #[async_trait::async_trait]
    impl cg_credentials::SecretVault for EmptyVault {
        async fn read_secret(&self, _secret_ref: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
        async fn find_record(
            &self,
            _source_id: &str,
            _scope: &cg_domain::CredentialScope,
        ) -> anyhow::Result<Option<cg_domain::CredentialRecord>> {
            Ok(None)
        }
    }

    async fn adapter() -> (LocalInprocAdapter, Arc<RunLifecycleManager>) {
        let lifecycle = Arc::new(RunLifecycleManager::new(
            Arc::new(InMemoryStateStore::default()),
            Arc::new(ApprovalCoordinator::new(500)),
            Duration::from_secs(60),
        ));
        let policy = Arc::new(PolicyEvaluator::new(Arc::new(NoRulesStore), ApprovalMode::Allow));
        let approvals = Arc::new(ApprovalCoordinator::new(500));
        let credentials = Arc::new(CredentialResolver::new(Arc::new(EmptyVault), "x-api-key".into(), Duration::from_secs(60)));
        let builtin_source = cg_domain::Source {
            id: "builtin".into(),
            workspace_id: "ws1".into(),
            name: "builtin".into(),
            kind: cg_domain::SourceKind::Builtin,
            endpoint: None,
            config: serde_json::Value::Null,
            enabled: true,
            source_hash: "h1".into(),
        };
        let providers = Arc::new(ProviderRegistry::from_sources(
            &[builtin_source],
            Arc::new(cg_mcp_client::McpManager::empty()),
            Arc::new(cg_exec::ProcessManager::new(Default::default())),
            PathBuf::from("."),
        ));
        let invocation = Arc::new(ToolInvocationService::new(
            policy,
            approvals,
            credentials,
            providers,
            lifecycle.clone(),
            Duration::from_secs(5),
        ));
        (LocalInprocAdapter::new(invocation), lifecycle)
    }

    #[tokio::test]
    async fn plain_code_completes() {
        let (adapter, lifecycle) = adapter().await;
        let ctx = ExecutionContext {
            actor: cg_domain::Actor::User { id: "u1".into() },
            workspace_id: "ws1".into(),
            organization_id: None,
            client_id: None,
            tags: vec![],
        };
        let run = lifecycle
            .submit(ctx, "return 1 + 1;".into(), RuntimeKind::LocalInproc, 5000)
            .await
            .unwrap();
        lifecycle.transition(&run.id, RunStatus::Running).await.unwrap();

        let result = adapter
            .execute(ExecuteRequest {
                run_id: run.id,
                code: "return 1 + 1;".into(),
                timeout_ms: 5000,
            })
            .await;
        assert_eq!(result.status, ExecuteStatus::Completed);
        assert_eq!(result.value, Some(serde_json::json!(2)));
    }

    /// Drives a real `tools.process.list({})` call the way a genuine
    /// sandboxed snippet would, all the way through the bridge into F's
    /// snapshot lookup and D's builtin provider dispatch — catches the
    /// `tool_path` (dotted name, e.g. "process.list") vs `descriptor.id`
    /// ("source_id:name") mismatch that a test hand-constructing
    /// `ToolCallRequest` directly would miss (§8 scenario a, §10.4).
    #[tokio::test]
    async fn builtin_tool_call_round_trips_end_to_end() {
        let (adapter, lifecycle) = adapter().await;

        let descriptor = cg_domain::ToolDescriptor {
            id: "builtin:process.list".into(),
            source_id: "builtin".into(),
            name: "process.list".into(),
            description: "list background process sessions".into(),
            input_schema: serde_json::json!({"type": "object"}),
            provider: cg_domain::ProviderKind::Builtin {
                name: "process.list".into(),
            },
            approval_mode: Some(ApprovalMode::Allow),
        };
        let snapshot = Arc::new(cg_domain::ToolRegistrySnapshot {
            version: 1,
            tools: vec![descriptor],
        });

        let ctx = ExecutionContext {
            actor: cg_domain::Actor::User { id: "u1".into() },
            workspace_id: "ws1".into(),
            organization_id: None,
            client_id: None,
            tags: vec![],
        };
        let run = lifecycle
            .submit(
                ctx,
                "return await tools.process.list({});".into(),
                RuntimeKind::LocalInproc,
                5000,
            )
            .await
            .unwrap();
        adapter.invocation.pin_snapshot(&run.id, snapshot);
        lifecycle.transition(&run.id, RunStatus::Running).await.unwrap();

        let result = adapter
            .execute(ExecuteRequest {
                run_id: run.id.clone(),
                code: "return await tools.process.list({});".into(),
                timeout_ms: 5000,
            })
            .await;

        adapter.invocation.unpin_snapshot(&run.id);

        assert_eq!(result.status, ExecuteStatus::Completed);
        assert_eq!(result.value, Some(serde_json::json!([])));
    }

    #[tokio::test]
    async fn runtime_throw_surfaces_as_failed() {
        let (adapter, lifecycle) = adapter().await;
        let ctx = ExecutionContext {
            actor: cg_domain::Actor::User { id: "u1".into() },
            workspace_id: "ws1".into(),
            organization_id: None,
            client_id: None,
            tags: vec![],
        };
        let run = lifecycle
            .submit(ctx, "throw new Error('boom');".into(), RuntimeKind::LocalInproc, 5000)
            .await
            .unwrap();
        lifecycle.transition(&run.id, RunStatus::Running).await.unwrap();

        let result = adapter
            .execute(ExecuteRequest {
                run_id: run.id,
                code: "throw new Error('boom');".into(),
                timeout_ms: 5000,
            })
            .await;
        assert_eq!(result.status, ExecuteStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
