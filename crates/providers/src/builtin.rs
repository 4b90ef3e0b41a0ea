//! Built-in provider adapter (§4.D) — in-process implementations backed
//! by `cg-exec`, sandboxed to one workspace root.

use std::path::PathBuf;
use std::sync::Arc;

use cg_domain::{ProviderKind, ToolDescriptor, ToolInvocationResult};
use cg_exec::manager::ProcessManager;
use cg_exec::{exec, file_ops};
use serde_json::Value;

use crate::traits::{InvocationContext, Provider, ProviderError};

pub struct BuiltinProvider {
    process_manager: Arc<ProcessManager>,
    workspace_root: PathBuf,
}

impl BuiltinProvider {
    pub fn new(process_manager: Arc<ProcessManager>, workspace_root: PathBuf) -> Self {
        Self {
            process_manager,
            workspace_root,
        }
    }

    async fn dispatch(&self, name: &str, args: Value) -> Result<Value, ProviderError> {
        match name {
            "exec.run" => {
                let req: exec::ExecRequest = serde_json::from_value(args)
                    .map_err(|e| ProviderError::Invalid(e.to_string()))?;
                let resp = exec::exec(&self.process_manager, req).await;
                serde_json::to_value(resp).map_err(|e| ProviderError::Request(e.to_string()))
            }
            "fs.read" => self.run_file_op(args, file_ops::file_read).await,
            "fs.write" => self.run_file_op(args, file_ops::file_write).await,
            "fs.append" => self.run_file_op(args, file_ops::file_append).await,
            "fs.move" => self.run_file_op(args, file_ops::file_move).await,
            "fs.delete" => self.run_file_op(args, file_ops::file_delete).await,
            "fs.list" => self.run_file_op(args, file_ops::file_list).await,
            "process.list" => {
                serde_json::to_value(self.process_manager.list())
                    .map_err(|e| ProviderError::Request(e.to_string()))
            }
            other => Err(ProviderError::Invalid(format!("unknown builtin tool {other}"))),
        }
    }

    async fn run_file_op<Req, F, Fut>(&self, args: Value, op: F) -> Result<Value, ProviderError>
    where
        Req: serde::de::DeserializeOwned,
        F: FnOnce(&std::path::Path, Req) -> Fut,
        Fut: std::future::Future<Output = Result<Value, String>>,
    {
        let req: Req = serde_json::from_value(args).map_err(|e| ProviderError::Invalid(e.to_string()))?;
        op(&self.workspace_root, req)
            .await
            .map_err(ProviderError::Invalid)
    }
}

#[async_trait::async_trait]
impl Provider for BuiltinProvider {
    async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        args: Value,
        _context: &InvocationContext,
    ) -> Result<ToolInvocationResult, ProviderError> {
        let ProviderKind::Builtin { name } = &descriptor.provider else {
            return Err(ProviderError::Invalid(format!(
                "descriptor {} is not a builtin provider",
                descriptor.id
            )));
        };

        match self.dispatch(name, args).await {
            Ok(body) => Ok(ToolInvocationResult::ok(body)),
            Err(ProviderError::Invalid(msg)) => Ok(ToolInvocationResult::error(Value::String(msg))),
            Err(other) => Err(other),
        }
    }
}
