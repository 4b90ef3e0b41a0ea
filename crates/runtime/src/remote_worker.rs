//! The `remote-worker` adapter (§4.G): POSTs a run payload to an
//! HTTPS-reachable worker pool and waits for its terminal result. Every
//! `tools.*` call the worker makes while running the code is an
//! out-of-band HTTPS POST from the worker straight back to this
//! gateway's `/v1/runtime/tool-call`, authenticated by the signed
//! callback token minted here — this adapter never sees those calls.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use cg_domain::config::RemoteWorkerRuntimeConfig;
use cg_domain::RuntimeKind;

use crate::token::CallbackTokenizer;
use crate::{ExecuteRequest, ExecuteResult, ExecuteStatus, RuntimeAdapter};

pub struct RemoteWorkerAdapter {
    client: reqwest::Client,
    config: RemoteWorkerRuntimeConfig,
    tokenizer: Option<CallbackTokenizer>,
}

impl RemoteWorkerAdapter {
    pub fn new(client: reqwest::Client, config: RemoteWorkerRuntimeConfig) -> Self {
        let tokenizer = std::env::var(&config.callback_signing_key_env)
            .ok()
            .map(|key| CallbackTokenizer::new(key.into_bytes()));
        Self {
            client,
            config,
            tokenizer,
        }
    }
}

fn failed_result(error: impl Into<String>, started: Instant) -> ExecuteResult {
    ExecuteResult {
        status: ExecuteStatus::Failed,
        stdout: String::new(),
        stderr: String::new(),
        value: None,
        error: Some(error.into()),
        exit_code: None,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

#[async_trait]
impl RuntimeAdapter for RemoteWorkerAdapter {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::RemoteWorker
    }

    fn is_available(&self) -> bool {
        self.config.enabled
            && self.config.worker_url.is_some()
            && self.config.callback_base_url.is_some()
            && self.tokenizer.is_some()
    }

    async fn execute(&self, request: ExecuteRequest) -> ExecuteResult {
        let started = Instant::now();
        let (Some(worker_url), Some(callback_base_url), Some(tokenizer)) = (
            self.config.worker_url.as_ref(),
            self.config.callback_base_url.as_ref(),
            self.tokenizer.as_ref(),
        ) else {
            return failed_result("remote_worker adapter not configured", started);
        };

        let callback_token = tokenizer.mint(&request.run_id);
        let payload = serde_json::json!({
            "runId": request.run_id,
            "code": request.code,
            "timeoutMs": request.timeout_ms,
            "callbackBaseUrl": callback_base_url,
            "callbackToken": callback_token,
        });

        let response = self
            .client
            .post(worker_url.as_str())
            .json(&payload)
            .timeout(Duration::from_millis(request.timeout_ms) + Duration::from_secs(5))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return ExecuteResult {
                    status: ExecuteStatus::TimedOut,
                    stdout: String::new(),
                    stderr: String::new(),
                    value: None,
                    error: Some("run deadline elapsed".into()),
                    exit_code: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
            Err(e) => return failed_result(format!("worker request failed: {e}"), started),
        };

        if !response.status().is_success() {
            return failed_result(format!("worker returned status {}", response.status()), started);
        }

        match response.json::<ExecuteResult>().await {
            Ok(result) => result,
            Err(e) => failed_result(format!("worker returned a malformed result: {e}"), started),
        }
    }
}
