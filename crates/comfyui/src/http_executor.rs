//! Poll-based local executor.
//!
//! Submits the ready graph over HTTP, then polls the history endpoint
//! on a fixed interval until a terminal state appears or the configured
//! timeout elapses. Transient poll failures are retried a bounded
//! number of times with exponential backoff; on timeout the executor
//! attempts best-effort cancellation before reporting.

use std::time::Duration;

use async_trait::async_trait;
use comfykit_core::backoff::{Backoff, BackoffConfig};
use comfykit_core::workflow::graph_to_json;
use comfykit_core::{Config, ExecutionError, JobHandle, RawOutputBundle, ReadyWorkflow,
    WorkflowExecutor};
use tokio::time::Instant;

use crate::api::{parse_history, ComfyUIApi};
use crate::outputs::bundle_from_outputs;

/// HTTP submit-and-poll executor for a local ComfyUI server.
pub struct HttpExecutor {
    api: ComfyUIApi,
    poll_interval: Duration,
    timeout: Duration,
    poll_retry_count: u32,
}

impl HttpExecutor {
    /// Build from the shared HTTP client and per-client config.
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            api: ComfyUIApi::from_config(client, config),
            poll_interval: config.poll_interval,
            timeout: config.local_timeout,
            poll_retry_count: config.poll_retry_count,
        }
    }

    /// Best-effort backend-side cancellation. Failures are logged and
    /// swallowed; the timeout error is reported either way.
    async fn cancel_best_effort(&self, prompt_id: &str) {
        if let Err(e) = self.api.cancel(prompt_id).await {
            tracing::warn!(prompt_id, error = %e, "Cancel request failed");
        }
        if let Err(e) = self.api.interrupt().await {
            tracing::warn!(prompt_id, error = %e, "Interrupt request failed");
        }
    }
}

#[async_trait]
impl WorkflowExecutor for HttpExecutor {
    async fn submit(&self, workflow: &ReadyWorkflow) -> Result<JobHandle, ExecutionError> {
        let graph = workflow.graph().ok_or_else(|| {
            ExecutionError::Rejected("local executor needs a materialized graph".into())
        })?;

        let client_id = uuid::Uuid::new_v4().to_string();
        let response = self
            .api
            .submit_workflow(&graph_to_json(graph), &client_id)
            .await
            .map_err(|e| e.into_execution())?;

        tracing::info!(prompt_id = %response.prompt_id, "Workflow submitted over HTTP");

        Ok(JobHandle {
            prompt_id: response.prompt_id,
            client_id: Some(client_id),
            labels: workflow.output_labels(),
        })
    }

    async fn await_completion(&self, handle: &JobHandle) -> Result<RawOutputBundle, ExecutionError> {
        let deadline = Instant::now() + self.timeout;
        let mut backoff = Backoff::new(BackoffConfig::default());
        let mut consecutive_failures = 0u32;

        loop {
            if Instant::now() >= deadline {
                self.cancel_best_effort(&handle.prompt_id).await;
                return Err(ExecutionError::Timeout(self.timeout));
            }

            match self.api.history(&handle.prompt_id).await {
                Ok(doc) => {
                    consecutive_failures = 0;
                    backoff.reset();

                    if let Some(entry) = parse_history(&handle.prompt_id, &doc) {
                        if let Some(detail) = entry.error {
                            return Err(ExecutionError::BackendReportedFailure(detail));
                        }
                        if entry.completed {
                            return Ok(bundle_from_outputs(handle, &self.api, &entry.outputs));
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        prompt_id = %handle.prompt_id,
                        attempt = consecutive_failures,
                        error = %e,
                        "Status poll failed",
                    );
                    if consecutive_failures > self.poll_retry_count {
                        return Err(e.into_execution());
                    }
                    // Clamped so a retry delay never overshoots the deadline.
                    tokio::time::sleep_until(deadline.min(Instant::now() + backoff.next())).await;
                    continue;
                }
                Err(e) => return Err(e.into_execution()),
            }

            tokio::time::sleep_until(deadline.min(Instant::now() + self.poll_interval)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use comfykit_core::inject::ParameterSet;

    fn executor() -> HttpExecutor {
        let config = Config::builder()
            .comfyui_url("http://127.0.0.1:8188")
            .build();
        HttpExecutor::new(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn rejects_cloud_references() {
        let workflow = ReadyWorkflow::CloudJob {
            workflow_id: "12345".into(),
            params: ParameterSet::new(),
        };
        assert_matches!(
            executor().submit(&workflow).await,
            Err(ExecutionError::Rejected(_))
        );
    }

    #[tokio::test]
    async fn retry_backoff_does_not_overshoot_the_deadline() {
        // Closed port: every poll fails fast with a transient error.
        let config = Config::builder()
            .comfyui_url("http://127.0.0.1:9")
            .local_timeout(Duration::from_millis(100))
            .poll_retry_count(100)
            .build();
        let executor = HttpExecutor::new(reqwest::Client::new(), &config);
        let handle = JobHandle {
            prompt_id: "p-1".into(),
            client_id: None,
            labels: Default::default(),
        };

        let started = std::time::Instant::now();
        let result = executor.await_completion(&handle).await;

        assert_matches!(result, Err(ExecutionError::Timeout(_)));
        // The retry delay is clamped to the deadline; an unclamped
        // first backoff step alone would already sleep 500 ms.
        assert!(started.elapsed() < Duration::from_millis(450));
    }
}
