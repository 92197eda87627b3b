//! Status loop driving one cloud job to a terminal state.
//!
//! The cloud budget (timeout, retry count) is configuration-supplied
//! and independent of the local backend's values. Transient failures
//! (network, 5xx) are retried with exponential backoff; permanent
//! failures (4xx) surface immediately as rejections.

use std::time::Duration;

use async_trait::async_trait;
use comfykit_core::backoff::{Backoff, BackoffConfig};
use comfykit_core::{
    Artifact, Config, ExecutionError, JobHandle, MediaKind, RawOutputBundle, ReadyWorkflow,
    WorkflowExecutor,
};
use tokio::time::Instant;

use crate::api::{CloudApi, CloudApiError, CloudJobApi, JobState, JobStatus};

/// Cloud job-queue executor, generic over the API transport so the
/// loop can run against a stub in tests.
pub struct CloudExecutor<A: CloudJobApi = CloudApi> {
    api: A,
    timeout: Duration,
    retry_count: u32,
    poll_interval: Duration,
}

impl CloudExecutor<CloudApi> {
    /// Build from the shared HTTP client and per-client config.
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self::with_api(CloudApi::from_config(client, config), config)
    }
}

impl<A: CloudJobApi> CloudExecutor<A> {
    /// Build around an arbitrary transport.
    pub fn with_api(api: A, config: &Config) -> Self {
        Self {
            api,
            timeout: config.cloud_timeout,
            retry_count: config.cloud_retry_count,
            poll_interval: config.poll_interval,
        }
    }

    fn map_error(e: CloudApiError) -> ExecutionError {
        match e {
            CloudApiError::Request(e) => ExecutionError::BackendUnreachable(e.to_string()),
            CloudApiError::Api { status, body } if status >= 500 => {
                ExecutionError::BackendUnreachable(format!("server error {status}: {body}"))
            }
            CloudApiError::Api { status, body } => {
                ExecutionError::Rejected(format!("status {status}: {body}"))
            }
        }
    }

    /// Handle one terminal status.
    fn finish(handle: &JobHandle, status: JobStatus) -> Result<RawOutputBundle, ExecutionError> {
        match status.state {
            JobState::Succeeded => Ok(bundle_from_cloud_outputs(
                handle,
                status.outputs.as_ref().unwrap_or(&serde_json::Value::Null),
            )),
            JobState::Failed => Err(ExecutionError::BackendReportedFailure(
                status.detail.unwrap_or_else(|| "job failed".to_string()),
            )),
            // Callers only reach here with a terminal state.
            JobState::Queued | JobState::Running => unreachable!("non-terminal state"),
        }
    }
}

#[async_trait]
impl<A: CloudJobApi> WorkflowExecutor for CloudExecutor<A> {
    async fn submit(&self, workflow: &ReadyWorkflow) -> Result<JobHandle, ExecutionError> {
        let ReadyWorkflow::CloudJob {
            workflow_id,
            params,
        } = workflow
        else {
            return Err(ExecutionError::Rejected(
                "cloud executor needs a cloud workflow id".into(),
            ));
        };

        let mut backoff = Backoff::new(BackoffConfig::default());
        let mut attempts = 0u32;
        let job_id = loop {
            match self.api.submit(workflow_id, params).await {
                Ok(job_id) => break job_id,
                Err(e) if e.is_transient() && attempts < self.retry_count => {
                    attempts += 1;
                    tracing::warn!(workflow_id, attempt = attempts, error = %e, "Submit failed");
                    tokio::time::sleep(backoff.next()).await;
                }
                Err(e) => return Err(Self::map_error(e)),
            }
        };

        tracing::info!(workflow_id, job_id = %job_id, "Cloud job queued");

        Ok(JobHandle {
            prompt_id: job_id,
            client_id: None,
            labels: Default::default(),
        })
    }

    async fn await_completion(&self, handle: &JobHandle) -> Result<RawOutputBundle, ExecutionError> {
        let deadline = Instant::now() + self.timeout;
        let mut backoff = Backoff::new(BackoffConfig::default());
        let mut consecutive_failures = 0u32;

        loop {
            if Instant::now() >= deadline {
                // Best-effort cancellation; the timeout is reported
                // whether or not the service acknowledges.
                if let Err(e) = self.api.cancel(&handle.prompt_id).await {
                    tracing::warn!(job_id = %handle.prompt_id, error = %e, "Cancel failed");
                }
                return Err(ExecutionError::Timeout(self.timeout));
            }

            match self.api.status(&handle.prompt_id).await {
                Ok(status) if status.state.is_terminal() => {
                    return Self::finish(handle, status);
                }
                Ok(status) => {
                    tracing::debug!(job_id = %handle.prompt_id, state = ?status.state, "Polled");
                    consecutive_failures = 0;
                    backoff.reset();
                }
                Err(e) if e.is_transient() => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        job_id = %handle.prompt_id,
                        attempt = consecutive_failures,
                        error = %e,
                        "Status poll failed",
                    );
                    if consecutive_failures > self.retry_count {
                        return Err(Self::map_error(e));
                    }
                    // Clamped so a retry delay never overshoots the deadline.
                    tokio::time::sleep_until(deadline.min(Instant::now() + backoff.next())).await;
                    continue;
                }
                Err(e) => return Err(Self::map_error(e)),
            }

            tokio::time::sleep_until(deadline.min(Instant::now() + self.poll_interval)).await;
        }
    }
}

/// Convert the service's output list into a bundle.
///
/// Outputs are an array of `{url, file_type?, node_id?}` records;
/// classification uses the declared type first and the URL's extension
/// as a fallback. Records without a node id group under `output`.
pub fn bundle_from_cloud_outputs(
    handle: &JobHandle,
    outputs: &serde_json::Value,
) -> RawOutputBundle {
    let mut bundle = RawOutputBundle {
        raw: outputs.clone(),
        ..Default::default()
    };

    let Some(items) = outputs.as_array() else {
        return bundle;
    };

    for item in items {
        let Some(url) = item.get("url").and_then(|v| v.as_str()) else {
            continue;
        };
        let node_id = item
            .get("node_id")
            .and_then(|v| v.as_str())
            .unwrap_or("output");
        let kind = item
            .get("file_type")
            .and_then(|v| v.as_str())
            .map(kind_from_declared)
            .unwrap_or_else(|| MediaKind::from_filename(url));

        let filename = url.rsplit('/').next().map(str::to_string);
        let var = handle.label_for(node_id).to_string();
        bundle.push(&var, Artifact::file(kind, url.to_string(), filename, node_id));
    }

    bundle
}

/// Map a declared file type onto a media kind.
fn kind_from_declared(declared: &str) -> MediaKind {
    match declared.to_ascii_lowercase().as_str() {
        "image" | "png" | "jpg" | "jpeg" | "webp" => MediaKind::Image,
        "video" | "mp4" | "webm" | "gif" => MediaKind::Video,
        "audio" | "mp3" | "wav" | "flac" => MediaKind::Audio,
        "text" | "txt" | "json" => MediaKind::Text,
        _ => MediaKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use comfykit_core::inject::ParameterSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Stub transport with scripted status behavior.
    struct StubApi {
        submit_result: Result<String, u16>,
        status_state: JobState,
        cancel_calls: Arc<AtomicU32>,
        status_calls: Arc<AtomicU32>,
    }

    impl StubApi {
        fn running_forever() -> Self {
            Self {
                submit_result: Ok("job-1".into()),
                status_state: JobState::Running,
                cancel_calls: Arc::new(AtomicU32::new(0)),
                status_calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl CloudJobApi for StubApi {
        async fn submit(
            &self,
            _workflow_id: &str,
            _params: &ParameterSet,
        ) -> Result<String, CloudApiError> {
            match &self.submit_result {
                Ok(id) => Ok(id.clone()),
                Err(status) => Err(CloudApiError::Api {
                    status: *status,
                    body: "stub".into(),
                }),
            }
        }

        async fn status(&self, _job_id: &str) -> Result<JobStatus, CloudApiError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            Ok(JobStatus {
                state: self.status_state,
                outputs: match self.status_state {
                    JobState::Succeeded => Some(serde_json::json!([
                        { "url": "https://cdn.example.com/out/a.png", "node_id": "9" }
                    ])),
                    _ => None,
                },
                detail: match self.status_state {
                    JobState::Failed => Some("workflow exploded".into()),
                    _ => None,
                },
            })
        }

        async fn cancel(&self, _job_id: &str) -> Result<(), CloudApiError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config_with_timeout(timeout: Duration) -> Config {
        Config::builder()
            .cloud_timeout(timeout)
            .cloud_retry_count(2)
            .poll_interval(Duration::from_millis(5))
            .build()
    }

    fn handle() -> JobHandle {
        JobHandle {
            prompt_id: "job-1".into(),
            client_id: None,
            labels: Default::default(),
        }
    }

    #[tokio::test]
    async fn timeout_attempts_one_cancellation() {
        let api = StubApi::running_forever();
        let cancels = Arc::clone(&api.cancel_calls);
        let executor = CloudExecutor::with_api(api, &config_with_timeout(Duration::ZERO));

        let result = executor.await_completion(&handle()).await;
        assert_matches!(result, Err(ExecutionError::Timeout(_)));
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poll_interval_does_not_overshoot_the_deadline() {
        let api = StubApi::running_forever();
        let config = Config::builder()
            .cloud_timeout(Duration::from_millis(100))
            .cloud_retry_count(2)
            .poll_interval(Duration::from_secs(30))
            .build();
        let executor = CloudExecutor::with_api(api, &config);

        let started = std::time::Instant::now();
        let result = executor.await_completion(&handle()).await;

        assert_matches!(result, Err(ExecutionError::Timeout(_)));
        // The sleep between polls is clamped to the deadline; without
        // the clamp this would block for the full 30 s interval.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn succeeded_job_yields_bundle() {
        let api = StubApi {
            status_state: JobState::Succeeded,
            ..StubApi::running_forever()
        };
        let executor = CloudExecutor::with_api(api, &config_with_timeout(Duration::from_secs(5)));

        let bundle = executor.await_completion(&handle()).await.unwrap();
        let images = bundle.of_kind(MediaKind::Image);
        assert_eq!(images.len(), 1);
        assert_eq!(
            images[0].url.as_deref(),
            Some("https://cdn.example.com/out/a.png")
        );
        assert_eq!(images[0].node_id, "9");
    }

    #[tokio::test]
    async fn failed_job_reports_detail() {
        let api = StubApi {
            status_state: JobState::Failed,
            ..StubApi::running_forever()
        };
        let executor = CloudExecutor::with_api(api, &config_with_timeout(Duration::from_secs(5)));

        assert_matches!(
            executor.await_completion(&handle()).await,
            Err(ExecutionError::BackendReportedFailure(detail)) if detail == "workflow exploded"
        );
    }

    #[tokio::test]
    async fn rejected_submission_is_not_retried() {
        let api = StubApi {
            submit_result: Err(400),
            ..StubApi::running_forever()
        };
        let executor = CloudExecutor::with_api(api, &config_with_timeout(Duration::from_secs(5)));

        let workflow = ReadyWorkflow::CloudJob {
            workflow_id: "12345".into(),
            params: ParameterSet::new(),
        };
        assert_matches!(
            executor.submit(&workflow).await,
            Err(ExecutionError::Rejected(_))
        );
    }

    #[tokio::test]
    async fn local_graph_is_rejected() {
        let api = StubApi::running_forever();
        let executor = CloudExecutor::with_api(api, &config_with_timeout(Duration::from_secs(5)));

        let workflow = ReadyWorkflow::Graph(Default::default());
        assert_matches!(
            executor.submit(&workflow).await,
            Err(ExecutionError::Rejected(_))
        );
    }

    #[test]
    fn cloud_outputs_classify_by_declared_type_then_extension() {
        let outputs = serde_json::json!([
            { "url": "https://cdn/x.bin", "file_type": "video", "node_id": "2" },
            { "url": "https://cdn/y.png", "node_id": "3" },
            { "url": "https://cdn/z.mp3" }
        ]);

        let bundle = bundle_from_cloud_outputs(&handle(), &outputs);
        assert_eq!(bundle.of_kind(MediaKind::Video).len(), 1);
        assert_eq!(bundle.of_kind(MediaKind::Image).len(), 1);
        assert_eq!(bundle.of_kind(MediaKind::Audio).len(), 1);
        assert!(bundle.vars.contains_key("output"));
    }
}
