//! HTTP client for the cloud job-queue service.
//!
//! The wire protocol is a conventional async job queue: submit a job
//! record, poll its status until a terminal state, optionally cancel.
//! The status loop in [`executor`](crate::executor) talks to the
//! service through the [`CloudJobApi`] trait so it can be exercised
//! against a stub in tests.

use async_trait::async_trait;
use comfykit_core::inject::ParameterSet;
use comfykit_core::Config;
use serde::Deserialize;

/// Header carrying the service API key.
const API_KEY_HEADER: &str = "X-Api-Key";

/// Lifecycle states the service reports for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Whether the job will not progress any further.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Response of the job status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    /// Produced artifacts, present once the job succeeded.
    #[serde(default)]
    pub outputs: Option<serde_json::Value>,
    /// Failure detail, present when the job failed.
    #[serde(default)]
    pub detail: Option<String>,
}

/// Response of the job submission endpoint.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

/// Errors from the cloud REST layer.
#[derive(Debug, thiserror::Error)]
pub enum CloudApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Cloud API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl CloudApiError {
    /// Transport failures and 5xx responses are worth retrying; 4xx
    /// responses are permanent rejections.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Api { status, .. } => *status >= 500,
        }
    }
}

/// The surface the status loop needs from the service.
#[async_trait]
pub trait CloudJobApi: Send + Sync {
    /// Queue a job for a cloud-resident workflow; returns the job id.
    async fn submit(
        &self,
        workflow_id: &str,
        params: &ParameterSet,
    ) -> Result<String, CloudApiError>;

    /// Fetch the job's current status.
    async fn status(&self, job_id: &str) -> Result<JobStatus, CloudApiError>;

    /// Ask the service to cancel the job. Best-effort only.
    async fn cancel(&self, job_id: &str) -> Result<(), CloudApiError>;
}

/// Production implementation backed by `reqwest`.
pub struct CloudApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CloudApi {
    /// Build from the shared HTTP client and per-client config.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.cloud_url.clone(),
            api_key: config.cloud_api_key.clone(),
        }
    }

    fn with_key(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CloudApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CloudApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CloudJobApi for CloudApi {
    async fn submit(
        &self,
        workflow_id: &str,
        params: &ParameterSet,
    ) -> Result<String, CloudApiError> {
        let body = serde_json::json!({
            "workflow_id": workflow_id,
            "params": params,
        });

        let response = self
            .with_key(self.client.post(format!("{}/task/create", self.base_url)))
            .json(&body)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let submit: SubmitResponse = response.json().await?;
        Ok(submit.job_id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, CloudApiError> {
        let response = self
            .with_key(
                self.client
                    .get(format!("{}/task/status/{}", self.base_url, job_id)),
            )
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), CloudApiError> {
        let response = self
            .with_key(
                self.client
                    .post(format!("{}/task/cancel/{}", self.base_url, job_id)),
            )
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}
