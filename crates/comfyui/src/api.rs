//! REST client for the ComfyUI HTTP endpoints.
//!
//! Covers workflow submission, history retrieval, queue cancellation,
//! and interruption. One [`ComfyUIApi`] is built per executor from the
//! client [`Config`], reusing the shared [`reqwest::Client`] so
//! sequential calls share the connection pool.

use comfykit_core::{Config, ExecutionError};
use serde::Deserialize;

/// HTTP client for a single ComfyUI server.
pub struct ComfyUIApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cookies: Option<String>,
}

/// Response returned by `POST /prompt` after queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
}

/// Terminal information extracted from a history document.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Whether the prompt reached a successful terminal state.
    pub completed: bool,
    /// Failure detail when the prompt terminated with an error.
    pub error: Option<String>,
    /// The raw `outputs` object (node id to node outputs).
    pub outputs: serde_json::Value,
}

/// Errors from the ComfyUI REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ApiError {
    /// Whether retrying could plausibly succeed: transport failures and
    /// server-side (5xx) errors are transient, client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Api { status, .. } => *status >= 500,
        }
    }

    /// Map onto the execution taxonomy once retries are exhausted or
    /// the error is permanent.
    pub fn into_execution(self) -> ExecutionError {
        match self {
            Self::Request(e) => ExecutionError::BackendUnreachable(e.to_string()),
            Self::Api { status, body } if status >= 500 => {
                ExecutionError::BackendUnreachable(format!("server error {status}: {body}"))
            }
            Self::Api { status, body } => {
                ExecutionError::Rejected(format!("status {status}: {body}"))
            }
        }
    }
}

impl ComfyUIApi {
    /// Build an API client from the shared HTTP client and config.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.comfyui_url.clone(),
            api_key: config.api_key.clone(),
            cookies: config.cookies.clone(),
        }
    }

    /// Base HTTP URL of this server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a workflow for execution.
    ///
    /// `POST /prompt` with the graph JSON and the WebSocket client id
    /// the submission should be attributed to.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .with_auth(self.client.post(format!("{}/prompt", self.base_url)))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve the history document for a prompt (`GET /history/{id}`).
    pub async fn history(&self, prompt_id: &str) -> Result<serde_json::Value, ApiError> {
        let response = self
            .with_auth(
                self.client
                    .get(format!("{}/history/{}", self.base_url, prompt_id)),
            )
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Remove a queued prompt (`POST /queue` with a delete entry).
    pub async fn cancel(&self, prompt_id: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "delete": [prompt_id] });

        let response = self
            .with_auth(self.client.post(format!("{}/queue", self.base_url)))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Interrupt whatever is executing right now (`POST /interrupt`).
    ///
    /// Not prompt-specific; used together with [`cancel`](Self::cancel)
    /// for best-effort cancellation on timeout.
    pub async fn interrupt(&self) -> Result<(), ApiError> {
        let response = self
            .with_auth(self.client.post(format!("{}/interrupt", self.base_url)))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Build the `/view` URL for a produced file.
    pub fn view_url(&self, filename: &str, subfolder: &str, folder_type: &str) -> String {
        reqwest::Url::parse_with_params(
            &format!("{}/view", self.base_url),
            &[
                ("filename", filename),
                ("subfolder", subfolder),
                ("type", folder_type),
            ],
        )
        .map(String::from)
        .unwrap_or_else(|_| format!("{}/view?filename={filename}", self.base_url))
    }

    // ---- private helpers ----

    /// Attach the configured bearer token and cookie header.
    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        };
        match &self.cookies {
            Some(cookies) => builder.header(reqwest::header::COOKIE, cookies),
            None => builder,
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Extract terminal information for `prompt_id` from a history document.
///
/// The document maps prompt ids to entries shaped like
/// `{"status": {"status_str": "...", "completed": bool, "messages": [...]},
///   "outputs": {...}}`. Returns `None` while the prompt has no entry
/// yet (still queued or running).
pub fn parse_history(prompt_id: &str, doc: &serde_json::Value) -> Option<HistoryEntry> {
    let entry = doc.get(prompt_id)?;
    let outputs = entry
        .get("outputs")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    let Some(status) = entry.get("status") else {
        // Some server versions omit the status block; an entry with
        // outputs is treated as finished.
        return Some(HistoryEntry {
            completed: outputs.is_object(),
            error: None,
            outputs,
        });
    };

    let status_str = status.get("status_str").and_then(|v| v.as_str());
    if status_str == Some("error") {
        return Some(HistoryEntry {
            completed: false,
            error: Some(extract_error_message(status)),
            outputs,
        });
    }

    let completed = status
        .get("completed")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    completed.then_some(HistoryEntry {
        completed: true,
        error: None,
        outputs,
    })
}

/// Pull the execution error detail out of the status `messages` array.
fn extract_error_message(status: &serde_json::Value) -> String {
    status
        .get("messages")
        .and_then(|v| v.as_array())
        .and_then(|messages| {
            messages.iter().find_map(|m| {
                let pair = m.as_array()?;
                if pair.first()?.as_str()? != "execution_error" {
                    return None;
                }
                pair.get(1)?
                    .get("exception_message")?
                    .as_str()
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| "execution failed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_without_entry_is_not_terminal() {
        let doc = json!({});
        assert!(parse_history("p-1", &doc).is_none());
    }

    #[test]
    fn completed_history_carries_outputs() {
        let doc = json!({
            "p-1": {
                "status": { "status_str": "success", "completed": true },
                "outputs": { "9": { "images": [] } }
            }
        });
        let entry = parse_history("p-1", &doc).unwrap();
        assert!(entry.completed);
        assert!(entry.error.is_none());
        assert!(entry.outputs.get("9").is_some());
    }

    #[test]
    fn running_history_is_not_terminal() {
        let doc = json!({
            "p-1": {
                "status": { "status_str": "running", "completed": false },
                "outputs": {}
            }
        });
        assert!(parse_history("p-1", &doc).is_none());
    }

    #[test]
    fn error_history_extracts_exception_message() {
        let doc = json!({
            "p-1": {
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", { "prompt_id": "p-1" }],
                        ["execution_error", {
                            "exception_message": "out of memory",
                            "node_id": "3"
                        }]
                    ]
                }
            }
        });
        let entry = parse_history("p-1", &doc).unwrap();
        assert!(!entry.completed);
        assert_eq!(entry.error.as_deref(), Some("out of memory"));
    }

    #[test]
    fn error_history_without_detail_uses_fallback() {
        let doc = json!({
            "p-1": { "status": { "status_str": "error" } }
        });
        let entry = parse_history("p-1", &doc).unwrap();
        assert_eq!(entry.error.as_deref(), Some("execution failed"));
    }

    #[test]
    fn statusless_entry_with_outputs_is_finished() {
        let doc = json!({
            "p-1": { "outputs": { "9": { "images": [] } } }
        });
        let entry = parse_history("p-1", &doc).unwrap();
        assert!(entry.completed);
    }

    #[test]
    fn transient_classification() {
        let server = ApiError::Api { status: 503, body: "busy".into() };
        let client_err = ApiError::Api { status: 404, body: "no".into() };
        assert!(server.is_transient());
        assert!(!client_err.is_transient());
    }

    #[test]
    fn view_url_encodes_query() {
        let api = ComfyUIApi {
            client: reqwest::Client::new(),
            base_url: "http://127.0.0.1:8188".into(),
            api_key: None,
            cookies: None,
        };
        let url = api.view_url("a b.png", "sub", "output");
        assert!(url.starts_with("http://127.0.0.1:8188/view?"));
        assert!(url.contains("filename=a+b.png") || url.contains("filename=a%20b.png"));
        assert!(url.contains("type=output"));
    }
}
