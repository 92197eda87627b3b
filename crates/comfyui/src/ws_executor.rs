//! Streaming local executor.
//!
//! Submits the ready graph over HTTP like the poll executor, then opens
//! one persistent WebSocket connection and consumes progress events
//! until a terminal event arrives. Events for other prompt ids are
//! ignored; duplicates and out-of-order arrivals are tolerated by the
//! [`ExecutionTracker`] state machine. Because completion events can
//! slip past between submission and the socket opening, the loop also
//! checks the history endpoint on a slow fallback interval.

use std::time::Duration;

use async_trait::async_trait;
use comfykit_core::workflow::graph_to_json;
use comfykit_core::{
    Config, ExecutionError, JobHandle, RawOutputBundle, ReadyWorkflow, WorkflowExecutor,
};
use futures::StreamExt;
use indexmap::IndexMap;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::api::{parse_history, ComfyUIApi};
use crate::messages::{parse_event, WsEvent};
use crate::outputs::bundle_from_outputs;

/// How often the fallback history check runs while streaming.
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Terminal outcome observed on the event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    /// The prompt finished; node outputs were collected along the way.
    Success,
    /// The prompt failed with the given detail.
    Failed(String),
}

/// Orders the event stream for one prompt id.
///
/// Foreign prompt ids are dropped, duplicate node outputs overwrite
/// their earlier copy, and a terminal outcome is reported at most once.
#[derive(Debug)]
pub struct ExecutionTracker {
    prompt_id: String,
    node_outputs: IndexMap<String, serde_json::Value>,
    terminal: Option<Terminal>,
}

impl ExecutionTracker {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            node_outputs: IndexMap::new(),
            terminal: None,
        }
    }

    /// Node outputs collected from `executed` events so far.
    pub fn node_outputs(&self) -> &IndexMap<String, serde_json::Value> {
        &self.node_outputs
    }

    /// Feed one event; returns the terminal outcome the first time one
    /// is reached, `None` otherwise (including for repeats).
    pub fn observe(&mut self, event: WsEvent) -> Option<Terminal> {
        if self.terminal.is_some() {
            return None;
        }

        match event {
            WsEvent::Status(data) => {
                tracing::debug!(
                    queue_remaining = data.status.exec_info.queue_remaining,
                    "Queue status",
                );
                None
            }
            WsEvent::Progress(data) => {
                tracing::debug!(value = data.value, max = data.max, "Generation progress");
                None
            }
            WsEvent::ExecutionStart(data) => {
                if data.prompt_id == self.prompt_id {
                    tracing::debug!(prompt_id = %data.prompt_id, "Execution started");
                }
                None
            }
            WsEvent::ExecutionCached(data) => {
                if data.prompt_id == self.prompt_id {
                    tracing::debug!(
                        prompt_id = %data.prompt_id,
                        nodes = data.nodes.len(),
                        "Nodes served from cache",
                    );
                }
                None
            }
            WsEvent::Executed(data) => {
                if data.prompt_id == self.prompt_id {
                    self.node_outputs.insert(data.node, data.output);
                }
                None
            }
            WsEvent::Executing(data) => {
                if data.prompt_id != self.prompt_id {
                    return None;
                }
                match data.node {
                    Some(node) => {
                        tracing::debug!(prompt_id = %data.prompt_id, node = %node, "Executing node");
                        None
                    }
                    None => {
                        self.terminal = Some(Terminal::Success);
                        self.terminal.clone()
                    }
                }
            }
            WsEvent::ExecutionError(data) => {
                if data.prompt_id != self.prompt_id {
                    return None;
                }
                self.terminal = Some(Terminal::Failed(data.exception_message));
                self.terminal.clone()
            }
        }
    }
}

/// WebSocket streaming executor for a local ComfyUI server.
pub struct WebSocketExecutor {
    api: ComfyUIApi,
    ws_base: String,
    timeout: Duration,
    api_key: Option<String>,
    cookies: Option<String>,
}

impl WebSocketExecutor {
    /// Build from the shared HTTP client and per-client config.
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            api: ComfyUIApi::from_config(client, config),
            ws_base: ws_base_url(&config.comfyui_url),
            timeout: config.local_timeout,
            api_key: config.api_key.clone(),
            cookies: config.cookies.clone(),
        }
    }

    async fn connect(
        &self,
        client_id: &str,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        ExecutionError,
    > {
        let url = format!("{}/ws?clientId={}", self.ws_base, client_id);
        let mut request = url
            .clone()
            .into_client_request()
            .map_err(|e| ExecutionError::BackendUnreachable(format!("bad WebSocket URL: {e}")))?;

        let headers = request.headers_mut();
        if let Some(key) = &self.api_key {
            if let Ok(value) = format!("Bearer {key}").parse() {
                headers.insert("Authorization", value);
            }
        }
        if let Some(cookies) = &self.cookies {
            if let Ok(value) = cookies.parse() {
                headers.insert("Cookie", value);
            }
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| {
                ExecutionError::BackendUnreachable(format!("WebSocket connect to {url} failed: {e}"))
            })?;

        tracing::debug!(client_id, "Connected to ComfyUI WebSocket");
        Ok(stream)
    }

    async fn cancel_best_effort(&self, prompt_id: &str) {
        if let Err(e) = self.api.cancel(prompt_id).await {
            tracing::warn!(prompt_id, error = %e, "Cancel request failed");
        }
        if let Err(e) = self.api.interrupt().await {
            tracing::warn!(prompt_id, error = %e, "Interrupt request failed");
        }
    }

    /// Collect outputs once the tracker saw success: prefer the node
    /// outputs streamed via `executed` events, fall back to history
    /// when every node was served from cache.
    async fn collect_outputs(
        &self,
        handle: &JobHandle,
        tracker: &ExecutionTracker,
    ) -> Result<RawOutputBundle, ExecutionError> {
        if !tracker.node_outputs().is_empty() {
            let outputs = serde_json::Value::Object(
                tracker
                    .node_outputs()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
            return Ok(bundle_from_outputs(handle, &self.api, &outputs));
        }

        let doc = self
            .api
            .history(&handle.prompt_id)
            .await
            .map_err(|e| e.into_execution())?;
        let outputs = parse_history(&handle.prompt_id, &doc)
            .map(|entry| entry.outputs)
            .unwrap_or(serde_json::Value::Null);
        Ok(bundle_from_outputs(handle, &self.api, &outputs))
    }
}

#[async_trait]
impl WorkflowExecutor for WebSocketExecutor {
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

        tracing::info!(
            prompt_id = %response.prompt_id,
            client_id = %client_id,
            "Workflow submitted for streaming",
        );

        Ok(JobHandle {
            prompt_id: response.prompt_id,
            client_id: Some(client_id),
            labels: workflow.output_labels(),
        })
    }

    async fn await_completion(&self, handle: &JobHandle) -> Result<RawOutputBundle, ExecutionError> {
        let client_id = handle.client_id.as_deref().ok_or_else(|| {
            ExecutionError::Rejected("handle was not submitted by the streaming executor".into())
        })?;

        let mut stream = self.connect(client_id).await?;
        let mut tracker = ExecutionTracker::new(handle.prompt_id.clone());

        let deadline = tokio::time::sleep_until(Instant::now() + self.timeout);
        tokio::pin!(deadline);
        let mut fallback = tokio::time::interval_at(
            Instant::now() + FALLBACK_POLL_INTERVAL,
            FALLBACK_POLL_INTERVAL,
        );

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    self.cancel_best_effort(&handle.prompt_id).await;
                    let _ = stream.close(None).await;
                    return Err(ExecutionError::Timeout(self.timeout));
                }

                _ = fallback.tick() => {
                    // Covers terminal events that fired before the
                    // socket was open.
                    if let Ok(doc) = self.api.history(&handle.prompt_id).await {
                        if let Some(entry) = parse_history(&handle.prompt_id, &doc) {
                            let _ = stream.close(None).await;
                            if let Some(detail) = entry.error {
                                return Err(ExecutionError::BackendReportedFailure(detail));
                            }
                            return Ok(bundle_from_outputs(handle, &self.api, &entry.outputs));
                        }
                    }
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let event = match parse_event(&text) {
                                Ok(event) => event,
                                Err(e) => {
                                    tracing::debug!(error = %e, "Skipping unrecognized frame");
                                    continue;
                                }
                            };
                            match tracker.observe(event) {
                                Some(Terminal::Success) => {
                                    let _ = stream.close(None).await;
                                    return self.collect_outputs(handle, &tracker).await;
                                }
                                Some(Terminal::Failed(detail)) => {
                                    let _ = stream.close(None).await;
                                    return Err(ExecutionError::BackendReportedFailure(detail));
                                }
                                None => {}
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            // Preview image frames; not part of the result.
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            return Err(ExecutionError::ConnectionDropped(format!(
                                "server closed the connection: {frame:?}"
                            )));
                        }
                        Some(Err(e)) => {
                            return Err(ExecutionError::ConnectionDropped(e.to_string()));
                        }
                        None => {
                            return Err(ExecutionError::ConnectionDropped(
                                "event stream ended before a terminal event".into(),
                            ));
                        }
                    }
                }
            }
        }
    }
}

/// Derive the WebSocket base URL from the HTTP base URL.
fn ws_base_url(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{http_url}")
    }
}
