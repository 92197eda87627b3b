//! WebSocket event types for the ComfyUI progress stream.
//!
//! Events arrive as JSON frames shaped `{"type": "<kind>", "data":
//! {...}}` and deserialize into [`WsEvent`] through the internally
//! tagged `type` field. Unknown kinds are parse errors; the consumer
//! logs them and keeps reading.

use serde::Deserialize;

/// All ComfyUI WebSocket event kinds the executor reacts to.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsEvent {
    /// Server-wide queue status broadcast.
    #[serde(rename = "status")]
    Status(StatusPayload),

    /// A prompt began executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(PromptPayload),

    /// Nodes whose outputs were served from cache.
    #[serde(rename = "execution_cached")]
    ExecutionCached(CachedPayload),

    /// A node is executing; `node: null` marks prompt completion.
    #[serde(rename = "executing")]
    Executing(ExecutingPayload),

    /// Step progress inside a long-running node.
    #[serde(rename = "progress")]
    Progress(ProgressPayload),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedPayload),

    /// The prompt failed.
    #[serde(rename = "execution_error")]
    ExecutionError(ExecutionErrorPayload),
}

/// Queue depth broadcast.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub status: QueueInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueInfo {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i64,
}

/// Payload carrying only the prompt id.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptPayload {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CachedPayload {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// `node` is `None` when the whole prompt has finished.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingPayload {
    pub node: Option<String>,
    pub prompt_id: String,
}

/// Step counter for the currently executing node. Not attributed to a
/// prompt id by the server; informational only.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressPayload {
    pub value: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedPayload {
    pub node: String,
    /// Raw per-node output object (images, filenames, text, ...).
    pub output: serde_json::Value,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionErrorPayload {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: Option<String>,
}

/// Parse one WebSocket text frame.
pub fn parse_event(text: &str) -> Result<WsEvent, serde_json::Error> {
    serde_json::from_str(text)
}
