//! Workflow reference classification and resolution.
//!
//! Callers hand over a reference in whatever shape is convenient: a
//! cloud workflow id, a URL, a filesystem path, inline JSON text, or an
//! already-parsed JSON value. Classification is purely syntactic and
//! never touches the network or disk; resolution then fetches, reads,
//! and parses as the classified kind demands.

use std::path::{Path, PathBuf};

use comfykit_core::workflow::parse_graph;
use comfykit_core::{ResolutionError, WorkflowGraph};

/// A caller-supplied workflow reference, before classification.
#[derive(Debug, Clone)]
pub enum WorkflowReference {
    /// Free-form text: a cloud id, a URL, a path, or inline JSON.
    Text(String),
    /// An explicit filesystem path.
    Path(PathBuf),
    /// An already-parsed workflow document.
    Graph(serde_json::Value),
}

impl From<&str> for WorkflowReference {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for WorkflowReference {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&Path> for WorkflowReference {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for WorkflowReference {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<serde_json::Value> for WorkflowReference {
    fn from(value: serde_json::Value) -> Self {
        Self::Graph(value)
    }
}

/// What a reference was classified as. Classification never performs
/// I/O; a [`File`](WorkflowSource::File) source may still turn out not
/// to exist at resolution time.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowSource {
    /// A numeric id naming a workflow stored on the cloud service.
    CloudJob(String),
    /// A remote workflow document to fetch over HTTP.
    Url(String),
    /// A local workflow JSON file.
    File(PathBuf),
    /// An inline workflow document.
    Graph(serde_json::Value),
}

/// Classify a reference by shape.
///
/// Precedence for text references: digits-only text is a cloud id even
/// when a file of that name exists; `http(s)://` text is a URL; text
/// that parses as a JSON object is an inline document; everything else
/// is treated as a file path.
pub fn classify(reference: &WorkflowReference) -> WorkflowSource {
    match reference {
        WorkflowReference::Path(path) => WorkflowSource::File(path.clone()),
        WorkflowReference::Graph(value) => WorkflowSource::Graph(value.clone()),
        WorkflowReference::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
                return WorkflowSource::CloudJob(trimmed.to_string());
            }
            if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
                return WorkflowSource::Url(trimmed.to_string());
            }
            if trimmed.starts_with('{') {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
                    return WorkflowSource::Graph(value);
                }
            }
            WorkflowSource::File(PathBuf::from(trimmed))
        }
    }
}

/// A reference resolved down to something an executor can run.
#[derive(Debug, Clone)]
pub enum ResolvedWorkflow {
    /// Cloud workflow id; the graph stays server-side.
    CloudJob(String),
    /// A parsed and link-validated local graph.
    Local(WorkflowGraph),
}

/// Resolve a reference into an executable workflow.
///
/// URLs are fetched with the shared HTTP client; fetch failures are
/// [`ResolutionError::Unreachable`] and malformed documents are
/// [`ResolutionError::InvalidFormat`]. Missing files are
/// [`ResolutionError::NotFound`].
pub async fn resolve(
    http: &reqwest::Client,
    reference: &WorkflowReference,
) -> Result<ResolvedWorkflow, ResolutionError> {
    match classify(reference) {
        WorkflowSource::CloudJob(id) => {
            tracing::debug!(workflow_id = %id, "Reference names a cloud workflow");
            Ok(ResolvedWorkflow::CloudJob(id))
        }
        WorkflowSource::Url(url) => {
            tracing::debug!(url = %url, "Fetching workflow document");
            let response = http
                .get(&url)
                .send()
                .await
                .map_err(|e| ResolutionError::Unreachable(format!("{url}: {e}")))?;
            if !response.status().is_success() {
                return Err(ResolutionError::Unreachable(format!(
                    "{url}: HTTP {}",
                    response.status()
                )));
            }
            let doc: serde_json::Value = response
                .json()
                .await
                .map_err(|e| ResolutionError::InvalidFormat(format!("{url}: {e}")))?;
            Ok(ResolvedWorkflow::Local(parse_graph(&doc)?))
        }
        WorkflowSource::File(path) => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|_| ResolutionError::NotFound(path.display().to_string()))?;
            let doc: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                ResolutionError::InvalidFormat(format!("{}: {e}", path.display()))
            })?;
            Ok(ResolvedWorkflow::Local(parse_graph(&doc)?))
        }
        WorkflowSource::Graph(value) => Ok(ResolvedWorkflow::Local(parse_graph(&value)?)),
    }
}
