//! Backend-agnostic result shapes.
//!
//! Backends produce a [`RawOutputBundle`]: output-variable names mapped
//! to ordered artifact descriptors. The aggregator in the client crate
//! folds a bundle into the public [`ExecuteResult`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Media classification of one produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Text,
    /// Recognized as output but not one of the typed kinds; retained
    /// only in the raw bundle.
    Other,
}

impl MediaKind {
    /// Classify by file extension. Unknown extensions are [`Other`].
    ///
    /// [`Other`]: MediaKind::Other
    pub fn from_filename(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "bmp" | "tiff" => Self::Image,
            "mp4" | "webm" | "mov" | "avi" | "gif" => Self::Video,
            "mp3" | "wav" | "flac" | "ogg" | "m4a" => Self::Audio,
            "txt" | "json" | "srt" => Self::Text,
            _ => Self::Other,
        }
    }
}

/// One produced media item.
///
/// File-backed artifacts carry a fetch `url`; text artifacts carry the
/// payload inline in `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Media classification.
    pub kind: MediaKind,
    /// Where the artifact can be fetched (backend view URL or cloud
    /// object URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Backend-reported filename, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Inline payload for text artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Graph node that produced the artifact.
    pub node_id: String,
}

impl Artifact {
    /// A file-backed artifact reachable at `url`.
    pub fn file(kind: MediaKind, url: String, filename: Option<String>, node_id: &str) -> Self {
        Self {
            kind,
            url: Some(url),
            filename,
            content: None,
            node_id: node_id.to_string(),
        }
    }

    /// An inline text artifact.
    pub fn text(content: String, node_id: &str) -> Self {
        Self {
            kind: MediaKind::Text,
            url: None,
            filename: None,
            content: Some(content),
            node_id: node_id.to_string(),
        }
    }
}

/// Backend-native result: output-variable name to ordered artifacts.
///
/// Variable order follows the backend's output declaration order; the
/// unmodified backend payload is kept in `raw` for advanced access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOutputBundle {
    pub vars: IndexMap<String, Vec<Artifact>>,
    pub raw: serde_json::Value,
}

impl RawOutputBundle {
    /// Append an artifact to a variable's sequence, creating the
    /// variable on first use (preserving first-seen order).
    pub fn push(&mut self, var: &str, artifact: Artifact) {
        self.vars.entry(var.to_string()).or_default().push(artifact);
    }

    /// All artifacts of one kind, flattened across variables in
    /// declaration order.
    pub fn of_kind(&self, kind: MediaKind) -> Vec<Artifact> {
        self.vars
            .values()
            .flatten()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect()
    }

    /// Per-variable artifacts of one kind, omitting variables that
    /// produced none of it.
    pub fn of_kind_by_var(&self, kind: MediaKind) -> IndexMap<String, Vec<Artifact>> {
        let mut out = IndexMap::new();
        for (var, artifacts) in &self.vars {
            let matching: Vec<Artifact> = artifacts
                .iter()
                .filter(|a| a.kind == kind)
                .cloned()
                .collect();
            if !matching.is_empty() {
                out.insert(var.clone(), matching);
            }
        }
        out
    }
}

/// Terminal status of one execute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteStatus {
    Completed,
    Error,
}

/// The public, backend-agnostic execution result.
///
/// Returned by value; the engine keeps no reference to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Terminal outcome.
    pub status: ExecuteStatus,
    /// Backend-assigned execution identifier, when submission happened.
    pub prompt_id: Option<String>,
    /// Wall-clock seconds from submit to terminal state.
    pub duration: Option<f64>,
    /// Human-readable failure detail; empty on success.
    pub msg: String,
    /// All images, ordered by variable declaration then artifact order.
    pub images: Vec<Artifact>,
    pub videos: Vec<Artifact>,
    pub audios: Vec<Artifact>,
    pub texts: Vec<Artifact>,
    /// Per-variable groupings, preserving declaration order.
    pub images_by_var: IndexMap<String, Vec<Artifact>>,
    pub videos_by_var: IndexMap<String, Vec<Artifact>>,
    pub audios_by_var: IndexMap<String, Vec<Artifact>>,
    pub texts_by_var: IndexMap<String, Vec<Artifact>>,
    /// Unmodified backend outputs for advanced access.
    pub outputs: serde_json::Value,
}

impl ExecuteResult {
    /// An error-status result. Media sequences are always empty here;
    /// partial output never accompanies a failure.
    pub fn error(msg: impl Into<String>, prompt_id: Option<String>, duration: Option<f64>) -> Self {
        Self {
            status: ExecuteStatus::Error,
            prompt_id,
            duration,
            msg: msg.into(),
            images: Vec::new(),
            videos: Vec::new(),
            audios: Vec::new(),
            texts: Vec::new(),
            images_by_var: IndexMap::new(),
            videos_by_var: IndexMap::new(),
            audios_by_var: IndexMap::new(),
            texts_by_var: IndexMap::new(),
            outputs: serde_json::Value::Null,
        }
    }
}
