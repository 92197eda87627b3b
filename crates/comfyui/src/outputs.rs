//! Conversion of ComfyUI node outputs into a [`RawOutputBundle`].
//!
//! The history document (and each `executed` WebSocket event) carries
//! per-node output objects keyed by category: `images`, `gifs`,
//! `audio`, `text`, and so on. File entries become view-URL artifacts;
//! string entries become inline text artifacts. Output keys outside the
//! recognized set stay available through the bundle's raw payload only.

use comfykit_core::{Artifact, JobHandle, MediaKind, RawOutputBundle};

use crate::api::ComfyUIApi;

/// File entry inside a node output category.
#[derive(Debug, serde::Deserialize)]
struct FileEntry {
    filename: String,
    #[serde(default)]
    subfolder: String,
    #[serde(rename = "type", default = "default_folder_type")]
    folder_type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

/// Build a bundle from an `outputs` object (node id to node outputs).
///
/// Node iteration order is stable; artifacts within one node follow
/// their array order. Variable names come from the submit-time
/// labels captured on the [`JobHandle`].
pub fn bundle_from_outputs(
    handle: &JobHandle,
    api: &ComfyUIApi,
    outputs: &serde_json::Value,
) -> RawOutputBundle {
    let mut bundle = RawOutputBundle {
        raw: outputs.clone(),
        ..Default::default()
    };

    let Some(nodes) = outputs.as_object() else {
        return bundle;
    };

    for (node_id, node_output) in nodes {
        let Some(categories) = node_output.as_object() else {
            continue;
        };
        let var = handle.label_for(node_id).to_string();

        for (category, items) in categories {
            let Some(items) = items.as_array() else { continue };
            for item in items {
                if let Some(artifact) = classify_item(api, node_id, category, item) {
                    bundle.push(&var, artifact);
                }
            }
        }
    }

    bundle
}

/// Classify one output item; `None` for unrecognized categories, which
/// remain reachable through the raw payload.
fn classify_item(
    api: &ComfyUIApi,
    node_id: &str,
    category: &str,
    item: &serde_json::Value,
) -> Option<Artifact> {
    match category {
        "images" | "gifs" | "videos" | "audio" | "audios" => {
            let entry: FileEntry = serde_json::from_value(item.clone()).ok()?;
            let kind = match category {
                "gifs" | "videos" => MediaKind::Video,
                "audio" | "audios" => MediaKind::Audio,
                // SaveImage and friends report videos under "images"
                // too; trust the extension when it disagrees.
                _ => match MediaKind::from_filename(&entry.filename) {
                    MediaKind::Video => MediaKind::Video,
                    _ => MediaKind::Image,
                },
            };
            let url = api.view_url(&entry.filename, &entry.subfolder, &entry.folder_type);
            Some(Artifact::file(kind, url, Some(entry.filename), node_id))
        }
        "text" | "texts" | "string" => {
            let content = item.as_str()?.to_string();
            Some(Artifact::text(content, node_id))
        }
        _ => None,
    }
}
