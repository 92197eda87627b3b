//! Workflow graph model.
//!
//! A workflow is the ComfyUI API-format JSON object: each key is a node
//! id and each value holds a `class_type` plus an `inputs` mapping. An
//! input is either a literal value or a link encoded as a two-element
//! array `[source_node_id, output_slot]`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;

/// A workflow graph keyed by node id, with a stable iteration order.
pub type WorkflowGraph = IndexMap<String, WorkflowNode>;

/// One generation node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Operation name, e.g. `KSampler` or `CLIPTextEncode`.
    pub class_type: String,
    /// Input slot values; literals or `[node_id, output_slot]` links.
    #[serde(default)]
    pub inputs: IndexMap<String, serde_json::Value>,
    /// Editor metadata. The title doubles as the output variable name
    /// and as the parameter binding marker.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
}

/// The `_meta` object ComfyUI's editor attaches to nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl WorkflowNode {
    /// The node's editor title, if any.
    pub fn title(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.title.as_deref())
    }
}

/// Interpret an input value as a link to another node's output slot.
///
/// Links are two-element arrays whose first element is a node id
/// (string or number) and whose second is an output slot index.
pub fn link_target(value: &serde_json::Value) -> Option<(String, u64)> {
    let arr = value.as_array()?;
    if arr.len() != 2 {
        return None;
    }
    let node_id = match &arr[0] {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let slot = arr[1].as_u64()?;
    Some((node_id, slot))
}

/// Parse and structurally validate a workflow JSON document.
///
/// Every node must carry a `class_type`, and every link must target a
/// node id that exists in the graph. Link violations are resolution
/// errors, never silent skips.
pub fn parse_graph(json: &serde_json::Value) -> Result<WorkflowGraph, ResolutionError> {
    let obj = json.as_object().ok_or_else(|| {
        ResolutionError::InvalidFormat("workflow document must be a JSON object".into())
    })?;

    if obj.is_empty() {
        return Err(ResolutionError::InvalidFormat(
            "workflow must contain at least one node".into(),
        ));
    }

    let mut graph = WorkflowGraph::new();
    for (node_id, node_value) in obj {
        let node: WorkflowNode = serde_json::from_value(node_value.clone()).map_err(|e| {
            ResolutionError::InvalidFormat(format!("node '{node_id}' is not a valid node: {e}"))
        })?;
        if node.class_type.is_empty() {
            return Err(ResolutionError::InvalidFormat(format!(
                "node '{node_id}' is missing 'class_type'"
            )));
        }
        graph.insert(node_id.clone(), node);
    }

    validate_links(&graph)?;
    Ok(graph)
}

/// Check that every link input references an existing node id.
pub fn validate_links(graph: &WorkflowGraph) -> Result<(), ResolutionError> {
    for (node_id, node) in graph {
        for (input_name, value) in &node.inputs {
            if let Some((target, _slot)) = link_target(value) {
                if !graph.contains_key(&target) {
                    return Err(ResolutionError::InvalidFormat(format!(
                        "node '{node_id}' input '{input_name}' links to missing node '{target}'"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Serialize a graph back into the wire-format JSON object.
pub fn graph_to_json(graph: &WorkflowGraph) -> serde_json::Value {
    serde_json::to_value(graph).unwrap_or(serde_json::Value::Null)
}
