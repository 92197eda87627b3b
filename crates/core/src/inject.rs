//! Parameter binding and injection.
//!
//! Callers supply a flat mapping of logical names (`prompt`, `seed`,
//! `steps`, `image`, ...) that must land on concrete `(node, input)`
//! pairs. Two binding layers decide where:
//!
//! 1. **Explicit markers.** A node whose `_meta.title` is `$name` (or
//!    `$name.input`) binds the logical parameter `name` to that node.
//!    With the short form the input slot is chosen per class (`text`
//!    for `CLIPTextEncode`, `image` for `LoadImage`, otherwise an input
//!    named like the parameter). A marker that names a missing input
//!    slot is a [`InjectionError::MalformedBinding`].
//! 2. **Class heuristics.** Absent a marker, well-known parameters are
//!    matched by node class: sampling knobs on the first `KSampler`,
//!    prompts on `CLIPTextEncode` nodes (negative detected from the
//!    node title or id), `image` on `LoadImage`, dimensions on
//!    `EmptyLatentImage`.
//!
//! Explicit markers always win. Unknown parameter names are dropped so
//! one parameter set can be reused across differently-shaped workflows.
//! Injection is pure and idempotent; `seed` is written only when the
//! caller supplies it.

use indexmap::IndexMap;

use crate::error::InjectionError;
use crate::workflow::{link_target, WorkflowGraph};

/// Flat caller-supplied parameter mapping.
pub type ParameterSet = IndexMap<String, serde_json::Value>;

/// A resolved `(node, input slot)` target for one logical parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub node_id: String,
    pub input_name: String,
}

/// Sampling inputs recognized on `KSampler`-family nodes, keyed by
/// logical parameter name.
const SAMPLER_INPUTS: &[(&str, &str)] = &[
    ("seed", "seed"),
    ("steps", "steps"),
    ("cfg", "cfg"),
    ("denoise", "denoise"),
    ("sampler", "sampler_name"),
];

/// Per-class default input slot for short-form `$name` markers.
fn default_slot(class_type: &str, param: &str) -> Option<&'static str> {
    match class_type {
        "CLIPTextEncode" => Some("text"),
        "LoadImage" | "LoadImageMask" => Some("image"),
        "KSampler" | "KSamplerAdvanced" => SAMPLER_INPUTS
            .iter()
            .find(|(name, _)| *name == param)
            .map(|(_, input)| *input),
        _ => None,
    }
}

/// Collect explicit `$name` markers from node titles.
///
/// Fails when a marker references an input slot the node does not have;
/// the marker is caller-authored metadata and a dangling one is a bug
/// in the workflow, not something to skip silently.
pub fn explicit_bindings(graph: &WorkflowGraph) -> Result<IndexMap<String, Binding>, InjectionError> {
    let mut bindings = IndexMap::new();

    for (node_id, node) in graph {
        let Some(title) = node.title() else { continue };
        let Some(marker) = title.strip_prefix('$') else {
            continue;
        };

        let (param, input_name) = match marker.split_once('.') {
            Some((param, input)) => (param.to_string(), input.to_string()),
            None => {
                let input = default_slot(&node.class_type, marker)
                    .map(str::to_string)
                    .unwrap_or_else(|| marker.to_string());
                (marker.to_string(), input)
            }
        };

        if param.is_empty() || input_name.is_empty() {
            return Err(InjectionError::MalformedBinding(format!(
                "node '{node_id}' has an empty binding marker '{title}'"
            )));
        }

        if !node.inputs.contains_key(&input_name) {
            return Err(InjectionError::MalformedBinding(format!(
                "node '{node_id}' marker '{title}' names input '{input_name}' \
                 which does not exist on class '{}'",
                node.class_type
            )));
        }

        bindings.insert(param, Binding {
            node_id: node_id.clone(),
            input_name,
        });
    }

    Ok(bindings)
}

/// Derive heuristic bindings from node classes.
///
/// Link-valued inputs are never bound: overwriting a link would detach
/// part of the graph.
pub fn heuristic_bindings(graph: &WorkflowGraph) -> IndexMap<String, Binding> {
    let mut bindings: IndexMap<String, Binding> = IndexMap::new();
    let mut bind = |name: &str, node_id: &str, input: &str| {
        if !bindings.contains_key(name) {
            bindings.insert(
                name.to_string(),
                Binding {
                    node_id: node_id.to_string(),
                    input_name: input.to_string(),
                },
            );
        }
    };

    for (node_id, node) in graph {
        match node.class_type.as_str() {
            "KSampler" | "KSamplerAdvanced" => {
                for &(name, input) in SAMPLER_INPUTS {
                    if literal_input(graph, node_id, input) {
                        bind(name, node_id, input);
                    }
                }
            }
            "CLIPTextEncode" => {
                if literal_input(graph, node_id, "text") {
                    let label = node.title().unwrap_or(node_id).to_ascii_lowercase();
                    if label.contains("neg") {
                        bind("negative_prompt", node_id, "text");
                    } else {
                        bind("prompt", node_id, "text");
                    }
                }
            }
            "LoadImage" => {
                if literal_input(graph, node_id, "image") {
                    bind("image", node_id, "image");
                }
            }
            "EmptyLatentImage" => {
                for name in ["width", "height"] {
                    if literal_input(graph, node_id, name) {
                        bind(name, node_id, name);
                    }
                }
            }
            _ => {}
        }
    }

    bindings
}

/// True when the node has the named input and it is a literal value
/// rather than a link.
fn literal_input(graph: &WorkflowGraph, node_id: &str, input: &str) -> bool {
    graph
        .get(node_id)
        .and_then(|node| node.inputs.get(input))
        .map(|value| link_target(value).is_none())
        .unwrap_or(false)
}

/// Merge `params` into a copy of `graph` and return the ready graph.
///
/// Pure and idempotent: no I/O, no randomness. Unknown parameter names
/// are dropped; a malformed explicit marker fails even when the
/// parameter set does not use it, because the graph itself is broken.
pub fn inject(graph: &WorkflowGraph, params: &ParameterSet) -> Result<WorkflowGraph, InjectionError> {
    let explicit = explicit_bindings(graph)?;
    let heuristic = heuristic_bindings(graph);

    let mut ready = graph.clone();
    for (name, value) in params {
        let binding = explicit.get(name).or_else(|| heuristic.get(name));
        let Some(binding) = binding else {
            tracing::debug!(param = %name, "No binding for parameter, dropping");
            continue;
        };
        // Bindings always point at existing nodes; both layers derive
        // them from the graph being injected.
        if let Some(node) = ready.get_mut(&binding.node_id) {
            node.inputs
                .insert(binding.input_name.clone(), value.clone());
            tracing::debug!(
                param = %name,
                node_id = %binding.node_id,
                input = %binding.input_name,
                "Injected parameter",
            );
        }
    }

    Ok(ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    use crate::workflow::parse_graph;

    fn t2i_graph() -> WorkflowGraph {
        parse_graph(&json!({
            "3": {
                "class_type": "KSampler",
                "inputs": {
                    "seed": 1,
                    "steps": 20,
                    "cfg": 7.5,
                    "denoise": 1.0,
                    "sampler_name": "euler",
                    "positive": ["6", 0],
                    "negative": ["7", 0]
                }
            },
            "5": {
                "class_type": "EmptyLatentImage",
                "inputs": { "width": 512, "height": 512 }
            },
            "6": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "placeholder" }
            },
            "7": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "blurry" },
                "_meta": { "title": "Negative Prompt" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn heuristics_find_sampler_and_prompt_targets() {
        let bindings = heuristic_bindings(&t2i_graph());
        assert_eq!(bindings["seed"], Binding { node_id: "3".into(), input_name: "seed".into() });
        assert_eq!(bindings["prompt"].node_id, "6");
        assert_eq!(bindings["negative_prompt"].node_id, "7");
        assert_eq!(bindings["width"].node_id, "5");
    }

    #[test]
    fn injects_prompt_seed_and_steps() {
        let graph = t2i_graph();
        let params: ParameterSet = [
            ("prompt".to_string(), json!("a cabin in the woods")),
            ("seed".to_string(), json!(42)),
            ("steps".to_string(), json!(28)),
        ]
        .into_iter()
        .collect();

        let ready = inject(&graph, &params).unwrap();
        assert_eq!(ready["6"].inputs["text"], json!("a cabin in the woods"));
        assert_eq!(ready["3"].inputs["seed"], json!(42));
        assert_eq!(ready["3"].inputs["steps"], json!(28));
        // Untouched inputs are preserved.
        assert_eq!(ready["3"].inputs["cfg"], json!(7.5));
    }

    #[test]
    fn injection_is_idempotent() {
        let graph = t2i_graph();
        let params: ParameterSet = [("prompt".to_string(), json!("same"))].into_iter().collect();

        let once = inject(&graph, &params).unwrap();
        let twice = inject(&once, &params).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }

    #[test]
    fn unknown_parameters_are_dropped() {
        let graph = t2i_graph();
        let unused: ParameterSet = [("unused_key".to_string(), json!(1))].into_iter().collect();

        let with_unused = inject(&graph, &unused).unwrap();
        let without = inject(&graph, &ParameterSet::new()).unwrap();
        assert_eq!(with_unused, without);
    }

    #[test]
    fn absent_seed_leaves_graph_untouched() {
        let graph = t2i_graph();
        let ready = inject(&graph, &ParameterSet::new()).unwrap();
        assert_eq!(ready["3"].inputs["seed"], json!(1));
    }

    #[test]
    fn explicit_marker_wins_over_heuristic() {
        let graph = parse_graph(&json!({
            "6": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "a" }
            },
            "8": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "b" },
                "_meta": { "title": "$prompt" }
            }
        }))
        .unwrap();

        let params: ParameterSet = [("prompt".to_string(), json!("bound"))].into_iter().collect();
        let ready = inject(&graph, &params).unwrap();
        assert_eq!(ready["8"].inputs["text"], json!("bound"));
        assert_eq!(ready["6"].inputs["text"], json!("a"));
    }

    #[test]
    fn dotted_marker_targets_named_input() {
        let graph = parse_graph(&json!({
            "2": {
                "class_type": "SomethingCustom",
                "inputs": { "strength": 0.5 },
                "_meta": { "title": "$strength.strength" }
            }
        }))
        .unwrap();

        let params: ParameterSet = [("strength".to_string(), json!(0.9))].into_iter().collect();
        let ready = inject(&graph, &params).unwrap();
        assert_eq!(ready["2"].inputs["strength"], json!(0.9));
    }

    #[test]
    fn marker_for_missing_input_is_malformed() {
        let graph = parse_graph(&json!({
            "2": {
                "class_type": "SomethingCustom",
                "inputs": { "strength": 0.5 },
                "_meta": { "title": "$scale.scale" }
            }
        }))
        .unwrap();

        // Fails even though the parameter set never mentions `scale`.
        assert_matches!(
            inject(&graph, &ParameterSet::new()),
            Err(InjectionError::MalformedBinding(msg)) if msg.contains("scale")
        );
    }

    #[test]
    fn linked_inputs_are_not_bound_heuristically() {
        let graph = parse_graph(&json!({
            "1": {
                "class_type": "PrimitiveNode",
                "inputs": { "value": 7 }
            },
            "3": {
                "class_type": "KSampler",
                "inputs": { "seed": ["1", 0], "steps": 20 }
            }
        }))
        .unwrap();

        let bindings = heuristic_bindings(&graph);
        assert!(!bindings.contains_key("seed"));
        assert!(bindings.contains_key("steps"));
    }
}
