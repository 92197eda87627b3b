//! The backend executor contract.
//!
//! Every backend (local HTTP polling, local WebSocket streaming, cloud
//! job queue) implements [`WorkflowExecutor`] so the orchestrator stays
//! protocol-agnostic. Each invocation produces at most one terminal
//! outcome, and `Completed` never carries partial results.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::ExecutionError;
use crate::inject::ParameterSet;
use crate::result::RawOutputBundle;
use crate::workflow::WorkflowGraph;

/// What an executor is asked to run.
///
/// Local backends receive the ready graph; the cloud backend receives a
/// workflow id plus the flat parameter overrides, because the graph
/// itself lives server-side.
#[derive(Debug, Clone)]
pub enum ReadyWorkflow {
    /// A fully injected graph for a local backend.
    Graph(WorkflowGraph),
    /// A cloud-resident workflow plus parameter overrides.
    CloudJob {
        workflow_id: String,
        params: ParameterSet,
    },
}

impl ReadyWorkflow {
    /// The graph, when this is a local workflow.
    pub fn graph(&self) -> Option<&WorkflowGraph> {
        match self {
            Self::Graph(graph) => Some(graph),
            Self::CloudJob { .. } => None,
        }
    }

    /// Output-variable labels for the graph's nodes: the node's
    /// `_meta.title` when present, otherwise the node id. Captured at
    /// submit time so `await_completion` can label outputs without
    /// holding the graph.
    pub fn output_labels(&self) -> IndexMap<String, String> {
        match self {
            Self::Graph(graph) => graph
                .iter()
                .map(|(id, node)| {
                    let label = node.title().unwrap_or(id.as_str()).to_string();
                    (id.clone(), label)
                })
                .collect(),
            Self::CloudJob { .. } => IndexMap::new(),
        }
    }
}

/// Identifier for one submitted execution.
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// Backend-assigned execution id (`prompt_id` locally, job id in
    /// the cloud).
    pub prompt_id: String,
    /// WebSocket client id the submission was tagged with, when the
    /// backend streams events.
    pub client_id: Option<String>,
    /// Node id to output-variable label mapping captured at submit.
    pub labels: IndexMap<String, String>,
}

impl JobHandle {
    /// Label outputs of `node_id`, falling back to the node id itself.
    pub fn label_for<'a>(&'a self, node_id: &'a str) -> &'a str {
        self.labels.get(node_id).map(String::as_str).unwrap_or(node_id)
    }
}

/// Uniform submit/monitor/collect contract over all backends.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    /// Queue the workflow and return its handle.
    async fn submit(&self, workflow: &ReadyWorkflow) -> Result<JobHandle, ExecutionError>;

    /// Drive the job to a terminal state and collect its outputs.
    ///
    /// A caller-level timeout is honored here; on timeout the executor
    /// attempts best-effort backend-side cancellation before returning
    /// [`ExecutionError::Timeout`].
    async fn await_completion(&self, handle: &JobHandle) -> Result<RawOutputBundle, ExecutionError>;
}
