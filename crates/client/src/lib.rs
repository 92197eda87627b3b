//! High-level workflow execution client.
//!
//! [`ComfyKit`] ties the pieces together: classify and resolve a
//! workflow reference, inject caller parameters, pick the backend the
//! configuration asks for, drive it to a terminal state, and fold the
//! outputs into an [`ExecuteResult`]. The execute path never returns
//! `Err`; every failure is captured as an error-status result so batch
//! callers can fire many executions without wrapping each in error
//! plumbing.
//!
//! ```no_run
//! use comfykit::{ComfyKit, ParameterSet};
//! use serde_json::json;
//!
//! # async fn demo() {
//! let kit = ComfyKit::new();
//! let params: ParameterSet = [
//!     ("prompt".to_string(), json!("a cabin in the woods")),
//!     ("seed".to_string(), json!(42)),
//! ]
//! .into_iter()
//! .collect();
//!
//! let result = kit.execute("workflows/t2i.json", params).await;
//! for image in &result.images {
//!     println!("{:?}", image.url);
//! }
//! # }
//! ```

pub mod aggregate;
pub mod resolver;

use std::time::Instant;

use comfykit_cloud::CloudExecutor;
use comfykit_comfyui::{HttpExecutor, WebSocketExecutor};

pub use comfykit_core::{
    inject, Artifact, Config, ConfigBuilder, Error, ExecuteResult, ExecuteStatus, ExecutionError,
    ExecutorKind, InjectionError, JobHandle, MediaKind, ParameterSet, RawOutputBundle,
    ReadyWorkflow, ResolutionError, WorkflowExecutor, WorkflowGraph,
};
pub use resolver::{classify, resolve, ResolvedWorkflow, WorkflowReference, WorkflowSource};

/// The workflow execution client.
///
/// Holds one immutable [`Config`] and one shared HTTP connection pool.
/// Instances are independent; two clients with different configurations
/// never observe each other.
pub struct ComfyKit {
    config: Config,
    http: reqwest::Client,
}

impl Default for ComfyKit {
    fn default() -> Self {
        Self::new()
    }
}

impl ComfyKit {
    /// A client configured from the environment and built-in defaults.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// A client with an explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// The resolved configuration this client runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Base URL of the local ComfyUI server.
    pub fn comfyui_url(&self) -> &str {
        &self.config.comfyui_url
    }

    /// Which local backend protocol is in use.
    pub fn executor_kind(&self) -> ExecutorKind {
        self.config.executor
    }

    /// Base URL of the cloud execution service.
    pub fn cloud_url(&self) -> &str {
        &self.config.cloud_url
    }

    /// Wall-clock budget for one cloud job.
    pub fn cloud_timeout(&self) -> std::time::Duration {
        self.config.cloud_timeout
    }

    /// Execute a workflow and return the aggregated result.
    ///
    /// The reference can be a cloud workflow id, a URL, a filesystem
    /// path, inline JSON text, or a parsed JSON value. Failures at any
    /// stage come back as an error-status [`ExecuteResult`], never as
    /// `Err` or a panic.
    pub async fn execute(
        &self,
        reference: impl Into<WorkflowReference>,
        params: ParameterSet,
    ) -> ExecuteResult {
        let started = Instant::now();
        let (prompt_id, outcome) = self.run(reference.into(), &params).await;
        Self::fold(started, prompt_id, outcome)
    }

    /// Execute a workflow given as raw JSON text.
    ///
    /// Unlike [`execute`](Self::execute) with text, the argument is
    /// always treated as a document, never as an id, URL, or path.
    pub async fn execute_json(&self, json: &str, params: ParameterSet) -> ExecuteResult {
        let started = Instant::now();
        let doc: serde_json::Value = match serde_json::from_str(json) {
            Ok(doc) => doc,
            Err(e) => {
                let err = ResolutionError::InvalidFormat(e.to_string());
                return Self::fold(started, None, Err(err.into()));
            }
        };
        let (prompt_id, outcome) = self.run(WorkflowReference::Graph(doc), &params).await;
        Self::fold(started, prompt_id, outcome)
    }

    /// Execute through a caller-supplied backend.
    ///
    /// Resolution and injection run exactly as in
    /// [`execute`](Self::execute); only the executor choice is
    /// overridden. Intended for custom backends and test doubles.
    pub async fn execute_with(
        &self,
        executor: &dyn WorkflowExecutor,
        reference: impl Into<WorkflowReference>,
        params: ParameterSet,
    ) -> ExecuteResult {
        let started = Instant::now();
        let outcome = match self.prepare(reference.into(), &params).await {
            Ok(workflow) => Self::drive(executor, &workflow).await,
            Err(e) => (None, Err(e)),
        };
        let (prompt_id, outcome) = outcome;
        Self::fold(started, prompt_id, outcome)
    }

    /// Resolve and inject, producing the workflow an executor runs.
    async fn prepare(
        &self,
        reference: WorkflowReference,
        params: &ParameterSet,
    ) -> Result<ReadyWorkflow, Error> {
        match resolve(&self.http, &reference).await? {
            ResolvedWorkflow::CloudJob(workflow_id) => Ok(ReadyWorkflow::CloudJob {
                workflow_id,
                params: params.clone(),
            }),
            ResolvedWorkflow::Local(graph) => {
                let ready = inject(&graph, params)?;
                Ok(ReadyWorkflow::Graph(ready))
            }
        }
    }

    /// The full pipeline with the backend chosen by configuration.
    async fn run(
        &self,
        reference: WorkflowReference,
        params: &ParameterSet,
    ) -> (Option<String>, Result<RawOutputBundle, Error>) {
        let workflow = match self.prepare(reference, params).await {
            Ok(workflow) => workflow,
            Err(e) => return (None, Err(e)),
        };

        match &workflow {
            ReadyWorkflow::CloudJob { .. } => {
                let executor = CloudExecutor::new(self.http.clone(), &self.config);
                Self::drive(&executor, &workflow).await
            }
            ReadyWorkflow::Graph(_) => match self.config.executor {
                ExecutorKind::Http => {
                    let executor = HttpExecutor::new(self.http.clone(), &self.config);
                    Self::drive(&executor, &workflow).await
                }
                ExecutorKind::WebSocket => {
                    let executor = WebSocketExecutor::new(self.http.clone(), &self.config);
                    Self::drive(&executor, &workflow).await
                }
            },
        }
    }

    /// Submit then await; the prompt id survives even when awaiting
    /// fails, so error results can still report it.
    async fn drive(
        executor: &dyn WorkflowExecutor,
        workflow: &ReadyWorkflow,
    ) -> (Option<String>, Result<RawOutputBundle, Error>) {
        let handle = match executor.submit(workflow).await {
            Ok(handle) => handle,
            Err(e) => return (None, Err(e.into())),
        };
        let prompt_id = Some(handle.prompt_id.clone());
        let outcome = executor.await_completion(&handle).await.map_err(Error::from);
        (prompt_id, outcome)
    }

    /// Fold an outcome into the public result shape.
    fn fold(
        started: Instant,
        prompt_id: Option<String>,
        outcome: Result<RawOutputBundle, Error>,
    ) -> ExecuteResult {
        let duration = started.elapsed().as_secs_f64();
        match outcome {
            Ok(bundle) => {
                tracing::info!(
                    prompt_id = prompt_id.as_deref().unwrap_or(""),
                    duration_secs = duration,
                    "Execution completed",
                );
                aggregate::completed(&bundle, prompt_id, Some(duration))
            }
            Err(e) => {
                tracing::warn!(
                    prompt_id = prompt_id.as_deref().unwrap_or(""),
                    duration_secs = duration,
                    error = %e,
                    "Execution failed",
                );
                ExecuteResult::error(e.to_string(), prompt_id, Some(duration))
            }
        }
    }
}
