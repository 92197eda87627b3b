//! Error taxonomy for workflow resolution, injection, and execution.
//!
//! Each stage has its own error enum so callers that invoke a stage
//! directly (resolution or injection without the orchestrator's
//! capture) get a precise type. The umbrella [`Error`] is what the
//! orchestrator folds into an error-status
//! [`ExecuteResult`](crate::result::ExecuteResult).

use std::time::Duration;

/// Failures while turning a workflow reference into an executable graph.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The referenced local file (or unclassifiable reference) does not exist.
    #[error("Workflow not found: {0}")]
    NotFound(String),

    /// A remote workflow URL could not be fetched.
    #[error("Workflow source unreachable: {0}")]
    Unreachable(String),

    /// The workflow document was fetched/read but is not a valid graph.
    #[error("Invalid workflow format: {0}")]
    InvalidFormat(String),
}

/// Failures while merging caller parameters into graph node inputs.
#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    /// Binding metadata embedded in the graph references a node or input
    /// slot that does not exist.
    #[error("Malformed parameter binding: {0}")]
    MalformedBinding(String),
}

/// Failures while driving a backend through submit/await.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The backend could not be reached, even after bounded retries.
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    /// The backend accepted the job but reported a terminal failure.
    #[error("Backend reported failure: {0}")]
    BackendReportedFailure(String),

    /// The backend rejected the submission outright (permanent failure,
    /// never retried).
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    /// A streaming connection closed before a terminal event arrived.
    #[error("Connection dropped: {0}")]
    ConnectionDropped(String),

    /// No terminal state was observed before the configured deadline.
    /// Best-effort backend cancellation has already been attempted.
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),
}

/// Any failure on the orchestrated execute path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Injection(#[from] InjectionError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
