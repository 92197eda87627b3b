//! Shared types for the comfykit workflow execution client.
//!
//! Defines the configuration surface, the workflow graph model, the
//! parameter binding and injection rules, the backend executor trait,
//! result shapes, the error taxonomy, and the retry backoff helper
//! used by every backend.

pub mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod inject;
pub mod result;
pub mod workflow;

pub use config::{Config, ConfigBuilder, ExecutorKind};
pub use error::{Error, ExecutionError, InjectionError, ResolutionError};
pub use executor::{JobHandle, ReadyWorkflow, WorkflowExecutor};
pub use inject::{inject, ParameterSet};
pub use result::{Artifact, ExecuteResult, ExecuteStatus, MediaKind, RawOutputBundle};
pub use workflow::{WorkflowGraph, WorkflowNode};
