//! Cloud job-queue backend.
//!
//! Workflows referenced by numeric id live on the cloud service; this
//! crate submits a job record (workflow id plus parameter overrides),
//! polls the job status with its own retry and timeout budget, and
//! collects output URLs when the job succeeds.

pub mod api;
pub mod executor;

pub use api::{CloudApi, CloudJobApi, JobState, JobStatus};
pub use executor::CloudExecutor;
