//! The execution collaborator.
//!
//! Graph construction never runs anything. This module holds the runtime
//! side of the contract: an [`ExecutionService`] accepts a built graph plus
//! parameter overrides and reports what each step did. [`LocalExecutionService`]
//! implements it in process, with job work delegated to a [`JobRunner`].

mod cache_store;
mod clock;
mod fingerprint;
mod local;
mod report;
mod resolve;
mod runner;
mod simulated;

pub use cache_store::{CacheStore, CachedStep, InMemoryCacheStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fingerprint::step_fingerprint;
pub use local::LocalExecutionService;
pub use report::{
    BranchOutcome, ConditionOutcome, ExecutionHandle, ExecutionReport, ExecutionStatus,
    RegisteredModel, StepRecord, StepStatus,
};
pub use resolve::ResolveError;
pub use runner::{JobError, JobRequest, JobResult, JobRunner};
pub use simulated::SimulatedJobRunner;

use crate::core::Value;
use crate::errors::TrainflowError;
use crate::pipeline::PipelineGraph;
use async_trait::async_trait;
use std::collections::HashMap;

/// Runs pipeline graphs.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Submits a graph with concrete parameter values.
    ///
    /// Parameters absent from `overrides` take their declared defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph fails validation or an override is
    /// unknown or of the wrong kind. Job failures are not errors here; they
    /// show up in the execution report.
    async fn submit(
        &self,
        graph: &PipelineGraph,
        overrides: HashMap<String, Value>,
    ) -> Result<ExecutionHandle, TrainflowError>;

    /// Returns the report of a submitted execution.
    ///
    /// # Errors
    ///
    /// Returns [`TrainflowError::UnknownExecution`] for handles this service
    /// did not issue.
    async fn describe(&self, handle: &ExecutionHandle) -> Result<ExecutionReport, TrainflowError>;
}
