//! The seam between the local execution service and job work.

use crate::core::{StepKind, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// One job launch.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// Execution the job belongs to.
    pub execution_id: Uuid,
    /// Step that launched the job.
    pub step_name: String,
    /// Step kind.
    pub kind: StepKind,
    /// The step's definition arguments.
    pub arguments: serde_json::Value,
    /// Resolved input values, by input name.
    pub inputs: BTreeMap<String, Value>,
    /// Where each output slot must be written, by slot label.
    pub outputs: BTreeMap<String, String>,
    /// Where each property file must be written, by property file name.
    pub property_files: BTreeMap<String, String>,
}

/// What a finished job left behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobResult {
    /// Log lines, in emission order.
    pub logs: Vec<String>,
    /// Structured documents written, keyed by location.
    pub documents: BTreeMap<String, serde_json::Value>,
}

impl JobResult {
    /// Adds a log line.
    #[must_use]
    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    /// Adds a written document.
    #[must_use]
    pub fn with_document(mut self, location: impl Into<String>, document: serde_json::Value) -> Self {
        self.documents.insert(location.into(), document);
        self
    }
}

/// A job that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Job for step '{step}' failed: {reason}")]
pub struct JobError {
    /// The step whose job failed.
    pub step: String,
    /// Failure reason reported by the job.
    pub reason: String,
}

impl JobError {
    /// Creates a job error.
    #[must_use]
    pub fn new(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            reason: reason.into(),
        }
    }
}

/// Runs the program behind a processing or training step.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Runs one job to completion.
    async fn run(&self, request: &JobRequest) -> Result<JobResult, JobError>;
}
