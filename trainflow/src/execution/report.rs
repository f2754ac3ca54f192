//! What an execution did, step by step.

use crate::core::{StepKind, Value};
use crate::steps::BranchDecision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifies one submitted execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionHandle {
    /// Execution id.
    pub id: Uuid,
    /// Name of the executed pipeline.
    pub pipeline_name: String,
}

impl ExecutionHandle {
    /// Creates a handle with a fresh id.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
        }
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pipeline_name, self.id)
    }
}

/// Final state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every reached step completed. A condition that stopped counts as success.
    Succeeded,
    /// A step failed; later steps were not started.
    Failed,
}

/// How one step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepStatus {
    /// The step ran.
    Executed,
    /// A live cache entry was replayed instead of running the job.
    CacheHit,
    /// The step failed.
    Failed {
        /// Why.
        reason: String,
    },
}

/// One step of an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name.
    pub name: String,
    /// Step kind.
    pub kind: StepKind,
    /// Outcome.
    pub status: StepStatus,
    /// Input fingerprint, for cacheable steps.
    pub fingerprint: Option<String>,
    /// Output locations by slot label.
    pub outputs: BTreeMap<String, String>,
    /// Scraped metrics.
    pub metrics: BTreeMap<String, f64>,
    /// When the step finished.
    pub finished_at: DateTime<Utc>,
}

/// Where a condition step sent the execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum BranchOutcome {
    /// The chosen arm held these steps and they ran.
    Continued {
        /// Steps of the chosen arm.
        steps: Vec<String>,
    },
    /// The chosen arm was empty: this path ends here, successfully.
    Stopped,
}

/// The single evaluation of a condition step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionOutcome {
    /// Condition step name.
    pub step: String,
    /// Resolved left-hand values, one per condition.
    pub left_values: Vec<f64>,
    /// Chosen arm.
    pub decision: BranchDecision,
    /// What the chosen arm did.
    pub branch: BranchOutcome,
}

/// A model package published by a registration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModel {
    /// Registry group.
    pub model_package_group_name: String,
    /// Version within the group, starting at 1.
    pub version: u32,
    /// Model archive location.
    pub model_data: String,
    /// Approval status.
    pub approval_status: String,
    /// Model statistics location, if attached.
    pub statistics: Option<String>,
}

/// Everything an execution did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The execution.
    pub handle: ExecutionHandle,
    /// Final state.
    pub status: ExecutionStatus,
    /// Bound parameter values.
    pub parameters: BTreeMap<String, Value>,
    /// Reached steps in execution order.
    pub steps: Vec<StepRecord>,
    /// Condition evaluations in execution order.
    pub conditions: Vec<ConditionOutcome>,
    /// Models published.
    pub registered_models: Vec<RegisteredModel>,
    /// Failure reason, if failed.
    pub error: Option<String>,
    /// Submission time.
    pub started_at: DateTime<Utc>,
    /// Completion time.
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Returns the record of a step, if it was reached.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|record| record.name == name)
    }

    /// Returns true if the step ran its job (not replayed from cache).
    #[must_use]
    pub fn executed(&self, name: &str) -> bool {
        self.step(name)
            .is_some_and(|record| record.status == StepStatus::Executed)
    }

    /// Returns true if the step was replayed from cache.
    #[must_use]
    pub fn cache_hit(&self, name: &str) -> bool {
        self.step(name)
            .is_some_and(|record| record.status == StepStatus::CacheHit)
    }

    /// Returns the evaluation of a condition step.
    #[must_use]
    pub fn condition(&self, name: &str) -> Option<&ConditionOutcome> {
        self.conditions.iter().find(|outcome| outcome.step == name)
    }

    /// Returns true if the execution succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }
}
