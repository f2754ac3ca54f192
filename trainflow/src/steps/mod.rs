//! Step nodes: the units of work a pipeline graph is made of.
//!
//! Every variant implements [`Step`], which exposes the step's ordered
//! inputs, its output slots, its cache scope and its definition arguments.
//! [`StepNode`] is the closed set of variants the graph stores.

mod code;
mod condition;
mod debugger;
mod distribution;
mod processing;
mod register;
mod training;

pub use code::CodeAsset;
pub use condition::{Branch, BranchDecision, Comparator, Condition, ConditionStep};
pub use debugger::{
    CProfileTimer, CollectionConfig, DebuggerHookConfig, FrameworkProfile, ProfilerConfig,
    ProfilingWindow, PythonProfiler, PythonProfilingWindow, Rule,
};
pub use distribution::{select_distribution, DistributionConfig, DistributionPlan, S3DataDistribution};
pub use processing::{ProcessingInput, ProcessingOutput, ProcessingStep, ScriptProcessor};
pub use register::{MetricsSource, ModelMetrics, RegisterModelStep};
pub use training::{Estimator, Framework, InputMode, MetricDefinition, TrainingInput, TrainingStep};

use crate::core::{CacheScope, StepKind};
use crate::properties::{OutputSlot, PropertyReference, Source};
use std::fmt;

/// One named input of a step and where its value comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    /// Logical input name, unique within the step.
    pub name: String,
    /// The value source.
    pub source: Source,
}

impl StepInput {
    /// Creates a step input.
    #[must_use]
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

/// Behavior shared by every step variant.
pub trait Step: fmt::Debug + Send + Sync {
    /// Returns the step name, unique within the graph.
    fn name(&self) -> &str;

    /// Returns the variant tag.
    fn kind(&self) -> StepKind;

    /// Returns the step's inputs in order.
    fn inputs(&self) -> Vec<StepInput>;

    /// Returns the output slots later steps may reference.
    fn output_slots(&self) -> Vec<OutputSlot> {
        Vec::new()
    }

    /// Returns the cache scope, if the step is cacheable.
    fn cache_scope(&self) -> Option<&CacheScope> {
        None
    }

    /// Returns the job arguments the execution service needs to run the step.
    fn arguments(&self) -> serde_json::Value;

    /// Renders the step as it appears in a pipeline definition.
    fn to_definition(&self) -> serde_json::Value {
        let mut definition = serde_json::json!({
            "Name": self.name(),
            "Type": self.kind().to_string(),
            "Arguments": self.arguments(),
        });
        if let Some(scope) = self.cache_scope() {
            definition["CacheConfig"] = scope.to_definition();
        }
        definition
    }
}

/// A step stored in a pipeline graph.
#[derive(Debug, Clone)]
pub enum StepNode {
    /// A processing job.
    Processing(ProcessingStep),
    /// A training job.
    Training(TrainingStep),
    /// A runtime branch.
    Condition(ConditionStep),
    /// A model registration.
    RegisterModel(RegisterModelStep),
}

impl StepNode {
    /// Returns the variant as a trait object.
    #[must_use]
    pub fn as_step(&self) -> &dyn Step {
        match self {
            Self::Processing(step) => step,
            Self::Training(step) => step,
            Self::Condition(step) => step,
            Self::RegisterModel(step) => step,
        }
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.as_step().name()
    }

    /// Returns the variant tag.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        self.as_step().kind()
    }

    /// Returns the step's inputs in order.
    #[must_use]
    pub fn inputs(&self) -> Vec<StepInput> {
        self.as_step().inputs()
    }

    /// Returns the step's output slots.
    #[must_use]
    pub fn output_slots(&self) -> Vec<OutputSlot> {
        self.as_step().output_slots()
    }

    /// Returns the cache scope, if any.
    #[must_use]
    pub fn cache_scope(&self) -> Option<&CacheScope> {
        self.as_step().cache_scope()
    }

    /// Returns true if the step declares `slot`.
    #[must_use]
    pub fn has_slot(&self, slot: &OutputSlot) -> bool {
        self.output_slots().contains(slot)
    }

    /// Returns every property reference the step's inputs consume.
    #[must_use]
    pub fn references(&self) -> Vec<PropertyReference> {
        self.inputs()
            .iter()
            .flat_map(|input| input.source.references().into_iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Returns the steps nested directly inside this one (condition branches).
    #[must_use]
    pub fn children(&self) -> Vec<&StepNode> {
        match self {
            Self::Condition(step) => step
                .if_branch()
                .steps()
                .iter()
                .chain(step.else_branch().steps())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Renders the step as it appears in a pipeline definition.
    #[must_use]
    pub fn to_definition(&self) -> serde_json::Value {
        self.as_step().to_definition()
    }
}

impl From<ProcessingStep> for StepNode {
    fn from(step: ProcessingStep) -> Self {
        Self::Processing(step)
    }
}

impl From<TrainingStep> for StepNode {
    fn from(step: TrainingStep) -> Self {
        Self::Training(step)
    }
}

impl From<ConditionStep> for StepNode {
    fn from(step: ConditionStep) -> Self {
        Self::Condition(step)
    }
}

impl From<RegisterModelStep> for StepNode {
    fn from(step: RegisterModelStep) -> Self {
        Self::RegisterModel(step)
    }
}
