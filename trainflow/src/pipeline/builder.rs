//! Pipeline builder with validation.

use super::scope::GraphScope;
use super::PipelineGraph;
use crate::errors::{ContractErrorInfo, PipelineValidationError, TrainflowError};
use crate::parameters::{Parameter, ParameterSet};
use crate::steps::StepNode;
use tracing::debug;

/// Builder for creating validated pipeline graphs.
///
/// Steps are admitted in dependency order: each step may only reference
/// outputs of steps added before it. Every check runs when the step is
/// added, so a builder that accepted a step never holds a dangling edge.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// Declared parameters.
    parameters: ParameterSet,
    /// Top-level steps in insertion order.
    steps: Vec<StepNode>,
    scope: GraphScope,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: ParameterSet::new(),
            steps: Vec::new(),
            scope: GraphScope::new(),
        }
    }

    /// Declares a parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter name is already declared.
    pub fn parameter(mut self, parameter: Parameter) -> Result<Self, TrainflowError> {
        self.declare_parameter(parameter)?;
        Ok(self)
    }

    /// Declares a parameter in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter name is already declared.
    pub fn declare_parameter(&mut self, parameter: Parameter) -> Result<(), TrainflowError> {
        if parameter.name().trim().is_empty() {
            return Err(PipelineValidationError::new("Parameter name cannot be empty").into());
        }
        debug!(parameter = parameter.name(), kind = %parameter.kind(), "declared parameter");
        self.parameters.declare(parameter)?;
        Ok(())
    }

    /// Adds a top-level step.
    ///
    /// # Errors
    ///
    /// Returns an error if the step (or a step nested in its branches)
    /// reuses a name, reads an undeclared parameter, or references an
    /// output that no earlier step declares.
    pub fn step(mut self, step: impl Into<StepNode>) -> Result<Self, TrainflowError> {
        self.add_step(step.into())?;
        Ok(self)
    }

    /// Adds a top-level step in place.
    ///
    /// # Errors
    ///
    /// See [`PipelineBuilder::step`].
    pub fn add_step(&mut self, node: StepNode) -> Result<(), TrainflowError> {
        self.scope.admit(&node, &self.parameters)?;
        debug!(
            pipeline = %self.name,
            step = node.name(),
            kind = %node.kind(),
            nested = node.children().len(),
            "added step"
        );
        self.steps.push(node);
        Ok(())
    }

    /// Builds the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline name is empty or no step was added.
    pub fn build(self) -> Result<PipelineGraph, TrainflowError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Pipeline name cannot be empty").into());
        }
        if self.steps.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no steps")
                .with_error_info(
                    ContractErrorInfo::new("GRAPH-004-EMPTY", "Cannot build an empty pipeline")
                        .with_default_hint(),
                )
                .into());
        }

        Ok(PipelineGraph::new(self.name, self.parameters, self.steps))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of top-level steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if a step with this name was added, nested or not.
    #[must_use]
    pub fn contains_step(&self, name: &str) -> bool {
        self.scope.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CacheScope;
    use crate::errors::NameScope;
    use crate::properties::{OutputSlot, PropertyFile, PropertyReference, Source};
    use crate::steps::{
        CodeAsset, Condition, ConditionStep, Framework, ProcessingOutput, ProcessingStep,
        RegisterModelStep, ScriptProcessor,
    };

    fn processor() -> ScriptProcessor {
        ScriptProcessor::python(
            Source::literal("image:latest"),
            Source::Parameter("InstanceType".into()),
            Source::literal(1_i64),
            "job",
            "role",
        )
    }

    fn producer(name: &str) -> ProcessingStep {
        ProcessingStep::new(name, processor(), CodeAsset::new("/srv/run.py"))
            .with_output(ProcessingOutput::new("report", "/opt/ml/processing/output", None).unwrap())
            .unwrap()
            .with_property_file(PropertyFile::new("Report", "report", "report.json"))
            .unwrap()
            .with_cache(CacheScope::days(30))
    }

    fn consumer(name: &str, reference: PropertyReference) -> RegisterModelStep {
        RegisterModelStep::new(
            name,
            reference,
            Framework::tensorflow("2.1.3"),
            "group",
            Source::literal("Approved"),
        )
    }

    fn builder() -> PipelineBuilder {
        PipelineBuilder::new("test")
            .parameter(Parameter::string("InstanceType", "ml.m5.xlarge"))
            .unwrap()
    }

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::new("test");
        assert_eq!(builder.name(), "test");
        assert_eq!(builder.step_count(), 0);
    }

    #[test]
    fn test_builder_add_steps_in_order() {
        let builder = builder()
            .step(producer("a"))
            .unwrap()
            .step(consumer(
                "b",
                PropertyReference::new("a", OutputSlot::ProcessingOutput("report".into())),
            ))
            .unwrap();

        assert_eq!(builder.step_count(), 2);
        assert!(builder.contains_step("b"));
    }

    #[test]
    fn test_builder_duplicate_parameter() {
        let err = builder()
            .parameter(Parameter::integer("InstanceType", 1))
            .unwrap_err();

        match err {
            TrainflowError::DuplicateName(e) => assert_eq!(e.scope, NameScope::Parameter),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builder_duplicate_step() {
        let err = builder()
            .step(producer("a"))
            .unwrap()
            .step(producer("a"))
            .unwrap_err();

        assert!(matches!(err, TrainflowError::DuplicateName(ref e) if e.scope == NameScope::Step));
    }

    #[test]
    fn test_builder_forward_reference() {
        let err = builder()
            .step(consumer("b", PropertyReference::new("a", OutputSlot::ModelArtifacts)))
            .unwrap_err();

        match err {
            TrainflowError::DanglingReference(e) => {
                assert_eq!(e.producer, "a");
                assert_eq!(e.error_info.code, "GRAPH-002-DANGLING");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builder_unknown_slot() {
        let err = builder()
            .step(producer("a"))
            .unwrap()
            .step(consumer("b", PropertyReference::new("a", OutputSlot::ModelArtifacts)))
            .unwrap_err();

        assert!(matches!(err, TrainflowError::DanglingReference(ref e) if e.slot == "ModelArtifacts"));
    }

    #[test]
    fn test_builder_unknown_parameter() {
        let err = PipelineBuilder::new("test").step(producer("a")).unwrap_err();

        match err {
            TrainflowError::Validation(e) => {
                assert_eq!(e.error_info.unwrap().code, "GRAPH-005-UNKNOWN_PARAM");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builder_nested_names_are_global() {
        let accuracy = PropertyReference::new("a", OutputSlot::PropertyFile("Report".into()))
            .with_sub_path("accuracy");
        let condition = ConditionStep::new("cond", Condition::greater_than_or_equal_to(accuracy, 0.5))
            .with_if_steps(vec![producer("a").into()]);

        let err = builder()
            .step(producer("a"))
            .unwrap()
            .step(condition)
            .unwrap_err();

        assert!(matches!(err, TrainflowError::DuplicateName(_)));
    }

    #[test]
    fn test_builder_else_arm_cannot_see_if_arm() {
        let accuracy = PropertyReference::new("a", OutputSlot::PropertyFile("Report".into()))
            .with_sub_path("accuracy");
        let condition = ConditionStep::new("cond", Condition::greater_than_or_equal_to(accuracy, 0.5))
            .with_if_steps(vec![producer("inner").into()])
            .with_else_steps(vec![consumer(
                "other",
                PropertyReference::new("inner", OutputSlot::ProcessingOutput("report".into())),
            )
            .into()]);

        let err = builder()
            .step(producer("a"))
            .unwrap()
            .step(condition)
            .unwrap_err();

        assert!(matches!(err, TrainflowError::DanglingReference(_)));
    }

    #[test]
    fn test_builder_empty_build() {
        let err = builder().build().unwrap_err();

        match err {
            TrainflowError::Validation(e) => assert_eq!(e.error_info.unwrap().code, "GRAPH-004-EMPTY"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builder_build_success() {
        let graph = builder().step(producer("a")).unwrap().build().unwrap();

        assert_eq!(graph.name(), "test");
        assert_eq!(graph.steps().len(), 1);
    }
}
