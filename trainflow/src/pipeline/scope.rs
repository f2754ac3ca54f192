//! Static checks applied while steps are admitted into a graph.

use crate::errors::{
    ContractErrorInfo, DanglingReferenceError, DuplicateNameError, NameScope,
    PipelineValidationError, TrainflowError,
};
use crate::parameters::ParameterSet;
use crate::properties::OutputSlot;
use crate::steps::StepNode;
use std::collections::{HashMap, HashSet};

/// Names and output slots visible to the next admitted step.
///
/// Step names are unique across the whole graph, nested branches included.
/// Output slots are only visible along one path: a step in an else-arm never
/// sees the outputs of the if-arm.
#[derive(Debug, Clone, Default)]
pub(crate) struct GraphScope {
    names: HashSet<String>,
    visible: HashMap<String, Vec<OutputSlot>>,
}

impl GraphScope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Checks a step against everything admitted before it, then admits it.
    pub(crate) fn admit(
        &mut self,
        node: &StepNode,
        parameters: &ParameterSet,
    ) -> Result<(), TrainflowError> {
        let name = node.name();
        if name.trim().is_empty() {
            return Err(PipelineValidationError::new("Step name cannot be empty").into());
        }
        if self.names.contains(name) {
            return Err(DuplicateNameError::new(NameScope::Step, name).into());
        }

        for input in node.inputs() {
            for parameter in input.source.parameters() {
                if !parameters.contains(parameter) {
                    return Err(unknown_parameter(name, &input.name, parameter).into());
                }
            }
            for reference in input.source.references() {
                let Some(slots) = self.visible.get(reference.step()) else {
                    return Err(DanglingReferenceError::unknown_step(
                        name,
                        reference.step(),
                        reference.slot().label(),
                    )
                    .into());
                };
                if !slots.contains(reference.slot()) {
                    return Err(DanglingReferenceError::unknown_slot(
                        name,
                        reference.step(),
                        reference.slot().label(),
                    )
                    .into());
                }
            }
        }

        self.names.insert(name.to_string());
        self.visible.insert(name.to_string(), node.output_slots());

        if let StepNode::Condition(step) = node {
            for branch in [step.if_branch(), step.else_branch()] {
                let mut arm = self.clone();
                for child in branch.steps() {
                    arm.admit(child, parameters)?;
                }
                self.names = arm.names;
            }
        }

        Ok(())
    }
}

fn unknown_parameter(step: &str, input: &str, parameter: &str) -> PipelineValidationError {
    PipelineValidationError::new(format!(
        "Step '{step}' input '{input}' reads undeclared parameter '{parameter}'"
    ))
    .with_steps(vec![step.to_string()])
    .with_error_info(
        ContractErrorInfo::new(
            "GRAPH-005-UNKNOWN_PARAM",
            format!("Parameter '{parameter}' is not declared"),
        )
        .with_context_entry("input", input)
        .with_default_hint(),
    )
}
