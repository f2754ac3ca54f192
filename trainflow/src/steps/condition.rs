//! Condition steps: a two-armed branch on runtime-resolved metrics.

use super::{Step, StepInput, StepNode};
use crate::core::StepKind;
use crate::properties::{PropertyReference, Source};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric comparison applied to a resolved metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    /// `left == right`
    Equals,
    /// `left > right`
    GreaterThan,
    /// `left >= right`
    GreaterThanOrEqualTo,
    /// `left < right`
    LessThan,
    /// `left <= right`
    LessThanOrEqualTo,
}

impl Comparator {
    /// Applies the comparison.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn compare(self, left: f64, right: f64) -> bool {
        match self {
            Self::Equals => left == right,
            Self::GreaterThan => left > right,
            Self::GreaterThanOrEqualTo => left >= right,
            Self::LessThan => left < right,
            Self::LessThanOrEqualTo => left <= right,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals => write!(f, "Equals"),
            Self::GreaterThan => write!(f, "GreaterThan"),
            Self::GreaterThanOrEqualTo => write!(f, "GreaterThanOrEqualTo"),
            Self::LessThan => write!(f, "LessThan"),
            Self::LessThanOrEqualTo => write!(f, "LessThanOrEqualTo"),
        }
    }
}

/// `left <comparator> right`, where `left` is resolved at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Metric reference, usually a property-file field.
    pub left: PropertyReference,
    /// Comparison.
    pub comparator: Comparator,
    /// Fixed threshold.
    pub right: f64,
}

impl Condition {
    /// Creates a condition.
    #[must_use]
    pub fn new(left: PropertyReference, comparator: Comparator, right: f64) -> Self {
        Self {
            left,
            comparator,
            right,
        }
    }

    /// `left >= right`
    #[must_use]
    pub fn greater_than_or_equal_to(left: PropertyReference, right: f64) -> Self {
        Self::new(left, Comparator::GreaterThanOrEqualTo, right)
    }

    /// Evaluates the condition against the resolved left value.
    #[must_use]
    pub fn evaluate(&self, left_value: f64) -> bool {
        self.comparator.compare(left_value, self.right)
    }

    fn to_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "Type": self.comparator.to_string(),
            "LeftValue": self.left.to_expression(),
            "RightValue": self.right,
        })
    }
}

/// One arm of a condition step.
///
/// `Stop` is a real outcome: the execution ends successfully at the
/// condition step without running anything further on this path.
#[derive(Debug, Clone, Default)]
pub enum Branch {
    /// Run these steps.
    Steps(Vec<StepNode>),
    /// Run nothing; the execution ends here without error.
    #[default]
    Stop,
}

impl Branch {
    /// Builds a branch, mapping an empty list to [`Branch::Stop`].
    #[must_use]
    pub fn from_steps(steps: Vec<StepNode>) -> Self {
        if steps.is_empty() {
            Self::Stop
        } else {
            Self::Steps(steps)
        }
    }

    /// Returns the branch steps; empty for [`Branch::Stop`].
    #[must_use]
    pub fn steps(&self) -> &[StepNode] {
        match self {
            Self::Steps(steps) => steps,
            Self::Stop => &[],
        }
    }

    /// Returns true for the terminal no-op arm.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

/// Which arm a condition step takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchDecision {
    /// Every condition held.
    IfBranch,
    /// At least one condition failed.
    ElseBranch,
}

/// Gates nested steps on runtime-resolved metrics.
#[derive(Debug, Clone)]
pub struct ConditionStep {
    name: String,
    conditions: Vec<Condition>,
    if_branch: Branch,
    else_branch: Branch,
}

impl ConditionStep {
    /// Creates a condition step whose arms both stop.
    #[must_use]
    pub fn new(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            name: name.into(),
            conditions: vec![condition],
            if_branch: Branch::Stop,
            else_branch: Branch::Stop,
        }
    }

    /// Adds a condition; all conditions must hold for the if-arm.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the steps run when every condition holds.
    #[must_use]
    pub fn with_if_steps(mut self, steps: Vec<StepNode>) -> Self {
        self.if_branch = Branch::from_steps(steps);
        self
    }

    /// Sets the steps run otherwise.
    #[must_use]
    pub fn with_else_steps(mut self, steps: Vec<StepNode>) -> Self {
        self.else_branch = Branch::from_steps(steps);
        self
    }

    /// Returns the conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the if-arm.
    #[must_use]
    pub fn if_branch(&self) -> &Branch {
        &self.if_branch
    }

    /// Returns the else-arm.
    #[must_use]
    pub fn else_branch(&self) -> &Branch {
        &self.else_branch
    }

    /// Decides the arm from resolved left values, one per condition.
    ///
    /// Missing values count as failed conditions.
    #[must_use]
    pub fn decide(&self, left_values: &[f64]) -> BranchDecision {
        let all_hold = self.conditions.len() == left_values.len()
            && self
                .conditions
                .iter()
                .zip(left_values)
                .all(|(condition, value)| condition.evaluate(*value));
        if all_hold {
            BranchDecision::IfBranch
        } else {
            BranchDecision::ElseBranch
        }
    }

    /// Returns the arm for a decision.
    #[must_use]
    pub fn branch(&self, decision: BranchDecision) -> &Branch {
        match decision {
            BranchDecision::IfBranch => &self.if_branch,
            BranchDecision::ElseBranch => &self.else_branch,
        }
    }
}

impl Step for ConditionStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StepKind {
        StepKind::Condition
    }

    fn inputs(&self) -> Vec<StepInput> {
        self.conditions
            .iter()
            .enumerate()
            .map(|(i, c)| StepInput::new(format!("condition_{i}"), Source::Property(c.left.clone())))
            .collect()
    }

    fn arguments(&self) -> serde_json::Value {
        serde_json::json!({
            "Conditions": self.conditions.iter().map(Condition::to_definition).collect::<Vec<_>>(),
            "IfSteps": self.if_branch.steps().iter().map(StepNode::to_definition).collect::<Vec<_>>(),
            "ElseSteps": self.else_branch.steps().iter().map(StepNode::to_definition).collect::<Vec<_>>(),
        })
    }
}
