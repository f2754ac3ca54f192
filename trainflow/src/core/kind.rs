//! Step kind enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The variant tag of a step node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// A script run on managed processing instances.
    Processing,
    /// A managed training job.
    Training,
    /// A runtime branch on a resolved metric.
    Condition,
    /// Publication of a model artifact into a registry group.
    RegisterModel,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "Processing"),
            Self::Training => write!(f, "Training"),
            Self::Condition => write!(f, "Condition"),
            Self::RegisterModel => write!(f, "RegisterModel"),
        }
    }
}

impl StepKind {
    /// Returns true if steps of this kind may carry a cache scope.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Processing | Self::Training)
    }

    /// Returns true if steps of this kind launch a job on the execution service.
    #[must_use]
    pub fn runs_job(&self) -> bool {
        matches!(self, Self::Processing | Self::Training)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind_display() {
        assert_eq!(StepKind::Processing.to_string(), "Processing");
        assert_eq!(StepKind::Training.to_string(), "Training");
        assert_eq!(StepKind::Condition.to_string(), "Condition");
        assert_eq!(StepKind::RegisterModel.to_string(), "RegisterModel");
    }

    #[test]
    fn test_step_kind_is_cacheable() {
        assert!(StepKind::Processing.is_cacheable());
        assert!(StepKind::Training.is_cacheable());
        assert!(!StepKind::Condition.is_cacheable());
        assert!(!StepKind::RegisterModel.is_cacheable());
    }
}
