//! Error types for the trainflow crate.
//!
//! Construction-time errors are local validation failures: the caller must
//! fix the configuration and rebuild. Runtime job failures are reported by
//! the execution collaborator through its execution report, never through
//! these types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for trainflow operations.
#[derive(Debug, Error)]
pub enum TrainflowError {
    /// A general pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Two parameters or two steps share a name.
    #[error("{0}")]
    DuplicateName(#[from] DuplicateNameError),

    /// A property reference points at a step or output slot that does not exist.
    #[error("{0}")]
    DanglingReference(#[from] DanglingReferenceError),

    /// A location string is malformed.
    #[error("{0}")]
    InvalidLocation(#[from] InvalidLocationError),

    /// A submission-time parameter problem.
    #[error("{0}")]
    Parameter(#[from] ParameterError),

    /// A metric definition pattern failed to compile.
    #[error("Invalid metric pattern for '{name}': {source}")]
    InvalidMetricPattern {
        /// The metric name.
        name: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The execution collaborator could not find an execution.
    #[error("Unknown execution: {0}")]
    UnknownExecution(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = TrainflowError> = std::result::Result<T, E>;

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-001-DUPLICATE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attaches the default suggestion for this code when no hint is set.
    #[must_use]
    pub fn with_default_hint(self) -> Self {
        if self.fix_hint.is_some() {
            return self;
        }
        match ContractSuggestions::get(&self.code) {
            Some(hint) => self.with_fix_hint(hint),
            None => self,
        }
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error.
    pub steps: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// What kind of entity a duplicate name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameScope {
    /// A pipeline parameter.
    Parameter,
    /// A step node (top-level or nested in a branch).
    Step,
    /// A named output, input or property file within one step.
    Slot,
}

impl std::fmt::Display for NameScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parameter => write!(f, "parameter"),
            Self::Step => write!(f, "step"),
            Self::Slot => write!(f, "slot"),
        }
    }
}

/// Error raised when a name is declared twice.
#[derive(Debug, Clone, Error)]
#[error("Duplicate {scope} name: '{name}'")]
pub struct DuplicateNameError {
    /// The scope the name lives in.
    pub scope: NameScope,
    /// The duplicated name.
    pub name: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl DuplicateNameError {
    /// Creates a new duplicate name error.
    #[must_use]
    pub fn new(scope: NameScope, name: impl Into<String>) -> Self {
        let name = name.into();
        let info = ContractErrorInfo::new(
            "GRAPH-001-DUPLICATE",
            format!("The {scope} name '{name}' is declared more than once"),
        )
        .with_context_entry("scope", scope.to_string())
        .with_default_hint();

        Self {
            scope,
            name,
            error_info: info,
        }
    }
}

/// Error raised when a step consumes an output that cannot exist.
#[derive(Debug, Clone, Error)]
#[error("Step '{consumer}' references '{producer}.{slot}', {reason}")]
pub struct DanglingReferenceError {
    /// The consuming step.
    pub consumer: String,
    /// The producing step named by the reference.
    pub producer: String,
    /// The output slot named by the reference.
    pub slot: String,
    /// Why the reference cannot be honored.
    pub reason: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl DanglingReferenceError {
    /// The producing step is not (yet) part of the graph.
    #[must_use]
    pub fn unknown_step(
        consumer: impl Into<String>,
        producer: impl Into<String>,
        slot: impl Into<String>,
    ) -> Self {
        Self::build(
            consumer.into(),
            producer.into(),
            slot.into(),
            "which is not an earlier step of the pipeline",
        )
    }

    /// The producing step exists but declares no such slot.
    #[must_use]
    pub fn unknown_slot(
        consumer: impl Into<String>,
        producer: impl Into<String>,
        slot: impl Into<String>,
    ) -> Self {
        Self::build(
            consumer.into(),
            producer.into(),
            slot.into(),
            "but the producing step declares no such output",
        )
    }

    fn build(consumer: String, producer: String, slot: String, reason: &str) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-002-DANGLING",
            format!("Reference to '{producer}.{slot}' cannot be resolved"),
        )
        .with_context_entry("consumer", consumer.clone())
        .with_default_hint();

        Self {
            consumer,
            producer,
            slot,
            reason: reason.to_string(),
            error_info: info,
        }
    }
}

/// Error raised for malformed storage locations or mount paths.
#[derive(Debug, Clone, Error)]
#[error("Invalid location '{location}': {reason}")]
pub struct InvalidLocationError {
    /// The offending location string.
    pub location: String,
    /// Why it was rejected.
    pub reason: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl InvalidLocationError {
    /// Creates a new invalid location error.
    #[must_use]
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        let location = location.into();
        let info = ContractErrorInfo::new(
            "GRAPH-003-LOCATION",
            format!("Location '{location}' is malformed"),
        )
        .with_default_hint();

        Self {
            location,
            reason: reason.into(),
            error_info: info,
        }
    }
}

/// Errors raised while binding parameter values at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    /// An override names a parameter the pipeline does not declare.
    #[error("Unknown parameter: {name}")]
    Unknown {
        /// The parameter name.
        name: String,
    },

    /// An override value has the wrong kind.
    #[error("Parameter '{name}' expects a {expected} value, got {actual}")]
    KindMismatch {
        /// The parameter name.
        name: String,
        /// The declared kind.
        expected: String,
        /// The supplied kind.
        actual: String,
    },
}

impl ParameterError {
    /// Creates an unknown parameter error.
    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::Unknown { name: name.into() }
    }

    /// Creates a kind mismatch error.
    #[must_use]
    pub fn kind_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::KindMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Provides default suggestions for common contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "GRAPH-001-DUPLICATE" => Some(
                "Parameter names and step names must be unique across the whole pipeline, \
                 including steps nested inside condition branches.",
            ),
            "GRAPH-002-DANGLING" => Some(
                "Add the producing step before the consuming step and reference only \
                 outputs the producing step declares.",
            ),
            "GRAPH-003-LOCATION" => Some(
                "Storage locations must look like s3://bucket/key and local mounts must be \
                 absolute paths.",
            ),
            "GRAPH-004-EMPTY" => Some("Add at least one step to the pipeline before building."),
            "GRAPH-005-UNKNOWN_PARAM" => Some(
                "Declare the parameter on the pipeline before a step reads it.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("step", "my_step");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("step"), Some(&"my_step".to_string()));
    }

    #[test]
    fn test_duplicate_name_error() {
        let err = DuplicateNameError::new(NameScope::Parameter, "TrainingInstanceCount");

        assert_eq!(
            err.to_string(),
            "Duplicate parameter name: 'TrainingInstanceCount'"
        );
        assert_eq!(err.error_info.code, "GRAPH-001-DUPLICATE");
        assert!(err.error_info.fix_hint.is_some());
    }

    #[test]
    fn test_dangling_reference_error() {
        let err = DanglingReferenceError::unknown_slot("Train", "Preprocess", "bogus");

        assert!(err.to_string().contains("Preprocess.bogus"));
        assert_eq!(err.error_info.code, "GRAPH-002-DANGLING");
        assert_eq!(err.error_info.context.get("consumer"), Some(&"Train".to_string()));
    }

    #[test]
    fn test_crate_error_conversion() {
        let err: TrainflowError = InvalidLocationError::new("s3:/nope", "missing scheme").into();
        assert!(matches!(err, TrainflowError::InvalidLocation(_)));
        assert!(err.to_string().contains("s3:/nope"));
    }

    #[test]
    fn test_contract_suggestions() {
        assert!(ContractSuggestions::get("GRAPH-004-EMPTY").is_some());
        assert!(ContractSuggestions::get("UNKNOWN").is_none());
    }
}
