//! Named, typed, defaulted runtime parameters.
//!
//! Parameters are declared while the graph is assembled and substituted with
//! concrete values when an execution is submitted. Range and type checks on
//! supplied values belong to the execution service.

mod set;

pub use set::ParameterSet;

use crate::core::{Value, ValueKind};
use crate::properties::Source;
use serde::{Deserialize, Serialize};

/// A single pipeline parameter. Immutable once declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    default: Value,
}

impl Parameter {
    /// Declares a parameter with an explicit default.
    #[must_use]
    pub fn new(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
        }
    }

    /// Declares an integer parameter.
    #[must_use]
    pub fn integer(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, Value::Integer(default))
    }

    /// Declares a string parameter.
    #[must_use]
    pub fn string(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(name, Value::String(default.into()))
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter kind, fixed by its default value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }

    /// Returns the default value.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Returns a source that reads this parameter at execution time.
    #[must_use]
    pub fn reference(&self) -> Source {
        Source::Parameter(self.name.clone())
    }

    /// Renders the parameter as it appears in a pipeline definition.
    #[must_use]
    pub fn to_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "Name": self.name,
            "Type": self.kind().to_string(),
            "DefaultValue": self.default.to_json(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_kinds() {
        let count = Parameter::integer("TrainingInstanceCount", 1);
        assert_eq!(count.kind(), ValueKind::Integer);
        assert_eq!(count.default_value(), &Value::Integer(1));

        let image = Parameter::string("ProcessImage", "repo/image:2.0");
        assert_eq!(image.kind(), ValueKind::String);
    }

    #[test]
    fn test_parameter_reference() {
        let param = Parameter::string("ModelApprovalStatus", "PendingManualApproval");
        assert_eq!(param.reference(), Source::Parameter("ModelApprovalStatus".to_string()));
    }

    #[test]
    fn test_parameter_definition() {
        let param = Parameter::integer("ProcessingInstanceCount", 1);
        assert_eq!(
            param.to_definition(),
            serde_json::json!({
                "Name": "ProcessingInstanceCount",
                "Type": "Integer",
                "DefaultValue": 1,
            })
        );
    }
}
