//! Input sources: literal, parameter, deferred reference or a runtime join.

use super::PropertyReference;
use crate::core::Value;
use serde::{Deserialize, Serialize};

/// Where a step input gets its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    /// A value fixed at construction time.
    Literal(Value),
    /// A pipeline parameter, bound at submission time.
    Parameter(String),
    /// An output of an earlier step, resolved after that step runs.
    Property(PropertyReference),
    /// String concatenation of other sources, evaluated at runtime.
    Join {
        /// Separator placed between values.
        on: String,
        /// The joined sources, in order.
        values: Vec<Source>,
    },
}

impl Source {
    /// Creates a literal source.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates a join source.
    #[must_use]
    pub fn join(on: impl Into<String>, values: Vec<Source>) -> Self {
        Self::Join {
            on: on.into(),
            values,
        }
    }

    /// Returns the literal payload, if this is a literal.
    #[must_use]
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true if the value only exists once the pipeline runs.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }

    /// Collects every property reference reachable from this source.
    #[must_use]
    pub fn references(&self) -> Vec<&PropertyReference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a PropertyReference>) {
        match self {
            Self::Property(reference) => out.push(reference),
            Self::Join { values, .. } => {
                for value in values {
                    value.collect_references(out);
                }
            }
            Self::Literal(_) | Self::Parameter(_) => {}
        }
    }

    /// Collects every parameter name read by this source.
    #[must_use]
    pub fn parameters(&self) -> Vec<&str> {
        match self {
            Self::Parameter(name) => vec![name.as_str()],
            Self::Join { values, .. } => values.iter().flat_map(Source::parameters).collect(),
            Self::Literal(_) | Self::Property(_) => Vec::new(),
        }
    }

    /// Renders the source as a definition expression.
    #[must_use]
    pub fn to_expression(&self) -> serde_json::Value {
        match self {
            Self::Literal(value) => value.to_json(),
            Self::Parameter(name) => serde_json::json!({ "Get": format!("Parameters.{name}") }),
            Self::Property(reference) => reference.to_expression(),
            Self::Join { on, values } => serde_json::json!({
                "Std:Join": {
                    "On": on,
                    "Values": values.iter().map(Source::to_expression).collect::<Vec<_>>(),
                }
            }),
        }
    }
}

impl From<PropertyReference> for Source {
    fn from(reference: PropertyReference) -> Self {
        Self::Property(reference)
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Source {
    fn from(value: &str) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
}
