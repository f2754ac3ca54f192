//! Ordered parameter collection with unique names.

use super::Parameter;
use crate::core::{Value, ValueKind};
use crate::errors::{DuplicateNameError, NameScope, ParameterError};
use std::collections::{BTreeMap, HashMap};

/// The parameters declared on one pipeline, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter with the same name already exists.
    pub fn declare(&mut self, parameter: Parameter) -> Result<(), DuplicateNameError> {
        if self.contains(parameter.name()) {
            return Err(DuplicateNameError::new(NameScope::Parameter, parameter.name()));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    /// Returns true if a parameter with this name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    /// Iterates parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns true if no parameters are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Binds concrete values: overrides where supplied, defaults elsewhere.
    ///
    /// Integers are accepted for float parameters; every other kind must match.
    ///
    /// # Errors
    ///
    /// Returns an error for overrides naming undeclared parameters or carrying
    /// a value of the wrong kind.
    pub fn bind(
        &self,
        overrides: &HashMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ParameterError> {
        for name in overrides.keys() {
            if !self.contains(name) {
                return Err(ParameterError::unknown(name));
            }
        }

        let mut bound = BTreeMap::new();
        for parameter in &self.parameters {
            let value = match overrides.get(parameter.name()) {
                Some(value) => coerce(parameter, value)?,
                None => parameter.default_value().clone(),
            };
            bound.insert(parameter.name().to_string(), value);
        }
        Ok(bound)
    }

    /// Renders all parameters as they appear in a pipeline definition.
    #[must_use]
    pub fn to_definition(&self) -> serde_json::Value {
        serde_json::Value::Array(self.parameters.iter().map(Parameter::to_definition).collect())
    }
}

#[allow(clippy::cast_precision_loss)]
fn coerce(parameter: &Parameter, value: &Value) -> Result<Value, ParameterError> {
    match (parameter.kind(), value) {
        (expected, actual) if expected == actual.kind() => Ok(actual.clone()),
        (ValueKind::Float, Value::Integer(v)) => Ok(Value::Float(*v as f64)),
        (expected, actual) => Err(ParameterError::kind_mismatch(
            parameter.name(),
            expected.to_string(),
            actual.kind().to_string(),
        )),
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}
