//! Property references and output slots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named output a step exposes to later steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputSlot {
    /// The storage location of a named processing output.
    ProcessingOutput(String),
    /// The storage location of a training job's model archive.
    ModelArtifacts,
    /// A registered property file (structured report) of a processing step.
    PropertyFile(String),
}

impl OutputSlot {
    /// Short name used in diagnostics.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::ProcessingOutput(name) => name.clone(),
            Self::ModelArtifacts => "ModelArtifacts".to_string(),
            Self::PropertyFile(name) => format!("PropertyFiles.{name}"),
        }
    }

    /// Path of this slot inside the producing step's runtime properties.
    #[must_use]
    pub fn property_path(&self) -> String {
        match self {
            Self::ProcessingOutput(name) => {
                format!("ProcessingOutputConfig.Outputs['{name}'].S3Output.S3Uri")
            }
            Self::ModelArtifacts => "ModelArtifacts.S3ModelArtifacts".to_string(),
            Self::PropertyFile(name) => format!("PropertyFiles.{name}"),
        }
    }
}

impl fmt::Display for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A deferred pointer to an output of another step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyReference {
    step: String,
    slot: OutputSlot,
    sub_path: Option<String>,
}

impl PropertyReference {
    /// Creates a reference to `slot` on the step named `step`.
    #[must_use]
    pub fn new(step: impl Into<String>, slot: OutputSlot) -> Self {
        Self {
            step: step.into(),
            slot,
            sub_path: None,
        }
    }

    /// Narrows the reference to a field path inside the slot's content.
    #[must_use]
    pub fn with_sub_path(mut self, path: impl Into<String>) -> Self {
        self.sub_path = Some(path.into());
        self
    }

    /// Name of the producing step.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// The referenced output slot.
    #[must_use]
    pub fn slot(&self) -> &OutputSlot {
        &self.slot
    }

    /// Optional field path inside the slot.
    #[must_use]
    pub fn sub_path(&self) -> Option<&str> {
        self.sub_path.as_deref()
    }

    /// Renders the reference as a definition expression.
    #[must_use]
    pub fn to_expression(&self) -> serde_json::Value {
        let get = format!("Steps.{}.{}", self.step, self.slot.property_path());
        match (&self.slot, &self.sub_path) {
            (OutputSlot::PropertyFile(_), Some(path)) => serde_json::json!({
                "Std:JsonGet": {
                    "PropertyFile": { "Get": get },
                    "Path": path,
                }
            }),
            (_, Some(path)) => serde_json::json!({ "Get": format!("{get}.{path}") }),
            (_, None) => serde_json::json!({ "Get": get }),
        }
    }
}

impl fmt::Display for PropertyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.step, self.slot)?;
        if let Some(path) = &self.sub_path {
            write!(f, "[{path}]")?;
        }
        Ok(())
    }
}
