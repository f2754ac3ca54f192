//! The JSON document an execution service accepts for a pipeline graph.

use super::PipelineGraph;
use serde::{Deserialize, Serialize};

/// Definition schema version understood by the execution service.
pub const DEFINITION_VERSION: &str = "2020-12-01";

/// Serializable pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineDefinition {
    /// Schema version.
    pub version: String,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Parameter declarations.
    pub parameters: Vec<serde_json::Value>,
    /// Top-level steps; branch steps are nested inside their condition.
    pub steps: Vec<serde_json::Value>,
}

impl PipelineDefinition {
    /// Renders a graph.
    #[must_use]
    pub fn from_graph(graph: &PipelineGraph) -> Self {
        Self {
            version: DEFINITION_VERSION.to_string(),
            metadata: serde_json::Map::new(),
            parameters: graph
                .parameters()
                .iter()
                .map(crate::parameters::Parameter::to_definition)
                .collect(),
            steps: graph.steps().iter().map(crate::steps::StepNode::to_definition).collect(),
        }
    }

    /// Serializes the definition as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Names of the top-level steps, in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| step.get("Name").and_then(serde_json::Value::as_str))
            .collect()
    }
}
