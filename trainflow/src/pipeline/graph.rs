//! The assembled, immutable pipeline graph.

use super::scope::GraphScope;
use super::PipelineDefinition;
use crate::errors::TrainflowError;
use crate::parameters::ParameterSet;
use crate::steps::StepNode;
use std::collections::BTreeSet;

/// A dependency edge implied by a property reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    /// The step whose output is read.
    pub producer: String,
    /// The step that reads it.
    pub consumer: String,
}

/// Parameters plus top-level steps in nominal execution order.
///
/// Steps reachable only through a condition branch are stored inside that
/// condition step, not at the top level.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    name: String,
    parameters: ParameterSet,
    steps: Vec<StepNode>,
}

impl PipelineGraph {
    pub(crate) fn new(name: String, parameters: ParameterSet, steps: Vec<StepNode>) -> Self {
        Self {
            name,
            parameters,
            steps,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared parameters.
    #[must_use]
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Returns the top-level steps.
    #[must_use]
    pub fn steps(&self) -> &[StepNode] {
        &self.steps
    }

    /// Returns the top-level step names, in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(StepNode::name).collect()
    }

    /// Every step in the graph, parents before their branch steps.
    #[must_use]
    pub fn all_steps(&self) -> Vec<&StepNode> {
        fn walk<'a>(node: &'a StepNode, out: &mut Vec<&'a StepNode>) {
            out.push(node);
            for child in node.children() {
                walk(child, out);
            }
        }

        let mut out = Vec::new();
        for node in &self.steps {
            walk(node, &mut out);
        }
        out
    }

    /// Finds a step by name, including steps nested in branches.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepNode> {
        self.all_steps().into_iter().find(|node| node.name() == name)
    }

    /// Returns the name of the condition step whose branch holds `name`.
    #[must_use]
    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.all_steps()
            .into_iter()
            .find(|node| node.children().iter().any(|child| child.name() == name))
            .map(StepNode::name)
    }

    /// Dependency edges, deduplicated and sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        let edges: BTreeSet<Edge> = self
            .all_steps()
            .into_iter()
            .flat_map(|node| {
                node.references().into_iter().map(move |reference| Edge {
                    producer: reference.step().to_string(),
                    consumer: node.name().to_string(),
                })
            })
            .collect();
        edges.into_iter().collect()
    }

    /// Re-checks the whole graph by static traversal: unique names, declared
    /// parameters, and references only to declared slots of earlier steps.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), TrainflowError> {
        let mut scope = GraphScope::new();
        for node in &self.steps {
            scope.admit(node, &self.parameters)?;
        }
        Ok(())
    }

    /// Renders the execution service definition.
    #[must_use]
    pub fn definition(&self) -> PipelineDefinition {
        PipelineDefinition::from_graph(self)
    }
}
