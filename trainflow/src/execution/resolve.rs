//! Runtime resolution of step input sources.

use crate::core::Value;
use crate::properties::{lookup_json_path, OutputSlot, PropertyReference, Source};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// A source that cannot be resolved at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The parameter has no bound value.
    #[error("Parameter '{0}' is not bound")]
    UnboundParameter(String),

    /// The producing step has not produced this output.
    #[error("'{0}' has not been produced")]
    MissingOutput(String),

    /// No document exists at the property file location.
    #[error("No document at '{location}' for '{reference}'")]
    MissingDocument {
        /// The reference being resolved.
        reference: String,
        /// Where the document was expected.
        location: String,
    },

    /// The document lacks the field, or the field is not a scalar.
    #[error("'{reference}' does not name a scalar field")]
    MissingField {
        /// The reference being resolved.
        reference: String,
    },
}

/// Values known so far during one execution.
#[derive(Debug, Default)]
pub(crate) struct Resolver {
    parameters: BTreeMap<String, Value>,
    outputs: HashMap<String, BTreeMap<String, String>>,
    documents: BTreeMap<String, serde_json::Value>,
}

impl Resolver {
    pub(crate) fn new(parameters: BTreeMap<String, Value>) -> Self {
        Self {
            parameters,
            ..Self::default()
        }
    }

    pub(crate) fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    /// Records a step's output locations, keyed by slot label.
    pub(crate) fn record_outputs(&mut self, step: &str, outputs: BTreeMap<String, String>) {
        self.outputs.insert(step.to_string(), outputs);
    }

    pub(crate) fn record_documents(&mut self, documents: BTreeMap<String, serde_json::Value>) {
        self.documents.extend(documents);
    }

    pub(crate) fn resolve(&self, source: &Source) -> Result<Value, ResolveError> {
        match source {
            Source::Literal(value) => Ok(value.clone()),
            Source::Parameter(name) => self
                .parameters
                .get(name)
                .cloned()
                .ok_or_else(|| ResolveError::UnboundParameter(name.clone())),
            Source::Property(reference) => self.resolve_reference(reference),
            Source::Join { on, values } => {
                let parts = values
                    .iter()
                    .map(|value| self.resolve(value).map(|v| v.to_string()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::String(parts.join(on)))
            }
        }
    }

    fn location(&self, step: &str, label: &str) -> Result<&String, ResolveError> {
        self.outputs
            .get(step)
            .and_then(|outputs| outputs.get(label))
            .ok_or_else(|| ResolveError::MissingOutput(format!("{step}.{label}")))
    }

    fn resolve_reference(&self, reference: &PropertyReference) -> Result<Value, ResolveError> {
        let location = self.location(reference.step(), &reference.slot().label())?;
        let OutputSlot::PropertyFile(_) = reference.slot() else {
            return Ok(Value::String(location.clone()));
        };

        let document = self
            .documents
            .get(location)
            .ok_or_else(|| ResolveError::MissingDocument {
                reference: reference.to_string(),
                location: location.clone(),
            })?;
        let field = match reference.sub_path() {
            Some(path) => lookup_json_path(document, path),
            None => Some(document),
        };
        field
            .and_then(Value::from_json)
            .ok_or_else(|| ResolveError::MissingField {
                reference: reference.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> Resolver {
        let mut parameters = BTreeMap::new();
        parameters.insert("ModelApprovalStatus".to_string(), Value::from("Approved"));
        let mut resolver = Resolver::new(parameters);

        let mut outputs = BTreeMap::new();
        outputs.insert("evaluation".to_string(), "s3://b/eval".to_string());
        outputs.insert(
            "PropertyFiles.EvaluationReport".to_string(),
            "s3://b/eval/evaluation.json".to_string(),
        );
        resolver.record_outputs("Eval", outputs);

        let mut documents = BTreeMap::new();
        documents.insert(
            "s3://b/eval/evaluation.json".to_string(),
            serde_json::json!({"multiclass_classification_metrics": {"accuracy": {"value": 0.81}}}),
        );
        resolver.record_documents(documents);
        resolver
    }

    fn report() -> PropertyReference {
        PropertyReference::new("Eval", OutputSlot::PropertyFile("EvaluationReport".into()))
    }

    #[test]
    fn test_resolve_parameter_and_location() {
        let resolver = resolver();
        assert_eq!(
            resolver.resolve(&Source::Parameter("ModelApprovalStatus".into())).unwrap(),
            Value::from("Approved")
        );
        let output = PropertyReference::new("Eval", OutputSlot::ProcessingOutput("evaluation".into()));
        assert_eq!(resolver.resolve(&output.into()).unwrap(), Value::from("s3://b/eval"));
    }

    #[test]
    fn test_resolve_property_file_field() {
        let reference = report().with_sub_path("multiclass_classification_metrics.accuracy.value");
        assert_eq!(resolver().resolve(&reference.into()).unwrap().as_f64(), Some(0.81));
    }

    #[test]
    fn test_resolve_join() {
        let output = PropertyReference::new("Eval", OutputSlot::ProcessingOutput("evaluation".into()));
        let join = Source::join("/", vec![output.into(), "evaluation.json".into()]);
        assert_eq!(
            resolver().resolve(&join).unwrap(),
            Value::from("s3://b/eval/evaluation.json")
        );
    }

    #[test]
    fn test_missing_field_and_output() {
        let resolver = resolver();
        let err = resolver
            .resolve(&report().with_sub_path("multiclass_classification_metrics.f1").into())
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingField { .. }));

        let err = resolver
            .resolve(&PropertyReference::new("Train", OutputSlot::ModelArtifacts).into())
            .unwrap_err();
        assert_eq!(err, ResolveError::MissingOutput("Train.ModelArtifacts".into()));
    }
}
