//! Model registration steps.

use super::{Framework, Step, StepInput};
use crate::core::StepKind;
use crate::properties::{PropertyReference, Source};

/// A metrics document attached to a registered model.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSource {
    /// Location of the document.
    pub s3_uri: Source,
    /// Document content type.
    pub content_type: String,
}

impl MetricsSource {
    /// Creates a metrics source.
    #[must_use]
    pub fn new(s3_uri: Source, content_type: impl Into<String>) -> Self {
        Self {
            s3_uri,
            content_type: content_type.into(),
        }
    }
}

/// Quality metrics attached to a model package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelMetrics {
    /// Model quality statistics.
    pub model_statistics: Option<MetricsSource>,
}

/// Publishes a model artifact into a model package group.
#[derive(Debug, Clone)]
pub struct RegisterModelStep {
    name: String,
    model_data: PropertyReference,
    framework: Framework,
    model_package_group_name: String,
    approval_status: Source,
    content_types: Vec<String>,
    response_types: Vec<String>,
    inference_instances: Vec<String>,
    transform_instances: Vec<String>,
    model_metrics: ModelMetrics,
}

impl RegisterModelStep {
    /// Creates a registration step.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        model_data: PropertyReference,
        framework: Framework,
        model_package_group_name: impl Into<String>,
        approval_status: Source,
    ) -> Self {
        Self {
            name: name.into(),
            model_data,
            framework,
            model_package_group_name: model_package_group_name.into(),
            approval_status,
            content_types: Vec::new(),
            response_types: Vec::new(),
            inference_instances: Vec::new(),
            transform_instances: Vec::new(),
            model_metrics: ModelMetrics::default(),
        }
    }

    /// Sets the accepted request and response content types.
    #[must_use]
    pub fn with_content_types(mut self, content: &[&str], response: &[&str]) -> Self {
        self.content_types = content.iter().map(ToString::to_string).collect();
        self.response_types = response.iter().map(ToString::to_string).collect();
        self
    }

    /// Sets the candidate real-time and batch instance types.
    #[must_use]
    pub fn with_instance_types(mut self, inference: &[&str], transform: &[&str]) -> Self {
        self.inference_instances = inference.iter().map(ToString::to_string).collect();
        self.transform_instances = transform.iter().map(ToString::to_string).collect();
        self
    }

    /// Attaches model metrics.
    #[must_use]
    pub fn with_model_metrics(mut self, metrics: ModelMetrics) -> Self {
        self.model_metrics = metrics;
        self
    }

    /// Returns the model archive reference.
    #[must_use]
    pub fn model_data(&self) -> &PropertyReference {
        &self.model_data
    }

    /// Returns the target model package group.
    #[must_use]
    pub fn model_package_group_name(&self) -> &str {
        &self.model_package_group_name
    }

    /// Returns the approval status source.
    #[must_use]
    pub fn approval_status(&self) -> &Source {
        &self.approval_status
    }

    /// Returns the attached metrics.
    #[must_use]
    pub fn model_metrics(&self) -> &ModelMetrics {
        &self.model_metrics
    }
}

impl Step for RegisterModelStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StepKind {
        StepKind::RegisterModel
    }

    fn inputs(&self) -> Vec<StepInput> {
        let mut inputs = vec![
            StepInput::new("model_data", Source::Property(self.model_data.clone())),
            StepInput::new("approval_status", self.approval_status.clone()),
        ];
        if let Some(statistics) = &self.model_metrics.model_statistics {
            inputs.push(StepInput::new("model_statistics", statistics.s3_uri.clone()));
        }
        inputs
    }

    fn arguments(&self) -> serde_json::Value {
        let mut args = serde_json::json!({
            "ModelPackageGroupName": self.model_package_group_name,
            "ModelApprovalStatus": self.approval_status.to_expression(),
            "InferenceSpecification": {
                "Containers": [{
                    "Framework": self.framework.to_definition(),
                    "ModelDataUrl": self.model_data.to_expression(),
                }],
                "SupportedContentTypes": self.content_types,
                "SupportedResponseMIMETypes": self.response_types,
                "SupportedRealtimeInferenceInstanceTypes": self.inference_instances,
                "SupportedTransformInstanceTypes": self.transform_instances,
            },
        });
        if let Some(statistics) = &self.model_metrics.model_statistics {
            args["ModelMetrics"] = serde_json::json!({
                "ModelQuality": {
                    "Statistics": {
                        "ContentType": statistics.content_type,
                        "S3Uri": statistics.s3_uri.to_expression(),
                    }
                }
            });
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::OutputSlot;

    fn step() -> RegisterModelStep {
        let report_dir = PropertyReference::new("Eval", OutputSlot::ProcessingOutput("evaluation".into()));
        RegisterModelStep::new(
            "Register",
            PropertyReference::new("Train", OutputSlot::ModelArtifacts),
            Framework::tensorflow("2.1.3"),
            "BirdEnd2EndModelGroup",
            Source::Parameter("ModelApprovalStatus".into()),
        )
        .with_content_types(&["text/csv"], &["text/csv"])
        .with_instance_types(&["ml.t2.medium", "ml.m5.large"], &["ml.m5.large"])
        .with_model_metrics(ModelMetrics {
            model_statistics: Some(MetricsSource::new(
                Source::join("/", vec![report_dir.into(), "evaluation.json".into()]),
                "application/json",
            )),
        })
    }

    #[test]
    fn test_inputs_reference_training_and_evaluation() {
        let step = step();
        let referenced: Vec<String> = step
            .inputs()
            .iter()
            .flat_map(|input| input.source.references().into_iter().map(|r| r.step().to_string()).collect::<Vec<_>>())
            .collect();
        assert_eq!(referenced, vec!["Train", "Eval"]);
    }

    #[test]
    fn test_definition() {
        let args = step().arguments();
        assert_eq!(args["ModelPackageGroupName"], "BirdEnd2EndModelGroup");
        assert_eq!(
            args["ModelApprovalStatus"],
            serde_json::json!({"Get": "Parameters.ModelApprovalStatus"})
        );
        assert_eq!(
            args["InferenceSpecification"]["SupportedRealtimeInferenceInstanceTypes"],
            serde_json::json!(["ml.t2.medium", "ml.m5.large"])
        );
        assert!(args["ModelMetrics"]["ModelQuality"]["Statistics"]["S3Uri"]["Std:Join"].is_object());
    }
}
