//! Configuration for the bird-classification training workflow.

use crate::errors::TrainflowError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_model_package_group_name() -> String {
    "BirdEnd2EndModelGroup".to_string()
}

fn default_pipeline_name() -> String {
    "BirdEnd2EndPipeline".to_string()
}

fn default_base_job_prefix() -> String {
    "BirdEnd2End".to_string()
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("pipeline")
}

const fn default_instance_count() -> i64 {
    1
}

fn default_processing_instance_type() -> String {
    "ml.m5.xlarge".to_string()
}

fn default_training_instance_type() -> String {
    "ml.c5.4xlarge".to_string()
}

fn default_approval_status() -> String {
    "PendingManualApproval".to_string()
}

/// Defaults of the parameters the workflow declares.
///
/// Locations left unset are derived from the execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefaults {
    /// `ProcessingInstanceCount`
    #[serde(default = "default_instance_count")]
    pub processing_instance_count: i64,
    /// `ProcessingInstanceType`
    #[serde(default = "default_processing_instance_type")]
    pub processing_instance_type: String,
    /// `TrainingInstanceCount`; also selects the distribution mode.
    #[serde(default = "default_instance_count")]
    pub training_instance_count: i64,
    /// `TrainingInstanceType`
    #[serde(default = "default_training_instance_type")]
    pub training_instance_type: String,
    /// `ModelApprovalStatus`
    #[serde(default = "default_approval_status")]
    pub model_approval_status: String,
    /// `InputDataUrl`
    #[serde(default)]
    pub input_data_url: Option<String>,
    /// `InputManifestUrl`
    #[serde(default)]
    pub input_manifest_url: Option<String>,
    /// `ProcessImage`
    #[serde(default)]
    pub process_image: Option<String>,
}

impl Default for ParameterDefaults {
    fn default() -> Self {
        Self {
            processing_instance_count: default_instance_count(),
            processing_instance_type: default_processing_instance_type(),
            training_instance_count: default_instance_count(),
            training_instance_type: default_training_instance_type(),
            model_approval_status: default_approval_status(),
            input_data_url: None,
            input_manifest_url: None,
            process_image: None,
        }
    }
}

/// Everything `build_pipeline` needs besides the execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Region the pipeline runs in.
    #[serde(default = "default_region")]
    pub region: String,
    /// Execution role; the ambient role is used when absent.
    #[serde(default)]
    pub role: Option<String>,
    /// Artifact bucket; `sagemaker-{region}-{account}` when absent.
    #[serde(default)]
    pub default_bucket: Option<String>,
    /// Model registry group models are published to.
    #[serde(default = "default_model_package_group_name")]
    pub model_package_group_name: String,
    /// Pipeline name.
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
    /// Prefix of every step and job name.
    #[serde(default = "default_base_job_prefix")]
    pub base_job_prefix: String,
    /// Directory holding `preprocess.py`, `evaluation.py` and `code/`.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Parameter defaults.
    #[serde(default)]
    pub parameters: ParameterDefaults,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            role: None,
            default_bucket: None,
            model_package_group_name: default_model_package_group_name(),
            pipeline_name: default_pipeline_name(),
            base_job_prefix: default_base_job_prefix(),
            base_dir: default_base_dir(),
            parameters: ParameterDefaults::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration for a region with every other field defaulted.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration from a JSON file; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TrainflowError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Sets the execution role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Sets the artifact bucket.
    #[must_use]
    pub fn with_default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = Some(bucket.into());
        self
    }

    /// Sets the model package group name.
    #[must_use]
    pub fn with_model_package_group_name(mut self, name: impl Into<String>) -> Self {
        self.model_package_group_name = name.into();
        self
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    /// Sets the step and job name prefix.
    #[must_use]
    pub fn with_base_job_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.base_job_prefix = prefix.into();
        self
    }

    /// Sets the directory holding the external scripts.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Sets the default training instance count.
    #[must_use]
    pub fn with_training_instance_count(mut self, count: i64) -> Self {
        self.parameters.training_instance_count = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.pipeline_name, "BirdEnd2EndPipeline");
        assert_eq!(config.model_package_group_name, "BirdEnd2EndModelGroup");
        assert_eq!(config.parameters.training_instance_type, "ml.c5.4xlarge");
        assert_eq!(config.parameters.training_instance_count, 1);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"region": "eu-west-1", "parameters": {"training_instance_count": 4}}"#,
        )
        .unwrap();

        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.base_job_prefix, "BirdEnd2End");
        assert_eq!(config.parameters.training_instance_count, 4);
        assert_eq!(config.parameters.processing_instance_type, "ml.m5.xlarge");
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"pipeline_name": "Custom", "role": "arn:aws:iam::1:role/x"}}"#).unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.pipeline_name, "Custom");
        assert_eq!(config.role.as_deref(), Some("arn:aws:iam::1:role/x"));
    }

    #[test]
    fn test_from_json_file_missing() {
        let err = PipelineConfig::from_json_file("/nonexistent/trainflow.json").unwrap_err();
        assert!(matches!(err, TrainflowError::Io(_)));
    }
}
