//! Training steps: managed training jobs described by an estimator.

use super::{
    CodeAsset, DebuggerHookConfig, DistributionConfig, ProfilerConfig, Rule, S3DataDistribution,
    Step, StepInput,
};
use crate::core::{CacheScope, S3Uri, StepKind, Value};
use crate::errors::{DuplicateNameError, InvalidLocationError, NameScope, TrainflowError};
use crate::properties::{OutputSlot, PropertyReference, Source};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;

const DEFAULT_VOLUME_SIZE_GB: u32 = 30;
const DEFAULT_MAX_RUNTIME_SECS: u64 = 24 * 60 * 60;

/// The deep learning framework a training job runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framework {
    /// Framework name, e.g. `tensorflow`.
    pub name: String,
    /// Framework version.
    pub version: String,
    /// Python version tag.
    pub py_version: String,
}

impl Framework {
    /// `TensorFlow` at the given version on Python 3.
    #[must_use]
    pub fn tensorflow(version: impl Into<String>) -> Self {
        Self {
            name: "tensorflow".to_string(),
            version: version.into(),
            py_version: "py3".to_string(),
        }
    }

    pub(crate) fn to_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "Name": self.name,
            "Version": self.version,
            "PyVersion": self.py_version,
        })
    }
}

/// How channel data reaches the training container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Data is downloaded before training starts.
    File,
    /// Data is streamed through a pipe.
    Pipe,
}

impl InputMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Pipe => "Pipe",
        }
    }
}

/// A scalar metric scraped from training logs.
#[derive(Debug, Clone)]
pub struct MetricDefinition {
    name: String,
    pattern: Regex,
}

impl MetricDefinition {
    /// Compiles a metric definition. The first capture group holds the value.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, TrainflowError> {
        let name = name.into();
        let pattern = Regex::new(pattern)
            .map_err(|source| TrainflowError::InvalidMetricPattern { name: name.clone(), source })?;
        Ok(Self { name, pattern })
    }

    /// Returns the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pattern source.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns the value of the first match in `line`, if any.
    #[must_use]
    pub fn scrape(&self, line: &str) -> Option<f64> {
        self.pattern
            .captures(line)
            .and_then(|caps| caps.get(1)?.as_str().parse().ok())
    }

    fn to_definition(&self) -> serde_json::Value {
        serde_json::json!({"Name": self.name, "Regex": self.pattern.as_str()})
    }
}

impl PartialEq for MetricDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.pattern.as_str() == other.pattern.as_str()
    }
}

/// Everything a training job needs besides its data channels.
#[derive(Debug, Clone)]
pub struct Estimator {
    /// Entry program, relative to `source_dir`.
    pub entry_point: String,
    /// Local directory bundling the entry program and its helpers.
    pub source_dir: PathBuf,
    /// Framework container.
    pub framework: Framework,
    /// Instance type.
    pub instance_type: Source,
    /// Number of instances.
    pub instance_count: Source,
    /// Launcher configuration.
    pub distribution: DistributionConfig,
    /// Hyperparameters handed to the entry program.
    pub hyperparameters: BTreeMap<String, Value>,
    /// Metrics scraped from job logs.
    pub metric_definitions: Vec<MetricDefinition>,
    /// Execution role.
    pub role: String,
    /// Prefix for generated job names.
    pub base_job_name: String,
    /// Where the model archive is written.
    pub output_path: S3Uri,
    /// Where checkpoints are synced.
    pub checkpoint_uri: Option<S3Uri>,
    /// Channel input mode.
    pub input_mode: InputMode,
    /// System and framework profiling.
    pub profiler: Option<ProfilerConfig>,
    /// Tensor collection hooks.
    pub debugger_hook: Option<DebuggerHookConfig>,
    /// Built-in analysis rules.
    pub rules: Vec<Rule>,
    /// Resource tags.
    pub tags: Vec<(String, String)>,
}

impl Estimator {
    /// Creates an estimator with no hyperparameters, metrics or profiling.
    #[must_use]
    pub fn new(
        entry_point: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        framework: Framework,
        instance_type: Source,
        instance_count: Source,
        role: impl Into<String>,
        output_path: S3Uri,
    ) -> Self {
        Self {
            entry_point: entry_point.into(),
            source_dir: source_dir.into(),
            framework,
            instance_type,
            instance_count,
            distribution: DistributionConfig::Disabled,
            hyperparameters: BTreeMap::new(),
            metric_definitions: Vec::new(),
            role: role.into(),
            base_job_name: String::new(),
            output_path,
            checkpoint_uri: None,
            input_mode: InputMode::File,
            profiler: None,
            debugger_hook: None,
            rules: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Sets the launcher configuration.
    #[must_use]
    pub fn with_distribution(mut self, distribution: DistributionConfig) -> Self {
        self.distribution = distribution;
        self
    }

    /// Adds a hyperparameter.
    #[must_use]
    pub fn with_hyperparameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.hyperparameters.insert(key.into(), value.into());
        self
    }

    /// Sets the metric definitions.
    #[must_use]
    pub fn with_metric_definitions(mut self, metrics: Vec<MetricDefinition>) -> Self {
        self.metric_definitions = metrics;
        self
    }

    /// Sets the base job name.
    #[must_use]
    pub fn with_base_job_name(mut self, name: impl Into<String>) -> Self {
        self.base_job_name = name.into();
        self
    }

    /// Sets the checkpoint location.
    #[must_use]
    pub fn with_checkpoint_uri(mut self, uri: S3Uri) -> Self {
        self.checkpoint_uri = Some(uri);
        self
    }

    /// Sets the channel input mode.
    #[must_use]
    pub fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    /// Sets the profiler configuration.
    #[must_use]
    pub fn with_profiler(mut self, profiler: ProfilerConfig) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Sets the debugger hook configuration.
    #[must_use]
    pub fn with_debugger_hook(mut self, hook: DebuggerHookConfig) -> Self {
        self.debugger_hook = Some(hook);
        self
    }

    /// Sets the analysis rules.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Adds a resource tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// The entry program on local disk.
    #[must_use]
    pub fn entry_program(&self) -> CodeAsset {
        CodeAsset::new(self.source_dir.join(&self.entry_point))
    }

    fn hyperparameters_definition(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut params: serde_json::Map<String, serde_json::Value> = self
            .hyperparameters
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json().to_string().into()))
            .collect();
        params.insert(
            "sagemaker_program".into(),
            serde_json::Value::String(self.entry_point.clone()).to_string().into(),
        );
        params.insert(
            "sagemaker_submit_directory".into(),
            serde_json::Value::String(self.source_dir.display().to_string())
                .to_string()
                .into(),
        );
        for (key, value) in self.distribution.launcher_hyperparameters() {
            params.insert(key, value.into());
        }
        params
    }
}

/// One data channel of a training job.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingInput {
    /// Channel data location.
    pub s3_data: Source,
    /// How the data is split across workers.
    pub distribution: S3DataDistribution,
}

impl TrainingInput {
    /// Creates a training input.
    ///
    /// # Errors
    ///
    /// Returns an error if a literal source is not a valid storage location.
    pub fn new(
        s3_data: impl Into<Source>,
        distribution: S3DataDistribution,
    ) -> Result<Self, InvalidLocationError> {
        let s3_data = s3_data.into();
        if let Source::Literal(Value::String(location)) = &s3_data {
            location.parse::<S3Uri>()?;
        }
        Ok(Self {
            s3_data,
            distribution,
        })
    }
}

/// A managed training job.
#[derive(Debug, Clone)]
pub struct TrainingStep {
    name: String,
    estimator: Estimator,
    channels: Vec<(String, TrainingInput)>,
    cache: Option<CacheScope>,
}

impl TrainingStep {
    /// Creates a training step with no data channels.
    #[must_use]
    pub fn new(name: impl Into<String>, estimator: Estimator) -> Self {
        Self {
            name: name.into(),
            estimator,
            channels: Vec::new(),
            cache: None,
        }
    }

    /// Adds a named data channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel name is already used.
    pub fn with_channel(
        mut self,
        channel: impl Into<String>,
        input: TrainingInput,
    ) -> Result<Self, DuplicateNameError> {
        let channel = channel.into();
        if self.channels.iter().any(|(name, _)| *name == channel) {
            return Err(DuplicateNameError::new(NameScope::Slot, channel));
        }
        self.channels.push((channel, input));
        Ok(self)
    }

    /// Attaches a cache scope.
    #[must_use]
    pub fn with_cache(mut self, scope: CacheScope) -> Self {
        self.cache = Some(scope);
        self
    }

    /// Returns the estimator.
    #[must_use]
    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Returns the data channels in order.
    #[must_use]
    pub fn channels(&self) -> &[(String, TrainingInput)] {
        &self.channels
    }

    /// Deferred reference to the model archive this job produces.
    #[must_use]
    pub fn model_artifacts(&self) -> PropertyReference {
        PropertyReference::new(&self.name, OutputSlot::ModelArtifacts)
    }
}

impl Step for TrainingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StepKind {
        StepKind::Training
    }

    fn inputs(&self) -> Vec<StepInput> {
        let mut inputs = vec![
            StepInput::new("instance_type", self.estimator.instance_type.clone()),
            StepInput::new("instance_count", self.estimator.instance_count.clone()),
        ];
        inputs.extend(
            self.channels
                .iter()
                .map(|(name, input)| StepInput::new(name, input.s3_data.clone())),
        );
        inputs
    }

    fn output_slots(&self) -> Vec<OutputSlot> {
        vec![OutputSlot::ModelArtifacts]
    }

    fn cache_scope(&self) -> Option<&CacheScope> {
        self.cache.as_ref()
    }

    fn arguments(&self) -> serde_json::Value {
        let estimator = &self.estimator;
        let mut args = serde_json::json!({
            "AlgorithmSpecification": {
                "Framework": estimator.framework.to_definition(),
                "TrainingInputMode": estimator.input_mode.as_str(),
                "MetricDefinitions": estimator
                    .metric_definitions
                    .iter()
                    .map(MetricDefinition::to_definition)
                    .collect::<Vec<_>>(),
                "EnableSageMakerMetricsTimeSeries": true,
            },
            "OutputDataConfig": {"S3OutputPath": estimator.output_path.to_string()},
            "StoppingCondition": {"MaxRuntimeInSeconds": DEFAULT_MAX_RUNTIME_SECS},
            "ResourceConfig": {
                "InstanceCount": estimator.instance_count.to_expression(),
                "InstanceType": estimator.instance_type.to_expression(),
                "VolumeSizeInGB": DEFAULT_VOLUME_SIZE_GB,
            },
            "RoleArn": estimator.role,
            "InputDataConfig": self
                .channels
                .iter()
                .map(|(name, input)| serde_json::json!({
                    "ChannelName": name,
                    "DataSource": {
                        "S3DataSource": {
                            "S3DataType": "S3Prefix",
                            "S3Uri": input.s3_data.to_expression(),
                            "S3DataDistributionType": input.distribution.to_string(),
                        }
                    }
                }))
                .collect::<Vec<_>>(),
            "HyperParameters": estimator.hyperparameters_definition(),
            "Distribution": estimator.distribution.to_json(),
        });

        if !estimator.base_job_name.is_empty() {
            args["BaseJobName"] = estimator.base_job_name.clone().into();
        }
        if let Some(checkpoint) = &estimator.checkpoint_uri {
            args["CheckpointConfig"] = serde_json::json!({"S3Uri": checkpoint.to_string()});
        }
        if let Some(hook) = &estimator.debugger_hook {
            args["DebugHookConfig"] = hook.to_definition();
        }
        if let Some(profiler) = &estimator.profiler {
            args["ProfilerConfig"] = profiler.to_definition();
        }
        let (profiler_rules, debug_rules): (Vec<Rule>, Vec<Rule>) =
            estimator.rules.iter().copied().partition(|rule| rule.is_profiler_rule());
        if !profiler_rules.is_empty() {
            args["ProfilerRuleConfigurations"] =
                profiler_rules.into_iter().map(Rule::to_definition).collect();
        }
        if !debug_rules.is_empty() {
            args["DebugRuleConfigurations"] =
                debug_rules.into_iter().map(Rule::to_definition).collect();
        }
        if !estimator.tags.is_empty() {
            args["Tags"] = estimator
                .tags
                .iter()
                .map(|(key, value)| serde_json::json!({"Key": key, "Value": value}))
                .collect();
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::select_distribution;

    fn estimator() -> Estimator {
        Estimator::new(
            "train_debugger.py",
            "/srv/pipeline/code",
            Framework::tensorflow("2.1.3"),
            Source::Parameter("TrainingInstanceType".to_string()),
            Source::Parameter("TrainingInstanceCount".to_string()),
            "arn:aws:iam::111122223333:role/Pipelines",
            S3Uri::new("my-bucket", "Prefix/output/models").unwrap(),
        )
        .with_hyperparameter("epochs", 15_i64)
        .with_hyperparameter("data_dir", "/opt/ml/input/data")
        .with_metric_definitions(vec![
            MetricDefinition::new("loss", r"loss: ([0-9\.]+)").unwrap(),
            MetricDefinition::new("val_acc", r"val_accuracy: ([0-9\.]+)").unwrap(),
        ])
    }

    #[test]
    fn test_metric_pattern_validated() {
        let err = MetricDefinition::new("broken", "loss: ([0-9").unwrap_err();
        assert!(matches!(err, TrainflowError::InvalidMetricPattern { .. }));
    }

    #[test]
    fn test_metric_scrape_takes_first_match() {
        let metric = MetricDefinition::new("loss", r"loss: ([0-9\.]+)").unwrap();
        assert_eq!(metric.scrape("epoch 3 - loss: 0.52 - val_loss: 0.61"), Some(0.52));
        assert_eq!(metric.scrape("no metrics here"), None);
    }

    #[test]
    fn test_hyperparameters_are_json_strings() {
        let step = TrainingStep::new("Train", estimator());
        let args = step.arguments();
        assert_eq!(args["HyperParameters"]["epochs"], "15");
        assert_eq!(args["HyperParameters"]["data_dir"], "\"/opt/ml/input/data\"");
        assert_eq!(args["HyperParameters"]["sagemaker_program"], "\"train_debugger.py\"");
    }

    #[test]
    fn test_channels_carry_distribution() {
        let plan = select_distribution(4);
        let step = TrainingStep::new("Train", estimator().with_distribution(plan.distribution))
            .with_channel(
                "train",
                TrainingInput::new(
                    PropertyReference::new("Pre", OutputSlot::ProcessingOutput("train_data".into())),
                    plan.data_distribution,
                )
                .unwrap(),
            )
            .unwrap();

        let args = step.arguments();
        assert_eq!(
            args["InputDataConfig"][0]["DataSource"]["S3DataSource"]["S3DataDistributionType"],
            "ShardedByS3Key"
        );
        assert_eq!(args["HyperParameters"]["sagemaker_mpi_enabled"], "true");
        assert_eq!(step.references_count(), 1);
    }

    #[test]
    fn test_literal_channel_location_validated() {
        let err = TrainingInput::new("not-a-location", S3DataDistribution::FullyReplicated)
            .unwrap_err();
        assert_eq!(err.error_info.code, "GRAPH-003-LOCATION");
        assert!(TrainingInput::new("s3://my-bucket//train", S3DataDistribution::FullyReplicated)
            .is_err());
        assert!(TrainingInput::new(
            Source::Parameter("TrainData".into()),
            S3DataDistribution::ShardedByS3Key
        )
        .is_ok());
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let input =
            TrainingInput::new("s3://my-bucket/train", S3DataDistribution::FullyReplicated).unwrap();
        let result = TrainingStep::new("Train", estimator())
            .with_channel("train", input.clone())
            .unwrap()
            .with_channel("train", input);
        assert!(result.is_err());
    }

    #[test]
    fn test_model_artifacts_slot() {
        let step = TrainingStep::new("Train", estimator());
        assert!(step.output_slots().contains(step.model_artifacts().slot()));
        assert_eq!(
            step.estimator().entry_program().path(),
            std::path::Path::new("/srv/pipeline/code/train_debugger.py")
        );
    }

    impl TrainingStep {
        fn references_count(&self) -> usize {
            self.inputs().iter().map(|i| i.source.references().len()).sum()
        }
    }
}
