//! Assembly of the bird-classification training pipeline.

use super::{ExecutionContext, PipelineConfig};
use crate::core::{CacheScope, S3Uri};
use crate::errors::TrainflowError;
use crate::parameters::Parameter;
use crate::pipeline::{PipelineBuilder, PipelineGraph};
use crate::properties::{PropertyFile, PropertyReference, Source};
use crate::steps::{
    select_distribution, CProfileTimer, CodeAsset, Condition, ConditionStep, DebuggerHookConfig,
    DistributionPlan, Estimator, Framework, FrameworkProfile, InputMode, MetricDefinition,
    MetricsSource, ModelMetrics, ProcessingInput, ProcessingOutput, ProcessingStep,
    ProfilerConfig, ProfilingWindow, PythonProfiler, PythonProfilingWindow, RegisterModelStep,
    Rule, ScriptProcessor, TrainingInput, TrainingStep,
};
use tracing::info;

/// `ProcessingInstanceCount` parameter.
pub const PROCESSING_INSTANCE_COUNT: &str = "ProcessingInstanceCount";
/// `ProcessingInstanceType` parameter.
pub const PROCESSING_INSTANCE_TYPE: &str = "ProcessingInstanceType";
/// `TrainingInstanceCount` parameter.
pub const TRAINING_INSTANCE_COUNT: &str = "TrainingInstanceCount";
/// `TrainingInstanceType` parameter.
pub const TRAINING_INSTANCE_TYPE: &str = "TrainingInstanceType";
/// `ModelApprovalStatus` parameter.
pub const MODEL_APPROVAL_STATUS: &str = "ModelApprovalStatus";
/// `InputDataUrl` parameter.
pub const INPUT_DATA_URL: &str = "InputDataUrl";
/// `InputManifestUrl` parameter.
pub const INPUT_MANIFEST_URL: &str = "InputManifestUrl";
/// `ProcessImage` parameter.
pub const PROCESS_IMAGE: &str = "ProcessImage";

/// Name of the evaluation report property file.
pub const EVALUATION_REPORT: &str = "EvaluationReport";
/// Field path of the accuracy inside the evaluation report.
pub const ACCURACY_PATH: &str = "multiclass_classification_metrics.accuracy.value";
/// Minimum accuracy a model needs to be registered.
pub const ACCURACY_THRESHOLD: f64 = 0.8;

const CACHE_TTL_DAYS: u64 = 30;
const TF_FRAMEWORK_VERSION: &str = "2.1.3";

/// Step names, derived once from the job prefix and passed to each
/// constructor explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNames {
    /// Preprocessing step.
    pub preprocess: String,
    /// Training step.
    pub train: String,
    /// Evaluation step.
    pub evaluation: String,
    /// Accuracy gate.
    pub condition: String,
    /// Model registration.
    pub register: String,
}

impl StepNames {
    /// Derives every step name from a prefix.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            preprocess: format!("{prefix}Preprocess"),
            train: format!("{prefix}Train"),
            evaluation: format!("{prefix}Evaluation"),
            condition: format!("{prefix}AccuracyCond"),
            register: format!("{prefix}RegisterModel"),
        }
    }
}

/// Builds the preprocess, train, evaluate, gate and register pipeline.
///
/// Nothing is executed. The only disk access happens later, when an
/// execution service fingerprints the scripts under `config.base_dir`.
///
/// # Errors
///
/// Returns an error if no execution role can be resolved, a configured
/// location is malformed, or the assembled graph fails validation.
pub fn build_pipeline(
    config: &PipelineConfig,
    ctx: &ExecutionContext,
) -> Result<PipelineGraph, TrainflowError> {
    let role = ctx.resolve_role(config.role.as_deref())?;
    let names = StepNames::with_prefix(&config.base_job_prefix);
    let plan = select_distribution(config.parameters.training_instance_count);

    let mut builder = PipelineBuilder::new(&config.pipeline_name);
    for parameter in parameters(config, ctx)? {
        builder.declare_parameter(parameter)?;
    }

    let preprocess = preprocess_step(config, ctx, &names, &role)?;
    let train = training_step(config, ctx, &names, &role, &plan, &preprocess)?;
    let evaluation = evaluation_step(config, &names, &role, &preprocess, &train)?;
    let register = register_step(config, &names, &train, &evaluation)?;
    let condition = condition_step(&names, &evaluation, register)?;

    builder.add_step(preprocess.into())?;
    builder.add_step(train.into())?;
    builder.add_step(evaluation.into())?;
    builder.add_step(condition.into())?;
    let graph = builder.build()?;

    info!(
        pipeline = graph.name(),
        steps = graph.all_steps().len(),
        parameters = graph.parameters().len(),
        distributed = plan.distribution.is_enabled(),
        data_distribution = %plan.data_distribution,
        "built pipeline"
    );
    Ok(graph)
}

fn parameters(
    config: &PipelineConfig,
    ctx: &ExecutionContext,
) -> Result<Vec<Parameter>, TrainflowError> {
    let defaults = &config.parameters;
    let input_data = match &defaults.input_data_url {
        Some(url) => url.parse::<S3Uri>()?,
        None => ctx.bucket_uri("bird-groundtruth/unlabeled/images")?,
    };
    let input_manifest = match &defaults.input_manifest_url {
        Some(url) => url.parse::<S3Uri>()?,
        None => ctx.bucket_uri("bird-groundtruth/pipeline/manifest")?,
    };
    let process_image = defaults
        .process_image
        .clone()
        .unwrap_or_else(|| format!("{}/sagemaker-tf-container:2.0", ctx.registry_host()));

    Ok(vec![
        Parameter::string(PROCESSING_INSTANCE_TYPE, &defaults.processing_instance_type),
        Parameter::integer(PROCESSING_INSTANCE_COUNT, defaults.processing_instance_count),
        Parameter::integer(TRAINING_INSTANCE_COUNT, defaults.training_instance_count),
        Parameter::string(TRAINING_INSTANCE_TYPE, &defaults.training_instance_type),
        Parameter::string(MODEL_APPROVAL_STATUS, &defaults.model_approval_status),
        Parameter::string(INPUT_DATA_URL, input_data.to_string()),
        Parameter::string(INPUT_MANIFEST_URL, input_manifest.to_string()),
        Parameter::string(PROCESS_IMAGE, process_image),
    ])
}

fn script_processor(base_job_name: &str, role: &str) -> ScriptProcessor {
    ScriptProcessor::python(
        Source::Parameter(PROCESS_IMAGE.to_string()),
        Source::Parameter(PROCESSING_INSTANCE_TYPE.to_string()),
        Source::Parameter(PROCESSING_INSTANCE_COUNT.to_string()),
        base_job_name,
        role,
    )
}

fn preprocess_step(
    config: &PipelineConfig,
    ctx: &ExecutionContext,
    names: &StepNames,
    role: &str,
) -> Result<ProcessingStep, TrainflowError> {
    let output_base = ctx.bucket_uri(&format!("{}/outputs", config.base_job_prefix))?;

    let mut step = ProcessingStep::new(
        &names.preprocess,
        script_processor(&names.preprocess, role),
        CodeAsset::new(config.base_dir.join("preprocess.py")),
    )
    .with_job_arguments(["--manifest", "manifest", "--images", "images"])
    .with_input(ProcessingInput::new(
        "images",
        Source::Parameter(INPUT_DATA_URL.to_string()),
        "/opt/ml/processing/input/images/",
    )?)?
    .with_input(ProcessingInput::new(
        "manifest",
        Source::Parameter(INPUT_MANIFEST_URL.to_string()),
        "/opt/ml/processing/input/manifest/",
    )?)?;

    for (output_name, suffix) in [
        ("train_data", "train"),
        ("val_data", "valid"),
        ("test_data", "test"),
        ("classes", "classes"),
    ] {
        step = step.with_output(ProcessingOutput::new(
            output_name,
            format!("/opt/ml/processing/output/{suffix}"),
            Some(output_base.join(suffix)),
        )?)?;
    }

    Ok(step.with_cache(CacheScope::days(CACHE_TTL_DAYS)))
}

fn training_step(
    config: &PipelineConfig,
    ctx: &ExecutionContext,
    names: &StepNames,
    role: &str,
    plan: &DistributionPlan,
    preprocess: &ProcessingStep,
) -> Result<TrainingStep, TrainflowError> {
    let prefix = &config.base_job_prefix;
    let profiler = ProfilerConfig {
        system_monitor_interval_millis: 500,
        framework: Some(FrameworkProfile {
            detailed: Some(ProfilingWindow::new(5, 10)),
            dataloader: Some(ProfilingWindow::new(7, 10)),
            python: Some(PythonProfilingWindow {
                window: ProfilingWindow::new(9, 10),
                profiler: PythonProfiler::CProfile,
                cprofile_timer: Some(CProfileTimer::TotalTime),
            }),
        }),
    };

    let estimator = Estimator::new(
        "train_debugger.py",
        config.base_dir.join("code"),
        Framework::tensorflow(TF_FRAMEWORK_VERSION),
        Source::Parameter(TRAINING_INSTANCE_TYPE.to_string()),
        Source::Parameter(TRAINING_INSTANCE_COUNT.to_string()),
        role,
        ctx.bucket_uri(&format!("{prefix}/output/models"))?,
    )
    .with_distribution(plan.distribution)
    .with_hyperparameter("batch_size", 8_i64)
    .with_hyperparameter("epochs", 15_i64)
    .with_hyperparameter("dropout", 0.76)
    .with_hyperparameter("lr", 0.000_019)
    .with_hyperparameter("data_dir", "/opt/ml/input/data")
    .with_metric_definitions(vec![
        MetricDefinition::new("loss", r"loss: ([0-9\.]+)")?,
        MetricDefinition::new("acc", r"accuracy: ([0-9\.]+)")?,
        MetricDefinition::new("val_loss", r"val_loss: ([0-9\.]+)")?,
        MetricDefinition::new("val_acc", r"val_accuracy: ([0-9\.]+)")?,
    ])
    .with_base_job_name(format!("{prefix}-hvd"))
    .with_checkpoint_uri(ctx.bucket_uri(&format!("{prefix}/output/checkpoints"))?)
    .with_input_mode(InputMode::Pipe)
    .with_profiler(profiler)
    .with_debugger_hook(DebuggerHookConfig::collecting(&["weights", "gradients"]))
    .with_rules(vec![Rule::ProfilerReport, Rule::LossNotDecreasing])
    .with_tag("TrainingType", "OnDemand");

    Ok(TrainingStep::new(&names.train, estimator)
        .with_channel(
            "train",
            TrainingInput::new(preprocess.output_uri("train_data")?, plan.data_distribution)?,
        )?
        .with_channel(
            "valid",
            TrainingInput::new(preprocess.output_uri("val_data")?, plan.data_distribution)?,
        )?
        .with_cache(CacheScope::days(CACHE_TTL_DAYS)))
}

fn evaluation_step(
    config: &PipelineConfig,
    names: &StepNames,
    role: &str,
    preprocess: &ProcessingStep,
    train: &TrainingStep,
) -> Result<ProcessingStep, TrainflowError> {
    ProcessingStep::new(
        &names.evaluation,
        script_processor(&names.evaluation, role),
        CodeAsset::new(config.base_dir.join("evaluation.py")),
    )
    .with_job_arguments(["--model-file", "model.tar.gz", "--classes-file", "classes.json"])
    .with_input(ProcessingInput::new(
        "test_data",
        preprocess.output_uri("test_data")?,
        "/opt/ml/processing/input/test",
    )?)?
    .with_input(ProcessingInput::new(
        "classes",
        preprocess.output_uri("classes")?,
        "/opt/ml/processing/input/classes",
    )?)?
    .with_input(ProcessingInput::new(
        "model",
        train.model_artifacts(),
        "/opt/ml/processing/model",
    )?)?
    .with_output(ProcessingOutput::new("evaluation", "/opt/ml/processing/output", None)?)?
    .with_property_file(PropertyFile::new(EVALUATION_REPORT, "evaluation", "evaluation.json"))
}

fn register_step(
    config: &PipelineConfig,
    names: &StepNames,
    train: &TrainingStep,
    evaluation: &ProcessingStep,
) -> Result<RegisterModelStep, TrainflowError> {
    let report_location = Source::join(
        "/",
        vec![evaluation.output_uri("evaluation")?.into(), "evaluation.json".into()],
    );

    Ok(RegisterModelStep::new(
        &names.register,
        train.model_artifacts(),
        Framework::tensorflow(TF_FRAMEWORK_VERSION),
        &config.model_package_group_name,
        Source::Parameter(MODEL_APPROVAL_STATUS.to_string()),
    )
    .with_content_types(&["text/csv"], &["text/csv"])
    .with_instance_types(&["ml.t2.medium", "ml.m5.large"], &["ml.m5.large"])
    .with_model_metrics(ModelMetrics {
        model_statistics: Some(MetricsSource::new(report_location, "application/json")),
    }))
}

fn condition_step(
    names: &StepNames,
    evaluation: &ProcessingStep,
    register: RegisterModelStep,
) -> Result<ConditionStep, TrainflowError> {
    let accuracy: PropertyReference = evaluation.property_value(EVALUATION_REPORT, ACCURACY_PATH)?;

    Ok(
        ConditionStep::new(
            &names.condition,
            Condition::greater_than_or_equal_to(accuracy, ACCURACY_THRESHOLD),
        )
        .with_if_steps(vec![register.into()])
        .with_else_steps(Vec::new()),
    )
}
