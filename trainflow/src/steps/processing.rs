//! Processing steps: scripts run on managed processing instances.

use super::{CodeAsset, Step, StepInput};
use crate::core::{validate_mount_path, CacheScope, S3Uri, StepKind, Value};
use crate::errors::{
    DanglingReferenceError, DuplicateNameError, InvalidLocationError, NameScope, TrainflowError,
};
use crate::properties::{OutputSlot, PropertyFile, PropertyReference, Source};

const CODE_MOUNT: &str = "/opt/ml/processing/input/code";
const DEFAULT_VOLUME_SIZE_GB: u32 = 30;

/// The container and cluster a processing script runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptProcessor {
    /// Container image reference.
    pub image_uri: Source,
    /// Interpreter command, e.g. `["python3"]`.
    pub command: Vec<String>,
    /// Instance type.
    pub instance_type: Source,
    /// Number of instances.
    pub instance_count: Source,
    /// Prefix for generated job names.
    pub base_job_name: String,
    /// Execution role the job runs under.
    pub role: String,
    /// Attached storage per instance.
    pub volume_size_gb: u32,
}

impl ScriptProcessor {
    /// Creates a processor running `python3` scripts.
    #[must_use]
    pub fn python(
        image_uri: Source,
        instance_type: Source,
        instance_count: Source,
        base_job_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            image_uri,
            command: vec!["python3".to_string()],
            instance_type,
            instance_count,
            base_job_name: base_job_name.into(),
            role: role.into(),
            volume_size_gb: DEFAULT_VOLUME_SIZE_GB,
        }
    }
}

/// A location mapped into the container before the script starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingInput {
    /// Input name, unique within the step.
    pub input_name: String,
    /// Where the data comes from.
    pub source: Source,
    /// Local mount point inside the container.
    pub destination: String,
}

impl ProcessingInput {
    /// Creates a processing input.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount point is not absolute or a literal
    /// source is not a valid storage location.
    pub fn new(
        input_name: impl Into<String>,
        source: impl Into<Source>,
        destination: impl Into<String>,
    ) -> Result<Self, InvalidLocationError> {
        let source = source.into();
        let destination = destination.into();
        validate_mount_path(&destination)?;
        if let Source::Literal(Value::String(location)) = &source {
            location.parse::<S3Uri>()?;
        }
        Ok(Self {
            input_name: input_name.into(),
            source,
            destination,
        })
    }

    fn to_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "InputName": self.input_name,
            "AppManaged": false,
            "S3Input": {
                "S3Uri": self.source.to_expression(),
                "LocalPath": self.destination,
                "S3DataType": "S3Prefix",
                "S3InputMode": "File",
                "S3DataDistributionType": "FullyReplicated",
            }
        })
    }
}

/// A container directory uploaded after the script finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutput {
    /// Output name, unique within the step and addressable by later steps.
    pub output_name: String,
    /// Local directory inside the container.
    pub source: String,
    /// Upload location; the execution service picks one when absent.
    pub destination: Option<S3Uri>,
}

impl ProcessingOutput {
    /// Creates a processing output.
    ///
    /// # Errors
    ///
    /// Returns an error if the local directory is not absolute.
    pub fn new(
        output_name: impl Into<String>,
        source: impl Into<String>,
        destination: Option<S3Uri>,
    ) -> Result<Self, InvalidLocationError> {
        let source = source.into();
        validate_mount_path(&source)?;
        Ok(Self {
            output_name: output_name.into(),
            source,
            destination,
        })
    }

    fn to_definition(&self) -> serde_json::Value {
        let mut s3_output = serde_json::json!({
            "LocalPath": self.source,
            "S3UploadMode": "EndOfJob",
        });
        if let Some(destination) = &self.destination {
            s3_output["S3Uri"] = serde_json::Value::String(destination.to_string());
        }
        serde_json::json!({
            "OutputName": self.output_name,
            "AppManaged": false,
            "S3Output": s3_output,
        })
    }
}

/// A script run on processing instances.
#[derive(Debug, Clone)]
pub struct ProcessingStep {
    name: String,
    processor: ScriptProcessor,
    code: CodeAsset,
    job_arguments: Vec<String>,
    inputs: Vec<ProcessingInput>,
    outputs: Vec<ProcessingOutput>,
    property_files: Vec<PropertyFile>,
    cache: Option<CacheScope>,
}

impl ProcessingStep {
    /// Creates a processing step with no inputs or outputs.
    #[must_use]
    pub fn new(name: impl Into<String>, processor: ScriptProcessor, code: CodeAsset) -> Self {
        Self {
            name: name.into(),
            processor,
            code,
            job_arguments: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            property_files: Vec::new(),
            cache: None,
        }
    }

    /// Sets the positional arguments passed to the script.
    #[must_use]
    pub fn with_job_arguments(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.job_arguments = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an input.
    ///
    /// # Errors
    ///
    /// Returns an error if an input with the same name exists.
    pub fn with_input(mut self, input: ProcessingInput) -> Result<Self, DuplicateNameError> {
        if self.inputs.iter().any(|i| i.input_name == input.input_name) {
            return Err(DuplicateNameError::new(NameScope::Slot, input.input_name));
        }
        self.inputs.push(input);
        Ok(self)
    }

    /// Adds an output.
    ///
    /// # Errors
    ///
    /// Returns an error if an output with the same name exists.
    pub fn with_output(mut self, output: ProcessingOutput) -> Result<Self, DuplicateNameError> {
        if self.outputs.iter().any(|o| o.output_name == output.output_name) {
            return Err(DuplicateNameError::new(NameScope::Slot, output.output_name));
        }
        self.outputs.push(output);
        Ok(self)
    }

    /// Registers a property file written into one of the step's outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the output does not exist or the name is taken.
    pub fn with_property_file(mut self, file: PropertyFile) -> Result<Self, TrainflowError> {
        if !self.outputs.iter().any(|o| o.output_name == file.output_name) {
            return Err(DanglingReferenceError::unknown_slot(
                &self.name,
                &self.name,
                &file.output_name,
            )
            .into());
        }
        if self.property_files.iter().any(|f| f.name == file.name) {
            return Err(DuplicateNameError::new(NameScope::Slot, file.name).into());
        }
        self.property_files.push(file);
        Ok(self)
    }

    /// Attaches a cache scope.
    #[must_use]
    pub fn with_cache(mut self, scope: CacheScope) -> Self {
        self.cache = Some(scope);
        self
    }

    /// Returns the processor.
    #[must_use]
    pub fn processor(&self) -> &ScriptProcessor {
        &self.processor
    }

    /// Returns the script.
    #[must_use]
    pub fn code(&self) -> &CodeAsset {
        &self.code
    }

    /// Returns the positional script arguments.
    #[must_use]
    pub fn job_arguments(&self) -> &[String] {
        &self.job_arguments
    }

    /// Returns the declared inputs.
    #[must_use]
    pub fn processing_inputs(&self) -> &[ProcessingInput] {
        &self.inputs
    }

    /// Returns the declared outputs.
    #[must_use]
    pub fn processing_outputs(&self) -> &[ProcessingOutput] {
        &self.outputs
    }

    /// Returns the registered property files.
    #[must_use]
    pub fn property_files(&self) -> &[PropertyFile] {
        &self.property_files
    }

    /// Returns a deferred reference to the upload location of an output.
    ///
    /// # Errors
    ///
    /// Returns an error if the step declares no such output.
    pub fn output_uri(&self, output_name: &str) -> Result<PropertyReference, DanglingReferenceError> {
        let slot = OutputSlot::ProcessingOutput(output_name.to_string());
        if !self.outputs.iter().any(|o| o.output_name == output_name) {
            return Err(DanglingReferenceError::unknown_slot("<unbound>", &self.name, slot.label()));
        }
        Ok(PropertyReference::new(&self.name, slot))
    }

    /// Returns a deferred reference to a field inside a property file.
    ///
    /// # Errors
    ///
    /// Returns an error if the step registers no such property file.
    pub fn property_value(
        &self,
        file_name: &str,
        json_path: &str,
    ) -> Result<PropertyReference, DanglingReferenceError> {
        let slot = OutputSlot::PropertyFile(file_name.to_string());
        if !self.property_files.iter().any(|f| f.name == file_name) {
            return Err(DanglingReferenceError::unknown_slot("<unbound>", &self.name, slot.label()));
        }
        Ok(PropertyReference::new(&self.name, slot).with_sub_path(json_path))
    }

    fn entrypoint(&self) -> Vec<String> {
        let mut entrypoint = self.processor.command.clone();
        entrypoint.push(format!("{CODE_MOUNT}/{}", self.code.file_name()));
        entrypoint
    }
}

impl Step for ProcessingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StepKind {
        StepKind::Processing
    }

    fn inputs(&self) -> Vec<StepInput> {
        let mut inputs = vec![
            StepInput::new("image_uri", self.processor.image_uri.clone()),
            StepInput::new("instance_type", self.processor.instance_type.clone()),
            StepInput::new("instance_count", self.processor.instance_count.clone()),
        ];
        inputs.extend(
            self.inputs
                .iter()
                .map(|input| StepInput::new(&input.input_name, input.source.clone())),
        );
        inputs
    }

    fn output_slots(&self) -> Vec<OutputSlot> {
        self.outputs
            .iter()
            .map(|o| OutputSlot::ProcessingOutput(o.output_name.clone()))
            .chain(
                self.property_files
                    .iter()
                    .map(|f| OutputSlot::PropertyFile(f.name.clone())),
            )
            .collect()
    }

    fn cache_scope(&self) -> Option<&CacheScope> {
        self.cache.as_ref()
    }

    fn arguments(&self) -> serde_json::Value {
        serde_json::json!({
            "ProcessingResources": {
                "ClusterConfig": {
                    "InstanceType": self.processor.instance_type.to_expression(),
                    "InstanceCount": self.processor.instance_count.to_expression(),
                    "VolumeSizeInGB": self.processor.volume_size_gb,
                }
            },
            "AppSpecification": {
                "ImageUri": self.processor.image_uri.to_expression(),
                "ContainerEntrypoint": self.entrypoint(),
                "ContainerArguments": self.job_arguments,
            },
            "RoleArn": self.processor.role,
            "ProcessingInputs": self.inputs.iter().map(ProcessingInput::to_definition).collect::<Vec<_>>(),
            "ProcessingOutputConfig": {
                "Outputs": self.outputs.iter().map(ProcessingOutput::to_definition).collect::<Vec<_>>(),
            },
        })
    }

    fn to_definition(&self) -> serde_json::Value {
        let mut definition = serde_json::json!({
            "Name": self.name,
            "Type": self.kind().to_string(),
            "Arguments": self.arguments(),
        });
        if !self.property_files.is_empty() {
            definition["PropertyFiles"] = self
                .property_files
                .iter()
                .map(PropertyFile::to_definition)
                .collect();
        }
        if let Some(scope) = &self.cache {
            definition["CacheConfig"] = scope.to_definition();
        }
        definition
    }
}
