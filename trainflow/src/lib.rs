//! # Trainflow
//!
//! Declarative construction of managed machine-learning training pipelines.
//!
//! Trainflow builds a pipeline graph for an external execution service to
//! run. It provides:
//!
//! - **Typed parameters**: named, defaulted values bound at submission time
//! - **Deferred references**: step inputs pointing at outputs that do not exist yet
//! - **Job steps**: processing and training steps with cache scopes
//! - **Runtime gates**: condition steps choosing exactly one branch
//! - **Definitions**: the JSON document the execution service consumes
//! - **Local execution**: an in-process collaborator for verifying caching and gating
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trainflow::prelude::*;
//!
//! let ctx = ExecutionContext::new("us-east-1", None, identity)?;
//! let graph = build_pipeline(&PipelineConfig::new("us-east-1"), &ctx)?;
//! println!("{}", graph.definition().to_json_pretty()?);
//!
//! let service = LocalExecutionService::new(Arc::new(SimulatedJobRunner::new()), artifact_root);
//! let handle = service.submit(&graph, HashMap::new()).await?;
//! let report = service.describe(&handle).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod core;
pub mod errors;
pub mod execution;
pub mod observability;
pub mod parameters;
pub mod pipeline;
pub mod properties;
pub mod steps;
pub mod testing;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{CacheScope, S3Uri, StepKind, Value, ValueKind};
    pub use crate::errors::{
        ContractErrorInfo, DanglingReferenceError, DuplicateNameError, InvalidLocationError,
        ParameterError, PipelineValidationError, TrainflowError,
    };
    pub use crate::execution::{
        ExecutionHandle, ExecutionReport, ExecutionService, ExecutionStatus, JobRunner,
        LocalExecutionService, SimulatedJobRunner,
    };
    pub use crate::parameters::{Parameter, ParameterSet};
    pub use crate::pipeline::{PipelineBuilder, PipelineDefinition, PipelineGraph};
    pub use crate::properties::{OutputSlot, PropertyFile, PropertyReference, Source};
    pub use crate::steps::{
        ConditionStep, ProcessingStep, RegisterModelStep, Step, StepNode, TrainingStep,
    };
    pub use crate::workflow::{
        build_pipeline, ExecutionContext, IdentityProvider, PipelineConfig, StaticIdentity,
    };
}
