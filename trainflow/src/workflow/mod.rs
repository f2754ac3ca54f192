//! The bird-classification training workflow.
//!
//! [`build_pipeline`] turns a [`PipelineConfig`] and an
//! [`ExecutionContext`] into a validated [`PipelineGraph`](crate::pipeline::PipelineGraph):
//! preprocess, train, evaluate, then an accuracy gate whose if-branch
//! registers the model and whose else-branch stops.

mod build;
mod config;
mod session;

pub use build::{
    build_pipeline, StepNames, ACCURACY_PATH, ACCURACY_THRESHOLD, EVALUATION_REPORT,
    INPUT_DATA_URL, INPUT_MANIFEST_URL, MODEL_APPROVAL_STATUS, PROCESSING_INSTANCE_COUNT,
    PROCESSING_INSTANCE_TYPE, PROCESS_IMAGE, TRAINING_INSTANCE_COUNT, TRAINING_INSTANCE_TYPE,
};
pub use config::{ParameterDefaults, PipelineConfig};
pub use session::{ExecutionContext, IdentityProvider, StaticIdentity};

#[cfg(test)]
pub use session::MockIdentityProvider;
