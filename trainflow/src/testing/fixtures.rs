//! Test fixtures for the bird-classification workflow.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::errors::TrainflowError;
use crate::workflow::{ExecutionContext, PipelineConfig, StaticIdentity};

/// Account id of the fixture identity.
pub const TEST_ACCOUNT: &str = "111122223333";
/// Region of the fixture context.
pub const TEST_REGION: &str = "us-east-1";
/// Ambient role of the fixture identity.
pub const TEST_ROLE: &str = "arn:aws:iam::111122223333:role/SageMakerExecutionRole";

/// An identity with [`TEST_ACCOUNT`] and [`TEST_ROLE`].
#[must_use]
pub fn static_identity() -> Arc<StaticIdentity> {
    Arc::new(StaticIdentity::new(TEST_ACCOUNT, Some(TEST_ROLE.to_string())))
}

/// An execution context in [`TEST_REGION`] with the derived default bucket.
///
/// # Errors
///
/// Returns an error if the derived bucket name is rejected.
pub fn execution_context() -> Result<ExecutionContext, TrainflowError> {
    ExecutionContext::new(TEST_REGION, None, static_identity())
}

/// Writes the three workflow scripts under `dir`.
///
/// The contents differ per script so each has its own digest.
///
/// # Errors
///
/// Returns an error if a file cannot be written.
pub fn write_scripts(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir.join("code"))?;
    fs::write(
        dir.join("preprocess.py"),
        "import argparse\nprint('splitting manifest into train/valid/test')\n",
    )?;
    fs::write(
        dir.join("evaluation.py"),
        "import json\nprint('writing evaluation.json')\n",
    )?;
    fs::write(
        dir.join("code").join("train_debugger.py"),
        "import tensorflow as tf\nprint('training')\n",
    )?;
    Ok(())
}

/// The default workflow configuration with scripts read from `base_dir`.
#[must_use]
pub fn workflow_config(base_dir: &Path) -> PipelineConfig {
    PipelineConfig::new(TEST_REGION).with_base_dir(base_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_derives_bucket() {
        let ctx = execution_context().unwrap();
        assert_eq!(ctx.default_bucket(), "sagemaker-us-east-1-111122223333");
        assert_eq!(ctx.resolve_role(None).unwrap(), TEST_ROLE);
    }

    #[test]
    fn test_write_scripts() {
        let dir = tempfile::tempdir().unwrap();
        write_scripts(dir.path()).unwrap();

        assert!(dir.path().join("preprocess.py").is_file());
        assert!(dir.path().join("evaluation.py").is_file());
        assert!(dir.path().join("code/train_debugger.py").is_file());
    }
}
