//! Local program files shipped with a step.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A script on the local disk that a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAsset {
    path: PathBuf,
}

impl CodeAsset {
    /// Points at a local script file. The file is not read until its digest
    /// is requested.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the local path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name, used as the program name inside the container.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// SHA-256 of the file content, hex encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn digest(&self) -> std::io::Result<String> {
        let content = std::fs::read(&self.path)?;
        Ok(hex::encode(Sha256::digest(&content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_name() {
        let asset = CodeAsset::new("/srv/pipeline/preprocess.py");
        assert_eq!(asset.file_name(), "preprocess.py");
    }

    #[test]
    fn test_digest_tracks_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "print('v1')").unwrap();
        let asset = CodeAsset::new(file.path());
        let first = asset.digest().unwrap();
        assert_eq!(first.len(), 64);

        write!(file, "print('v2')").unwrap();
        assert_ne!(asset.digest().unwrap(), first);
    }

    #[test]
    fn test_digest_missing_file() {
        assert!(CodeAsset::new("/nonexistent/trainflow/evaluation.py").digest().is_err());
    }
}
