//! Storage locations and local mount paths.

use crate::errors::InvalidLocationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "s3://";
const EMPTY_SEGMENT: &str = "key contains an empty path segment";

/// A parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct S3Uri {
    bucket: String,
    key: String,
}

impl S3Uri {
    /// Creates a location from a bucket and key prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket name is not a valid bucket name or the
    /// key contains an empty path segment.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, InvalidLocationError> {
        let bucket = bucket.into();
        let key = key.into().trim_matches('/').to_string();
        let location = || format!("{SCHEME}{bucket}/{key}");
        if key.contains("//") {
            return Err(InvalidLocationError::new(location(), EMPTY_SEGMENT));
        }
        validate_bucket(&bucket).map_err(|reason| InvalidLocationError::new(location(), reason))?;
        Ok(Self { bucket, key })
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the key (without leading or trailing slashes).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Appends path segments to the key. Empty segments in `suffix` are dropped.
    #[must_use]
    pub fn join(&self, suffix: &str) -> Self {
        let key = std::iter::once(self.key.as_str())
            .chain(suffix.split('/'))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self {
            bucket: self.bucket.clone(),
            key,
        }
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{SCHEME}{}", self.bucket)
        } else {
            write!(f, "{SCHEME}{}/{}", self.bucket, self.key)
        }
    }
}

impl FromStr for S3Uri {
    type Err = InvalidLocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| InvalidLocationError::new(s, "expected an s3:// scheme"))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if key.starts_with('/') || key.contains("//") {
            return Err(InvalidLocationError::new(s, EMPTY_SEGMENT));
        }
        validate_bucket(bucket).map_err(|reason| InvalidLocationError::new(s, reason))?;
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.trim_end_matches('/').to_string(),
        })
    }
}

impl TryFrom<String> for S3Uri {
    type Error = InvalidLocationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<S3Uri> for String {
    fn from(uri: S3Uri) -> Self {
        uri.to_string()
    }
}

fn validate_bucket(bucket: &str) -> Result<(), &'static str> {
    if !(3..=63).contains(&bucket.len()) {
        return Err("bucket name must be between 3 and 63 characters");
    }
    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err("bucket name may only contain lowercase letters, digits, '-' and '.'");
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !edge_ok(bucket.chars().next()) || !edge_ok(bucket.chars().last()) {
        return Err("bucket name must start and end with a letter or digit");
    }
    Ok(())
}

/// Validates a container-local mount path such as `/opt/ml/processing/input/test`.
///
/// # Errors
///
/// Returns an error if the path is not absolute or contains `..` segments.
pub fn validate_mount_path(path: &str) -> Result<(), InvalidLocationError> {
    if !path.starts_with('/') {
        return Err(InvalidLocationError::new(path, "mount paths must be absolute"));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(InvalidLocationError::new(path, "mount paths may not contain '..'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_uri() {
        let uri: S3Uri = "s3://my-bucket/BirdEnd2End/outputs/".parse().unwrap();
        assert_eq!(uri.bucket(), "my-bucket");
        assert_eq!(uri.key(), "BirdEnd2End/outputs");
        assert_eq!(uri.to_string(), "s3://my-bucket/BirdEnd2End/outputs");
    }

    #[test]
    fn test_join_suffix() {
        let base = S3Uri::new("my-bucket", "BirdEnd2End/outputs").unwrap();
        assert_eq!(base.join("/train").to_string(), "s3://my-bucket/BirdEnd2End/outputs/train");

        let root = S3Uri::new("my-bucket", "").unwrap();
        assert_eq!(root.join("valid").to_string(), "s3://my-bucket/valid");

        let joined = base.join("eval//report/");
        assert_eq!(joined.key(), "BirdEnd2End/outputs/eval/report");
        assert_eq!(joined.to_string().parse::<S3Uri>().unwrap(), joined);
    }

    #[test]
    fn test_new_rejects_empty_segments() {
        let err = S3Uri::new("my-bucket", "BirdEnd2End//outputs").unwrap_err();
        assert_eq!(err.reason, "key contains an empty path segment");
        assert_eq!(err.error_info.code, "GRAPH-003-LOCATION");
        assert!(S3Uri::new("my-bucket", "/BirdEnd2End/outputs/").is_ok());
    }

    #[test]
    fn test_malformed_uris() {
        assert!("my-bucket/key".parse::<S3Uri>().is_err());
        assert!("s3://My_Bucket/key".parse::<S3Uri>().is_err());
        assert!("s3://ab/key".parse::<S3Uri>().is_err());
        assert!("s3://bucket-/key".parse::<S3Uri>().is_err());
        assert!("s3://bucket//key".parse::<S3Uri>().is_err());
    }

    #[test]
    fn test_mount_paths() {
        assert!(validate_mount_path("/opt/ml/processing/input/images/").is_ok());
        assert!(validate_mount_path("opt/ml/processing").is_err());
        assert!(validate_mount_path("/opt/ml/../etc").is_err());
    }
}
