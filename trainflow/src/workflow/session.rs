//! The opaque execution context jobs are authorized and submitted under.

use crate::core::S3Uri;
use crate::errors::{PipelineValidationError, TrainflowError};
use std::fmt;
use std::sync::Arc;

/// Supplies the ambient identity of the caller.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    /// The role jobs run under when none is configured.
    fn execution_role(&self) -> Option<String>;

    /// The account the caller belongs to.
    fn account_id(&self) -> String;
}

/// A fixed identity, for tests and local use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    role: Option<String>,
    account_id: String,
}

impl StaticIdentity {
    /// Creates an identity for an account, optionally with an ambient role.
    #[must_use]
    pub fn new(account_id: impl Into<String>, role: Option<String>) -> Self {
        Self {
            role,
            account_id: account_id.into(),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn execution_role(&self) -> Option<String> {
        self.role.clone()
    }

    fn account_id(&self) -> String {
        self.account_id.clone()
    }
}

/// Region, artifact bucket and identity of one session.
#[derive(Clone)]
pub struct ExecutionContext {
    region: String,
    default_bucket: String,
    account_id: String,
    identity: Arc<dyn IdentityProvider>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("region", &self.region)
            .field("default_bucket", &self.default_bucket)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Opens a session. Without an explicit bucket, the conventional
    /// `sagemaker-{region}-{account}` bucket is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the region is empty or the bucket name is invalid.
    pub fn new(
        region: impl Into<String>,
        default_bucket: Option<String>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, TrainflowError> {
        let region = region.into();
        if region.trim().is_empty() {
            return Err(PipelineValidationError::new("Region cannot be empty").into());
        }
        let account_id = identity.account_id();
        let default_bucket =
            default_bucket.unwrap_or_else(|| format!("sagemaker-{region}-{account_id}"));
        S3Uri::new(&default_bucket, "")?;

        Ok(Self {
            region,
            default_bucket,
            account_id,
            identity,
        })
    }

    /// Returns the region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the artifact bucket.
    #[must_use]
    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    /// Returns the account id.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Returns `explicit` or, failing that, the ambient execution role.
    ///
    /// # Errors
    ///
    /// Returns an error if neither is available.
    pub fn resolve_role(&self, explicit: Option<&str>) -> Result<String, TrainflowError> {
        if let Some(role) = explicit {
            return Ok(role.to_string());
        }
        self.identity.execution_role().ok_or_else(|| {
            PipelineValidationError::new(
                "No execution role configured and no ambient role available",
            )
            .into()
        })
    }

    /// A location in the artifact bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket name is invalid.
    pub fn bucket_uri(&self, key: &str) -> Result<S3Uri, TrainflowError> {
        Ok(S3Uri::new(&self.default_bucket, key)?)
    }

    /// The account's private container registry host.
    #[must_use]
    pub fn registry_host(&self) -> String {
        format!("{}.dkr.ecr.{}.amazonaws.com", self.account_id, self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_identity(role: Option<&'static str>) -> Arc<dyn IdentityProvider> {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_account_id()
            .times(1)
            .returning(|| "111122223333".to_string());
        identity
            .expect_execution_role()
            .returning(move || role.map(ToString::to_string));
        Arc::new(identity)
    }

    #[test]
    fn test_default_bucket_from_account() {
        let ctx = ExecutionContext::new("us-east-1", None, mock_identity(None)).unwrap();
        assert_eq!(ctx.default_bucket(), "sagemaker-us-east-1-111122223333");
        assert_eq!(ctx.registry_host(), "111122223333.dkr.ecr.us-east-1.amazonaws.com");
    }

    #[test]
    fn test_explicit_bucket_wins() {
        let ctx = ExecutionContext::new("us-east-1", Some("my-bucket".into()), mock_identity(None))
            .unwrap();
        assert_eq!(ctx.bucket_uri("a/b").unwrap().to_string(), "s3://my-bucket/a/b");
    }

    #[test]
    fn test_invalid_bucket_rejected() {
        let err = ExecutionContext::new("us-east-1", Some("Bad_Bucket".into()), mock_identity(None))
            .unwrap_err();
        assert!(matches!(err, TrainflowError::InvalidLocation(_)));
    }

    #[test]
    fn test_role_falls_back_to_ambient() {
        let ctx = ExecutionContext::new("us-east-1", None, mock_identity(Some("ambient"))).unwrap();
        assert_eq!(ctx.resolve_role(None).unwrap(), "ambient");
        assert_eq!(ctx.resolve_role(Some("explicit")).unwrap(), "explicit");
    }

    #[test]
    fn test_missing_role_is_an_error() {
        let ctx = ExecutionContext::new("us-east-1", None, mock_identity(None)).unwrap();
        assert!(ctx.resolve_role(None).is_err());
    }
}
