//! Transport seam to the remote policy API.
//!
//! Signing, credentials and HTTP plumbing live behind [`PolicyApi`]; this
//! crate only consumes the four calls and classifies their failures.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::remote::{PolicyEnvelope, RemotePolicyConfig};
use crate::types::{ETag, PolicyId};

/// Raw failure reported by a transport implementation.
///
/// `status` is `None` when no response was received (connect or read
/// failure). `code` carries the remote error code when the body had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code, if a response arrived.
    pub status: Option<u16>,
    /// Remote error code (e.g. `NoSuchOriginRequestPolicy`).
    pub code: Option<String>,
    /// Remote-provided detail.
    pub message: String,
    /// Retry-After hint from the response.
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Build an error from an HTTP response.
    #[must_use]
    pub fn http(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Build an error for a request that never got a response.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Builder: attach a Retry-After hint.
    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "{status} {code}: {}", self.message),
            (Some(status), None) => write!(f, "{status}: {}", self.message),
            (None, _) => write!(f, "no response: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Remote origin request policy API.
///
/// Every mutation of an existing policy takes the version token observed on
/// the last read; the remote system rejects stale tokens.
#[async_trait]
pub trait PolicyApi: Send + Sync {
    /// Create a policy. Returns the assigned ID and initial version token.
    async fn create_policy(
        &self,
        config: &RemotePolicyConfig,
    ) -> Result<(PolicyId, ETag), ApiError>;

    /// Fetch a policy and its current version token.
    async fn get_policy(&self, id: &PolicyId) -> Result<PolicyEnvelope, ApiError>;

    /// Replace a policy's configuration. Returns the new version token.
    async fn update_policy(
        &self,
        id: &PolicyId,
        etag: &ETag,
        config: &RemotePolicyConfig,
    ) -> Result<ETag, ApiError>;

    /// Delete a policy.
    async fn delete_policy(&self, id: &PolicyId, etag: &ETag) -> Result<(), ApiError>;
}

#[async_trait]
impl<T: PolicyApi + ?Sized> PolicyApi for std::sync::Arc<T> {
    async fn create_policy(
        &self,
        config: &RemotePolicyConfig,
    ) -> Result<(PolicyId, ETag), ApiError> {
        (**self).create_policy(config).await
    }

    async fn get_policy(&self, id: &PolicyId) -> Result<PolicyEnvelope, ApiError> {
        (**self).get_policy(id).await
    }

    async fn update_policy(
        &self,
        id: &PolicyId,
        etag: &ETag,
        config: &RemotePolicyConfig,
    ) -> Result<ETag, ApiError> {
        (**self).update_policy(id, etag, config).await
    }

    async fn delete_policy(&self, id: &PolicyId, etag: &ETag) -> Result<(), ApiError> {
        (**self).delete_policy(id, etag).await
    }
}
