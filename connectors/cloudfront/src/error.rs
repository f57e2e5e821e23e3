//! Transport errors and their mapping onto [`ApiError`].

use std::time::Duration;

use orp_core::api::ApiError;
use thiserror::Error;

/// HTTP transport errors.
#[derive(Error, Debug)]
pub enum CloudFrontError {
    /// HTTP request failed before a usable response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The API answered with an error status.
    #[error("CloudFront API error {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        retry_after: Option<u64>,
    },

    /// A success response whose body could not be decoded.
    #[error("undecodable response ({status}): {message}")]
    Decode { status: u16, message: String },

    /// A success response without the ETag header.
    #[error("response ({status}) carried no ETag")]
    MissingETag { status: u16 },
}

impl CloudFrontError {
    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.status().is_none_or(|s| s.is_server_error()),
            Self::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Config(_) | Self::Decode { .. } | Self::MissingETag { .. } => false,
        }
    }

    /// Get the suggested retry delay.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api { retry_after, .. } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }

    /// Convert into the transport-neutral error the core classifies.
    ///
    /// Failures raised on this side of the wire carry a 4xx status so they
    /// classify as fatal.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        let err = match self {
            Self::Http(e) => match e.status() {
                Some(status) => ApiError::http(status.as_u16(), None, e.to_string()),
                None => ApiError::connection(e.to_string()),
            },
            Self::Config(msg) => {
                ApiError::http(400, Some("InvalidConfiguration".into()), msg.clone())
            }
            Self::Api {
                status,
                code,
                message,
                ..
            } => ApiError::http(*status, code.clone(), message.clone()),
            Self::Decode { status, message } => {
                ApiError::http(*status, Some("MalformedResponse".into()), message.clone())
            }
            Self::MissingETag { status } => ApiError::http(
                *status,
                Some("MissingETag".into()),
                "response carried no ETag header",
            ),
        };
        match self.retry_after() {
            Some(delay) => err.with_retry_after(delay),
            None => err,
        }
    }
}

impl From<CloudFrontError> for ApiError {
    fn from(err: CloudFrontError) -> Self {
        err.to_api_error()
    }
}

/// Result type for transport operations.
pub type CloudFrontResult<T> = Result<T, CloudFrontError>;
