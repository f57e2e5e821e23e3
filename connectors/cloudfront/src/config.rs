//! Connection settings for the HTTP transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CloudFrontError, CloudFrontResult};

/// Default API root, including the API version path.
pub const DEFAULT_ENDPOINT: &str = "https://cloudfront.amazonaws.com/2020-05-31";

/// Configuration for [`crate::HttpPolicyApi`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudFrontConfig {
    /// API root URL, e.g. `https://cloudfront.amazonaws.com/2020-05-31`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u32,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u32,

    /// User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

const fn default_connect_timeout_ms() -> u32 {
    10_000
}

const fn default_request_timeout_ms() -> u32 {
    60_000
}

fn default_user_agent() -> String {
    concat!("orp-cloudfront/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for CloudFrontConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl CloudFrontConfig {
    /// Configuration pointing at `endpoint`, other fields defaulted.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Parse configuration from JSON value.
    ///
    /// # Errors
    /// Returns `CloudFrontError::Config` if the configuration is invalid.
    pub fn from_params(params: &serde_json::Value) -> CloudFrontResult<Self> {
        let config: Self = serde_json::from_value(params.clone()).map_err(|e| {
            CloudFrontError::Config(format!("invalid cloudfront configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `CloudFrontError::Config` if validation fails.
    pub fn validate(&self) -> CloudFrontResult<()> {
        self.base_url()?;

        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > 300_000 {
            return Err(CloudFrontError::Config(
                "connect timeout must be between 1ms and 300000ms".into(),
            ));
        }
        if self.request_timeout_ms == 0 || self.request_timeout_ms > 600_000 {
            return Err(CloudFrontError::Config(
                "request timeout must be between 1ms and 600000ms".into(),
            ));
        }
        Ok(())
    }

    /// Parsed endpoint.
    ///
    /// # Errors
    /// Returns `CloudFrontError::Config` unless the endpoint is an absolute
    /// http(s) URL that can carry path segments.
    pub fn base_url(&self) -> CloudFrontResult<Url> {
        if self.endpoint.is_empty() {
            return Err(CloudFrontError::Config("endpoint cannot be empty".into()));
        }
        let url = Url::parse(&self.endpoint).map_err(|e| {
            CloudFrontError::Config(format!("invalid endpoint {}: {e}", self.endpoint))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(CloudFrontError::Config(format!(
                "endpoint must be an http(s) URL, got {}",
                self.endpoint
            )));
        }
        Ok(url)
    }

    /// Connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.connect_timeout_ms))
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.request_timeout_ms))
    }
}
