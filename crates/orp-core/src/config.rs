//! Reconciler configuration.
//!
//! Loaded from TOML (or JSON via [`ReconcilerConfig::from_params`]); every
//! field has a default, so an empty document is valid.
//!
//! ```toml
//! [limits]
//! max_name_len = 128
//! max_items_per_dimension = 10
//!
//! [propagation]
//! base_backoff_ms = 500
//! max_backoff_ms = 10000
//! max_attempts = 20
//! max_elapsed_ms = 120000
//!
//! [transient]
//! max_attempts = 5
//! ```

use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::validate::Limits;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse.
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON did not parse.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Values parsed but are out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Remote limits checked during validation.
    pub limits: Limits,
    /// Retry policy for read-after-create and read-after-delete.
    ///
    /// Fields left out of a partial section keep the propagation schedule,
    /// not the generic [`RetryPolicy`] defaults.
    #[serde(
        default = "default_propagation",
        deserialize_with = "propagation_with_defaults"
    )]
    pub propagation: RetryPolicy,
    /// Retry policy for throttling and 5xx responses.
    pub transient: RetryPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            propagation: default_propagation(),
            transient: RetryPolicy::default(),
        }
    }
}

fn default_propagation() -> RetryPolicy {
    RetryPolicy {
        base_backoff_ms: 500,
        max_backoff_ms: 10_000,
        jitter_enabled: true,
        max_attempts: Some(20),
        max_elapsed_ms: Some(120_000),
    }
}

fn propagation_with_defaults<'de, D>(deserializer: D) -> Result<RetryPolicy, D::Error>
where
    D: Deserializer<'de>,
{
    overlay(default_propagation(), deserializer)
}

/// Deserialize a partial retry section on top of `base`.
fn overlay<'de, D>(base: RetryPolicy, deserializer: D) -> Result<RetryPolicy, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = Map::<String, Value>::deserialize(deserializer)?;
    let mut merged = serde_json::to_value(base).map_err(D::Error::custom)?;
    if let Value::Object(fields) = &mut merged {
        fields.extend(overrides);
    }
    serde_json::from_value(merged).map_err(D::Error::custom)
}

impl ReconcilerConfig {
    /// Parse configuration from a TOML document.
    ///
    /// # Errors
    /// Returns `ConfigError` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON value.
    ///
    /// # Errors
    /// Returns `ConfigError` if parsing or validation fails.
    pub fn from_params(params: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(params.clone())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Validate value ranges.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_name_len == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_name_len must be at least 1".into(),
            ));
        }
        if self.limits.max_items_per_dimension == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_items_per_dimension must be at least 1".into(),
            ));
        }
        for (section, policy) in [
            ("propagation", &self.propagation),
            ("transient", &self.transient),
        ] {
            if policy.max_backoff_ms < policy.base_backoff_ms {
                return Err(ConfigError::Invalid(format!(
                    "{section}.max_backoff_ms ({}) is below base_backoff_ms ({})",
                    policy.max_backoff_ms, policy.base_backoff_ms
                )));
            }
            if policy.max_attempts.is_none() && policy.max_elapsed_ms.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{section} needs max_attempts or max_elapsed_ms; unbounded retry is not allowed"
                )));
            }
        }
        Ok(())
    }
}
