//! Error taxonomy for policy reconciliation.

use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;
use crate::retry::{ErrorClass, classify, retry_after_for};
use crate::types::{Behavior, Dimension, PolicyId};

/// Caller-side schema violations, detected before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Policy name is empty.
    #[error("name must not be empty")]
    EmptyName,

    /// Policy name exceeds the configured limit.
    #[error("name is {len} characters long, limit is {max}")]
    NameTooLong { len: usize, max: usize },

    /// Behavior is not offered for this dimension.
    #[error("{dimension}: behavior `{behavior}` is not supported")]
    UnsupportedBehavior {
        dimension: Dimension,
        behavior: Behavior,
    },

    /// Items supplied with a behavior that forwards no explicit list.
    #[error("{dimension}: behavior `{behavior}` does not accept items")]
    UnexpectedItems {
        dimension: Dimension,
        behavior: Behavior,
    },

    /// `whitelist` without any items.
    #[error("{dimension}: behavior `whitelist` requires at least one item")]
    EmptyWhitelist { dimension: Dimension },

    /// An item is the empty string.
    #[error("{dimension}: items must not be empty strings")]
    BlankItem { dimension: Dimension },

    /// Same item listed twice.
    #[error("{dimension}: duplicate item `{item}`")]
    DuplicateItem { dimension: Dimension, item: String },

    /// More items than the remote quota allows.
    #[error("{dimension}: {count} items exceeds limit of {max}")]
    TooManyItems {
        dimension: Dimension,
        count: usize,
        max: usize,
    },
}

/// Errors surfaced by lookup, reconciliation and apply.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Desired state violates the schema. Never retried, never sent.
    #[error("invalid policy: {0}")]
    Validation(#[from] ValidationError),

    /// The remote system has no policy with this ID.
    #[error("origin request policy {id} not found")]
    NotFound { id: PolicyId },

    /// Retryable remote failure (throttling, 5xx, connection loss).
    #[error("transient API error{}: {message}", status_suffix(.status))]
    Transient {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Version token mismatch on a conditional mutation.
    #[error("policy {id} was modified concurrently: {message}")]
    Conflict { id: PolicyId, message: String },

    /// Non-retryable remote rejection, or retry budget exhausted.
    #[error("API error{}: {message}", status_suffix(.status))]
    Fatal {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// The caller cancelled while waiting between attempts.
    #[error("operation cancelled")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |s| format!(" {s}"))
}

impl PolicyError {
    /// Classify a raw transport failure for the given policy.
    #[must_use]
    pub fn from_api(id: Option<&PolicyId>, err: ApiError) -> Self {
        match classify(&err) {
            ErrorClass::NotFound => match id {
                Some(id) => Self::NotFound { id: id.clone() },
                None => Self::fatal(err),
            },
            ErrorClass::Conflict => Self::Conflict {
                id: id.cloned().unwrap_or_else(|| PolicyId::new("<new>")),
                message: err.message,
            },
            ErrorClass::Transient => Self::Transient {
                status: err.status,
                retry_after: retry_after_for(&err),
                message: err.message,
            },
            ErrorClass::Fatal => Self::fatal(err),
        }
    }

    fn fatal(err: ApiError) -> Self {
        Self::Fatal {
            status: err.status,
            code: err.code,
            message: err.message,
        }
    }

    /// Malformed remote payload.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Fatal {
            status: None,
            code: Some("MalformedResponse".into()),
            message: message.into(),
        }
    }

    /// Check if this error may succeed on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Check if this error means the object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get the suggested retry delay.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Escalate an exhausted transient error into a fatal one.
    #[must_use]
    pub fn exhausted(self, attempts: u32) -> Self {
        match self {
            Self::Transient {
                status, message, ..
            } => Self::Fatal {
                status,
                code: Some("RetriesExhausted".into()),
                message: format!("gave up after {attempts} attempts: {message}"),
            },
            other => other,
        }
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
