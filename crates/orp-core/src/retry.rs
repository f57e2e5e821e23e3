//! Retry policy and remote error classification.
//!
//! [`RetryPolicy`] turns a [`RetryDecision`] into a concrete delay. The
//! classification table in [`classify`] decides which remote failures are
//! retryable at all.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use orp_core::retry::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new()
//!     .with_jitter_enabled(false)
//!     .with_base_backoff_ms(500);
//! assert_eq!(
//!     policy.next_delay(1, RetryDecision::Backoff, None),
//!     Some(Duration::from_millis(1_000))
//! );
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ApiError;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again right away.
    Immediate,
    /// Wait out the policy's exponential backoff.
    Backoff,
    /// Wait exactly this long.
    After(Duration),
    /// Give up.
    Terminal,
}

/// Bounded exponential backoff: attempt ceiling plus elapsed-time ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// First backoff step in milliseconds; doubles per attempt.
    pub base_backoff_ms: u64,
    /// Cap on a single backoff step in milliseconds.
    pub max_backoff_ms: u64,
    /// Shrink each step by a deterministic factor in `[0.5, 1.0]`.
    pub jitter_enabled: bool,
    /// Maximum retries after the first attempt. `None` means unlimited.
    pub max_attempts: Option<u32>,
    /// Total time budget across all attempts (milliseconds). `None` means unbounded.
    pub max_elapsed_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            jitter_enabled: true,
            max_attempts: Some(5),
            max_elapsed_ms: Some(300_000),
        }
    }
}

impl RetryPolicy {
    /// Same as [`Default::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_enabled: false,
            max_attempts: Some(0),
            max_elapsed_ms: Some(0),
        }
    }

    /// Override [`Self::base_backoff_ms`].
    #[must_use]
    pub const fn with_base_backoff_ms(mut self, ms: u64) -> Self {
        self.base_backoff_ms = ms;
        self
    }

    /// Override [`Self::max_backoff_ms`].
    #[must_use]
    pub const fn with_max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Override [`Self::jitter_enabled`].
    #[must_use]
    pub const fn with_jitter_enabled(mut self, enabled: bool) -> Self {
        self.jitter_enabled = enabled;
        self
    }

    /// Override [`Self::max_attempts`].
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the elapsed-time ceiling.
    #[must_use]
    pub const fn with_max_elapsed(mut self, max_elapsed: Option<Duration>) -> Self {
        self.max_elapsed_ms = match max_elapsed {
            Some(d) => Some(duration_to_ms(d)),
            None => None,
        };
        self
    }

    /// The elapsed-time ceiling, if any.
    #[must_use]
    pub const fn max_elapsed(&self) -> Option<Duration> {
        match self.max_elapsed_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        }
    }

    /// Un-jittered delay before retry number `attempt + 1`.
    #[must_use]
    pub fn compute_backoff_ms(&self, attempt: u32) -> u64 {
        let doubling = 1u64 << attempt.min(30);
        self.max_backoff_ms.min(self.base_backoff_ms.saturating_mul(doubling))
    }

    /// Delay for `attempt` scaled by `jitter_factor` mapped onto `[0.5, 1.0]`.
    #[must_use]
    pub fn compute_backoff_with_jitter_ms(&self, attempt: u32, jitter_factor: f64) -> u64 {
        let full = self.compute_backoff_ms(attempt);
        if self.jitter_enabled {
            scale_ms(full, jitter_factor.clamp(0.0, 1.0).mul_add(0.5, 0.5))
        } else {
            full
        }
    }

    /// Delay before the next attempt, or `None` once the attempt ceiling is
    /// reached or the decision is terminal. A server hint longer than the
    /// computed backoff wins.
    /// The elapsed-time ceiling is enforced by the caller, which owns the clock.
    #[must_use]
    pub fn next_delay(
        &self,
        attempt: u32,
        decision: RetryDecision,
        retry_after_hint: Option<Duration>,
    ) -> Option<Duration> {
        if self.max_attempts.is_some_and(|ceiling| attempt >= ceiling) {
            return None;
        }

        match decision {
            RetryDecision::Terminal => None,
            RetryDecision::Immediate => Some(Duration::ZERO),
            RetryDecision::After(delay) => Some(delay),
            RetryDecision::Backoff => {
                let jitter = (f64::from(attempt) * 0.1).fract();
                let computed = self.compute_backoff_with_jitter_ms(attempt, jitter);
                let hinted = retry_after_hint.map_or(0, duration_to_ms);
                Some(Duration::from_millis(computed.max(hinted)))
            }
        }
    }
}

/// Wait applied to throttled calls that carry no `Retry-After`.
pub const DEFAULT_RATE_LIMIT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Remote error codes that mean "no such policy".
const NOT_FOUND_CODES: &[&str] = &["NoSuchOriginRequestPolicy", "NoSuchResource"];

/// Remote error codes for a stale or missing version token.
const CONFLICT_CODES: &[&str] = &["PreconditionFailed"];

/// Remote error codes for throttling.
const THROTTLE_CODES: &[&str] = &["Throttling", "ThrottlingException", "TooManyRequests"];

/// Outcome class of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Object does not exist.
    NotFound,
    /// Version token mismatch.
    Conflict,
    /// Retryable with backoff.
    Transient,
    /// Not retryable.
    Fatal,
}

/// Classify a raw transport failure.
///
/// Error codes take precedence over status codes, so a throttling code on a
/// 400 response is still transient.
#[must_use]
pub fn classify(err: &ApiError) -> ErrorClass {
    if let Some(code) = err.code.as_deref() {
        if NOT_FOUND_CODES.contains(&code) {
            return ErrorClass::NotFound;
        }
        if CONFLICT_CODES.contains(&code) {
            return ErrorClass::Conflict;
        }
        if THROTTLE_CODES.contains(&code) {
            return ErrorClass::Transient;
        }
    }

    match err.status {
        None => ErrorClass::Transient,
        Some(404) => ErrorClass::NotFound,
        Some(412) => ErrorClass::Conflict,
        Some(status) if transient_status(status) => ErrorClass::Transient,
        Some(_) => ErrorClass::Fatal,
    }
}

/// Retry-After to honor for a transient failure.
#[must_use]
pub fn retry_after_for(err: &ApiError) -> Option<Duration> {
    let throttled = err.status == Some(429)
        || err
            .code
            .as_deref()
            .is_some_and(|code| THROTTLE_CODES.contains(&code));
    if throttled {
        Some(err.retry_after.unwrap_or(DEFAULT_RATE_LIMIT_RETRY_AFTER))
    } else {
        err.retry_after
    }
}

const fn transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_ms(ms: u64, factor: f64) -> u64 {
    (ms as f64 * factor) as u64
}

const fn duration_to_ms(duration: Duration) -> u64 {
    let ms = duration.as_millis();
    if ms > u64::MAX as u128 { u64::MAX } else { ms as u64 }
}
