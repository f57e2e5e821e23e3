//! Bounded retry around lookups and conditional calls.
//!
//! The remote API is eventually consistent: a policy that was just created
//! can read as missing, and one that was just deleted can still read as
//! present. [`ConsistentLookup`] absorbs that window with two explicit
//! [`RetryPolicy`] values, one for propagation (`NotFound` / still-present)
//! and one for transient failures. Waits are cancellable between attempts.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::api::PolicyApi;
use crate::error::{PolicyError, PolicyResult};
use crate::lookup;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::types::{PolicyId, StoredPolicy};

/// Lookup wrapper that retries across propagation delay and transient errors.
pub struct ConsistentLookup<'a, A: PolicyApi + ?Sized> {
    api: &'a A,
    propagation: RetryPolicy,
    transient: RetryPolicy,
    cancel: CancellationToken,
}

impl<'a, A: PolicyApi + ?Sized> ConsistentLookup<'a, A> {
    /// Create a lookup with the given retry policies.
    #[must_use]
    pub fn new(api: &'a A, propagation: RetryPolicy, transient: RetryPolicy) -> Self {
        Self {
            api,
            propagation,
            transient,
            cancel: CancellationToken::new(),
        }
    }

    /// Builder: abort backoff sleeps when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch a policy, retrying transient failures only. `NotFound` is terminal.
    ///
    /// # Errors
    /// `NotFound`, `Fatal` (including exhausted transient retries), or `Cancelled`.
    pub async fn find_by_id(&self, id: &PolicyId) -> PolicyResult<StoredPolicy> {
        self.run(false, || lookup::find_by_id(self.api, id)).await
    }

    /// Fetch a policy that is expected to exist, waiting out propagation delay.
    ///
    /// # Errors
    /// `NotFound` once the propagation budget is spent, `Fatal`, or `Cancelled`.
    #[instrument(skip(self), fields(policy_id = %id))]
    pub async fn await_visible(&self, id: &PolicyId) -> PolicyResult<StoredPolicy> {
        self.run(true, || lookup::find_by_id(self.api, id)).await
    }

    /// Wait until a deleted policy stops being visible.
    ///
    /// # Errors
    /// `Fatal` with code `StillExists` once the propagation budget is spent,
    /// any non-`NotFound` lookup failure, or `Cancelled`.
    #[instrument(skip(self), fields(policy_id = %id))]
    pub async fn await_absent(&self, id: &PolicyId) -> PolicyResult<()> {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            match self.find_by_id(id).await {
                Err(err) if err.is_not_found() => {
                    debug!(attempt, "policy no longer visible");
                    return Ok(());
                }
                Err(err) => return Err(err),
                Ok(stored) => {
                    let Some(delay) = next_wait(&self.propagation, attempt, started, None) else {
                        return Err(PolicyError::Fatal {
                            status: None,
                            code: Some("StillExists".into()),
                            message: format!(
                                "policy {id} still visible (etag {}) after {} checks",
                                stored.etag,
                                attempt.saturating_add(1)
                            ),
                        });
                    };
                    attempt = attempt.saturating_add(1);
                    debug!(attempt, delay_ms = duration_ms(delay), "policy still visible");
                    self.pause(delay).await?;
                }
            }
        }
    }

    /// Run a conditional call, retrying transient failures only.
    ///
    /// Only for calls that are safe to repeat (reads, or mutations guarded by
    /// a version token).
    ///
    /// # Errors
    /// The call's own non-transient error, `Fatal` once retries are
    /// exhausted, or `Cancelled`.
    pub async fn retry_transient<T, F, Fut>(&self, op: F) -> PolicyResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PolicyResult<T>>,
    {
        self.run(false, op).await
    }

    async fn run<T, F, Fut>(&self, retry_not_found: bool, mut op: F) -> PolicyResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PolicyResult<T>>,
    {
        let started = Instant::now();
        let mut not_found_attempts = 0u32;
        let mut transient_attempts = 0u32;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let propagating = retry_not_found && err.is_not_found();
            if !propagating && !err.is_retryable() {
                return Err(err);
            }
            let (policy, attempt) = if propagating {
                (&self.propagation, &mut not_found_attempts)
            } else {
                (&self.transient, &mut transient_attempts)
            };

            let Some(delay) = next_wait(policy, *attempt, started, err.retry_after()) else {
                let attempts = attempt.saturating_add(1);
                warn!(attempts, error = %err, "retry budget exhausted");
                return Err(err.exhausted(attempts));
            };
            *attempt = attempt.saturating_add(1);
            warn!(
                attempt = *attempt,
                delay_ms = duration_ms(delay),
                error = %err,
                "retrying after backoff"
            );
            self.pause(delay).await?;
        }
    }

    async fn pause(&self, delay: Duration) -> PolicyResult<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(PolicyError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Next backoff delay, or `None` if the attempt or elapsed-time ceiling is hit.
fn next_wait(
    policy: &RetryPolicy,
    attempt: u32,
    started: Instant,
    hint: Option<Duration>,
) -> Option<Duration> {
    let delay = policy.next_delay(attempt, RetryDecision::Backoff, hint)?;
    let fits = policy
        .max_elapsed()
        .is_none_or(|budget| started.elapsed().saturating_add(delay) <= budget);
    fits.then_some(delay)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
