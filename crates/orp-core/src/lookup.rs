//! Single-attempt lookup by ID.
//!
//! Stateless per call. Retrying across propagation delay is the job of
//! [`crate::consistency::ConsistentLookup`].

use tracing::{debug, instrument};

use crate::api::PolicyApi;
use crate::error::{PolicyError, PolicyResult};
use crate::types::{PolicyId, StoredPolicy};

/// Fetch a policy once and classify the outcome.
///
/// # Errors
/// `NotFound` when the remote reports no such object, `Transient` for
/// throttling/5xx/connection failures, `Fatal` for anything else or for a
/// malformed payload.
#[instrument(skip(api), fields(policy_id = %id))]
pub async fn find_by_id<A: PolicyApi + ?Sized>(
    api: &A,
    id: &PolicyId,
) -> PolicyResult<StoredPolicy> {
    match api.get_policy(id).await {
        Ok(envelope) => {
            let stored = envelope.into_stored()?;
            debug!(etag = %stored.etag, "policy found");
            Ok(stored)
        }
        Err(err) => {
            let err = PolicyError::from_api(Some(id), err);
            debug!(error = %err, "policy lookup failed");
            Err(err)
        }
    }
}

/// Like [`find_by_id`], but absence is `Ok(None)`.
///
/// # Errors
/// Any non-`NotFound` failure from [`find_by_id`].
pub async fn read_optional<A: PolicyApi + ?Sized>(
    api: &A,
    id: &PolicyId,
) -> PolicyResult<Option<StoredPolicy>> {
    match find_by_id(api, id).await {
        Ok(stored) => Ok(Some(stored)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
