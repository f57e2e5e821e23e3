//! Reconciliation engine.
//!
//! One pass is strictly sequential: validate, look up current state, diff,
//! apply, then re-verify through [`ConsistentLookup`]. The engine keeps no
//! state between passes; the remote object and its etag are the only durable
//! state.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::api::PolicyApi;
use crate::config::ReconcilerConfig;
use crate::consistency::ConsistentLookup;
use crate::draft::PolicyDraft;
use crate::error::{PolicyError, PolicyResult};
use crate::plan::{self, Plan, PlanAction};
use crate::remote::to_remote;
use crate::types::{PolicyConfig, PolicyId, StoredPolicy};

/// Result of applying a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// What was done.
    pub action: PlanAction,
    /// The policy as read back after the operation; `None` after a delete
    /// or a bare no-op.
    pub policy: Option<StoredPolicy>,
}

impl ApplyOutcome {
    const fn new(action: PlanAction, policy: Option<StoredPolicy>) -> Self {
        Self { action, policy }
    }
}

/// Drives one policy toward its desired state.
pub struct Reconciler<A: PolicyApi> {
    api: A,
    config: ReconcilerConfig,
}

impl<A: PolicyApi> Reconciler<A> {
    /// Create a reconciler with default configuration.
    #[must_use]
    pub fn new(api: A) -> Self {
        Self::with_config(api, ReconcilerConfig::default())
    }

    /// Create a reconciler with explicit configuration.
    #[must_use]
    pub const fn with_config(api: A, config: ReconcilerConfig) -> Self {
        Self { api, config }
    }

    /// The underlying transport.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    fn lookup(&self, cancel: &CancellationToken) -> ConsistentLookup<'_, A> {
        ConsistentLookup::new(
            &self.api,
            self.config.propagation.clone(),
            self.config.transient.clone(),
        )
        .with_cancellation(cancel.clone())
    }

    /// Validate a draft against the configured limits.
    ///
    /// # Errors
    /// `PolicyError::Validation` with the first violation.
    pub fn validate(&self, draft: &PolicyDraft) -> PolicyResult<PolicyConfig> {
        Ok(draft.clone().into_config(&self.config.limits)?)
    }

    /// Fetch a policy by ID. `NotFound` is terminal; transient failures are
    /// retried.
    ///
    /// # Errors
    /// `NotFound`, `Fatal`, or `Cancelled`.
    pub async fn find_by_id(
        &self,
        id: &PolicyId,
        cancel: &CancellationToken,
    ) -> PolicyResult<StoredPolicy> {
        self.lookup(cancel).find_by_id(id).await
    }

    /// Fetch a policy that was just created, waiting out propagation delay.
    ///
    /// # Errors
    /// `NotFound` once the propagation budget is spent, `Fatal`, or `Cancelled`.
    pub async fn await_visible(
        &self,
        id: &PolicyId,
        cancel: &CancellationToken,
    ) -> PolicyResult<StoredPolicy> {
        self.lookup(cancel).await_visible(id).await
    }

    async fn read_current(
        &self,
        id: Option<&PolicyId>,
        cancel: &CancellationToken,
    ) -> PolicyResult<Option<StoredPolicy>> {
        let Some(id) = id else {
            return Ok(None);
        };
        match self.find_by_id(id, cancel).await {
            Ok(stored) => Ok(Some(stored)),
            Err(err) if err.is_not_found() => {
                debug!(policy_id = %id, "tracked policy is gone; will recreate");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Validate `draft`, read the policy tracked as `id`, and compute a plan.
    ///
    /// A tracked ID that no longer exists plans a `Create`.
    ///
    /// # Errors
    /// `Validation` before any remote call, a lookup failure, or `Cancelled`
    /// if `cancel` fires while the read is backing off.
    #[instrument(skip(self, draft, cancel), fields(name = %draft.name))]
    pub async fn plan(
        &self,
        draft: &PolicyDraft,
        id: Option<&PolicyId>,
        cancel: &CancellationToken,
    ) -> PolicyResult<Plan> {
        let desired = self.validate(draft)?;
        let current = self.read_current(id, cancel).await?;
        let plan = plan::reconcile(&desired, current.as_ref());
        info!(action = %plan.action(), "computed plan");
        Ok(plan)
    }

    /// Execute a plan and read back the result.
    ///
    /// Create is attempted once; update and delete carry the observed etag
    /// and are retried on transient failures only.
    ///
    /// # Errors
    /// `Conflict` on an etag mismatch, `Fatal`, `NotFound` if a created
    /// policy never becomes visible, or `Cancelled`.
    #[instrument(skip(self, plan, cancel), fields(action = %plan.action()))]
    pub async fn apply(
        &self,
        plan: Plan,
        cancel: &CancellationToken,
    ) -> PolicyResult<ApplyOutcome> {
        let lookup = self.lookup(cancel);
        match plan {
            Plan::NoOp => Ok(ApplyOutcome::new(PlanAction::NoOp, None)),
            Plan::Create(config) => {
                let remote = to_remote(&config);
                let (id, etag) = self
                    .api
                    .create_policy(&remote)
                    .await
                    .map_err(|err| PolicyError::from_api(None, err))?;
                info!(policy_id = %id, etag = %etag, "policy created");
                let stored = lookup.await_visible(&id).await?;
                Ok(ApplyOutcome::new(PlanAction::Create, Some(stored)))
            }
            Plan::Update {
                id,
                etag,
                config,
                changed,
            } => {
                let remote = to_remote(&config);
                let (api, id_ref, etag_ref, remote_ref) = (&self.api, &id, &etag, &remote);
                let new_etag = lookup
                    .retry_transient(move || async move {
                        api.update_policy(id_ref, etag_ref, remote_ref)
                            .await
                            .map_err(|err| PolicyError::from_api(Some(id_ref), err))
                    })
                    .await?;
                info!(
                    policy_id = %id,
                    etag = %new_etag,
                    changed = ?changed,
                    "policy updated"
                );
                let stored = lookup.find_by_id(&id).await?;
                Ok(ApplyOutcome::new(PlanAction::Update, Some(stored)))
            }
            Plan::Delete { id, etag } => {
                let (api, id_ref, etag_ref) = (&self.api, &id, &etag);
                let deleted = lookup
                    .retry_transient(move || async move {
                        api.delete_policy(id_ref, etag_ref)
                            .await
                            .map_err(|err| PolicyError::from_api(Some(id_ref), err))
                    })
                    .await;
                match deleted {
                    Ok(()) => info!(policy_id = %id, "policy deleted"),
                    Err(err) if err.is_not_found() => {
                        debug!(policy_id = %id, "policy already deleted");
                    }
                    Err(err) => return Err(err),
                }
                lookup.await_absent(&id).await?;
                Ok(ApplyOutcome::new(PlanAction::Delete, None))
            }
        }
    }

    /// Plan and apply in one pass.
    ///
    /// A no-op returns the current policy so callers always see the
    /// converged state.
    ///
    /// # Errors
    /// Any error from [`Self::validate`], lookup, or [`Self::apply`].
    #[instrument(skip(self, draft, cancel), fields(name = %draft.name))]
    pub async fn converge(
        &self,
        draft: &PolicyDraft,
        id: Option<&PolicyId>,
        cancel: &CancellationToken,
    ) -> PolicyResult<ApplyOutcome> {
        let desired = self.validate(draft)?;
        let current = self.read_current(id, cancel).await?;
        let plan = plan::reconcile(&desired, current.as_ref());
        info!(action = %plan.action(), "converging");
        if plan.is_noop() {
            return Ok(ApplyOutcome::new(PlanAction::NoOp, current));
        }
        self.apply(plan, cancel).await
    }

    /// Delete a policy and wait until it reads as absent.
    ///
    /// Already-absent policies yield a no-op.
    ///
    /// # Errors
    /// `Conflict`, `Fatal` (including `StillExists`), or `Cancelled`.
    #[instrument(skip(self, cancel), fields(policy_id = %id))]
    pub async fn destroy(
        &self,
        id: &PolicyId,
        cancel: &CancellationToken,
    ) -> PolicyResult<ApplyOutcome> {
        let current = self.read_current(Some(id), cancel).await?;
        let plan = plan::plan_delete(current.as_ref());
        self.apply(plan, cancel).await
    }

    /// Adopt an existing policy.
    ///
    /// The stored policy must survive a round trip through draft form and
    /// validation unchanged.
    ///
    /// # Errors
    /// `NotFound`, `Validation` if the stored policy violates local limits,
    /// `Fatal` if it does not round-trip, or `Cancelled`.
    #[instrument(skip(self, cancel), fields(policy_id = %id))]
    pub async fn import_by_id(
        &self,
        id: &PolicyId,
        cancel: &CancellationToken,
    ) -> PolicyResult<StoredPolicy> {
        let stored = self.find_by_id(id, cancel).await?;
        let revalidated = stored.config.to_draft().into_config(&self.config.limits)?;
        if revalidated != stored.config {
            return Err(PolicyError::malformed(format!(
                "policy {id} does not round-trip through its desired form"
            )));
        }
        info!(name = %stored.config.name, etag = %stored.etag, "policy imported");
        Ok(stored)
    }
}
