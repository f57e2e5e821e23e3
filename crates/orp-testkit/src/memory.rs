//! In-memory, eventually-consistent policy backend.
//!
//! Behaves like the remote API as far as the core can observe: opaque IDs
//! and etags, name uniqueness, conditional update/delete, and a configurable
//! number of reads during which a fresh create or delete is not yet visible.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use orp_core::api::{ApiError, PolicyApi};
use orp_core::remote::{PolicyEnvelope, RemotePolicy, RemotePolicyConfig};
use orp_core::types::{ETag, PolicyId};
use parking_lot::Mutex;
use uuid::Uuid;

/// A transport call, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    Update,
    Delete,
}

/// Number of reads for which a mutation stays invisible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationLag {
    /// Reads returning `NotFound` after a create.
    pub create_reads: u32,
    /// Reads still returning the old policy after a delete.
    pub delete_reads: u32,
}

impl PropagationLag {
    /// Same lag after create and delete.
    #[must_use]
    pub const fn reads(reads: u32) -> Self {
        Self {
            create_reads: reads,
            delete_reads: reads,
        }
    }
}

/// Calls received, by operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: u32,
    pub get: u32,
    pub update: u32,
    pub delete: u32,
}

impl CallCounts {
    /// Calls that mutate remote state.
    #[must_use]
    pub const fn mutations(&self) -> u32 {
        self.create + self.update + self.delete
    }

    fn bump(&mut self, op: Operation) {
        let slot = match op {
            Operation::Create => &mut self.create,
            Operation::Get => &mut self.get,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone)]
struct Entry {
    policy: RemotePolicy,
    etag: ETag,
    hidden_reads: u32,
}

#[derive(Debug, Default)]
struct State {
    live: BTreeMap<PolicyId, Entry>,
    ghosts: BTreeMap<PolicyId, (Entry, u32)>,
    failures: HashMap<Operation, VecDeque<ApiError>>,
    calls: CallCounts,
    lag: PropagationLag,
}

impl State {
    fn enter(&mut self, op: Operation) -> Result<(), ApiError> {
        self.calls.bump(op);
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn name_taken(&self, name: &str, except: Option<&PolicyId>) -> bool {
        self.live
            .iter()
            .any(|(id, entry)| Some(id) != except && entry.policy.config.name == name)
    }

    fn live_mut(&mut self, id: &PolicyId, etag: &ETag) -> Result<&mut Entry, ApiError> {
        let entry = self.live.get_mut(id).ok_or_else(|| not_found(id))?;
        if entry.etag != *etag {
            return Err(ApiError::http(
                412,
                Some("PreconditionFailed".into()),
                format!(
                    "the If-Match version {etag} does not match the current version {}",
                    entry.etag
                ),
            ));
        }
        Ok(entry)
    }
}

fn not_found(id: &PolicyId) -> ApiError {
    ApiError::http(
        404,
        Some("NoSuchOriginRequestPolicy".into()),
        format!("the origin request policy {id} does not exist"),
    )
}

fn already_exists(name: &str) -> ApiError {
    ApiError::http(
        409,
        Some("OriginRequestPolicyAlreadyExists".into()),
        format!("an origin request policy named {name} already exists"),
    )
}

fn fresh_etag() -> ETag {
    let simple = Uuid::new_v4().simple().to_string().to_uppercase();
    ETag::new(format!("E{}", &simple[..13]))
}

/// In-memory [`PolicyApi`] with propagation lag and failure injection.
#[derive(Debug, Default)]
pub struct MemoryPolicyApi {
    state: Mutex<State>,
}

impl MemoryPolicyApi {
    /// Empty, immediately consistent backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set propagation lag.
    #[must_use]
    pub fn with_lag(self, lag: PropagationLag) -> Self {
        self.state.lock().lag = lag;
        self
    }

    /// Fail the next call of `op` with `err`. Queued failures are consumed in
    /// order.
    pub fn fail_next(&self, op: Operation, err: ApiError) {
        self.fail_times(op, 1, err);
    }

    /// Fail the next `times` calls of `op` with `err`.
    pub fn fail_times(&self, op: Operation, times: usize, err: ApiError) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(op).or_default();
        queue.extend(std::iter::repeat_n(err, times));
    }

    /// Store a policy directly, visible at once. Returns its ID and etag.
    pub fn seed(&self, config: RemotePolicyConfig) -> (PolicyId, ETag) {
        let id = PolicyId::new(Uuid::new_v4().to_string());
        let etag = fresh_etag();
        let entry = Entry {
            policy: RemotePolicy {
                id: id.clone(),
                last_modified_time: Some(Utc::now()),
                config,
            },
            etag: etag.clone(),
            hidden_reads: 0,
        };
        self.state.lock().live.insert(id.clone(), entry);
        (id, etag)
    }

    /// Modify a stored policy behind the reconciler's back; bumps the etag.
    ///
    /// Returns the new etag, or `None` if the policy does not exist.
    pub fn modify_out_of_band(
        &self,
        id: &PolicyId,
        edit: impl FnOnce(&mut RemotePolicyConfig),
    ) -> Option<ETag> {
        let mut state = self.state.lock();
        let entry = state.live.get_mut(id)?;
        edit(&mut entry.policy.config);
        entry.policy.last_modified_time = Some(Utc::now());
        entry.etag = fresh_etag();
        Some(entry.etag.clone())
    }

    /// Delete a stored policy behind the reconciler's back, with no lag.
    pub fn remove_out_of_band(&self, id: &PolicyId) -> bool {
        self.state.lock().live.remove(id).is_some()
    }

    /// Stored configuration, ignoring propagation lag.
    #[must_use]
    pub fn stored(&self, id: &PolicyId) -> Option<RemotePolicyConfig> {
        self.state
            .lock()
            .live
            .get(id)
            .map(|entry| entry.policy.config.clone())
    }

    /// Current etag, ignoring propagation lag.
    #[must_use]
    pub fn etag(&self, id: &PolicyId) -> Option<ETag> {
        self.state.lock().live.get(id).map(|entry| entry.etag.clone())
    }

    /// Number of live policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Whether no policies are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }
}

#[async_trait]
impl PolicyApi for MemoryPolicyApi {
    async fn create_policy(
        &self,
        config: &RemotePolicyConfig,
    ) -> Result<(PolicyId, ETag), ApiError> {
        let mut state = self.state.lock();
        state.enter(Operation::Create)?;
        if state.name_taken(&config.name, None) {
            return Err(already_exists(&config.name));
        }

        let id = PolicyId::new(Uuid::new_v4().to_string());
        let etag = fresh_etag();
        let hidden_reads = state.lag.create_reads;
        state.live.insert(
            id.clone(),
            Entry {
                policy: RemotePolicy {
                    id: id.clone(),
                    last_modified_time: Some(Utc::now()),
                    config: config.clone(),
                },
                etag: etag.clone(),
                hidden_reads,
            },
        );
        Ok((id, etag))
    }

    async fn get_policy(&self, id: &PolicyId) -> Result<PolicyEnvelope, ApiError> {
        let mut state = self.state.lock();
        state.enter(Operation::Get)?;

        if let Some(entry) = state.live.get_mut(id) {
            if entry.hidden_reads > 0 {
                entry.hidden_reads -= 1;
                return Err(not_found(id));
            }
            return Ok(PolicyEnvelope {
                policy: entry.policy.clone(),
                etag: entry.etag.clone(),
            });
        }

        let Some((entry, reads_left)) = state.ghosts.remove(id) else {
            return Err(not_found(id));
        };
        let envelope = PolicyEnvelope {
            policy: entry.policy.clone(),
            etag: entry.etag.clone(),
        };
        if reads_left > 1 {
            state.ghosts.insert(id.clone(), (entry, reads_left - 1));
        }
        Ok(envelope)
    }

    async fn update_policy(
        &self,
        id: &PolicyId,
        etag: &ETag,
        config: &RemotePolicyConfig,
    ) -> Result<ETag, ApiError> {
        let mut state = self.state.lock();
        state.enter(Operation::Update)?;
        if state.name_taken(&config.name, Some(id)) {
            return Err(already_exists(&config.name));
        }

        let entry = state.live_mut(id, etag)?;
        entry.policy.config = config.clone();
        entry.policy.last_modified_time = Some(Utc::now());
        entry.etag = fresh_etag();
        Ok(entry.etag.clone())
    }

    async fn delete_policy(&self, id: &PolicyId, etag: &ETag) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        state.enter(Operation::Delete)?;
        state.live_mut(id, etag)?;

        let lag = state.lag.delete_reads;
        if let Some(entry) = state.live.remove(id) {
            if lag > 0 {
                state.ghosts.insert(id.clone(), (entry, lag));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orp_core::remote::to_remote;
    use orp_core::types::{Forwarding, PolicyConfig};

    fn remote(name: &str) -> RemotePolicyConfig {
        to_remote(&PolicyConfig::new(name).with_headers(Forwarding::All))
    }

    #[tokio::test]
    async fn create_then_get() {
        let api = MemoryPolicyApi::new();
        let (id, etag) = api.create_policy(&remote("p1")).await.expect("create");
        let envelope = api.get_policy(&id).await.expect("get");
        assert_eq!(envelope.etag, etag);
        assert_eq!(envelope.policy.config.name, "p1");
        assert_eq!(api.calls().create, 1);
        assert_eq!(api.calls().get, 1);
    }

    #[tokio::test]
    async fn create_lag_hides_policy_for_configured_reads() {
        let api = MemoryPolicyApi::new().with_lag(PropagationLag {
            create_reads: 2,
            delete_reads: 0,
        });
        let (id, _) = api.create_policy(&remote("p1")).await.expect("create");
        assert_eq!(api.get_policy(&id).await.expect_err("hidden").status, Some(404));
        assert_eq!(api.get_policy(&id).await.expect_err("hidden").status, Some(404));
        assert!(api.get_policy(&id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_lag_keeps_policy_readable() {
        let api = MemoryPolicyApi::new().with_lag(PropagationLag {
            create_reads: 0,
            delete_reads: 1,
        });
        let (id, etag) = api.create_policy(&remote("p1")).await.expect("create");
        api.delete_policy(&id, &etag).await.expect("delete");
        assert!(api.get_policy(&id).await.is_ok());
        assert_eq!(api.get_policy(&id).await.expect_err("gone").status, Some(404));
        assert!(api.is_empty());
    }

    #[tokio::test]
    async fn stale_etag_is_rejected() {
        let api = MemoryPolicyApi::new();
        let (id, etag) = api.create_policy(&remote("p1")).await.expect("create");
        let next = api.update_policy(&id, &etag, &remote("p1")).await.expect("update");
        assert_ne!(next, etag);

        let err = api.update_policy(&id, &etag, &remote("p1")).await.expect_err("stale");
        assert_eq!(err.status, Some(412));
        let err = api.delete_policy(&id, &etag).await.expect_err("stale");
        assert_eq!(err.code.as_deref(), Some("PreconditionFailed"));
    }

    #[tokio::test]
    async fn names_are_unique_among_live_policies() {
        let api = MemoryPolicyApi::new();
        api.create_policy(&remote("p1")).await.expect("create");
        let err = api.create_policy(&remote("p1")).await.expect_err("duplicate");
        assert_eq!(err.status, Some(409));

        let (id, etag) = api.create_policy(&remote("p2")).await.expect("create");
        let err = api.update_policy(&id, &etag, &remote("p1")).await.expect_err("rename clash");
        assert_eq!(err.code.as_deref(), Some("OriginRequestPolicyAlreadyExists"));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let api = MemoryPolicyApi::new();
        api.fail_times(Operation::Create, 2, ApiError::http(503, None, "unavailable"));
        assert!(api.create_policy(&remote("p1")).await.is_err());
        assert!(api.create_policy(&remote("p1")).await.is_err());
        assert!(api.create_policy(&remote("p1")).await.is_ok());
        assert_eq!(api.calls().create, 3);
        assert_eq!(api.len(), 1);
    }

    #[tokio::test]
    async fn out_of_band_edit_bumps_etag() {
        let api = MemoryPolicyApi::new();
        let (id, etag) = api.seed(remote("p1"));
        let next = api
            .modify_out_of_band(&id, |config| config.comment = Some("edited".into()))
            .expect("exists");
        assert_ne!(next, etag);
        assert_eq!(api.stored(&id).and_then(|c| c.comment).as_deref(), Some("edited"));
        assert!(api.remove_out_of_band(&id));
        assert!(api.etag(&id).is_none());
    }
}
