//! Declarative reconciliation core for origin request policies.
//!
//! An origin request policy tells an edge network which parts of a viewer
//! request (cookies, headers, query strings) to forward to the origin. This
//! crate takes a desired policy, validates it before any network call,
//! computes the minimal remote operation to converge, applies it through a
//! [`PolicyApi`] transport, and rides out the remote system's eventual
//! consistency with bounded, cancellable retry.
//!
//! # Flow
//!
//! ```text
//! PolicyDraft --validate--> PolicyConfig --reconcile(current)--> Plan
//!     --apply--> PolicyApi --ConsistentLookup--> StoredPolicy
//! ```
//!
//! Transports only report raw [`ApiError`]s; classification into
//! not-found, conflict, transient and fatal happens in [`retry::classify`].

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod consistency;
pub mod draft;
pub mod error;
pub mod lookup;
pub mod plan;
pub mod reconciler;
pub mod remote;
pub mod retry;
pub mod types;
pub mod validate;

pub use api::{ApiError, PolicyApi};
pub use config::{ConfigError, ReconcilerConfig};
pub use consistency::ConsistentLookup;
pub use draft::{DimensionDraft, PolicyDraft};
pub use error::{PolicyError, PolicyResult, ValidationError};
pub use plan::{Plan, PlanAction, PolicyField};
pub use reconciler::{ApplyOutcome, Reconciler};
pub use remote::{PolicyEnvelope, RemotePolicy, RemotePolicyConfig};
pub use retry::{RetryDecision, RetryPolicy};
pub use types::{
    Behavior, Dimension, ETag, Forwarding, ItemSet, PolicyConfig, PolicyId, StoredPolicy,
};
pub use validate::Limits;

/// Re-exported so callers can cancel without a direct `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
