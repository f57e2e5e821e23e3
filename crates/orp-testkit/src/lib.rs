//! Test support for origin request policy reconciliation.
//!
//! - [`MemoryPolicyApi`]: eventually-consistent in-memory backend with
//!   failure injection and call counting.
//! - [`fixtures`]: the acceptance scenario drafts and a fast retry config.
//! - [`init_test_tracing`]: subscriber setup honoring `RUST_LOG`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fixtures;
pub mod logging;
pub mod memory;

pub use logging::init_test_tracing;
pub use memory::{CallCounts, MemoryPolicyApi, Operation, PropagationLag};
