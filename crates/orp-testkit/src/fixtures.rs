//! Scenario drafts and configuration for acceptance-style tests.

use std::time::Duration;

use orp_core::config::ReconcilerConfig;
use orp_core::draft::{DimensionDraft, PolicyDraft};
use orp_core::retry::RetryPolicy;
use uuid::Uuid;

/// A policy name that will not collide with other tests.
#[must_use]
pub fn unique_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..8])
}

/// Whitelist `["test"]` in every dimension.
#[must_use]
pub fn whitelist_draft(name: impl Into<String>) -> PolicyDraft {
    PolicyDraft::new(name)
        .with_comment("test comment")
        .with_cookies(DimensionDraft::whitelist(["test"]))
        .with_headers(DimensionDraft::whitelist(["test"]))
        .with_query_strings(DimensionDraft::whitelist(["test"]))
}

/// [`whitelist_draft`] after an update: headers narrowed to none, other
/// items swapped to `test2`.
#[must_use]
pub fn narrowed_draft(name: impl Into<String>) -> PolicyDraft {
    PolicyDraft::new(name)
        .with_comment("test comment updated")
        .with_cookies(DimensionDraft::whitelist(["test2"]))
        .with_headers(DimensionDraft::none())
        .with_query_strings(DimensionDraft::whitelist(["test2"]))
}

/// Forward nothing in any dimension.
#[must_use]
pub fn all_none_draft(name: impl Into<String>) -> PolicyDraft {
    PolicyDraft::new(name).with_comment("test comment")
}

/// Forward every viewer header, nothing else.
#[must_use]
pub fn all_headers_draft(name: impl Into<String>) -> PolicyDraft {
    PolicyDraft::new(name).with_headers(DimensionDraft::all())
}

/// Reconciler settings with short, jitter-free backoff so paused-clock tests
/// can reason about exact schedules.
#[must_use]
pub fn fast_config() -> ReconcilerConfig {
    ReconcilerConfig {
        propagation: RetryPolicy::new()
            .with_jitter_enabled(false)
            .with_base_backoff_ms(100)
            .with_max_backoff_ms(1_000)
            .with_max_attempts(Some(8))
            .with_max_elapsed(Some(Duration::from_secs(10))),
        transient: RetryPolicy::new()
            .with_jitter_enabled(false)
            .with_base_backoff_ms(100)
            .with_max_backoff_ms(1_000)
            .with_max_attempts(Some(3))
            .with_max_elapsed(Some(Duration::from_secs(60))),
        ..ReconcilerConfig::default()
    }
}
