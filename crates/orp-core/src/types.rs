//! Core policy types.
//!
//! Forwarding for each dimension is a tagged variant, so a policy value that
//! made it past validation cannot carry items under `none` or `all`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote-assigned policy identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    /// Wrap a remote identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PolicyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PolicyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque version token used for conditional mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Wrap a version token returned by the remote API.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Get the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ETag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ETag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One of the three independently configured request dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Request cookies.
    Cookies,
    /// Request headers.
    Headers,
    /// URL query strings.
    QueryStrings,
}

impl Dimension {
    /// All dimensions in validation order.
    pub const ALL: [Self; 3] = [Self::Cookies, Self::Headers, Self::QueryStrings];

    /// Whether this dimension accepts the given behavior.
    #[must_use]
    pub const fn supports(self, behavior: Behavior) -> bool {
        match (self, behavior) {
            (_, Behavior::None | Behavior::Whitelist) | (Self::Headers, Behavior::All) => true,
            (Self::Cookies | Self::QueryStrings, Behavior::All) => false,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cookies => write!(f, "cookies_config"),
            Self::Headers => write!(f, "headers_config"),
            Self::QueryStrings => write!(f, "query_strings_config"),
        }
    }
}

/// Forwarding mode selector as it appears in caller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// Forward nothing.
    #[default]
    None,
    /// Forward only the listed items.
    Whitelist,
    /// Forward everything.
    All,
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Whitelist => write!(f, "whitelist"),
            Self::All => write!(f, "all"),
        }
    }
}

impl FromStr for Behavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "whitelist" => Ok(Self::Whitelist),
            "all" => Ok(Self::All),
            other => Err(format!("unknown behavior `{other}`")),
        }
    }
}

/// Case-sensitive set of forwarded item names.
///
/// Iteration order is canonical (lexicographic), so two sets built from the
/// same names in different orders compare and serialize identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemSet(BTreeSet<String>);

impl ItemSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Insert an item. Returns false when it was already present.
    pub fn insert(&mut self, item: impl Into<String>) -> bool {
        self.0.insert(item.into())
    }

    /// Whether the item is present (case-sensitive).
    #[must_use]
    pub fn contains(&self, item: &str) -> bool {
        self.0.contains(item)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate items in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Items in canonical order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ItemSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Validated forwarding configuration for one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "behavior", content = "items", rename_all = "lowercase")]
pub enum Forwarding {
    /// Forward nothing.
    #[default]
    None,
    /// Forward only the listed items. Never empty once validated.
    Whitelist(ItemSet),
    /// Forward everything (headers only).
    All,
}

impl Forwarding {
    /// Build a whitelist from item names.
    #[must_use]
    pub fn whitelist<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Whitelist(items.into_iter().collect())
    }

    /// The behavior selector for this variant.
    #[must_use]
    pub const fn behavior(&self) -> Behavior {
        match self {
            Self::None => Behavior::None,
            Self::Whitelist(_) => Behavior::Whitelist,
            Self::All => Behavior::All,
        }
    }

    /// Forwarded items; empty for `none` and `all`.
    #[must_use]
    pub fn items(&self) -> Option<&ItemSet> {
        match self {
            Self::Whitelist(items) => Some(items),
            Self::None | Self::All => None,
        }
    }

    /// Number of forwarded items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items().map_or(0, ItemSet::len)
    }
}

/// Desired (validated) policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Caller-chosen name, unique among live policies.
    pub name: String,
    /// Free-text comment. An empty comment is stored as `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Cookie forwarding.
    pub cookies: Forwarding,
    /// Header forwarding.
    pub headers: Forwarding,
    /// Query string forwarding.
    pub query_strings: Forwarding,
}

impl PolicyConfig {
    /// Create a config that forwards nothing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            cookies: Forwarding::None,
            headers: Forwarding::None,
            query_strings: Forwarding::None,
        }
    }

    /// Builder: set the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = if comment.is_empty() {
            None
        } else {
            Some(comment)
        };
        self
    }

    /// Builder: set cookie forwarding.
    #[must_use]
    pub fn with_cookies(mut self, forwarding: Forwarding) -> Self {
        self.cookies = forwarding;
        self
    }

    /// Builder: set header forwarding.
    #[must_use]
    pub fn with_headers(mut self, forwarding: Forwarding) -> Self {
        self.headers = forwarding;
        self
    }

    /// Builder: set query string forwarding.
    #[must_use]
    pub fn with_query_strings(mut self, forwarding: Forwarding) -> Self {
        self.query_strings = forwarding;
        self
    }

    /// Forwarding for a dimension.
    #[must_use]
    pub const fn forwarding(&self, dimension: Dimension) -> &Forwarding {
        match dimension {
            Dimension::Cookies => &self.cookies,
            Dimension::Headers => &self.headers,
            Dimension::QueryStrings => &self.query_strings,
        }
    }
}

/// A policy as observed on the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPolicy {
    /// Remote-assigned identifier. Stable across updates.
    pub id: PolicyId,
    /// Version token observed with this read.
    pub etag: ETag,
    /// Last modification time reported by the remote system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Stored configuration.
    pub config: PolicyConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_set_ignores_insertion_order() {
        let a: ItemSet = ["b", "a", "c"].into_iter().collect();
        let b: ItemSet = ["c", "b", "a"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.to_vec(), vec!["a", "b", "c"]);
    }

    #[test]
    fn item_set_is_case_sensitive() {
        let set: ItemSet = ["Accept", "accept"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains("Accept"));
        assert!(!set.contains("ACCEPT"));
    }

    #[test]
    fn headers_alone_support_all() {
        assert!(Dimension::Headers.supports(Behavior::All));
        assert!(!Dimension::Cookies.supports(Behavior::All));
        assert!(!Dimension::QueryStrings.supports(Behavior::All));
        for dimension in Dimension::ALL {
            assert!(dimension.supports(Behavior::None));
            assert!(dimension.supports(Behavior::Whitelist));
        }
    }

    #[test]
    fn behavior_parse_and_display() {
        for behavior in [Behavior::None, Behavior::Whitelist, Behavior::All] {
            assert_eq!(behavior.to_string().parse::<Behavior>(), Ok(behavior));
        }
        assert!("allViewer".parse::<Behavior>().is_err());
    }

    #[test]
    fn forwarding_reports_behavior_and_items() {
        let forwarding = Forwarding::whitelist(["test"]);
        assert_eq!(forwarding.behavior(), Behavior::Whitelist);
        assert_eq!(forwarding.item_count(), 1);
        assert_eq!(Forwarding::All.item_count(), 0);
        assert!(Forwarding::None.items().is_none());
    }

    #[test]
    fn empty_comment_is_absent() {
        let config = PolicyConfig::new("p1").with_comment("");
        assert_eq!(config.comment, None);
    }

    #[test]
    fn dimension_display_matches_config_keys() {
        assert_eq!(Dimension::Cookies.to_string(), "cookies_config");
        assert_eq!(Dimension::Headers.to_string(), "headers_config");
        assert_eq!(Dimension::QueryStrings.to_string(), "query_strings_config");
    }
}
