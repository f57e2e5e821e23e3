//! Caller-facing desired-state shape.
//!
//! A [`PolicyDraft`] is what a configuration front-end hands over: a flat
//! behavior selector plus an item list per dimension. It becomes a
//! [`PolicyConfig`] only through validation.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{Behavior, Forwarding, PolicyConfig};
use crate::validate::{Limits, validate};

/// Flat per-dimension configuration as written by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DimensionDraft {
    /// Forwarding mode.
    pub behavior: Behavior,
    /// Item names, in caller order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

impl DimensionDraft {
    /// A dimension that forwards nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            behavior: Behavior::None,
            items: Vec::new(),
        }
    }

    /// A dimension that forwards everything.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            behavior: Behavior::All,
            items: Vec::new(),
        }
    }

    /// A whitelist dimension.
    #[must_use]
    pub fn whitelist<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            behavior: Behavior::Whitelist,
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    fn to_forwarding(&self) -> Forwarding {
        match self.behavior {
            Behavior::None => Forwarding::None,
            Behavior::Whitelist => Forwarding::whitelist(self.items.iter().cloned()),
            Behavior::All => Forwarding::All,
        }
    }
}

impl From<&Forwarding> for DimensionDraft {
    fn from(forwarding: &Forwarding) -> Self {
        Self {
            behavior: forwarding.behavior(),
            items: forwarding.items().map(|set| set.to_vec()).unwrap_or_default(),
        }
    }
}

/// Desired policy as supplied by the caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub cookies_config: DimensionDraft,
    #[serde(default)]
    pub headers_config: DimensionDraft,
    #[serde(default)]
    pub query_strings_config: DimensionDraft,
}

impl PolicyDraft {
    /// Create a draft that forwards nothing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            cookies_config: DimensionDraft::none(),
            headers_config: DimensionDraft::none(),
            query_strings_config: DimensionDraft::none(),
        }
    }

    /// Builder: set the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Builder: set cookie forwarding.
    #[must_use]
    pub fn with_cookies(mut self, dimension: DimensionDraft) -> Self {
        self.cookies_config = dimension;
        self
    }

    /// Builder: set header forwarding.
    #[must_use]
    pub fn with_headers(mut self, dimension: DimensionDraft) -> Self {
        self.headers_config = dimension;
        self
    }

    /// Builder: set query string forwarding.
    #[must_use]
    pub fn with_query_strings(mut self, dimension: DimensionDraft) -> Self {
        self.query_strings_config = dimension;
        self
    }

    /// Validate and convert into the typed desired state.
    ///
    /// # Errors
    /// Returns the first [`ValidationError`] found.
    pub fn into_config(self, limits: &Limits) -> Result<PolicyConfig, ValidationError> {
        validate(&self, limits)?;
        Ok(PolicyConfig {
            cookies: self.cookies_config.to_forwarding(),
            headers: self.headers_config.to_forwarding(),
            query_strings: self.query_strings_config.to_forwarding(),
            comment: self.comment.filter(|c| !c.is_empty()),
            name: self.name,
        })
    }
}

impl PolicyConfig {
    /// Render back into caller-facing draft shape (canonical item order).
    #[must_use]
    pub fn to_draft(&self) -> PolicyDraft {
        PolicyDraft {
            name: self.name.clone(),
            comment: self.comment.clone(),
            cookies_config: DimensionDraft::from(&self.cookies),
            headers_config: DimensionDraft::from(&self.headers),
            query_strings_config: DimensionDraft::from(&self.query_strings),
        }
    }
}
