//! Structural validation of desired state.
//!
//! Pure functions; nothing here touches the network.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::draft::{DimensionDraft, PolicyDraft};
use crate::error::ValidationError;
use crate::types::{Behavior, Dimension};

/// Remote-side limits enforced before any call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum policy name length, in characters.
    pub max_name_len: usize,
    /// Maximum whitelisted items per dimension.
    pub max_items_per_dimension: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_name_len: 128,
            max_items_per_dimension: 10,
        }
    }
}

/// Validate a draft, returning the first violation.
///
/// Checks run in order: name, cookies, headers, query strings.
///
/// # Errors
/// Returns the first [`ValidationError`] found.
pub fn validate(draft: &PolicyDraft, limits: &Limits) -> Result<(), ValidationError> {
    match validate_all(draft, limits).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Validate a draft, returning every violation found.
#[must_use]
pub fn validate_all(draft: &PolicyDraft, limits: &Limits) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let name_len = draft.name.chars().count();
    if name_len == 0 {
        errors.push(ValidationError::EmptyName);
    } else if name_len > limits.max_name_len {
        errors.push(ValidationError::NameTooLong {
            len: name_len,
            max: limits.max_name_len,
        });
    }

    let dimensions = [
        (Dimension::Cookies, &draft.cookies_config),
        (Dimension::Headers, &draft.headers_config),
        (Dimension::QueryStrings, &draft.query_strings_config),
    ];
    for (dimension, config) in dimensions {
        if let Err(err) = validate_dimension(dimension, config, limits) {
            errors.push(err);
        }
    }

    errors
}

fn validate_dimension(
    dimension: Dimension,
    config: &DimensionDraft,
    limits: &Limits,
) -> Result<(), ValidationError> {
    let behavior = config.behavior;
    if !dimension.supports(behavior) {
        return Err(ValidationError::UnsupportedBehavior {
            dimension,
            behavior,
        });
    }

    match behavior {
        Behavior::None | Behavior::All if !config.items.is_empty() => {
            Err(ValidationError::UnexpectedItems {
                dimension,
                behavior,
            })
        }
        Behavior::None | Behavior::All => Ok(()),
        Behavior::Whitelist => validate_items(dimension, &config.items, limits),
    }
}

fn validate_items(
    dimension: Dimension,
    items: &[String],
    limits: &Limits,
) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptyWhitelist { dimension });
    }
    if items.len() > limits.max_items_per_dimension {
        return Err(ValidationError::TooManyItems {
            dimension,
            count: items.len(),
            max: limits.max_items_per_dimension,
        });
    }

    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if item.is_empty() {
            return Err(ValidationError::BlankItem { dimension });
        }
        if !seen.insert(item.as_str()) {
            return Err(ValidationError::DuplicateItem {
                dimension,
                item: item.clone(),
            });
        }
    }
    Ok(())
}
