//! Wire representation of an origin request policy and its translation to and
//! from [`PolicyConfig`].
//!
//! `to_desired(&to_remote(c)) == c` for every valid config. Drift detection
//! depends on that: any asymmetry shows up as a perpetual update plan.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};
use crate::types::{
    Behavior, Dimension, ETag, Forwarding, ItemSet, PolicyConfig, PolicyId, StoredPolicy,
};

/// Wire value for headers forwarded wholesale.
const HEADERS_ALL_VIEWER: &str = "allViewer";

/// Counted item list as the remote API encodes it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteItems {
    /// Number of entries in `items`.
    pub quantity: u32,
    /// Item names; omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
}

impl RemoteItems {
    fn from_set(items: &ItemSet) -> Self {
        let items = items.to_vec();
        Self {
            quantity: u32::try_from(items.len()).unwrap_or(u32::MAX),
            items: Some(items),
        }
    }
}

/// Cookie forwarding on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteCookiesConfig {
    pub cookie_behavior: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<RemoteItems>,
}

/// Header forwarding on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteHeadersConfig {
    pub header_behavior: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<RemoteItems>,
}

/// Query string forwarding on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteQueryStringsConfig {
    pub query_string_behavior: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_strings: Option<RemoteItems>,
}

/// Policy configuration body sent on create/update and returned on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemotePolicyConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub cookies_config: RemoteCookiesConfig,
    pub headers_config: RemoteHeadersConfig,
    pub query_strings_config: RemoteQueryStringsConfig,
}

/// A stored policy as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemotePolicy {
    pub id: PolicyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_time: Option<DateTime<Utc>>,
    #[serde(rename = "OriginRequestPolicyConfig")]
    pub config: RemotePolicyConfig,
}

/// Result of a successful read: the policy plus its version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEnvelope {
    pub policy: RemotePolicy,
    pub etag: ETag,
}

impl PolicyEnvelope {
    /// Translate into the observed-state shape.
    ///
    /// # Errors
    /// Returns `PolicyError::Fatal` if the remote payload is malformed.
    pub fn into_stored(self) -> PolicyResult<StoredPolicy> {
        Ok(StoredPolicy {
            config: to_desired(&self.policy.config)?,
            id: self.policy.id,
            etag: self.etag,
            last_modified: self.policy.last_modified_time,
        })
    }
}

/// Render a validated config into its wire form.
#[must_use]
pub fn to_remote(config: &PolicyConfig) -> RemotePolicyConfig {
    let (cookie_behavior, cookies) = encode(Dimension::Cookies, &config.cookies);
    let (header_behavior, headers) = encode(Dimension::Headers, &config.headers);
    let (query_string_behavior, query_strings) =
        encode(Dimension::QueryStrings, &config.query_strings);

    RemotePolicyConfig {
        name: config.name.clone(),
        comment: config.comment.clone(),
        cookies_config: RemoteCookiesConfig {
            cookie_behavior,
            cookies,
        },
        headers_config: RemoteHeadersConfig {
            header_behavior,
            headers,
        },
        query_strings_config: RemoteQueryStringsConfig {
            query_string_behavior,
            query_strings,
        },
    }
}

/// Parse a wire config back into desired-state shape.
///
/// # Errors
/// Returns `PolicyError::Fatal` for unknown behaviors, quantity mismatches,
/// or item lists that contradict their behavior.
pub fn to_desired(remote: &RemotePolicyConfig) -> PolicyResult<PolicyConfig> {
    Ok(PolicyConfig {
        name: remote.name.clone(),
        comment: remote.comment.clone().filter(|c| !c.is_empty()),
        cookies: decode(
            Dimension::Cookies,
            &remote.cookies_config.cookie_behavior,
            remote.cookies_config.cookies.as_ref(),
        )?,
        headers: decode(
            Dimension::Headers,
            &remote.headers_config.header_behavior,
            remote.headers_config.headers.as_ref(),
        )?,
        query_strings: decode(
            Dimension::QueryStrings,
            &remote.query_strings_config.query_string_behavior,
            remote.query_strings_config.query_strings.as_ref(),
        )?,
    })
}

fn all_wire_value(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Headers => HEADERS_ALL_VIEWER,
        Dimension::Cookies | Dimension::QueryStrings => "all",
    }
}

fn encode(dimension: Dimension, forwarding: &Forwarding) -> (String, Option<RemoteItems>) {
    match forwarding {
        Forwarding::None => ("none".to_string(), None),
        Forwarding::Whitelist(items) => {
            ("whitelist".to_string(), Some(RemoteItems::from_set(items)))
        }
        Forwarding::All => (all_wire_value(dimension).to_string(), None),
    }
}

fn decode(
    dimension: Dimension,
    behavior: &str,
    items: Option<&RemoteItems>,
) -> PolicyResult<Forwarding> {
    let names = match items {
        None => Vec::new(),
        Some(list) => {
            let names = list.items.clone().unwrap_or_default();
            if usize::try_from(list.quantity).ok() != Some(names.len()) {
                return Err(PolicyError::malformed(format!(
                    "{dimension}: quantity {} does not match {} items",
                    list.quantity,
                    names.len()
                )));
            }
            if let Some(duplicate) = first_duplicate(&names) {
                return Err(PolicyError::malformed(format!(
                    "{dimension}: item `{duplicate}` listed more than once"
                )));
            }
            names
        }
    };

    let parsed = match behavior {
        "none" => Some(Behavior::None),
        "whitelist" => Some(Behavior::Whitelist),
        wire if dimension.supports(Behavior::All) && wire == all_wire_value(dimension) => {
            Some(Behavior::All)
        }
        _ => None,
    };

    match (parsed, names.is_empty()) {
        (Some(Behavior::None), true) => Ok(Forwarding::None),
        (Some(Behavior::All), true) => Ok(Forwarding::All),
        (Some(Behavior::Whitelist), false) => {
            Ok(Forwarding::Whitelist(names.into_iter().collect()))
        }
        (Some(_), _) => Err(PolicyError::malformed(format!(
            "{dimension}: behavior `{behavior}` with {} items",
            names.len()
        ))),
        (None, _) => Err(PolicyError::malformed(format!(
            "{dimension}: unknown behavior `{behavior}`"
        ))),
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = BTreeSet::new();
    names
        .iter()
        .find(|name| !seen.insert(name.as_str()))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> PolicyConfig {
        PolicyConfig::new("p1")
            .with_comment("test comment")
            .with_cookies(Forwarding::whitelist(["test"]))
            .with_headers(Forwarding::whitelist(["test"]))
            .with_query_strings(Forwarding::whitelist(["test"]))
    }

    #[test]
    fn whitelist_round_trips() {
        let config = sample();
        assert_eq!(to_desired(&to_remote(&config)).expect("decode"), config);
    }

    #[test]
    fn none_and_all_round_trip() {
        let config = PolicyConfig::new("p2").with_headers(Forwarding::All);
        let remote = to_remote(&config);
        assert_eq!(remote.headers_config.header_behavior, "allViewer");
        assert!(remote.headers_config.headers.is_none());
        assert!(remote.cookies_config.cookies.is_none());
        assert_eq!(to_desired(&remote).expect("decode"), config);
    }

    #[test]
    fn wire_shape_matches_api() {
        let value = serde_json::to_value(to_remote(&sample())).expect("serialize");
        assert_eq!(
            value,
            json!({
                "Name": "p1",
                "Comment": "test comment",
                "CookiesConfig": {
                    "CookieBehavior": "whitelist",
                    "Cookies": { "Quantity": 1, "Items": ["test"] }
                },
                "HeadersConfig": {
                    "HeaderBehavior": "whitelist",
                    "Headers": { "Quantity": 1, "Items": ["test"] }
                },
                "QueryStringsConfig": {
                    "QueryStringBehavior": "whitelist",
                    "QueryStrings": { "Quantity": 1, "Items": ["test"] }
                }
            })
        );
    }

    #[test]
    fn items_are_emitted_in_canonical_order() {
        let config = PolicyConfig::new("p").with_cookies(Forwarding::whitelist(["b", "a"]));
        let remote = to_remote(&config);
        let cookies = remote.cookies_config.cookies.expect("cookies");
        assert_eq!(cookies.quantity, 2);
        assert_eq!(cookies.items, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn explicit_empty_list_decodes_as_none() {
        let mut remote = to_remote(&PolicyConfig::new("p"));
        remote.cookies_config.cookies = Some(RemoteItems {
            quantity: 0,
            items: None,
        });
        let config = to_desired(&remote).expect("decode");
        assert_eq!(config.cookies, Forwarding::None);
    }

    #[test]
    fn quantity_mismatch_is_malformed() {
        let mut remote = to_remote(&sample());
        remote.cookies_config.cookies = Some(RemoteItems {
            quantity: 2,
            items: Some(vec!["test".into()]),
        });
        let err = to_desired(&remote).expect_err("mismatch");
        assert!(matches!(
            err,
            PolicyError::Fatal { code: Some(code), .. } if code == "MalformedResponse"
        ));
    }

    #[test]
    fn duplicate_items_are_malformed() {
        let mut remote = to_remote(&sample());
        remote.headers_config.headers = Some(RemoteItems {
            quantity: 2,
            items: Some(vec!["a".into(), "a".into()]),
        });
        let err = to_desired(&remote).expect_err("duplicate");
        assert!(matches!(
            err,
            PolicyError::Fatal { code: Some(ref code), .. } if code == "MalformedResponse"
        ));
        assert!(err.to_string().contains("`a` listed more than once"));
    }

    #[test]
    fn case_variants_are_not_duplicates() {
        let mut remote = to_remote(&sample());
        remote.headers_config.headers = Some(RemoteItems {
            quantity: 2,
            items: Some(vec!["Accept".into(), "accept".into()]),
        });
        let config = to_desired(&remote).expect("decode");
        assert_eq!(config.headers.item_count(), 2);
    }

    #[test]
    fn unknown_behavior_is_malformed() {
        let mut remote = to_remote(&sample());
        remote.query_strings_config.query_string_behavior = "allExcept".into();
        assert!(to_desired(&remote).is_err());
    }

    #[test]
    fn cookies_do_not_decode_header_all_value() {
        let mut remote = to_remote(&sample());
        remote.cookies_config.cookie_behavior = "allViewer".into();
        remote.cookies_config.cookies = None;
        assert!(to_desired(&remote).is_err());
    }

    #[test]
    fn whitelist_without_items_is_malformed() {
        let mut remote = to_remote(&sample());
        remote.headers_config.headers = None;
        assert!(to_desired(&remote).is_err());
    }

    #[test]
    fn empty_remote_comment_is_absent() {
        let mut remote = to_remote(&sample());
        remote.comment = Some(String::new());
        assert_eq!(to_desired(&remote).expect("decode").comment, None);
    }

    #[test]
    fn envelope_deserializes_remote_policy() {
        let config = serde_json::to_value(to_remote(&sample())).expect("serialize");
        let policy: RemotePolicy = serde_json::from_value(json!({
            "Id": "abc-123",
            "LastModifiedTime": "2024-01-02T03:04:05Z",
            "OriginRequestPolicyConfig": config
        }))
        .expect("deserialize");
        let stored = PolicyEnvelope {
            policy,
            etag: ETag::new("E1"),
        }
        .into_stored()
        .expect("stored");
        assert_eq!(stored.id.as_str(), "abc-123");
        assert_eq!(stored.config, sample());
        assert!(stored.last_modified.is_some());
    }
}
