//! Query Parameters
//!
//! Query parameters are a multimap from key to values; values for one key
//! are sent comma-joined (`tweet.fields=entities,author_id`).
//!
//! Every endpoint accepts a fixed set of keys, and the field-selection keys
//! accept a fixed set of values. Both are static tables here, checked before
//! any request leaves the process.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

// =============================================================================
// Accepted Values
// =============================================================================

/// Values accepted for `tweet.fields`
pub const TWEET_FIELDS: &[&str] = &[
    "attachments",
    "author_id",
    "context_annotations",
    "conversation_id",
    "created_at",
    "entities",
    "geo",
    "id",
    "in_reply_to_user_id",
    "lang",
    "non_public_metrics",
    "public_metrics",
    "organic_metrics",
    "promoted_metrics",
    "possibly_sensitive",
    "referenced_tweets",
    "reply_settings",
    "source",
    "text",
    "withheld",
];

/// Values accepted for `user.fields`
pub const USER_FIELDS: &[&str] = &[
    "created_at",
    "description",
    "entities",
    "id",
    "location",
    "name",
    "pinned_tweet_id",
    "profile_image_url",
    "protected",
    "public_metrics",
    "url",
    "username",
    "verified",
    "withheld",
];

/// Values accepted for `expansions` on tweet endpoints
pub const TWEET_EXPANSIONS: &[&str] = &[
    "attachments.poll_ids",
    "attachments.media_keys",
    "author_id",
    "entities.mentions.username",
    "geo.place_id",
    "in_reply_to_user_id",
    "referenced_tweets.id",
    "referenced_tweets.id.author_id",
];

/// Values accepted for `expansions` on user endpoints
pub const USER_EXPANSIONS: &[&str] = &["pinned_tweet_id"];

const SEARCH_RECENT_KEYS: &[&str] = &[
    "query",
    "start_time",
    "end_time",
    "since_id",
    "until_id",
    "max_results",
    "next_token",
    "expansions",
    "tweet.fields",
    "user.fields",
    "media.fields",
    "place.fields",
    "poll.fields",
];

const STREAM_KEYS: &[&str] = &[
    "backfill_minutes",
    "expansions",
    "tweet.fields",
    "user.fields",
    "media.fields",
    "place.fields",
    "poll.fields",
];

// =============================================================================
// Endpoints
// =============================================================================

/// API endpoints with a known parameter schema
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// `GET /tweets/search/stream`
    SearchStream,
    /// `GET /tweets/sample/stream`
    SampleStream,
    /// `GET /tweets/search/recent`
    SearchRecent,
    /// `GET /tweets/search/stream/rules`
    GetRules,
    /// `POST /tweets/search/stream/rules`
    ChangeRules,
    /// `GET /users/:id`
    UserLookup,
}

impl Endpoint {
    /// Path under the API version prefix
    ///
    /// For [`Endpoint::UserLookup`] this is the collection path; the user id
    /// is appended by the caller.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::SearchStream => "/tweets/search/stream",
            Self::SampleStream => "/tweets/sample/stream",
            Self::SearchRecent => "/tweets/search/recent",
            Self::GetRules | Self::ChangeRules => "/tweets/search/stream/rules",
            Self::UserLookup => "/users",
        }
    }

    /// HTTP method
    #[must_use]
    pub fn method(self) -> reqwest::Method {
        match self {
            Self::ChangeRules => reqwest::Method::POST,
            _ => reqwest::Method::GET,
        }
    }

    /// Keys this endpoint accepts
    #[must_use]
    pub fn accepted_keys(self) -> &'static [&'static str] {
        match self {
            Self::SearchStream | Self::SampleStream => STREAM_KEYS,
            Self::SearchRecent => SEARCH_RECENT_KEYS,
            Self::GetRules => &["ids"],
            Self::ChangeRules => &["dry_run"],
            Self::UserLookup => &["expansions", "tweet.fields", "user.fields"],
        }
    }

    /// Keys this endpoint requires
    #[must_use]
    pub fn required_keys(self) -> &'static [&'static str] {
        match self {
            Self::SearchRecent => &["query"],
            _ => &[],
        }
    }

    /// Values accepted for `key`, or `None` when the key is free-form
    #[must_use]
    pub fn accepted_values(self, key: &str) -> Option<&'static [&'static str]> {
        match key {
            "tweet.fields" => Some(TWEET_FIELDS),
            "user.fields" => Some(USER_FIELDS),
            "expansions" if self == Self::UserLookup => Some(USER_EXPANSIONS),
            "expansions" => Some(TWEET_EXPANSIONS),
            _ => None,
        }
    }

    /// Check `params` against this endpoint's schema
    ///
    /// # Errors
    ///
    /// Returns the first unknown key, unknown value or missing required key.
    pub fn validate(self, params: &QueryParameters) -> Result<(), ClientError> {
        for (key, values) in params.iter() {
            if !self.accepted_keys().contains(&key) {
                return Err(ClientError::InvalidParameterKey {
                    endpoint: self,
                    key: key.to_string(),
                });
            }

            if let Some(accepted) = self.accepted_values(key) {
                if let Some(value) = values.iter().find(|v| !accepted.contains(&v.as_str())) {
                    return Err(ClientError::InvalidParameterValue {
                        key: key.to_string(),
                        value: value.clone(),
                    });
                }
            }
        }

        if let Some(key) = self
            .required_keys()
            .iter()
            .find(|key| !params.contains_key(key))
        {
            return Err(ClientError::MissingParameter {
                endpoint: self,
                key: *key,
            });
        }

        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = match self {
            Self::UserLookup => "/users/:id",
            other => other.path(),
        };
        write!(f, "{} {path}", self.method())
    }
}

// =============================================================================
// Query Parameters
// =============================================================================

/// Ordered multimap of query parameters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParameters(BTreeMap<String, Vec<String>>);

impl QueryParameters {
    /// Empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append values for `key`
    pub fn insert<I, V>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.0
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    /// Builder form of [`QueryParameters::insert`]
    #[must_use]
    pub fn with<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.insert(key, values);
        self
    }

    /// Values for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Whether `key` is present
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether no parameters are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate keys with their values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Key/value pairs ready for the query string, values comma-joined
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(key, values)| (key.clone(), values.join(",")))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, [value]);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pairs_are_comma_joined() {
        let params = QueryParameters::new()
            .with("user.fields", ["username", "url"])
            .with("expansions", ["author_id"]);

        assert_eq!(
            params.to_pairs(),
            vec![
                ("expansions".to_string(), "author_id".to_string()),
                ("user.fields".to_string(), "username,url".to_string()),
            ]
        );
    }

    #[test]
    fn test_insert_appends() {
        let mut params = QueryParameters::new();
        params.insert("tweet.fields", ["entities"]);
        params.insert("tweet.fields", ["lang"]);
        assert_eq!(
            params.get("tweet.fields"),
            Some(&["entities".to_string(), "lang".to_string()][..])
        );
    }

    #[test]
    fn test_stream_accepts_field_keys() {
        let params = QueryParameters::new()
            .with("user.fields", ["username", "url", "location", "public_metrics"])
            .with("tweet.fields", ["entities"])
            .with("expansions", ["author_id", "entities.mentions.username"]);

        assert!(Endpoint::SearchStream.validate(&params).is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let params = QueryParameters::new().with("max_results", ["10"]);
        let err = Endpoint::GetRules.validate(&params).unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidParameterKey { ref key, endpoint: Endpoint::GetRules } if key == "max_results"
        ));
    }

    #[test]
    fn test_unknown_value_rejected() {
        let params = QueryParameters::new().with("tweet.fields", ["entities", "favourites"]);
        let err = Endpoint::SearchStream.validate(&params).unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidParameterValue { ref key, ref value }
                if key == "tweet.fields" && value == "favourites"
        ));
    }

    #[test]
    fn test_user_lookup_expansions_are_user_specific() {
        let ok = QueryParameters::new().with("expansions", ["pinned_tweet_id"]);
        assert!(Endpoint::UserLookup.validate(&ok).is_ok());

        let bad = QueryParameters::new().with("expansions", ["author_id"]);
        assert!(Endpoint::UserLookup.validate(&bad).is_err());
    }

    #[test]
    fn test_search_recent_requires_query() {
        let params = QueryParameters::new().with("max_results", ["10"]);
        let err = Endpoint::SearchRecent.validate(&params).unwrap_err();
        assert!(matches!(err, ClientError::MissingParameter { key: "query", .. }));

        let params = params.with("query", ["#rust -is:retweet"]);
        assert!(Endpoint::SearchRecent.validate(&params).is_ok());
    }

    #[test]
    fn test_free_form_keys_not_value_checked() {
        let params = QueryParameters::new().with("media.fields", ["anything"]);
        assert!(Endpoint::SearchStream.validate(&params).is_ok());
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::SearchStream.to_string(), "GET /tweets/search/stream");
        assert_eq!(
            Endpoint::ChangeRules.to_string(),
            "POST /tweets/search/stream/rules"
        );
        assert_eq!(Endpoint::UserLookup.to_string(), "GET /users/:id");
    }

    #[test]
    fn test_from_iterator() {
        let params: QueryParameters = [("ids", "1"), ("ids", "2")].into_iter().collect();
        assert_eq!(params.to_pairs(), vec![("ids".to_string(), "1,2".to_string())]);
    }
}
