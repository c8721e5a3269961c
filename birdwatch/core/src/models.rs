//! API Models
//!
//! Serde types for the v2 API payloads used by the client: tweets, users,
//! filter rules and the records pushed over the filtered stream.
//!
//! Almost every field is optional on the wire (which fields arrive depends
//! on the `tweet.fields`/`user.fields`/`expansions` the caller asked for),
//! so fields default when absent. Fields without a typed counterpart are
//! kept in `extra` so a record serializes back to what the server sent.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Tweets and Users
// =============================================================================

/// A user mentioned in a tweet
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// Start offset in the tweet text
    pub start: u32,
    /// End offset in the tweet text
    pub end: u32,
    /// Mentioned username, without `@`
    pub username: String,
    /// Mentioned user id (present with the `entities.mentions.username` expansion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A hashtag in a tweet
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashtag {
    /// Start offset in the tweet text
    pub start: u32,
    /// End offset in the tweet text
    pub end: u32,
    /// Tag text, without `#`
    pub tag: String,
}

/// Entities parsed out of a tweet's text
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    /// Mentioned users
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<Mention>,
    /// Hashtags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<Hashtag>,
    /// Other entity kinds (urls, cashtags, annotations)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entities {
    /// True when no entity of any kind is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty() && self.hashtags.is_empty() && self.extra.is_empty()
    }
}

/// Public engagement counters of a tweet
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweetPublicMetrics {
    /// Retweet count
    pub retweet_count: u64,
    /// Reply count
    pub reply_count: u64,
    /// Like count
    pub like_count: u64,
    /// Quote count
    pub quote_count: u64,
}

/// A tweet
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    /// Tweet id
    pub id: String,
    /// Tweet text
    #[serde(default)]
    pub text: String,
    /// Author user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    /// Id of the conversation root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// BCP47 language tag detected by the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Id of the user this tweet replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_user_id: Option<String>,
    /// Parsed entities
    #[serde(default, skip_serializing_if = "Entities::is_empty")]
    pub entities: Entities,
    /// Engagement counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_metrics: Option<TweetPublicMetrics>,
    /// Requested fields without a typed counterpart (`referenced_tweets`,
    /// `attachments`, `geo`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Public counters of a user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPublicMetrics {
    /// Followers
    pub followers_count: u64,
    /// Accounts followed
    pub following_count: u64,
    /// Tweets posted
    pub tweet_count: u64,
    /// Lists the user is on
    pub listed_count: u64,
}

/// A user
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Handle, without `@`
    #[serde(default)]
    pub username: String,
    /// Profile URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Bio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Account creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Whether the account is verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    /// Whether the account is protected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<bool>,
    /// Pinned tweet id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_tweet_id: Option<String>,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    /// Counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_metrics: Option<UserPublicMetrics>,
    /// Requested fields without a typed counterpart
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Expanded objects referenced by the primary payload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Includes {
    /// Expanded users
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<User>,
    /// Expanded tweets
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tweets: Vec<Tweet>,
    /// Other expansions (`media`, `places`, `polls`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An error object reported inside a response or stream record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericError {
    /// Short error title
    pub title: String,
    /// Human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Problem type URI
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Offending value, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Offending parameter, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    /// Resource type the error concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Response section the error belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl fmt::Display for GenericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        if let Some(ref detail) = self.detail {
            write!(f, ": {detail}")?;
        }
        if let Some(ref value) = self.value {
            write!(f, " ({value})")?;
        }
        Ok(())
    }
}

// =============================================================================
// Stream Records
// =============================================================================

/// A filter rule that matched a streamed tweet
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingRule {
    /// Rule id
    pub id: String,
    /// Rule tag, if one was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// One record pushed over a tweet stream
///
/// Either a tweet (with optional includes) or an inline server error. The
/// server multiplexes error notifications into the stream instead of
/// failing the connection; those are delivered like any other record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// The tweet
    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub tweet: Option<Tweet>,
    /// Expanded objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<Includes>,
    /// Inline server errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GenericError>,
    /// Rules that matched (filtered stream only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matching_rules: Vec<MatchingRule>,
    /// Top-level members without a typed counterpart
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamRecord {
    /// True when the record carries neither a tweet nor errors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tweet.is_none() && self.errors.is_empty()
    }

    /// True when the record is an inline server error without a tweet
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.tweet.is_none() && !self.errors.is_empty()
    }

    /// Look up an expanded user by id
    #[must_use]
    pub fn included_user(&self, id: &str) -> Option<&User> {
        self.includes
            .as_ref()
            .and_then(|includes| includes.users.iter().find(|u| u.id == id))
    }

    /// The author of the tweet, if it was expanded
    #[must_use]
    pub fn author(&self) -> Option<&User> {
        let author_id = self.tweet.as_ref()?.author_id.as_deref()?;
        self.included_user(author_id)
    }
}

// =============================================================================
// Rules
// =============================================================================

/// A filtered-stream rule
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule id (assigned by the server; empty when adding)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Rule query
    pub value: String,
    /// Optional label echoed back in `matching_rules`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Rule {
    /// Create a rule to add
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Set the tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Counters returned when rules are added or deleted
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSummary {
    /// Rules created
    pub created: u32,
    /// Rules not created
    pub not_created: u32,
    /// Valid rules
    pub valid: u32,
    /// Invalid rules
    pub invalid: u32,
    /// Rules deleted
    pub deleted: u32,
    /// Rules not deleted
    pub not_deleted: u32,
}

/// Metadata of a rules response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleMeta {
    /// Server timestamp of the request
    pub sent: String,
    /// Add/delete counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RuleSummary>,
    /// Number of rules listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_count: Option<u32>,
}

/// Rule ids to delete
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRules {
    /// Ids to delete
    pub ids: Vec<String>,
}

/// Request body for adding and/or deleting rules
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOrDeleteRulesRequest {
    /// Rules to add
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<Rule>,
    /// Rules to delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<DeleteRules>,
}

impl AddOrDeleteRulesRequest {
    /// Request that adds the given rules
    #[must_use]
    pub fn add(rules: Vec<Rule>) -> Self {
        Self {
            add: rules,
            delete: None,
        }
    }

    /// Request that deletes the given rule ids
    #[must_use]
    pub fn delete(ids: Vec<String>) -> Self {
        Self {
            add: Vec::new(),
            delete: Some(DeleteRules { ids }),
        }
    }
}

/// Response to an add/delete rules request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddOrDeleteRulesResponse {
    /// Rules created
    #[serde(rename = "data")]
    pub rules: Vec<Rule>,
    /// Metadata
    pub meta: RuleMeta,
    /// Per-rule errors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GenericError>,
}

/// Response listing the active rules
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetRulesResponse {
    /// Active rules
    #[serde(rename = "data")]
    pub rules: Vec<Rule>,
    /// Metadata
    pub meta: RuleMeta,
}

// =============================================================================
// Search and Lookup
// =============================================================================

/// Pagination metadata of a search response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweetMeta {
    /// Newest tweet id in the page
    pub newest_id: Option<String>,
    /// Oldest tweet id in the page
    pub oldest_id: Option<String>,
    /// Tweets in the page
    pub result_count: u32,
    /// Token for the next page
    pub next_token: Option<String>,
}

/// Response of a recent-search request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRecentTweetsResponse {
    /// Matching tweets
    #[serde(rename = "data")]
    pub tweets: Vec<Tweet>,
    /// Expanded objects
    pub includes: Includes,
    /// Pagination
    pub meta: TweetMeta,
}

/// Response of a user lookup
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupUserResponse {
    /// The user, when found
    pub data: Option<User>,
    /// Errors (e.g. user not found)
    pub errors: Vec<GenericError>,
}
