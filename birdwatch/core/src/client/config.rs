//! Client Configuration

use serde::{Deserialize, Serialize};

/// Default API host
pub const DEFAULT_API_URL: &str = "https://api.twitter.com";

/// Connection settings for [`ApiClient`](super::ApiClient)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API host, without the version prefix
    pub base_url: String,

    /// OAuth 2.0 app-only bearer token
    pub bearer_token: Option<String>,

    /// `User-Agent` header value
    pub user_agent: String,

    /// Total timeout for REST calls in milliseconds (0 = none)
    ///
    /// Never applied to streaming requests, which stay open indefinitely.
    pub request_timeout_ms: u64,

    /// TCP/TLS connect timeout in milliseconds (0 = none)
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            bearer_token: None,
            user_agent: concat!("birdwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden from the environment
    ///
    /// Reads `TWITTER_BEARER_TOKEN` (falling back to `BIRDWATCH_BEARER_TOKEN`)
    /// and `TWITTER_API_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of this configuration
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("TWITTER_BEARER_TOKEN")
            .or_else(|_| std::env::var("BIRDWATCH_BEARER_TOKEN"))
        {
            if !token.is_empty() {
                self.bearer_token = Some(token);
            }
        }
        if let Ok(url) = std::env::var("TWITTER_API_URL") {
            if !url.is_empty() {
                self.base_url = url;
            }
        }
        self
    }

    /// Set the bearer token
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the API host
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}
