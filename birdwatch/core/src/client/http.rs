//! HTTP API Client
//!
//! `reqwest`-based client for the v2 API. Every request is authenticated
//! with an app-only bearer token and asks for JSON.
//!
//! # Endpoints
//!
//! - `GET  /2/tweets/search/stream` - filtered stream (via [`StreamConnector`])
//! - `GET  /2/tweets/sample/stream` - sample stream (via [`StreamConnector`])
//! - `GET  /2/tweets/search/stream/rules` - list filter rules
//! - `POST /2/tweets/search/stream/rules` - add or delete filter rules
//! - `GET  /2/tweets/search/recent` - search the last seven days
//! - `GET  /2/users/:id` - look up one user
//!
//! Streaming requests carry only a connect timeout; REST calls additionally
//! carry the configured request timeout.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONNECTION};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use super::config::ClientConfig;
use super::traits::{ByteStream, StreamConnector};
use crate::error::ClientError;
use crate::models::{
    AddOrDeleteRulesRequest, AddOrDeleteRulesResponse, GetRulesResponse, LookupUserResponse,
    SearchRecentTweetsResponse, User,
};
use crate::params::{Endpoint, QueryParameters};

/// Version prefix every path is resolved under
pub const API_V2_PATH: &str = "/2";

/// Authenticated client for the v2 API
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    bearer_token: String,
    request_timeout: Option<Duration>,
}

impl ApiClient {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// [`ClientError::MissingCredentials`] without a bearer token,
    /// [`ClientError::InvalidUrl`] for an unparsable base URL, or
    /// [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let bearer_token = config
            .bearer_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(ClientError::MissingCredentials)?;

        let base_url = Url::parse(&config.base_url).map_err(|e| ClientError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if config.connect_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
            bearer_token,
            request_timeout: (config.request_timeout_ms > 0)
                .then(|| Duration::from_millis(config.request_timeout_ms)),
        })
    }

    /// Build a client from environment variables
    ///
    /// # Errors
    ///
    /// See [`ApiClient::new`].
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(&ClientConfig::from_env())
    }

    /// The API host
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path under the version prefix
    ///
    /// Any path already on the base URL (a proxy mount point) is kept.
    fn url(&self, path: &str) -> Result<Url, ClientError> {
        if self.base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }
        let full = format!(
            "{}{API_V2_PATH}{path}",
            self.base_url.path().trim_end_matches('/')
        );
        let mut url = self.base_url.clone();
        url.set_path(&full);
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        query: &QueryParameters,
    ) -> Result<RequestBuilder, ClientError> {
        let url = self.url(path)?;
        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(&self.bearer_token)
            .header(ACCEPT, "application/json");
        if !query.is_empty() {
            builder = builder.query(&query.to_pairs());
        }
        Ok(builder)
    }

    /// Request with the REST timeout applied
    fn rest_request(
        &self,
        method: Method,
        path: &str,
        query: &QueryParameters,
    ) -> Result<RequestBuilder, ClientError> {
        let builder = self.request(method, path, query)?;
        Ok(match self.request_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        })
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let response = check_status(builder.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Add and/or delete filtered-stream rules
    ///
    /// With `dry_run` the server validates the rules without applying them.
    ///
    /// # Errors
    ///
    /// [`ClientError::Api`] if the server rejected any rule, plus the usual
    /// transport and status errors.
    pub async fn add_or_delete_rules(
        &self,
        request: &AddOrDeleteRulesRequest,
        dry_run: bool,
    ) -> Result<AddOrDeleteRulesResponse, ClientError> {
        let mut query = QueryParameters::new();
        if dry_run {
            query.insert("dry_run", ["true"]);
        }
        Endpoint::ChangeRules.validate(&query)?;

        let builder = self
            .rest_request(Method::POST, Endpoint::ChangeRules.path(), &query)?
            .json(request);
        let response: AddOrDeleteRulesResponse = Self::send_json(builder).await?;

        if !response.errors.is_empty() {
            tracing::warn!(errors = response.errors.len(), "Rule change rejected");
            return Err(ClientError::Api(response.errors));
        }
        tracing::info!(
            added = request.add.len(),
            deleted = request.delete.as_ref().map_or(0, |d| d.ids.len()),
            dry_run,
            "Rules changed"
        );
        Ok(response)
    }

    /// List the active filtered-stream rules
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidParameterKey`] for any key but `ids`, plus the
    /// usual transport and status errors.
    pub async fn get_rules(&self, params: &QueryParameters) -> Result<GetRulesResponse, ClientError> {
        Endpoint::GetRules.validate(params)?;
        let builder = self.rest_request(Method::GET, Endpoint::GetRules.path(), params)?;
        Self::send_json(builder).await
    }

    // =========================================================================
    // Search and Lookup
    // =========================================================================

    /// Search tweets from the last seven days
    ///
    /// # Errors
    ///
    /// [`ClientError::MissingParameter`] without `query`, plus validation,
    /// transport and status errors.
    pub async fn search_recent_tweets(
        &self,
        params: &QueryParameters,
    ) -> Result<SearchRecentTweetsResponse, ClientError> {
        Endpoint::SearchRecent.validate(params)?;
        let builder = self.rest_request(Method::GET, Endpoint::SearchRecent.path(), params)?;
        Self::send_json(builder).await
    }

    /// Look up one user by id
    ///
    /// # Errors
    ///
    /// [`ClientError::Api`] when the server reports the user as missing,
    /// plus validation, transport and status errors.
    pub async fn lookup_user_by_id(
        &self,
        id: &str,
        params: &QueryParameters,
    ) -> Result<User, ClientError> {
        Endpoint::UserLookup.validate(params)?;
        let path = format!("{}/{id}", Endpoint::UserLookup.path());
        let builder = self.rest_request(Method::GET, &path, params)?;
        let response: LookupUserResponse = Self::send_json(builder).await?;
        response.data.ok_or(ClientError::Api(response.errors))
    }
}

#[async_trait]
impl StreamConnector for ApiClient {
    async fn open_stream(
        &self,
        method: Method,
        path: &str,
        query: &QueryParameters,
    ) -> Result<ByteStream, ClientError> {
        let builder = self
            .request(method, path, query)?
            .header(CONNECTION, "keep-alive");
        let response = check_status(builder.send().await?).await?;
        tracing::info!(path, status = %response.status(), "Stream connection opened");

        Ok(response
            .bytes_stream()
            .map_err(io::Error::other)
            .boxed())
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Turn a non-2xx response into [`ClientError::Status`]
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%status, "Request rejected");
    Err(ClientError::Status { status, body })
}
