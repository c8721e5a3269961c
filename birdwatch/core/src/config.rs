//! TOML Configuration File Support
//!
//! Configuration lives in `~/.config/birdwatch/config.toml` (XDG config
//! directory).
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (applied by the caller)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [client]
//! base_url = "https://api.twitter.com"
//! request_timeout_ms = 30000
//!
//! [stream]
//! max_record_bytes = 1048576
//! idle_timeout_ms = 30000
//!
//! [query]
//! tweet_fields = ["entities", "author_id", "created_at"]
//! user_fields = ["username", "public_metrics"]
//! expansions = ["author_id"]
//!
//! [[rules]]
//! value = "#rust -is:retweet"
//! tag = "rust"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::client::ClientConfig;
use crate::error::ConfigError;
use crate::models::Rule;
use crate::params::QueryParameters;
use crate::streaming::StreamConfig;

// =============================================================================
// TOML Structures
// =============================================================================

/// Field selection applied to every stream request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Values for `tweet.fields`
    pub tweet_fields: Vec<String>,
    /// Values for `user.fields`
    pub user_fields: Vec<String>,
    /// Values for `expansions`
    pub expansions: Vec<String>,
}

impl QueryConfig {
    /// Query parameters for a stream request
    #[must_use]
    pub fn to_params(&self) -> QueryParameters {
        let mut params = QueryParameters::new();
        for (key, values) in [
            ("tweet.fields", &self.tweet_fields),
            ("user.fields", &self.user_fields),
            ("expansions", &self.expansions),
        ] {
            if !values.is_empty() {
                params.insert(key, values.iter().cloned());
            }
        }
        params
    }
}

/// Top-level configuration file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BirdwatchToml {
    /// API connection settings
    pub client: ClientConfig,
    /// Per-stream settings
    pub stream: StreamConfig,
    /// Field selection for the filtered stream
    pub query: QueryConfig,
    /// Filter rules to install before streaming
    pub rules: Vec<Rule>,

    /// Path the configuration was loaded from, if any
    #[serde(skip)]
    pub config_file_path: Option<PathBuf>,
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file path
///
/// `$XDG_CONFIG_HOME/birdwatch/config.toml`, typically
/// `~/.config/birdwatch/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("birdwatch").join("config.toml"))
}

/// Load configuration from the default path
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed. A
/// missing file is not an error.
pub fn load_config() -> Result<BirdwatchToml, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from `path`, then apply environment overrides
///
/// With `None`, or a path that does not exist, only defaults and the
/// environment are used.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<BirdwatchToml, ConfigError> {
    let mut config = match path {
        Some(ref config_path) if config_path.exists() => {
            let mut config = parse_file(config_path)?;
            config.config_file_path = Some(config_path.clone());
            tracing::info!(
                path = %config_path.display(),
                rules = config.rules.len(),
                "Loaded configuration from file"
            );
            config
        }
        Some(ref config_path) => {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
            BirdwatchToml::default()
        }
        None => BirdwatchToml::default(),
    };

    config.client = config.client.with_env_overrides();
    Ok(config)
}

fn parse_file(path: &Path) -> Result<BirdwatchToml, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
