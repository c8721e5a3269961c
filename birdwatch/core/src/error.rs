//! Error Types
//!
//! One enum per failure domain:
//!
//! - [`ClientError`]: opening a connection or calling a REST endpoint failed.
//!   Surfaced synchronously to the caller; a stream that fails here never
//!   starts.
//! - [`DecodeError`]: the byte stream of an open connection could not be
//!   turned into a record. Fatal to that one stream only.
//! - [`StreamError`]: why a stream processor stopped with an error, as seen
//!   through [`StreamHandle::finish`](crate::streaming::StreamHandle::finish).
//! - [`RegistryError`]: the stream registry refused an entry.
//! - [`ConfigError`]: a configuration file could not be read or parsed.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::models::GenericError;
use crate::params::Endpoint;
use crate::streaming::StreamId;

// =============================================================================
// Client Errors
// =============================================================================

/// Errors from building, sending or validating API requests
#[derive(Debug, Error)]
pub enum ClientError {
    /// No bearer token was configured
    #[error("no bearer token configured")]
    MissingCredentials,

    /// The configured base URL could not be parsed or joined
    #[error("invalid API URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL or path
        url: String,
        /// Parser message
        reason: String,
    },

    /// A query parameter key is not accepted by the endpoint
    #[error("query parameter key invalid for {endpoint}: {key}")]
    InvalidParameterKey {
        /// Endpoint the parameters were validated against
        endpoint: Endpoint,
        /// The rejected key
        key: String,
    },

    /// A query parameter value is not one of the accepted values for its key
    #[error("query parameter key value invalid: {key}={value}")]
    InvalidParameterValue {
        /// Key the value was given for
        key: String,
        /// The rejected value
        value: String,
    },

    /// A parameter the endpoint requires is missing
    #[error("missing required query parameter for {endpoint}: {key}")]
    MissingParameter {
        /// Endpoint the parameters were validated against
        endpoint: Endpoint,
        /// The missing key
        key: &'static str,
    },

    /// The server answered with a non-2xx status
    #[error("request failed with status {status}: {body}")]
    Status {
        /// HTTP status code
        status: StatusCode,
        /// Response body, if it could be read
        body: String,
    },

    /// The server answered 2xx but reported errors in the payload
    #[error("API reported {} error(s): {}", .0.len(), join_errors(.0))]
    Api(Vec<GenericError>),

    /// Transport-level failure (DNS, TLS, connect, body decode)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The stream could not be registered
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn join_errors(errors: &[GenericError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Stream Errors
// =============================================================================

/// Errors that terminate a single stream while decoding its body
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Reading the next chunk from the connection failed
    #[error("failed to read stream body: {0}")]
    Read(#[from] std::io::Error),

    /// The bytes at the current position are not a valid record
    #[error("unable to decode stream message: {source} (near `{snippet}`)")]
    Malformed {
        /// Parser error
        #[source]
        source: serde_json::Error,
        /// Leading bytes of the rejected input, lossily decoded
        snippet: String,
    },

    /// The connection ended in the middle of a record
    #[error("stream ended inside a record ({pending} bytes pending)")]
    Truncated {
        /// Number of undecoded bytes left in the buffer
        pending: usize,
    },

    /// A syntactically valid record carried neither a payload nor errors
    #[error("no tweet or error present on stream message")]
    EmptyRecord,

    /// A single record grew past the configured limit
    #[error("record exceeds {limit} bytes ({size} buffered)")]
    RecordTooLarge {
        /// Bytes buffered so far
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Nothing, not even a keep-alive, arrived within the idle window
    #[error("no data received for {0:?}")]
    Stalled(Duration),
}

/// Errors a stream processor can finish with
#[derive(Debug, Error)]
pub enum StreamError {
    /// The body could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The processor task panicked or was aborted
    #[error("stream processor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The outcome was already collected by an earlier `finish` call
    #[error("stream outcome already taken")]
    OutcomeTaken,
}

/// Errors from the stream registry
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A stream with this id is already registered
    #[error("stream {0} is already registered")]
    DuplicateId(StreamId),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        /// Path that was parsed
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },
}
