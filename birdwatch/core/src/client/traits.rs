//! Connection Traits
//!
//! The streaming core only needs one thing from the network: an open,
//! authenticated byte stream positioned at the first record. This trait
//! keeps it independent of the HTTP stack so tests can feed it canned
//! bodies.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::ClientError;
use crate::params::QueryParameters;

/// Body of an open streaming connection
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Opens streaming connections
///
/// Implement this trait to plug a different transport under
/// [`StreamClient`](crate::streaming::StreamClient).
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open a long-lived request and return its body
    ///
    /// `path` is relative to the API version prefix. Returns once the
    /// response headers have arrived with a success status.
    async fn open_stream(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &QueryParameters,
    ) -> Result<ByteStream, ClientError>;
}
