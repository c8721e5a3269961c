//! Stream Client
//!
//! Entry point for opening streams: validates the query, opens the
//! connection through a [`StreamConnector`], and spawns a processor bound to
//! a new handle in the client's registry.

use tokio_util::sync::CancellationToken;

use super::handle::StreamHandle;
use super::processor::spawn_stream;
use super::registry::StreamRegistry;
use super::StreamConfig;
use crate::client::StreamConnector;
use crate::error::ClientError;
use crate::params::{Endpoint, QueryParameters};

/// Opens streams and tracks them in a registry
pub struct StreamClient<C> {
    connector: C,
    registry: StreamRegistry,
    config: StreamConfig,
}

impl<C: StreamConnector> StreamClient<C> {
    /// Create a client with its own registry and default stream settings
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, StreamRegistry::new(), StreamConfig::default())
    }

    /// Create a client sharing `registry`
    pub fn with_config(connector: C, registry: StreamRegistry, config: StreamConfig) -> Self {
        Self {
            connector,
            registry,
            config,
        }
    }

    /// Registry every stream of this client is tracked in
    #[must_use]
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// The underlying connector
    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open the filtered stream
    ///
    /// Returns as soon as the connection is established; records then arrive
    /// on the handle. `cancel` stops the stream when fired.
    ///
    /// # Errors
    ///
    /// Parameter validation errors, connection failures and non-2xx
    /// statuses. No stream is registered when this fails.
    pub async fn search_stream(
        &self,
        params: &QueryParameters,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle, ClientError> {
        self.open(Endpoint::SearchStream, params, cancel).await
    }

    /// Open the volume (sample) stream
    ///
    /// # Errors
    ///
    /// Same as [`StreamClient::search_stream`].
    pub async fn sample_stream(
        &self,
        params: &QueryParameters,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle, ClientError> {
        self.open(Endpoint::SampleStream, params, cancel).await
    }

    /// Close every stream opened through this client's registry
    pub fn shutdown_all(&self) -> usize {
        self.registry.shutdown_all()
    }

    async fn open(
        &self,
        endpoint: Endpoint,
        params: &QueryParameters,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle, ClientError> {
        endpoint.validate(params)?;

        let body = self
            .connector
            .open_stream(endpoint.method(), endpoint.path(), params)
            .await?;
        let handle = spawn_stream(&self.registry, body, cancel, &self.config)?;

        tracing::info!(stream_id = %handle.id(), %endpoint, "Stream opened");
        Ok(handle)
    }
}

impl<C> std::fmt::Debug for StreamClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
