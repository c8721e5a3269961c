//! Stream ingestion loop
//!
//! Keeps one filtered stream open, writes every record as a JSON line, and
//! reconnects with a fixed delay when the stream ends or fails. The core
//! never reconnects on its own; this loop is the only place that does.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use birdwatch_core::{QueryParameters, StreamConnector, StreamClient, StreamHandle, Termination};

/// Reconnect policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed connections tolerated before giving up
    pub attempts: u32,
    /// Pause between connections
    pub delay: Duration,
}

/// Owns the stream client and drives the reconnect loop
pub struct Ingestor<C> {
    client: StreamClient<C>,
    params: QueryParameters,
    cancel: CancellationToken,
    policy: ReconnectPolicy,
}

impl<C: StreamConnector> Ingestor<C> {
    pub fn new(
        client: StreamClient<C>,
        params: QueryParameters,
        cancel: CancellationToken,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            client,
            params,
            cancel,
            policy,
        }
    }

    /// Stream into `out` until cancelled or out of reconnect attempts
    ///
    /// Returns the number of records written.
    pub async fn run<W>(&self, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut failures = 0u32;
        let mut total = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(total);
            }

            // A session that delivered records is healthy however it ended.
            let delivered = match self.client.search_stream(&self.params, &self.cancel).await {
                Ok(mut handle) => {
                    info!(stream_id = %handle.id(), "Connected to filtered stream");
                    let written = pump(&mut handle, out).await?;
                    total += written;

                    match handle.finish().await {
                        Ok(Termination::Cancelled | Termination::Closed) => return Ok(total),
                        Ok(termination) => warn!(?termination, written, "Stream ended"),
                        Err(e) => warn!(error = %e, written, "Stream failed"),
                    }
                    written > 0
                }
                Err(e) => {
                    warn!(error = %e, "Failed to open stream");
                    false
                }
            };

            if delivered {
                failures = 0;
            } else {
                failures += 1;
                if failures > self.policy.attempts {
                    anyhow::bail!(
                        "Giving up after {} consecutive failed connections",
                        failures
                    );
                }
            }

            info!(
                attempt = failures,
                delay_ms = self.policy.delay.as_millis(),
                "Reconnecting"
            );
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(total),
                () = tokio::time::sleep(self.policy.delay) => {}
            }
        }
    }
}

/// Write every record of `handle` to `out`, one JSON object per line
pub async fn pump<W>(handle: &mut StreamHandle, out: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(record) = handle.recv().await {
        if record.is_server_error() {
            for error in &record.errors {
                warn!(stream_id = %handle.id(), %error, "Server error on stream");
            }
        }

        let mut line = serde_json::to_vec(&record).context("Failed to encode record")?;
        line.push(b'\n');
        out.write_all(&line).await.context("Failed to write record")?;
        out.flush().await.context("Failed to flush output")?;
        written += 1;
    }
    Ok(written)
}
