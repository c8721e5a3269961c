//! Stream Processor
//!
//! The background task behind every open stream. It owns the connection body
//! (through the decoder) and the sending end of the handle's channel, and is
//! the only writer to that channel.
//!
//! # State Machine
//!
//! ```text
//!   Running ──► Decoding ──► Delivering ──┐
//!                  ▲  │                   │
//!                  │  └── keep-alive      │
//!                  └──────────────────────┘
//!                  │
//!   end / error / cancel / close
//!                  ▼
//!               Closing ──► Terminated
//! ```
//!
//! # Delivery
//!
//! The channel has a single slot. After putting a record in the slot the
//! processor waits until the slot is free again before decoding the next
//! record, so it never runs more than one record ahead of the consumer. Both
//! waits race the stream's cancellation token.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::decoder::{Decoded, RecordDecoder};
use super::handle::{StreamControl, StreamHandle};
use super::registry::StreamRegistry;
use super::StreamConfig;
use crate::error::{RegistryError, StreamError};
use crate::models::StreamRecord;

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of a stream processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProcessorState {
    /// Spawned, not yet reading
    Running = 0,
    /// Waiting for the next record from the connection
    Decoding = 1,
    /// Waiting for the consumer to take a record
    Delivering = 2,
    /// Releasing the handle and the connection
    Closing = 3,
    /// Finished
    Terminated = 4,
}

impl ProcessorState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Decoding,
            2 => Self::Delivering,
            3 => Self::Closing,
            _ => Self::Terminated,
        }
    }
}

/// Why a processor stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Termination {
    /// The server ended the connection between records
    Ended,
    /// The caller's cancellation token fired
    Cancelled,
    /// The handle was closed (by the consumer or a registry shutdown)
    Closed,
    /// The receiving end of the channel went away
    ConsumerGone,
}

// =============================================================================
// Processor
// =============================================================================

/// Drives one stream from its connection body into its handle's channel
pub struct StreamProcessor<S> {
    control: Arc<StreamControl>,
    registry: StreamRegistry,
    decoder: RecordDecoder<S>,
    sender: mpsc::Sender<StreamRecord>,
    delivered: u64,
}

impl<S> StreamProcessor<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    pub(crate) fn new(
        control: Arc<StreamControl>,
        registry: StreamRegistry,
        decoder: RecordDecoder<S>,
        sender: mpsc::Sender<StreamRecord>,
    ) -> Self {
        Self {
            control,
            registry,
            decoder,
            sender,
            delivered: 0,
        }
    }

    /// Run until the stream ends, fails, or is cancelled
    ///
    /// On every path the handle is closed through the registry and the
    /// connection body is dropped before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Decode`] when the body could not be decoded.
    pub async fn run(mut self) -> Result<Termination, StreamError> {
        let outcome = self.drive().await;

        self.control.set_state(ProcessorState::Closing);
        tracing::trace!(state = ?ProcessorState::Closing, "Processor state");
        self.registry.close(&self.control);

        let Self {
            control,
            decoder,
            sender,
            delivered,
            ..
        } = self;
        drop(sender);
        drop(decoder);
        control.set_state(ProcessorState::Terminated);

        match &outcome {
            Ok(termination) => {
                tracing::info!(?termination, delivered, "Stream terminated");
            }
            Err(e) => {
                tracing::error!(error = %e, delivered, "Stream failed");
            }
        }
        outcome
    }

    async fn drive(&mut self) -> Result<Termination, StreamError> {
        let token = self.control.token().clone();

        loop {
            if token.is_cancelled() {
                return Ok(self.cancellation());
            }

            self.set_state(ProcessorState::Decoding);
            let decoded = tokio::select! {
                biased;
                () = token.cancelled() => None,
                decoded = self.decoder.next() => Some(decoded),
            };
            let Some(decoded) = decoded else {
                return Ok(self.cancellation());
            };

            match decoded? {
                Decoded::End => return Ok(Termination::Ended),
                Decoded::KeepAlive => {
                    tracing::debug!("Keep-alive received");
                }
                Decoded::Record(record) => {
                    self.set_state(ProcessorState::Delivering);
                    if let Some(termination) = self.deliver(record, &token).await {
                        return Ok(termination);
                    }
                }
            }
        }
    }

    /// Hand one record to the consumer and wait until it has been taken
    ///
    /// Returns `Some` when the stream must stop.
    async fn deliver(
        &mut self,
        record: StreamRecord,
        token: &CancellationToken,
    ) -> Option<Termination> {
        let reserved = tokio::select! {
            biased;
            () = token.cancelled() => None,
            permit = self.sender.reserve() => Some(permit),
        };
        match reserved {
            None => return Some(self.cancellation()),
            Some(Err(_)) => return Some(Termination::ConsumerGone),
            Some(Ok(permit)) => permit.send(record),
        }
        self.delivered += 1;
        tracing::debug!(delivered = self.delivered, "Record delivered");

        // The slot frees up only once the consumer has received the record.
        let drained = tokio::select! {
            biased;
            () = token.cancelled() => None,
            permit = self.sender.reserve() => Some(permit.is_ok()),
        };
        match drained {
            None => Some(self.cancellation()),
            Some(false) => Some(Termination::ConsumerGone),
            Some(true) => None,
        }
    }

    fn cancellation(&self) -> Termination {
        if self.control.is_closed() {
            Termination::Closed
        } else {
            Termination::Cancelled
        }
    }

    fn set_state(&self, state: ProcessorState) {
        self.control.set_state(state);
        tracing::trace!(?state, "Processor state");
    }
}

// =============================================================================
// Spawning
// =============================================================================

/// Register a new stream over `body` and spawn its processor
///
/// The handle is registered before this returns. The stream stops when
/// `cancel` fires, when the handle is closed or dropped, or when the body
/// ends or fails to decode. Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicateId`] if registration fails.
pub fn spawn_stream<S>(
    registry: &StreamRegistry,
    body: S,
    cancel: &CancellationToken,
    config: &StreamConfig,
) -> Result<StreamHandle, RegistryError>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin + Send + 'static,
{
    let control = Arc::new(StreamControl::new(cancel));
    registry.register(Arc::clone(&control))?;

    let (sender, receiver) = mpsc::channel(1);
    let processor = StreamProcessor::new(
        Arc::clone(&control),
        registry.clone(),
        RecordDecoder::new(body, config),
        sender,
    );

    let span = tracing::info_span!("stream", stream_id = %control.id());
    let task = tokio::spawn(processor.run().instrument(span));

    Ok(StreamHandle::new(control, registry.clone(), receiver, task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use futures::stream;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio_stream::wrappers::ReceiverStream;

    type Feed = mpsc::Sender<io::Result<Bytes>>;

    fn config() -> StreamConfig {
        StreamConfig::default().without_idle_timeout()
    }

    fn fixed_body(chunks: &[&'static str]) -> impl Stream<Item = io::Result<Bytes>> + Unpin + Send {
        stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    /// A body that stays open until the returned sender is dropped
    fn live_body() -> (Feed, ReceiverStream<io::Result<Bytes>>) {
        let (tx, rx) = mpsc::channel(16);
        (tx, ReceiverStream::new(rx))
    }

    fn record(id: u32) -> Bytes {
        Bytes::from(format!("{{\"data\":{{\"id\":\"{id}\"}}}}\r\n"))
    }

    fn id_of(record: &StreamRecord) -> &str {
        &record.tweet.as_ref().unwrap().id
    }

    async fn wait_for_state(handle: &StreamHandle, state: ProcessorState) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while handle.state() != state {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_single_record_then_close() {
        let registry = StreamRegistry::new();
        let mut handle = spawn_stream(
            &registry,
            fixed_body(&[r#"{"data":{"id":"1","text":"hello"}}"#]),
            &CancellationToken::new(),
            &config(),
        )
        .unwrap();

        let first = handle.recv().await.unwrap();
        assert_eq!(id_of(&first), "1");
        assert_eq!(first.tweet.as_ref().unwrap().text, "hello");

        assert!(handle.recv().await.is_none());
        assert_eq!(handle.finish().await.unwrap(), Termination::Ended);
        assert!(handle.is_closed());
        assert_eq!(handle.state(), ProcessorState::Terminated);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_records_arrive_in_decode_order() {
        let registry = StreamRegistry::new();
        let mut handle = spawn_stream(
            &registry,
            fixed_body(&[
                "{\"data\":{\"id\":\"0\"}}\r\n{\"data\":{\"id\":\"1\"}}",
                "\r\n\r\n{\"data\":{\"id\":",
                "\"2\"}}{\"data\":{\"id\":\"3\"}}\r\n",
                "\r\n",
                "{\"data\":{\"id\":\"4\"}}",
            ]),
            &CancellationToken::new(),
            &config(),
        )
        .unwrap();

        let mut ids = Vec::new();
        while let Some(record) = handle.recv().await {
            ids.push(id_of(&record).to_string());
        }
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
        assert_eq!(handle.finish().await.unwrap(), Termination::Ended);
    }

    #[tokio::test]
    async fn test_handle_as_stream() {
        let registry = StreamRegistry::new();
        let handle = spawn_stream(
            &registry,
            fixed_body(&["{\"data\":{\"id\":\"1\"}}{\"data\":{\"id\":\"2\"}}"]),
            &CancellationToken::new(),
            &config(),
        )
        .unwrap();

        let records: Vec<_> = handle.collect().await;
        assert_eq!(records.len(), 2);
        assert_eq!(id_of(&records[1]), "2");
    }

    #[tokio::test]
    async fn test_processor_waits_for_consumer() {
        let registry = StreamRegistry::new();
        let (feed, body) = live_body();
        let mut handle =
            spawn_stream(&registry, body, &CancellationToken::new(), &config()).unwrap();

        for id in 0..3 {
            feed.send(Ok(record(id))).await.unwrap();
        }

        // One record in the slot, the rest still unread on the connection
        wait_for_state(&handle, ProcessorState::Delivering).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state(), ProcessorState::Delivering);

        assert_eq!(id_of(&handle.recv().await.unwrap()), "0");
        assert_eq!(id_of(&handle.recv().await.unwrap()), "1");
        assert_eq!(id_of(&handle.recv().await.unwrap()), "2");

        drop(feed);
        assert!(handle.recv().await.is_none());
        assert_eq!(handle.finish().await.unwrap(), Termination::Ended);
    }

    #[tokio::test]
    async fn test_double_close() {
        let registry = StreamRegistry::new();
        let (_feed, body) = live_body();
        let mut handle =
            spawn_stream(&registry, body, &CancellationToken::new(), &config()).unwrap();
        assert_eq!(registry.count(), 1);

        assert!(handle.close());
        assert!(!handle.close());
        assert!(handle.is_closed());
        assert!(registry.is_empty());

        // Closed handle never blocks
        assert!(handle.recv().await.is_none());
        assert_eq!(handle.finish().await.unwrap(), Termination::Closed);

        // Close after processor termination is still a no-op
        assert!(!handle.close());
        assert!(matches!(
            handle.finish().await,
            Err(StreamError::OutcomeTaken)
        ));
    }

    #[tokio::test]
    async fn test_drop_releases_processor() {
        let registry = StreamRegistry::new();
        let (feed, body) = live_body();
        let handle = spawn_stream(&registry, body, &CancellationToken::new(), &config()).unwrap();
        feed.send(Ok(record(1))).await.unwrap();
        wait_for_state(&handle, ProcessorState::Delivering).await;

        drop(handle);
        assert!(registry.is_empty());

        // The processor drops the body, which closes the feed
        tokio::time::timeout(Duration::from_secs(1), feed.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_all_closes_every_stream() {
        let registry = StreamRegistry::new();
        let cancel = CancellationToken::new();
        let mut feeds = Vec::new();
        let mut handles = Vec::new();

        for i in 0..3 {
            let (feed, body) = live_body();
            let handle = spawn_stream(&registry, body, &cancel, &config()).unwrap();
            if i == 0 {
                // Parked on a send
                feed.send(Ok(record(1))).await.unwrap();
                wait_for_state(&handle, ProcessorState::Delivering).await;
            }
            feeds.push(feed);
            handles.push(handle);
        }
        assert_eq!(registry.count(), 3);

        assert_eq!(registry.shutdown_all(), 3);
        assert!(registry.is_empty());
        assert!(!cancel.is_cancelled());

        for handle in &mut handles {
            assert!(handle.is_closed());
            assert!(handle.recv().await.is_none());
            assert_eq!(handle.finish().await.unwrap(), Termination::Closed);
        }
    }

    #[tokio::test]
    async fn test_cancel_with_pending_send() {
        let registry = StreamRegistry::new();
        let cancel = CancellationToken::new();
        let (feed, body) = live_body();
        let mut handle = spawn_stream(&registry, body, &cancel, &config()).unwrap();

        feed.send(Ok(record(1))).await.unwrap();
        feed.send(Ok(record(2))).await.unwrap();
        wait_for_state(&handle, ProcessorState::Delivering).await;

        cancel.cancel();
        let termination = tokio::time::timeout(Duration::from_secs(1), handle.finish())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(termination, Termination::Cancelled);
        assert!(handle.is_closed());
        assert!(registry.is_empty());
        assert!(handle.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_record_is_fatal() {
        let registry = StreamRegistry::new();
        let mut handle = spawn_stream(
            &registry,
            fixed_body(&[r#"{"non_compliant":"content"}"#]),
            &CancellationToken::new(),
            &config(),
        )
        .unwrap();

        assert!(handle.recv().await.is_none());
        assert!(matches!(
            handle.finish().await,
            Err(StreamError::Decode(DecodeError::EmptyRecord))
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_decode_error_is_isolated() {
        let registry = StreamRegistry::new();
        let cancel = CancellationToken::new();

        let mut broken = spawn_stream(
            &registry,
            fixed_body(&["{\"data\":{\"id\":\"1\"}}\r\n{\"data\": nope}"]),
            &cancel,
            &config(),
        )
        .unwrap();
        let (feed, body) = live_body();
        let mut healthy = spawn_stream(&registry, body, &cancel, &config()).unwrap();

        assert_eq!(id_of(&broken.recv().await.unwrap()), "1");
        assert!(broken.recv().await.is_none());
        assert!(matches!(
            broken.finish().await,
            Err(StreamError::Decode(DecodeError::Malformed { .. }))
        ));

        assert!(!healthy.is_closed());
        assert_eq!(registry.stream_ids(), vec![healthy.id()]);
        feed.send(Ok(record(7))).await.unwrap();
        assert_eq!(id_of(&healthy.recv().await.unwrap()), "7");
    }

    #[tokio::test]
    async fn test_cancel_one_of_two_streams() {
        let registry = StreamRegistry::new();
        let first_cancel = CancellationToken::new();
        let (first_feed, first_body) = live_body();
        let (second_feed, second_body) = live_body();

        let mut first = spawn_stream(&registry, first_body, &first_cancel, &config()).unwrap();
        let mut second =
            spawn_stream(&registry, second_body, &CancellationToken::new(), &config()).unwrap();

        first_feed.send(Ok(record(1))).await.unwrap();
        assert_eq!(id_of(&first.recv().await.unwrap()), "1");

        first_cancel.cancel();
        assert_eq!(first.finish().await.unwrap(), Termination::Cancelled);
        assert!(first.recv().await.is_none());

        for id in 10..13 {
            second_feed.send(Ok(record(id))).await.unwrap();
            assert_eq!(id_of(&second.recv().await.unwrap()), id.to_string());
        }
        assert_eq!(registry.count(), 1);
        assert!(registry.contains(&second.id()));
    }

    #[tokio::test]
    async fn test_consumer_gone() {
        let registry = StreamRegistry::new();
        let control = Arc::new(StreamControl::new(&CancellationToken::new()));
        registry.register(Arc::clone(&control)).unwrap();

        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let processor = StreamProcessor::new(
            Arc::clone(&control),
            registry.clone(),
            RecordDecoder::new(fixed_body(&["{\"data\":{\"id\":\"1\"}}"]), &config()),
            sender,
        );

        assert_eq!(processor.run().await.unwrap(), Termination::ConsumerGone);
        assert!(control.is_closed());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_state_from_u8() {
        for state in [
            ProcessorState::Running,
            ProcessorState::Decoding,
            ProcessorState::Delivering,
            ProcessorState::Closing,
            ProcessorState::Terminated,
        ] {
            assert_eq!(ProcessorState::from_u8(state as u8), state);
        }
    }
}
