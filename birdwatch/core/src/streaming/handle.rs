//! Stream Handle
//!
//! The consumer-facing side of one open stream.
//!
//! A stream is split in two:
//!
//! - [`StreamControl`]: the shared part (id, closed flag, cancellation token,
//!   processor state). The registry, the processor and the handle each hold
//!   an `Arc` to it.
//! - [`StreamHandle`]: owned by the consumer. Holds the receiving end of the
//!   delivery channel and the processor's join handle.
//!
//! Closing is a single atomic transition on the control. Whichever side gets
//! there first (consumer `close`, processor termination, registry
//! `shutdown_all`) performs it; every later attempt is a no-op.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::processor::{ProcessorState, Termination};
use super::registry::StreamRegistry;
use crate::error::StreamError;
use crate::models::StreamRecord;

/// Unique identifier of an open stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Generate a fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared state of one stream
#[derive(Debug)]
pub struct StreamControl {
    id: StreamId,
    closed: AtomicBool,
    cancel: CancellationToken,
    state: AtomicU8,
}

impl StreamControl {
    /// Create the control for a new stream
    ///
    /// The stream's token is a child of `parent`: cancelling the caller's
    /// token stops the stream, closing the stream leaves the caller's token
    /// alone.
    #[must_use]
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            id: StreamId::new(),
            closed: AtomicBool::new(false),
            cancel: parent.child_token(),
            state: AtomicU8::new(ProcessorState::Running as u8),
        }
    }

    /// The stream id
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Whether the stream has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the stream was cancelled or closed
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token fired on close or caller cancellation
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Current processor state
    #[must_use]
    pub fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ProcessorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Flip to closed and fire the token; true only for the first caller
    ///
    /// Only the registry calls this, under its write lock.
    pub(crate) fn mark_closed(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.cancel.cancel();
        }
        first
    }
}

/// Consumer handle for one open stream
///
/// Records arrive through [`StreamHandle::recv`] or the [`Stream`] impl.
/// Dropping the handle closes the stream.
pub struct StreamHandle {
    control: Arc<StreamControl>,
    registry: StreamRegistry,
    receiver: mpsc::Receiver<StreamRecord>,
    task: Option<JoinHandle<Result<Termination, StreamError>>>,
}

impl StreamHandle {
    pub(crate) fn new(
        control: Arc<StreamControl>,
        registry: StreamRegistry,
        receiver: mpsc::Receiver<StreamRecord>,
        task: JoinHandle<Result<Termination, StreamError>>,
    ) -> Self {
        Self {
            control,
            registry,
            receiver,
            task: Some(task),
        }
    }

    /// The stream id
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.control.id()
    }

    /// Whether the stream has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }

    /// Current processor state
    #[must_use]
    pub fn state(&self) -> ProcessorState {
        self.control.state()
    }

    /// Close the stream
    ///
    /// Idempotent. Returns true if this call performed the close.
    pub fn close(&self) -> bool {
        let closed = self.registry.close(&self.control);
        if closed {
            tracing::debug!(stream_id = %self.control.id(), "Stream closed by consumer");
        }
        closed
    }

    /// Receive the next record
    ///
    /// Returns `None` once the stream is closed, cancelled or ended. After
    /// that every call returns `None` immediately.
    pub async fn recv(&mut self) -> Option<StreamRecord> {
        if self.control.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            () = self.control.token().cancelled() => None,
            record = self.receiver.recv() => record,
        }
    }

    /// Wait for the processor to stop and report why
    ///
    /// The delivery channel carries only records; this is where a consumer
    /// that saw the channel close learns whether the stream ended cleanly or
    /// failed. Call it after [`recv`](Self::recv) returned `None` or after
    /// [`close`](Self::close); on a live stream it waits until the stream
    /// terminates.
    ///
    /// # Errors
    ///
    /// The processor's decode error, a task failure, or
    /// [`StreamError::OutcomeTaken`] on a second call.
    pub async fn finish(&mut self) -> Result<Termination, StreamError> {
        let task = self.task.take().ok_or(StreamError::OutcomeTaken)?;
        task.await?
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.control.id())
            .field("closed", &self.control.is_closed())
            .field("state", &self.control.state())
            .finish_non_exhaustive()
    }
}

impl Stream for StreamHandle {
    type Item = StreamRecord;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.control.is_cancelled() {
            return Poll::Ready(None);
        }
        // The processor drops its sender on the way out, which wakes us.
        this.receiver.poll_recv(cx)
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.registry.close(&self.control);
    }
}
