//! Stream Registry - Open Stream Tracking
//!
//! Table of every stream currently open, keyed by [`StreamId`], so that a
//! single stream can be closed by id and every stream can be closed at once
//! during process shutdown.
//!
//! # Architecture
//!
//! ```text
//!                      StreamRegistry
//!                     ┌───────────────────────────────────────────┐
//!                     │ HashMap<StreamId, Arc<StreamControl>>     │
//!                     │   - wrapped in Arc<RwLock<>>              │
//!                     └───────────────┬───────────────────────────┘
//!                                     │
//!              ┌──────────────────────┼──────────────────────┐
//!              │                      │                      │
//!       ┌──────▼──────┐       ┌───────▼──────┐       ┌───────▼──────┐
//!       │  Processor  │       │  Processor   │       │  Processor   │
//!       │  stream A   │       │  stream B    │       │  stream C    │
//!       └─────────────┘       └──────────────┘       └──────────────┘
//! ```
//!
//! # Thread Safety
//!
//! Every mutation (register, unregister, close, shutdown) takes the write
//! lock. Closing a stream flips its closed flag and removes its entry under
//! the same lock, so no id in the table ever refers to a closed stream.
//! Nothing blocking happens while the lock is held: firing a cancellation
//! token only wakes the waiting tasks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::handle::{StreamControl, StreamId};
use crate::error::RegistryError;

/// Registry of open streams
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    inner: Arc<RwLock<HashMap<StreamId, Arc<StreamControl>>>>,
}

impl StreamRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open stream
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if the id is already present.
    /// Ids are random UUIDs, so this indicates a bug.
    pub fn register(&self, control: Arc<StreamControl>) -> Result<(), RegistryError> {
        let id = control.id();
        let mut inner = self.inner.write();
        if inner.contains_key(&id) {
            tracing::error!(stream_id = %id, "Stream id already registered");
            return Err(RegistryError::DuplicateId(id));
        }
        inner.insert(id, control);
        tracing::info!(
            stream_id = %id,
            active = inner.len(),
            "Stream registered"
        );
        Ok(())
    }

    /// Remove a stream's entry without closing it
    ///
    /// Returns true if the entry was present.
    pub fn unregister(&self, id: &StreamId) -> bool {
        let removed = self.inner.write().remove(id).is_some();
        if removed {
            tracing::info!(stream_id = %id, "Stream unregistered");
        }
        removed
    }

    /// Close a stream and remove its entry
    ///
    /// Returns true if this call performed the close; false if the stream
    /// was already closed.
    pub fn close(&self, control: &StreamControl) -> bool {
        let mut inner = self.inner.write();
        if !control.mark_closed() {
            return false;
        }
        inner.remove(&control.id());
        tracing::info!(
            stream_id = %control.id(),
            active = inner.len(),
            "Stream closed"
        );
        true
    }

    /// Close a stream by id
    ///
    /// Returns true if the stream was open.
    pub fn close_id(&self, id: &StreamId) -> bool {
        let mut inner = self.inner.write();
        match inner.remove(id) {
            Some(control) => {
                control.mark_closed();
                tracing::info!(stream_id = %id, "Stream closed by id");
                true
            }
            None => false,
        }
    }

    /// Close every open stream and empty the table
    ///
    /// Every processor observes its stream as closed on its next delivery
    /// attempt, including one already waiting on a send. Returns the number
    /// of streams closed.
    pub fn shutdown_all(&self) -> usize {
        let mut inner = self.inner.write();
        let closed = inner
            .drain()
            .filter(|(_, control)| control.mark_closed())
            .count();
        tracing::info!(closed, "All streams shut down");
        closed
    }

    /// Number of open streams
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no stream is open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Whether a stream is registered
    #[must_use]
    pub fn contains(&self, id: &StreamId) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Ids of all open streams
    #[must_use]
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.inner.read().keys().copied().collect()
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("open", &self.count())
            .finish()
    }
}
