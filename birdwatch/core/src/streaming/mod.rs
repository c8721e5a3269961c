//! Streaming Core for the Filtered Stream
//!
//! Turns long-lived HTTP connections carrying a continuous sequence of JSON
//! records into per-stream channels, each read by exactly one consumer.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          StreamClient                              │
//! │   validate params ──► open connection ──► spawn_stream()           │
//! └────────────────────────────────┬───────────────────────────────────┘
//!                                  │
//!          ┌───────────────────────┼────────────────────────┐
//!          │                       │                        │
//!          ▼                       ▼                        ▼
//! ┌──────────────────┐   ┌───────────────────┐   ┌─────────────────────┐
//! │  StreamRegistry  │   │  StreamProcessor  │   │    StreamHandle     │
//! │  id ─► control   │◄──┤  (tokio task)     │──►│  (consumer side)    │
//! │  close / shutdown│   │  RecordDecoder    │   │  recv() / Stream    │
//! └──────────────────┘   │  body ─► records  │   │  close() / finish() │
//!                        └───────────────────┘   └─────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **Ordered**: records reach the consumer in the order they were decoded
//! - **Backpressure**: the processor is never more than one record ahead of
//!   its consumer
//! - **Isolation**: a decode failure stops only its own stream
//! - **Prompt teardown**: close, cancellation and `shutdown_all` all wake a
//!   processor parked on a read or a send
//!
//! # Example
//!
//! ```ignore
//! use birdwatch_core::streaming::{spawn_stream, StreamConfig, StreamRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = StreamRegistry::new();
//! let mut handle = spawn_stream(&registry, body, &CancellationToken::new(), &StreamConfig::default())?;
//!
//! while let Some(record) = handle.recv().await {
//!     println!("{:?}", record.tweet);
//! }
//! let termination = handle.finish().await?;
//! ```

mod config;
mod decoder;
mod handle;
mod processor;
mod registry;
mod stream_client;

pub use config::StreamConfig;
pub use decoder::{Decoded, RecordDecoder};
pub use handle::{StreamControl, StreamHandle, StreamId};
pub use processor::{spawn_stream, ProcessorState, StreamProcessor, Termination};
pub use registry::StreamRegistry;
pub use stream_client::StreamClient;
