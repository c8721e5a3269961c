//! Birdwatch Core - Filtered Stream Ingestion
//!
//! This crate consumes the Twitter v2 filtered stream: a long-lived HTTP
//! connection on which the server pushes one JSON record per matching tweet.
//! Each open connection is decoded incrementally and its records are handed,
//! in order and with backpressure, to exactly one consumer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Consumers                               │
//! │     daemon (JSON lines)   │   tests   │   embedding applications  │
//! └──────────────┬───────────────────────────────────────────────────┘
//!                │ StreamHandle::recv() / close() / finish()
//! ┌──────────────┼───────────────────────────────────────────────────┐
//! │              │           STREAMING CORE                          │
//! │  ┌───────────┴──────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │  StreamClient    │─►│ StreamProcessor  │─►│ RecordDecoder  │  │
//! │  │  StreamRegistry  │  │ (task per stream)│  │ (bytes ─► JSON)│  │
//! │  └──────────────────┘  └──────────────────┘  └───────┬────────┘  │
//! └──────────────────────────────────────────────────────┼───────────┘
//!                                                        │ ByteStream
//! ┌──────────────────────────────────────────────────────┼───────────┐
//! │                  CLIENT LAYER                        │           │
//! │  ApiClient (reqwest): bearer auth, rules, search, user lookup    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use birdwatch_core::{ApiClient, ClientConfig, QueryParameters, StreamClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = ApiClient::new(&ClientConfig::from_env())?;
//!     let client = StreamClient::new(api);
//!
//!     let params = QueryParameters::new().with("expansions", ["author_id"]);
//!     let mut handle = client.search_stream(&params, &CancellationToken::new()).await?;
//!
//!     while let Some(record) = handle.recv().await {
//!         println!("{:?}", record.tweet);
//!     }
//!     println!("stream stopped: {:?}", handle.finish().await);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`streaming`]: registry, handles, processors and the record decoder
//! - [`client`]: HTTP client, connection trait and client configuration
//! - [`params`]: query parameters and per-endpoint validation tables
//! - [`models`]: API payload types
//! - [`config`]: TOML configuration file loading
//! - [`error`]: error types

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod params;
pub mod streaming;

// Client exports
pub use client::{ApiClient, ByteStream, ClientConfig, StreamConnector};

// Config exports
pub use config::{default_config_path, load_config, load_config_from_path, BirdwatchToml, QueryConfig};

// Error exports
pub use error::{ClientError, ConfigError, DecodeError, RegistryError, StreamError};

// Model exports
pub use models::{
    AddOrDeleteRulesRequest, AddOrDeleteRulesResponse, GenericError, GetRulesResponse, Includes,
    MatchingRule, Rule, SearchRecentTweetsResponse, StreamRecord, Tweet, User,
};

// Parameter exports
pub use params::{Endpoint, QueryParameters};

// Streaming exports
pub use streaming::{
    spawn_stream, Decoded, ProcessorState, RecordDecoder, StreamClient, StreamConfig,
    StreamHandle, StreamId, StreamRegistry, Termination,
};
