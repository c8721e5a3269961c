//! API Client Layer
//!
//! Request building, bearer authentication and the REST calls around the
//! filtered stream (rule management, recent search, user lookup).
//!
//! # Usage
//!
//! ```ignore
//! use birdwatch_core::client::{ApiClient, ClientConfig};
//! use birdwatch_core::models::{AddOrDeleteRulesRequest, Rule};
//!
//! let client = ApiClient::new(&ClientConfig::from_env())?;
//! client
//!     .add_or_delete_rules(&AddOrDeleteRulesRequest::add(vec![Rule::new("#rust")]), false)
//!     .await?;
//! ```

mod config;
mod http;
mod traits;

pub use config::{ClientConfig, DEFAULT_API_URL};
pub use http::{ApiClient, API_V2_PATH};
pub use traits::{ByteStream, StreamConnector};
