//! The tally metrics agent.
//!
//! The agent polls a set of [collectors](collector::Collector) on a fixed interval, merges their
//! batches into an [`Aggregator`](tally_metrics::Aggregator) and periodically delivers the
//! aggregate to the ingestion server:
//!
//! ```text
//!  RuntimeCollector ──┐
//!                     ├── fan_in ──> Agent ──> Sender ──> UpstreamClient ──> server
//!  SystemCollector  ──┘
//! ```
//!
//! Delivery uses one of three strategies, see [`Sender`]. Per-metric strategies run through a
//! bounded [`WorkerPool`]. Every request is retried on network errors and server errors, and is
//! signed when a secret key is configured.
//!
//! # Usage
//!
//! ```no_run
//! use tally_config::AgentConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), tally_agent::ClientError> {
//! let config = AgentConfig::default();
//! tally_agent::run(&config, CancellationToken::new()).await
//! # }
//! ```

#![warn(missing_docs)]

mod agent;
mod client;
mod pool;
mod sender;

pub mod collector;

pub use self::agent::*;
pub use self::client::*;
pub use self::pool::*;
pub use self::sender::*;
