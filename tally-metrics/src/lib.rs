//! Metric model, wire format and aggregation.
//!
//! A [`Metric`] is either a counter, whose updates add to a running total, or a gauge, whose
//! updates replace the previous value. Both the agent and the server speak the same JSON wire
//! format:
//!
//! ```json
//! {"id": "PollCount", "type": "counter", "delta": 5}
//! {"id": "Alloc", "type": "gauge", "value": 1024.5}
//! ```
//!
//! Exactly one of `delta` and `value` must be present and must match `type`. Payloads violating
//! this are rejected during deserialization with a [`ParseMetricError`], so that invalid metrics
//! never reach an [`Aggregator`] or a storage backend.
//!
//! # Aggregation
//!
//! The [`Aggregator`] holds the latest known value of every metric on the producer side. Batches
//! are merged atomically with [`Aggregator::merge`] and read as a consistent copy with
//! [`Aggregator::snapshot`].

#![warn(missing_docs)]

mod aggregator;
mod protocol;

pub use aggregator::*;
pub use protocol::*;
