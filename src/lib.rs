//! Host metrics agent and collector server
//!
//! The agent samples host statistics, batches them and pushes them to the
//! server over HTTP. The server merges every metric into one store: gauges
//! keep the latest value, counters keep a running total.

pub mod actors;
pub mod agent;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod metric;
pub mod monitors;
#[cfg(feature = "api")]
pub mod server;
pub mod storage;
pub mod util;

pub use metric::{Metric, MetricKind, MetricPayload, MetricValue, Signer};
