//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Snapshots and batches**: immutable values handed between tasks, never shared mutable state
//! 3. **Errors**: component-local failures travel to the run loop as [`AgentError`]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::metric::{Metric, MetricError, MetricPayload};

/// Immutable copy of the collector's current gauge and counter sets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSnapshot {
    pub gauges: BTreeMap<String, f64>,
    pub counters: BTreeMap<String, i64>,
}

impl MetricSnapshot {
    /// All metrics in the snapshot: gauges by name, then counters by name
    pub fn metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        let gauges = self
            .gauges
            .iter()
            .map(|(name, value)| Metric::gauge(name.clone(), *value));
        let counters = self
            .counters
            .iter()
            .map(|(name, delta)| Metric::counter(name.clone(), *delta));

        gauges.chain(counters)
    }

    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One delivery unit: the wire-ready metrics of a single snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub metrics: Vec<MetricPayload>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Commands that can be sent to the SampleCollectorActor
#[derive(Debug)]
pub enum CollectorCommand {
    /// Refresh immediately, bypassing the poll timer
    ///
    /// Used for testing and manual refresh operations.
    RefreshNow {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Stop the collector after the current refresh
    Shutdown,
}

/// Commands that can be sent to the BackupActor
#[derive(Debug)]
pub enum BackupCommand {
    /// Dump the store to the snapshot file now
    Flush {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Get backup statistics
    GetStats {
        respond_to: oneshot::Sender<BackupStats>,
    },

    /// Write a final dump, then stop
    Shutdown {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },
}

/// Backup statistics
#[derive(Debug, Clone, Default)]
pub struct BackupStats {
    /// Successful dumps so far
    pub dump_count: u64,

    /// Metrics written by the most recent dump
    pub last_dump_size: usize,

    /// When the most recent dump finished
    pub last_dump: Option<DateTime<Utc>>,
}

/// A host statistic that could not be read during one refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectError {
    pub unavailable: Vec<&'static str>,
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "statistics unavailable, keeping previous values: {}",
            self.unavailable.join(", ")
        )
    }
}

impl std::error::Error for CollectError {}

/// Why a batch did not reach the server
#[derive(Debug)]
pub enum DeliveryError {
    /// Batch could not be serialized or compressed
    Encode(String),

    /// Connection, timeout or other transport failure
    Transport(reqwest::Error),

    /// Server answered with something other than 200
    Status(reqwest::StatusCode),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Encode(msg) => write!(f, "failed to encode batch: {msg}"),
            DeliveryError::Transport(err) => write!(f, "failed to send batch: {err}"),
            DeliveryError::Status(status) => write!(f, "bad response code {status}"),
        }
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeliveryError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// Recoverable agent errors reported on the error channel
#[derive(Debug)]
pub enum AgentError {
    Collect(CollectError),
    Encode(MetricError),
    Delivery(DeliveryError),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Collect(err) => write!(f, "collection: {err}"),
            AgentError::Encode(err) => write!(f, "metric skipped: {err}"),
            AgentError::Delivery(err) => write!(f, "delivery: {err}"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<CollectError> for AgentError {
    fn from(err: CollectError) -> Self {
        AgentError::Collect(err)
    }
}

impl From<MetricError> for AgentError {
    fn from(err: MetricError) -> Self {
        AgentError::Encode(err)
    }
}

impl From<DeliveryError> for AgentError {
    fn from(err: DeliveryError) -> Self {
        AgentError::Delivery(err)
    }
}
