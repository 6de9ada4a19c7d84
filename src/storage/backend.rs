//! Merge store trait definition
//!
//! This module defines the `MetricStore` trait that every store
//! implementation must implement.

use async_trait::async_trait;

use crate::metric::Metric;

use super::error::StorageResult;

/// Keyed metric storage applying the gauge/counter merge rule
///
/// Gauges are overwritten, counters are summed (saturating at the `i64`
/// bounds). The kind stored under a name never changes; an update of the
/// other kind fails with `StorageError::KindMismatch`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: one instance is shared by every
/// HTTP handler and the backup actor. Updates to the same name are totally
/// ordered, and no reader observes a partially applied batch.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Current metric stored under `name`, or `StorageError::NotFound`
    async fn get(&self, name: &str) -> StorageResult<Metric>;

    /// One page of metrics ordered by name
    ///
    /// `limit == 0` means no limit. An `offset` at or past the end yields an
    /// empty page when `limit == 0` and `StorageError::InvalidRange` otherwise.
    async fn find(&self, limit: usize, offset: usize) -> StorageResult<Vec<Metric>>;

    /// Every stored metric, ordered by name
    async fn all(&self) -> StorageResult<Vec<Metric>> {
        self.find(0, 0).await
    }

    /// Merge one metric and return the stored result
    async fn update(&self, metric: Metric) -> StorageResult<Metric>;

    /// Merge all metrics or none
    ///
    /// Returns the post-merge value for each input, in input order.
    async fn batch_update(&self, metrics: Vec<Metric>) -> StorageResult<Vec<Metric>>;

    /// Check that the store is reachable
    async fn ping(&self) -> StorageResult<()>;

    /// Release connections
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Offset check shared by store implementations
pub(crate) fn check_range(limit: usize, offset: usize, len: usize) -> StorageResult<()> {
    if offset >= len && limit != 0 {
        return Err(super::StorageError::InvalidRange { offset, len });
    }
    Ok(())
}
