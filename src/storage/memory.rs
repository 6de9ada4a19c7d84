//! In-memory merge store (no persistence of its own)
//!
//! All entries live in one `BTreeMap` behind a single `tokio::sync::RwLock`.
//! Writers take the lock exclusively, so updates to a name are totally
//! ordered and a batch is never interleaved with another writer. Durability
//! comes from the snapshot file written by the backup actor.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace};

use crate::metric::{Metric, MetricValue};

use super::backend::{MetricStore, check_range};
use super::error::{StorageError, StorageResult};

/// In-memory merge store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, MetricValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Merged value for `metric` given what is currently stored
fn merged(stored: Option<MetricValue>, metric: &Metric) -> StorageResult<MetricValue> {
    match stored {
        None => Ok(metric.value),
        Some(stored) => stored
            .merge(metric.value)
            .map_err(|e| StorageError::from_merge(&metric.name, e)),
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn get(&self, name: &str) -> StorageResult<Metric> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .map(|value| Metric {
                name: name.to_string(),
                value: *value,
            })
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn find(&self, limit: usize, offset: usize) -> StorageResult<Vec<Metric>> {
        let entries = self.entries.read().await;
        check_range(limit, offset, entries.len())?;

        let take = if limit == 0 { usize::MAX } else { limit };
        Ok(entries
            .iter()
            .skip(offset)
            .take(take)
            .map(|(name, value)| Metric {
                name: name.clone(),
                value: *value,
            })
            .collect())
    }

    #[instrument(skip(self), fields(name = %metric.name))]
    async fn update(&self, metric: Metric) -> StorageResult<Metric> {
        let mut entries = self.entries.write().await;
        let value = merged(entries.get(&metric.name).copied(), &metric)?;
        entries.insert(metric.name.clone(), value);

        trace!("stored {value}");
        Ok(Metric {
            name: metric.name,
            value,
        })
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn batch_update(&self, metrics: Vec<Metric>) -> StorageResult<Vec<Metric>> {
        let mut entries = self.entries.write().await;

        // Stage every merge first so a failure leaves the store untouched
        let mut staged: BTreeMap<String, MetricValue> = BTreeMap::new();
        let mut results = Vec::with_capacity(metrics.len());

        for metric in metrics {
            let current = staged
                .get(&metric.name)
                .or_else(|| entries.get(&metric.name))
                .copied();
            let value = merged(current, &metric)?;
            staged.insert(metric.name.clone(), value);
            results.push(Metric {
                name: metric.name,
                value,
            });
        }

        debug!("applying {} staged entries", staged.len());
        entries.extend(staged);
        Ok(results)
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}
