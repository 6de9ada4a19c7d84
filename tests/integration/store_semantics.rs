//! Merge store behavior under concurrent writers
//!
//! Both store implementations must produce the same totals no matter how
//! updates from many tasks interleave.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sysmonitor::metric::{Metric, MetricValue};
use sysmonitor::storage::{MemoryStore, MetricStore, StorageError};

const TASKS: i64 = 20;
const UPDATES_PER_TASK: i64 = 10;

async fn hammer(store: Arc<dyn MetricStore>) {
    let mut handles = Vec::new();

    for task in 0..TASKS {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for i in 0..UPDATES_PER_TASK {
                store.update(Metric::counter("Hits", 1)).await.unwrap();
                store
                    .batch_update(vec![
                        Metric::counter("Batched", 2),
                        Metric::gauge("Last", (task * UPDATES_PER_TASK + i) as f64),
                    ])
                    .await
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

async fn check_totals(store: Arc<dyn MetricStore>) {
    let total = TASKS * UPDATES_PER_TASK;

    assert_eq!(store.get("Hits").await.unwrap(), Metric::counter("Hits", total));
    assert_eq!(
        store.get("Batched").await.unwrap(),
        Metric::counter("Batched", 2 * total)
    );

    // Some writer's value, never a torn or default one
    match store.get("Last").await.unwrap().value {
        MetricValue::Gauge(value) => assert!((0.0..total as f64).contains(&value)),
        other => panic!("unexpected value {other:?}"),
    }

    let names: Vec<_> = store
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|metric| metric.name)
        .collect();
    assert_eq!(names, vec!["Batched", "Hits", "Last"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_store_concurrent_updates() {
    let store: Arc<dyn MetricStore> = Arc::new(MemoryStore::new());
    hammer(Arc::clone(&store)).await;
    check_totals(store).await;
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_store_concurrent_updates() {
    use sysmonitor::storage::SqliteStore;

    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("metrics.db");
    let store: Arc<dyn MetricStore> =
        Arc::new(SqliteStore::connect(path.to_str().unwrap()).await.unwrap());

    hammer(Arc::clone(&store)).await;
    check_totals(store).await;
}

#[tokio::test]
async fn test_unknown_metric_is_not_found() {
    let store = MemoryStore::new();
    assert!(matches!(
        store.get("Unknown").await,
        Err(StorageError::NotFound(_))
    ));
}
