//! Agent to server tests over real sockets

use std::time::Duration;

use sysmonitor::agent::run_with_source;
use sysmonitor::config::ServerConfig;
use sysmonitor::metric::{Metric, MetricValue};
use sysmonitor::server;
use sysmonitor::storage::{StorageError, snapshot};
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

fn server_config(dir: &tempfile::TempDir, key: &str) -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1:0".to_string(),
        store_interval: Duration::ZERO,
        store_file: dir.path().join("metrics.json").display().to_string(),
        restore: false,
        key: Some(key.to_string()),
        database_dsn: None,
    }
}

async fn run_agent(address: String, key: &str, duration: Duration) {
    let cancel = CancellationToken::new();
    let config = fast_agent_config(address, Some(key));
    let agent = tokio::spawn(run_with_source(config, FakeSource, cancel.clone()));

    tokio::time::sleep(duration).await;
    cancel.cancel();
    agent.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_agent_reports_to_server() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = server_config(&temp_dir, "secret");
    let cancel = CancellationToken::new();
    let running = server::start(&config, cancel.clone()).await.unwrap();
    let store = running.store.clone();

    run_agent(running.addr.to_string(), "secret", Duration::from_millis(300)).await;

    assert_eq!(
        store.get("TotalMemory").await.unwrap(),
        Metric::gauge("TotalMemory", TOTAL_MEMORY as f64)
    );

    // The server sums the cumulative PollCount of every delivered batch
    match store.get("PollCount").await.unwrap().value {
        MetricValue::Counter(total) => assert!(total > 0),
        other => panic!("unexpected value {other:?}"),
    }

    cancel.cancel();
    running.stopped().await.unwrap();

    let saved = snapshot::load(&config.backup_path().unwrap()).await.unwrap();
    assert!(saved.iter().any(|metric| metric.name == "PollCount"));
}

#[tokio::test]
async fn test_mismatched_keys_are_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = server_config(&temp_dir, "secret");
    let cancel = CancellationToken::new();
    let running = server::start(&config, cancel.clone()).await.unwrap();
    let store = running.store.clone();

    run_agent(running.addr.to_string(), "wrong", Duration::from_millis(200)).await;

    assert!(matches!(
        store.get("PollCount").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(store.all().await.unwrap().is_empty());

    cancel.cancel();
    running.stopped().await.unwrap();
}
