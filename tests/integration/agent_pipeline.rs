//! Agent pipeline tests against a mock server
//!
//! These tests run the whole agent (collector, poller, sender pool) with a
//! fixed statistics source and inspect what reaches the wire.

use std::time::Duration;

use pretty_assertions::assert_eq;
use sysmonitor::agent::{self, run_with_source};
use sysmonitor::config::{AgentConfig, ConfigError};
use sysmonitor::metric::{Metric, MetricPayload, Signer};
use sysmonitor::monitors::host::GAUGE_TABLE;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn run_agent_for(config: AgentConfig, duration: Duration) {
    let cancel = CancellationToken::new();
    let agent = tokio::spawn(run_with_source(config, FakeSource, cancel.clone()));

    tokio::time::sleep(duration).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(6), agent)
        .await
        .expect("agent did not stop")
        .unwrap()
        .unwrap();
}

async fn received_batches(server: &MockServer) -> Vec<Vec<MetricPayload>> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| serde_json::from_slice(&gunzip(&request.body)).unwrap())
        .collect()
}

#[tokio::test]
async fn test_agent_delivers_complete_batches() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .and(header("content-encoding", "gzip"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let config = fast_agent_config(address_of(&mock_server), None);
    run_agent_for(config, Duration::from_millis(300)).await;

    let batches = received_batches(&mock_server).await;
    assert!(!batches.is_empty(), "no batch was delivered");

    let last = batches.last().unwrap();

    // Every host gauge plus RandomValue, then PollCount
    assert_eq!(last.len(), GAUGE_TABLE.len() + 2);
    let kinds: Vec<_> = last.iter().map(|payload| payload.kind.as_str()).collect();
    let first_counter = kinds.iter().position(|kind| *kind == "counter").unwrap();
    assert!(kinds[..first_counter].iter().all(|kind| *kind == "gauge"));
    assert_eq!(last[first_counter].id, "PollCount");

    let total = last.iter().find(|payload| payload.id == "TotalMemory").unwrap();
    assert_eq!(total.value, Some(TOTAL_MEMORY as f64));
    assert!(last.iter().all(|payload| payload.hash.is_none()));

    // PollCount is cumulative, so it outgrows the batch count. Workers may
    // deliver out of order.
    let poll_counts: Vec<i64> = batches
        .iter()
        .map(|batch| batch.iter().find(|p| p.id == "PollCount").unwrap().delta.unwrap())
        .collect();
    assert!(poll_counts.iter().all(|count| *count > 0));
    assert!(*poll_counts.iter().max().unwrap() >= batches.len() as i64);
}

#[tokio::test]
async fn test_agent_signs_batches_with_key() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let config = fast_agent_config(address_of(&mock_server), Some("secret"));
    run_agent_for(config, Duration::from_millis(200)).await;

    let signer = Signer::new("secret");
    let batches = received_batches(&mock_server).await;
    assert!(!batches.is_empty());

    for payload in batches.iter().flatten() {
        let metric = Metric::try_from(payload).unwrap();
        assert!(
            signer.verify(&metric, payload.hash.as_deref()).is_ok(),
            "bad signature on {}",
            payload.id
        );
    }
}

#[tokio::test]
async fn test_agent_survives_server_errors() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let config = fast_agent_config(address_of(&mock_server), None);
    run_agent_for(config, Duration::from_millis(250)).await;

    // Failed batches are not retried, but later ticks keep sending
    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.len() >= 2, "only {} requests", requests.len());
}

#[tokio::test]
async fn test_invalid_intervals_start_nothing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = AgentConfig {
        poll_interval: Duration::from_millis(50),
        report_interval: Duration::from_millis(50),
        ..fast_agent_config(address_of(&mock_server), None)
    };

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        agent::run(config, CancellationToken::new()),
    )
    .await
    .expect("run must fail immediately");

    let err = result.unwrap_err();
    assert!(matches!(err, ConfigError::PollNotFasterThanReport { .. }));
    assert!(err.to_string().contains("poll interval"));

    // Give any stray task a chance to send
    tokio::time::sleep(Duration::from_millis(150)).await;
}
