//! Concurrency tests for the delivery pool
//!
//! A real server counts in-flight requests while the pool pushes 100 batches
//! through it with `rate_limit = 4`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::Response;
use sysmonitor::actors::messages::Batch;
use sysmonitor::actors::sender::spawn_sender_pool;
use sysmonitor::api::{ApiState, router};
use sysmonitor::metric::{Metric, MetricPayload};
use sysmonitor::storage::{MemoryStore, MetricStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

async fn track(State(tracker): State<Arc<InFlight>>, request: Request, next: Next) -> Response {
    let now = tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
    tracker.max.fetch_max(now, Ordering::SeqCst);

    // Hold the request long enough for the workers to pile up
    tokio::time::sleep(Duration::from_millis(10)).await;
    let response = next.run(request).await;

    tracker.current.fetch_sub(1, Ordering::SeqCst);
    response
}

#[tokio::test]
async fn test_rate_limit_bounds_in_flight_requests() {
    const RATE_LIMIT: usize = 4;
    const BATCHES: i64 = 100;

    let store = Arc::new(MemoryStore::new());
    let tracker = Arc::new(InFlight::default());
    let app = router(ApiState::new(store.clone(), None))
        .layer(from_fn_with_state(tracker.clone(), track));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let (jobs_tx, jobs_rx) = mpsc::channel(RATE_LIMIT);
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let workers = spawn_sender_pool(RATE_LIMIT, &address, jobs_rx, error_tx, cancel.clone());

    for _ in 0..BATCHES {
        let batch = Batch {
            metrics: vec![MetricPayload::encode(&Metric::counter("Hits", 1), None).unwrap()],
        };
        jobs_tx.send(batch).await.unwrap();
    }
    drop(jobs_tx);

    let finished = tokio::time::timeout(
        Duration::from_secs(30),
        futures::future::join_all(workers),
    )
    .await
    .expect("workers did not drain the queue");
    assert!(finished.iter().all(|result| result.is_ok()));

    assert!(error_rx.try_recv().is_err(), "a delivery failed");

    let max = tracker.max.load(Ordering::SeqCst);
    assert!(max <= RATE_LIMIT, "{max} requests in flight");
    assert!(max > 1, "workers never overlapped");

    // Every batch merged exactly once
    assert_eq!(store.get("Hits").await.unwrap(), Metric::counter("Hits", BATCHES));
}
