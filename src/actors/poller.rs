//! Report-interval poller
//!
//! On every report tick the poller takes the collector's latest snapshot,
//! encodes (and optionally signs) each metric, and pushes the resulting
//! [`Batch`] onto the bounded job channel. When all senders are busy and the
//! channel is full the poller waits; batches are never dropped or merged.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::metric::{MetricError, MetricPayload, Signer};

use super::collector::CollectorHandle;
use super::messages::{AgentError, Batch, MetricSnapshot};

/// Encode every metric of a snapshot, gauges first then counters, each by name.
///
/// Metrics that cannot be encoded are left out of the batch and returned
/// alongside it.
pub fn build_batch(snapshot: &MetricSnapshot, signer: Option<&Signer>) -> (Batch, Vec<MetricError>) {
    let mut metrics = Vec::with_capacity(snapshot.len());
    let mut skipped = Vec::new();

    for metric in snapshot.metrics() {
        match MetricPayload::encode(&metric, signer) {
            Ok(payload) => metrics.push(payload),
            Err(e) => skipped.push(e),
        }
    }

    (Batch { metrics }, skipped)
}

/// Spawn the poller task
///
/// The first batch is produced one `report_interval` after start.
pub fn spawn_poller(
    collector: CollectorHandle,
    signer: Option<Signer>,
    report_interval: Duration,
    jobs: mpsc::Sender<Batch>,
    error_tx: mpsc::UnboundedSender<AgentError>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_poller(
        collector,
        signer,
        report_interval,
        jobs,
        error_tx,
        cancel,
    ))
}

#[instrument(skip_all, fields(interval = ?report_interval))]
async fn run_poller(
    collector: CollectorHandle,
    signer: Option<Signer>,
    report_interval: Duration,
    jobs: mpsc::Sender<Batch>,
    error_tx: mpsc::UnboundedSender<AgentError>,
    cancel: CancellationToken,
) {
    debug!("starting poller");

    let mut ticker = interval_at(Instant::now() + report_interval, report_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let snapshot = collector.snapshot();
        let (batch, skipped) = build_batch(&snapshot, signer.as_ref());

        for e in skipped {
            warn!("{e}");
            let _ = error_tx.send(e.into());
        }

        trace!("queueing batch of {} metrics", batch.len());

        // Blocks while every sender is busy; cancellation interrupts the wait
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = jobs.send(batch) => {
                if sent.is_err() {
                    warn!("job channel closed, stopping poller");
                    break;
                }
            }
        }
    }

    debug!("poller stopped");
}
