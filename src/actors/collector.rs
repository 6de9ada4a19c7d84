//! SampleCollectorActor - Keeps the current value of every agent metric
//!
//! The actor exclusively owns the gauge and counter maps. After every refresh
//! it publishes an immutable [`MetricSnapshot`] on a watch channel, so readers
//! (the poller) never hold a lock the collector needs and never see a
//! half-written refresh.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → Read HostStats → Apply GAUGE_TABLE → Publish snapshot → [Poller, ...]
//!     ↑                               │
//!     └─── Commands (RefreshNow, Shutdown)   └─── CollectError → error channel
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::monitors::host::{GAUGE_TABLE, POLL_COUNT, RANDOM_VALUE, StatsSource};

use super::messages::{AgentError, CollectError, CollectorCommand, MetricSnapshot};

/// Actor that refreshes host statistics on the poll interval
pub struct SampleCollectorActor<S: StatsSource> {
    /// Where statistics come from
    source: S,

    /// Current gauge values, owned by this actor only
    gauges: BTreeMap<String, f64>,

    /// Current counter values, owned by this actor only
    counters: BTreeMap<String, i64>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<CollectorCommand>,

    /// Publishes a fresh snapshot after every refresh
    snapshot_tx: watch::Sender<Arc<MetricSnapshot>>,

    /// Side channel for unreadable statistics
    error_tx: mpsc::UnboundedSender<AgentError>,

    /// Poll interval
    interval_duration: Duration,

    /// Root cancellation signal
    cancel: CancellationToken,
}

impl<S: StatsSource> SampleCollectorActor<S> {
    pub fn new(
        source: S,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<CollectorCommand>,
        snapshot_tx: watch::Sender<Arc<MetricSnapshot>>,
        error_tx: mpsc::UnboundedSender<AgentError>,
        cancel: CancellationToken,
    ) -> Self {
        let initial = initial_snapshot();

        Self {
            source,
            gauges: initial.gauges,
            counters: initial.counters,
            command_rx,
            snapshot_tx,
            error_tx,
            interval_duration,
            cancel,
        }
    }

    /// Run the actor's main loop
    ///
    /// Exits on cancellation, on a Shutdown command or when every handle is gone.
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting collector actor");

        // The initial snapshot already covers time zero
        let start = Instant::now() + self.interval_duration;
        let mut ticker = interval_at(start, self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("cancellation requested");
                    break;
                }

                _ = ticker.tick() => {
                    self.refresh_and_report();
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(CollectorCommand::RefreshNow { respond_to }) => {
                            debug!("received RefreshNow command");
                            self.refresh_and_report();
                            let _ = respond_to.send(Ok(()));
                        }

                        Some(CollectorCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("collector actor stopped");
    }

    fn refresh_and_report(&mut self) {
        if let Err(e) = self.refresh() {
            warn!("{e}");
            let _ = self.error_tx.send(e.into());
        }
    }

    /// Read statistics, overwrite gauges, bump the poll counter and publish.
    ///
    /// Gauges whose statistic could not be read keep their previous value and
    /// are listed in the returned error; the rest of the refresh still applies.
    pub fn refresh(&mut self) -> Result<(), CollectError> {
        let stats = self.source.read();
        let mut unavailable = Vec::new();

        for source in GAUGE_TABLE {
            match (source.extract)(&stats) {
                Some(value) => {
                    self.gauges.insert(source.name.to_string(), value);
                }
                None => unavailable.push(source.name),
            }
        }

        self.gauges
            .insert(RANDOM_VALUE.to_string(), rand::random::<f64>());

        let poll_count = self.counters.entry(POLL_COUNT.to_string()).or_insert(0);
        *poll_count = poll_count.saturating_add(1);

        self.publish();
        trace!("refreshed {} gauges", self.gauges.len());

        if unavailable.is_empty() {
            Ok(())
        } else {
            Err(CollectError { unavailable })
        }
    }

    fn publish(&self) {
        let snapshot = MetricSnapshot {
            gauges: self.gauges.clone(),
            counters: self.counters.clone(),
        };
        // send_replace never fails, even when nobody is subscribed
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}

/// Snapshot before the first refresh: every known metric at zero
pub fn initial_snapshot() -> MetricSnapshot {
    let mut gauges: BTreeMap<String, f64> = GAUGE_TABLE
        .iter()
        .map(|source| (source.name.to_string(), 0.0))
        .collect();
    gauges.insert(RANDOM_VALUE.to_string(), 0.0);

    let counters = BTreeMap::from([(POLL_COUNT.to_string(), 0)]);

    MetricSnapshot { gauges, counters }
}

/// Handle for controlling a SampleCollectorActor
///
/// Cheap to clone. [`CollectorHandle::snapshot`] never waits for the actor.
#[derive(Clone)]
pub struct CollectorHandle {
    /// Command sender
    sender: mpsc::Sender<CollectorCommand>,

    /// Latest published snapshot
    snapshot_rx: watch::Receiver<Arc<MetricSnapshot>>,
}

impl CollectorHandle {
    /// Spawn a new collector actor
    ///
    /// Returns the handle and the actor's task, so callers can wait for it on shutdown.
    pub fn spawn<S: StatsSource>(
        source: S,
        poll_interval: Duration,
        error_tx: mpsc::UnboundedSender<AgentError>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(initial_snapshot()));

        let actor = SampleCollectorActor::new(
            source,
            poll_interval,
            cmd_rx,
            snapshot_tx,
            error_tx,
            cancel,
        );

        let task = tokio::spawn(actor.run());

        (
            Self {
                sender: cmd_tx,
                snapshot_rx,
            },
            task,
        )
    }

    /// Read-only copy of the current gauge and counter sets
    pub fn snapshot(&self) -> Arc<MetricSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Trigger an immediate refresh and wait for it to finish
    pub async fn refresh_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CollectorCommand::RefreshNow { respond_to: tx })
            .await
            .context("failed to send RefreshNow command")?;

        rx.await.context("failed to receive response")??;
        Ok(())
    }

    /// Gracefully shut down the collector
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CollectorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
