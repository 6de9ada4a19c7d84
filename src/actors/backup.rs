//! BackupActor - Periodically dumps the store to the snapshot file
//!
//! The actor holds a handle to the shared store and, when a store interval is
//! configured, dumps on every tick. A `Shutdown` command always performs one
//! final dump before the actor exits, so a clean server stop never loses the
//! latest merged values.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, warn};

use crate::storage::{MetricStore, snapshot};

use super::messages::{BackupCommand, BackupStats};

/// Actor that writes the store to disk
pub struct BackupActor {
    store: Arc<dyn MetricStore>,

    /// Snapshot file
    path: PathBuf,

    /// Periodic dump interval; `None` dumps only on flush and shutdown
    interval: Option<Duration>,

    command_rx: mpsc::Receiver<BackupCommand>,

    stats: BackupStats,
}

impl BackupActor {
    pub fn new(
        store: Arc<dyn MetricStore>,
        path: PathBuf,
        interval: Option<Duration>,
        command_rx: mpsc::Receiver<BackupCommand>,
    ) -> Self {
        Self {
            store,
            path,
            interval,
            command_rx,
            stats: BackupStats::default(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn run(mut self) {
        debug!("starting backup actor");

        let mut ticker = self.interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = next_tick(&mut ticker) => {
                    if let Err(e) = self.dump().await {
                        error!("periodic dump failed: {:#}", e);
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(BackupCommand::Flush { respond_to }) => {
                            debug!("received Flush command");
                            let _ = respond_to.send(self.dump().await);
                        }

                        Some(BackupCommand::GetStats { respond_to }) => {
                            let _ = respond_to.send(self.stats.clone());
                        }

                        Some(BackupCommand::Shutdown { respond_to }) => {
                            debug!("received shutdown command");
                            let result = self.dump().await;
                            let _ = respond_to.send(result);
                            break;
                        }

                        None => {
                            warn!("command channel closed, dumping before exit");
                            if let Err(e) = self.dump().await {
                                error!("final dump failed: {:#}", e);
                            }
                            break;
                        }
                    }
                }
            }
        }

        info!("backup actor stopped after {} dumps", self.stats.dump_count);
    }

    async fn dump(&mut self) -> Result<()> {
        let metrics = self.store.all().await.context("failed to read store")?;
        snapshot::dump(&self.path, &metrics)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        self.stats.dump_count += 1;
        self.stats.last_dump_size = metrics.len();
        self.stats.last_dump = Some(Utc::now());

        debug!("dumped {} metrics", metrics.len());
        Ok(())
    }
}

/// Next tick of an optional ticker; never resolves without one
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle for controlling a BackupActor
#[derive(Clone)]
pub struct BackupHandle {
    sender: mpsc::Sender<BackupCommand>,
}

impl BackupHandle {
    /// Spawn a new backup actor
    pub fn spawn(
        store: Arc<dyn MetricStore>,
        path: PathBuf,
        interval: Option<Duration>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let actor = BackupActor::new(store, path, interval, rx);
        let task = tokio::spawn(actor.run());

        (Self { sender: tx }, task)
    }

    /// Dump now and wait for the result
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BackupCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn get_stats(&self) -> Result<BackupStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BackupCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive stats")
    }

    /// Final dump, then stop the actor
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BackupCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("failed to receive response")?
    }
}
