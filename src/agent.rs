//! Agent assembly: collector, poller and sender pool under one cancellation token

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::actors::collector::CollectorHandle;
use crate::actors::messages::Batch;
use crate::actors::poller::spawn_poller;
use crate::actors::sender::spawn_sender_pool;
use crate::config::{AgentConfig, ConfigError};
use crate::monitors::host::{StatsSource, SysinfoSource};

/// How long tasks get to finish after cancellation
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run the agent against the local host until `cancel` fires
pub async fn run(config: AgentConfig, cancel: CancellationToken) -> Result<(), ConfigError> {
    run_with_source(config, SysinfoSource::new(), cancel).await
}

/// Run the agent with an explicit statistics source
#[instrument(skip_all, fields(address = %config.address))]
pub async fn run_with_source<S: StatsSource>(
    config: AgentConfig,
    source: S,
    cancel: CancellationToken,
) -> Result<(), ConfigError> {
    config.validate()?;

    info!(
        "starting agent: poll every {:?}, report every {:?}, {} sender(s), signing {}",
        config.poll_interval,
        config.report_interval,
        config.rate_limit,
        if config.signer().is_some() { "on" } else { "off" }
    );

    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let (jobs_tx, jobs_rx) = mpsc::channel::<Batch>(config.rate_limit);

    let (collector, collector_task) = CollectorHandle::spawn(
        source,
        config.poll_interval,
        error_tx.clone(),
        cancel.clone(),
    );

    let poller_task = spawn_poller(
        collector,
        config.signer(),
        config.report_interval,
        jobs_tx,
        error_tx.clone(),
        cancel.clone(),
    );

    let mut tasks = spawn_sender_pool(
        config.rate_limit,
        &config.address,
        jobs_rx,
        error_tx,
        cancel.clone(),
    );
    tasks.push(collector_task);
    tasks.push(poller_task);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(e) = error_rx.recv() => warn!("{e}"),
        }
    }

    debug!("waiting for {} tasks", tasks.len());
    match tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(tasks)).await {
        Ok(_) => info!("agent stopped"),
        Err(_) => warn!("agent tasks did not stop within {:?}", SHUTDOWN_GRACE),
    }

    Ok(())
}
