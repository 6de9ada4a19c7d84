//! Server assembly: store, restore, backup actor and HTTP API

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::actors::backup::BackupHandle;
use crate::api::{ApiConfig, ApiState, spawn_api_server};
use crate::config::ServerConfig;
use crate::storage::{MemoryStore, MetricStore, snapshot};

/// A started server
pub struct RunningServer {
    pub addr: SocketAddr,
    pub store: Arc<dyn MetricStore>,
    backup: Option<(BackupHandle, JoinHandle<()>)>,
    api_task: JoinHandle<()>,
}

impl RunningServer {
    /// Wait for the API to stop, then write the final snapshot and close the store
    pub async fn stopped(self) -> Result<()> {
        if let Err(e) = self.api_task.await {
            error!("API task failed: {e}");
        }

        if let Some((backup, task)) = self.backup {
            backup.shutdown().await.context("final snapshot failed")?;
            let _ = task.await;
        }

        self.store.close().await?;
        info!("server stopped");
        Ok(())
    }
}

/// Build the store selected by the configuration
pub async fn open_store(config: &ServerConfig) -> Result<Arc<dyn MetricStore>> {
    if let Some(dsn) = config.dsn() {
        #[cfg(feature = "storage-sqlite")]
        {
            let store = crate::storage::SqliteStore::connect(dsn)
                .await
                .context("failed to open database")?;
            return Ok(Arc::new(store));
        }

        #[cfg(not(feature = "storage-sqlite"))]
        anyhow::bail!("database DSN '{dsn}' given but SQLite support is not compiled in");
    }

    Ok(Arc::new(MemoryStore::new()))
}

/// Start everything; the API stops once `cancel` fires
#[instrument(skip_all, fields(address = %config.address))]
pub async fn start(config: &ServerConfig, cancel: CancellationToken) -> Result<RunningServer> {
    let store = open_store(config).await?;

    if config.need_restore() {
        if let Some(path) = config.backup_path() {
            let metrics = snapshot::load(&path)
                .await
                .with_context(|| format!("failed to restore from {}", path.display()))?;
            let restored = store.batch_update(metrics).await?;
            info!("restored {} metrics", restored.len());
        }
    }

    let backup = config.backup_path().map(|path| {
        let interval = config
            .need_periodic_store()
            .then_some(config.store_interval);
        BackupHandle::spawn(Arc::clone(&store), path, interval)
    });

    let signer = config.signer();
    if signer.is_none() {
        warn!("no key configured, metrics are accepted unsigned");
    }

    let state = ApiState::new(Arc::clone(&store), signer);
    let api_config = ApiConfig {
        bind_addr: config.address.clone(),
    };
    let (addr, api_task) = spawn_api_server(api_config, state, cancel).await?;

    Ok(RunningServer {
        addr,
        store,
        backup,
        api_task,
    })
}

/// Run the server until `cancel` fires
pub async fn run(config: ServerConfig, cancel: CancellationToken) -> Result<()> {
    let server = start(&config, cancel).await?;
    server.stopped().await
}
