//! Delivery pool
//!
//! `rate_limit` workers share one job receiver, so at most `rate_limit`
//! requests are in flight at any time. Each worker serializes a batch as a
//! JSON array, gzips it and POSTs it to `/updates/`. Failures are reported on
//! the error channel; a failed batch is not retried.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use super::messages::{AgentError, Batch, DeliveryError};

/// Overall client timeout (connect included)
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a single delivery
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared HTTP client for every worker of the pool
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client")
}

/// Batch endpoint for a `host:port` address
pub fn updates_url(address: &str) -> String {
    format!("http://{address}/updates/")
}

/// JSON-encode and gzip a batch
pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>, DeliveryError> {
    let json =
        serde_json::to_vec(&batch.metrics).map_err(|e| DeliveryError::Encode(e.to_string()))?;

    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| DeliveryError::Encode(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| DeliveryError::Encode(e.to_string()))
}

/// One worker of the delivery pool
pub struct DeliveryWorker {
    id: usize,
    client: reqwest::Client,
    url: String,
    jobs: Arc<Mutex<mpsc::Receiver<Batch>>>,
    error_tx: mpsc::UnboundedSender<AgentError>,
    cancel: CancellationToken,
}

impl DeliveryWorker {
    #[instrument(skip(self), fields(worker = self.id))]
    pub async fn run(self) {
        debug!("starting delivery worker");

        loop {
            // Only one idle worker waits on the channel at a time
            let batch = {
                let mut jobs = tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    jobs = self.jobs.lock() => jobs,
                };

                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    batch = jobs.recv() => batch,
                }
            };

            let Some(batch) = batch else {
                debug!("job channel closed");
                break;
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.deliver(&batch) => {
                    if let Err(e) = result {
                        warn!("{e}");
                        let _ = self.error_tx.send(e.into());
                    }
                }
            }
        }

        debug!("delivery worker stopped");
    }

    async fn deliver(&self, batch: &Batch) -> Result<(), DeliveryError> {
        let body = encode_batch(batch)?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .timeout(REQUEST_TIMEOUT)
            .body(body)
            .send()
            .await
            .map_err(DeliveryError::Transport)?;

        match response.status() {
            StatusCode::OK => {
                trace!("delivered {} metrics", batch.len());
                Ok(())
            }
            status => Err(DeliveryError::Status(status)),
        }
    }
}

/// Spawn `workers` delivery workers sharing `jobs`
pub fn spawn_sender_pool(
    workers: usize,
    address: &str,
    jobs: mpsc::Receiver<Batch>,
    error_tx: mpsc::UnboundedSender<AgentError>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let client = build_client();
    let url = updates_url(address);
    let jobs = Arc::new(Mutex::new(jobs));

    (0..workers)
        .map(|id| {
            let worker = DeliveryWorker {
                id,
                client: client.clone(),
                url: url.clone(),
                jobs: Arc::clone(&jobs),
                error_tx: error_tx.clone(),
                cancel: cancel.clone(),
            };
            tokio::spawn(worker.run())
        })
        .collect()
}
