//! Snapshot file: one unsigned JSON metric payload per line
//!
//! Dumps go to a sibling temporary file which is then renamed over the
//! target, so a crash mid-dump never leaves a truncated snapshot behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::metric::{Metric, MetricPayload};

use super::error::{StorageError, StorageResult};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write every metric to `path`, replacing its previous content
pub async fn dump(path: &Path, metrics: &[Metric]) -> StorageResult<()> {
    let mut buf = Vec::new();
    for metric in metrics {
        let payload = MetricPayload::encode(metric, None)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        serde_json::to_writer(&mut buf, &payload)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        buf.push(b'\n');
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path(path);
    fs::write(&tmp, &buf).await?;
    fs::rename(&tmp, path).await?;

    debug!("dumped {} metrics to {}", metrics.len(), path.display());
    Ok(())
}

/// Read a snapshot; a missing file is an empty snapshot
pub async fn load(path: &Path) -> StorageResult<Vec<Metric>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("no snapshot at {}, starting empty", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut metrics = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let metric = serde_json::from_str::<MetricPayload>(line)
            .map_err(|e| e.to_string())
            .and_then(|payload| Metric::try_from(payload).map_err(|e| e.to_string()))
            .map_err(|e| {
                StorageError::SerializationError(format!(
                    "{}:{}: {}",
                    path.display(),
                    index + 1,
                    e
                ))
            })?;
        metrics.push(metric);
    }

    info!("loaded {} metrics from {}", metrics.len(), path.display());
    Ok(metrics)
}
