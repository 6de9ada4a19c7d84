//! Update endpoints

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use tracing::{debug, instrument};

use crate::api::{ApiError, ApiResult, ApiState};
use crate::metric::{Metric, MetricPayload};

/// POST /update/:type/:name/:value
///
/// Merges one metric given in the path and answers the stored value as text.
/// A path carries no signature, so the route is closed while a key is set.
#[instrument(skip_all)]
pub async fn update_by_path(
    State(state): State<ApiState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> ApiResult<String> {
    let metric = Metric::parse(&name, &kind, &value)?;
    if state.signer.is_some() {
        return Err(ApiError::InvalidRequest(format!(
            "metric '{}' must be sent signed as JSON",
            metric.name
        )));
    }
    let merged = state.store.update(metric).await?;
    Ok(merged.value.to_string())
}

/// POST /update/
///
/// Merges one JSON metric and answers the stored metric, signed.
#[instrument(skip_all)]
pub async fn update_json(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<MetricPayload>> {
    let payload: MetricPayload = serde_json::from_slice(&body)?;
    let metric = state.accept(&payload)?;

    let merged = state.store.update(metric).await?;
    Ok(Json(state.reply(&merged)?))
}

/// POST /updates/
///
/// Merges a JSON array of metrics all-or-nothing and answers every stored
/// result in input order.
#[instrument(skip_all)]
pub async fn update_batch(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<Vec<MetricPayload>>> {
    let payloads: Vec<MetricPayload> = serde_json::from_slice(&body)?;
    let metrics = payloads
        .iter()
        .map(|payload| state.accept(payload))
        .collect::<ApiResult<Vec<_>>>()?;

    debug!("merging batch of {} metrics", metrics.len());
    let merged = state.store.batch_update(metrics).await?;

    let replies = merged
        .iter()
        .map(|metric| state.reply(metric))
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(replies))
}
