//! Value lookup endpoints

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use tracing::instrument;

use crate::api::{ApiError, ApiResult, ApiState};
use crate::metric::{Metric, MetricKind, MetricPayload};

/// Stored metric under `name`, which must be of `kind`
async fn lookup(state: &ApiState, kind: MetricKind, name: &str) -> ApiResult<Metric> {
    let metric = state.store.get(name).await?;
    if metric.kind() != kind {
        return Err(ApiError::NotFound(format!("{} '{}' not found", kind, name)));
    }
    Ok(metric)
}

/// GET /value/:type/:name
#[instrument(skip_all)]
pub async fn value_by_path(
    State(state): State<ApiState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind.parse()?;
    let metric = lookup(&state, kind, &name).await?;
    Ok(metric.value.to_string())
}

/// POST /value/
///
/// Body carries `id` and `type`; the answer is the stored metric, signed.
#[instrument(skip_all)]
pub async fn value_json(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<MetricPayload>> {
    let payload: MetricPayload = serde_json::from_slice(&body)?;
    let kind = payload.metric_kind()?;

    let metric = lookup(&state, kind, &payload.id).await?;
    Ok(Json(state.reply(&metric)?))
}
