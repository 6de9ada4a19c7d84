//! Health check endpoint

use axum::extract::State;

use crate::api::{ApiResult, ApiState};

/// GET /ping
///
/// Answers 200 when the store is reachable
pub async fn ping(State(state): State<ApiState>) -> ApiResult<&'static str> {
    state.store.ping().await?;
    Ok("OK")
}
