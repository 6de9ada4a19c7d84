//! API shared state

use std::sync::Arc;

use crate::metric::{Metric, MetricPayload, Signer};
use crate::storage::MetricStore;

use super::error::ApiResult;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// The one merge store of this server
    pub store: Arc<dyn MetricStore>,

    /// Verifies inbound and signs outbound metrics when a key is configured
    pub signer: Option<Signer>,
}

impl ApiState {
    pub fn new(store: Arc<dyn MetricStore>, signer: Option<Signer>) -> Self {
        Self { store, signer }
    }

    /// Decode a wire payload, checking its signature when signing is on
    pub fn accept(&self, payload: &MetricPayload) -> ApiResult<Metric> {
        let metric = Metric::try_from(payload)?;
        if let Some(signer) = &self.signer {
            signer.verify(&metric, payload.hash.as_deref())?;
        }
        Ok(metric)
    }

    /// Encode a metric for a response, signed when signing is on
    pub fn reply(&self, metric: &Metric) -> ApiResult<MetricPayload> {
        Ok(MetricPayload::encode(metric, self.signer.as_ref())?)
    }
}
