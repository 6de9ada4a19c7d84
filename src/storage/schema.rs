//! Database row definition
//!
//! One row per metric name. `m_type` holds the wire spelling of the kind;
//! exactly one of `delta` (counter) or `val` (gauge) is set.

use std::str::FromStr;

use crate::metric::{Metric, MetricKind, MetricValue};

use super::error::StorageError;

/// A single row of the `metrics` table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MetricRow {
    pub id: String,
    pub m_type: String,
    pub delta: Option<i64>,
    pub val: Option<f64>,
}

impl TryFrom<MetricRow> for Metric {
    type Error = StorageError;

    fn try_from(row: MetricRow) -> Result<Self, Self::Error> {
        let kind = MetricKind::from_str(&row.m_type)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let value = match (kind, row.delta, row.val) {
            (MetricKind::Counter, Some(delta), _) => MetricValue::Counter(delta),
            (MetricKind::Gauge, _, Some(val)) => MetricValue::Gauge(val),
            _ => {
                return Err(StorageError::SerializationError(format!(
                    "row '{}' has no value for its {} type",
                    row.id, kind
                )));
            }
        };

        Ok(Metric {
            name: row.id,
            value,
        })
    }
}
