//! SQLite merge store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Atomic merge**: each metric is one `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`
//!   statement, so the counter sum happens inside SQLite rather than as a
//!   read-modify-write from Rust
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Every write, single or batched, runs in one transaction.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::metric::{Metric, MetricKind, MetricValue};

use super::backend::{MetricStore, check_range};
use super::error::{StorageError, StorageResult};
use super::schema::MetricRow;

const UPSERT_GAUGE: &str = r#"
    INSERT INTO metrics (id, m_type, val)
    VALUES (?1, 'gauge', ?2)
    ON CONFLICT (id) DO UPDATE SET val = excluded.val
    WHERE metrics.m_type = 'gauge'
    RETURNING val
"#;

// ?3 and ?4 are i64::MAX and i64::MIN; the CASE pins the sum at those bounds
// because SQLite would otherwise turn an overflowing sum into a REAL.
const UPSERT_COUNTER: &str = r#"
    INSERT INTO metrics (id, m_type, delta)
    VALUES (?1, 'counter', ?2)
    ON CONFLICT (id) DO UPDATE SET delta = CASE
        WHEN excluded.delta > 0 AND metrics.delta > ?3 - excluded.delta THEN ?3
        WHEN excluded.delta < 0 AND metrics.delta < ?4 - excluded.delta THEN ?4
        ELSE metrics.delta + excluded.delta
    END
    WHERE metrics.m_type = 'counter'
    RETURNING delta
"#;

/// SQLite merge store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database behind `dsn` and run migrations
    ///
    /// `dsn` is either a `sqlite:` URL or a plain file path.
    #[instrument(skip_all)]
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        info!("initializing SQLite store at: {}", dsn);

        let options = if dsn.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(dsn)
                .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new().filename(dsn)
        };

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("SQLite store ready");
        Ok(Self { pool })
    }

    async fn upsert(conn: &mut SqliteConnection, metric: &Metric) -> StorageResult<Metric> {
        let value = match metric.value {
            MetricValue::Gauge(value) => sqlx::query_scalar::<_, f64>(UPSERT_GAUGE)
                .bind(&metric.name)
                .bind(value)
                .fetch_optional(&mut *conn)
                .await?
                .map(MetricValue::Gauge),
            MetricValue::Counter(delta) => sqlx::query_scalar::<_, i64>(UPSERT_COUNTER)
                .bind(&metric.name)
                .bind(delta)
                .bind(i64::MAX)
                .bind(i64::MIN)
                .fetch_optional(&mut *conn)
                .await?
                .map(MetricValue::Counter),
        };

        match value {
            Some(value) => Ok(Metric {
                name: metric.name.clone(),
                value,
            }),
            // The conflict guard rejected the update: the stored kind differs
            None => {
                let stored: String = sqlx::query_scalar("SELECT m_type FROM metrics WHERE id = ?1")
                    .bind(&metric.name)
                    .fetch_one(&mut *conn)
                    .await?;
                let stored = MetricKind::from_str(&stored)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))?;

                Err(StorageError::KindMismatch {
                    name: metric.name.clone(),
                    stored,
                    update: metric.kind(),
                })
            }
        }
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn get(&self, name: &str) -> StorageResult<Metric> {
        let row: Option<MetricRow> =
            sqlx::query_as("SELECT id, m_type, delta, val FROM metrics WHERE id = ?1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| StorageError::NotFound(name.to_string()))?
            .try_into()
    }

    #[instrument(skip(self))]
    async fn find(&self, limit: usize, offset: usize) -> StorageResult<Vec<Metric>> {
        let mut tx = self.pool.begin().await?;

        let len: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metrics")
            .fetch_one(&mut *tx)
            .await?;
        check_range(limit, offset, len as usize)?;

        // LIMIT -1 is SQLite for "no limit"
        let sql_limit = if limit == 0 { -1 } else { limit as i64 };
        let rows: Vec<MetricRow> = sqlx::query_as(
            "SELECT id, m_type, delta, val FROM metrics ORDER BY id LIMIT ?1 OFFSET ?2",
        )
        .bind(sql_limit)
        .bind(offset as i64)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        rows.into_iter().map(Metric::try_from).collect()
    }

    #[instrument(skip(self), fields(name = %metric.name))]
    async fn update(&self, metric: Metric) -> StorageResult<Metric> {
        let mut tx = self.pool.begin().await?;
        let merged = Self::upsert(&mut *tx, &metric).await?;
        tx.commit().await?;
        Ok(merged)
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn batch_update(&self, metrics: Vec<Metric>) -> StorageResult<Vec<Metric>> {
        if metrics.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping the transaction on error rolls every statement back
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(metrics.len());
        for metric in &metrics {
            results.push(Self::upsert(&mut *tx, metric).await?);
        }
        tx.commit().await?;

        debug!("batch update complete");
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("ping failed: {}", e);
                StorageError::ConnectionFailed(e.to_string())
            })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
