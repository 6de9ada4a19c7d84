//! Error types for storage operations

use std::fmt;

use crate::metric::{MetricError, MetricKind};

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug)]
pub enum StorageError {
    /// No entry with this name
    NotFound(String),

    /// Update kind differs from the kind already stored under this name
    KindMismatch {
        name: String,
        stored: MetricKind,
        update: MetricKind,
    },

    /// `find` offset lies outside the collection
    InvalidRange { offset: usize, len: usize },

    /// Database connection failed
    ConnectionFailed(String),

    /// Database query failed
    QueryFailed(String),

    /// Migration failed
    MigrationFailed(String),

    /// Metric serialization/deserialization error
    SerializationError(String),

    /// I/O error (file access, etc.)
    IoError(std::io::Error),
}

impl StorageError {
    /// Attach the metric name to a merge failure
    pub fn from_merge(name: &str, err: MetricError) -> Self {
        match err {
            MetricError::KindMismatch { stored, update } => StorageError::KindMismatch {
                name: name.to_string(),
                stored,
                update,
            },
            other => StorageError::SerializationError(other.to_string()),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(name) => write!(f, "metric '{}' not found", name),
            StorageError::KindMismatch {
                name,
                stored,
                update,
            } => write!(
                f,
                "metric '{}' is stored as a {}, can not apply a {} update",
                name, stored, update
            ),
            StorageError::InvalidRange { offset, len } => {
                write!(f, "offset {} is out of range for {} metrics", offset, len)
            }
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to storage backend: {}", msg)
            }
            StorageError::QueryFailed(msg) => write!(f, "storage query failed: {}", msg),
            StorageError::MigrationFailed(msg) => write!(f, "database migration failed: {}", msg),
            StorageError::SerializationError(msg) => {
                write!(f, "metric serialization error: {}", msg)
            }
            StorageError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::IoError(io_err),
            sqlx::Error::RowNotFound => StorageError::QueryFailed("no rows found".to_string()),
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}
