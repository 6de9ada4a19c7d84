//! Server-side metric storage
//!
//! ## Design
//!
//! - **Trait-based**: `MetricStore` lets the HTTP layer and the backup actor
//!   work against any implementation through one shared `Arc<dyn MetricStore>`
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Merge semantics**: gauges overwrite, counters add (saturating)
//!
//! ## Stores
//!
//! - **In-Memory** (default): `MemoryStore`, persisted through the snapshot file
//! - **SQLite**: `SqliteStore`, selected by a database DSN
//!
//! ## Usage
//!
//! ```no_run
//! use sysmonitor::metric::Metric;
//! use sysmonitor::storage::{MemoryStore, MetricStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryStore::new();
//!     store.update(Metric::counter("PollCount", 5)).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod snapshot;

#[cfg(feature = "storage-sqlite")]
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::MetricStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteStore;
