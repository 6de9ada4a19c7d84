//! Actor-based agent pipeline and server background tasks
//!
//! Each actor runs as an independent async task communicating via Tokio channels.
//!
//! ## Agent Overview
//!
//! ```text
//!   SampleCollectorActor ── watch(Arc<MetricSnapshot>) ──> poller
//!          │                                                 │
//!          │                                    mpsc::channel(rate_limit) of Batch
//!          │                                                 │
//!          │                             ┌───────────────────┼───────────────────┐
//!          │                             ▼                   ▼                   ▼
//!          │                      DeliveryWorker-1    DeliveryWorker-2  ... DeliveryWorker-N
//!          │                             │                   │                   │
//!          └──────────── AgentError (unbounded) ◄────────────┴───────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **SampleCollectorActor**: Refreshes host statistics on the poll interval
//! - **poller**: Turns snapshots into batches on the report interval
//! - **DeliveryWorker**: POSTs batches to the server, `rate_limit` of them
//! - **BackupActor**: Dumps the server's store to the snapshot file
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Snapshots**: The collector publishes immutable snapshots over a watch channel
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod backup;
pub mod collector;
pub mod messages;
pub mod poller;
pub mod sender;
