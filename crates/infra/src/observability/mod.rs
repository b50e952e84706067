//! Observability for the sync scheduler
//!
//! Structured logging goes through `tracing`; this module holds the
//! in-process counters the scheduler logs after every tick.

pub mod sync_metrics;

pub use sync_metrics::{SyncMetrics, SyncMetricsSnapshot};
