//! Sync engine: reconciliation, backoff, notification and batch execution

pub mod backoff;
pub mod batch;
pub mod notifier;
pub mod reconcile;
pub mod service;
pub mod trigger;

pub use backoff::{FailureBackoffManager, FailureReport};
pub use batch::{BatchLimits, BatchSummary, SyncBatchRunner};
pub use notifier::{ChangeNotifier, NotificationTransport};
pub use reconcile::{content_hash, EventChangeSet, ReconcileCounts, ReconcilePlan, ReconciliationEngine};
pub use service::{ConnectionSyncService, SkipReason, SyncAttempt, SyncDependencies, SyncOptions};
pub use trigger::{BackgroundSyncTrigger, NoopSyncTrigger, SyncTrigger};
