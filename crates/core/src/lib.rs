//! # HearthSync Core
//!
//! Calendar connection sync engine - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for repositories, session store, provider
//!   adapters, feed fetching and notification transport
//! - OAuth session orchestration and ICS validation
//! - Reconciliation, failure/backoff policy, single-connection sync and
//!   batch execution
//! - The operation pipeline and the API facade
//!
//! ## Architecture Principles
//! - Only depends on `hearthsync-common` and `hearthsync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod api;
pub mod connections;
pub mod ics;
pub mod oauth;
pub mod pipeline;
pub mod providers;
pub mod sync;

pub use api::CalendarConnectionsApi;
pub use connections::{
    ClaimFence, ConnectionLifecycleService, ConnectionRepository, CredentialStore, IcsSubscription,
    LifecycleDependencies, MirroredEventRepository,
};
pub use ics::IcsValidator;
pub use oauth::{
    InitiatedSession, OAuthDependencies, OAuthSessionService, OAuthSessionStore, PhaseTransition,
};
pub use pipeline::{
    LoggingLayer, OperationContext, OperationLayer, OperationPipeline, OperationReport,
    TimingLayer, ValidationLayer,
};
pub use providers::{
    AuthorizationRequest, CalendarProviderAdapter, FeedFetcher, ProviderRegistry, ProviderResult,
};
pub use sync::{
    BackgroundSyncTrigger, BatchLimits, BatchSummary, ChangeNotifier, ConnectionSyncService,
    EventChangeSet, FailureBackoffManager, NoopSyncTrigger, NotificationTransport,
    ReconciliationEngine, SkipReason, SyncAttempt, SyncBatchRunner, SyncDependencies,
    SyncOptions, SyncTrigger,
};
