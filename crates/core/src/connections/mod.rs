//! Connection persistence ports and lifecycle operations

pub mod lifecycle;
pub mod ports;

pub use lifecycle::{ConnectionLifecycleService, IcsSubscription, LifecycleDependencies};
pub use ports::{ClaimFence, ConnectionRepository, CredentialStore, MirroredEventRepository};
