//! OAuth session ports and orchestration

pub mod ports;
pub mod service;

pub use ports::{OAuthSessionStore, PhaseTransition};
pub use service::{InitiatedSession, OAuthDependencies, OAuthSessionService};
