//! Change notification transports

pub mod broadcast;

pub use broadcast::BroadcastTransport;
