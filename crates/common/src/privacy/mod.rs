//! Log-safe rendering of personal identifiers

pub mod redact;

pub use redact::redact_identifier;
