//! # HearthSync Domain
//!
//! Business types for the calendar connection sync engine.
//!
//! This crate contains:
//! - Connection, event and OAuth session models
//! - Error taxonomy and Result alias
//! - Configuration structures and default constants
//!
//! ## Architecture
//! - No dependencies on other HearthSync crates
//! - Pure data and state-machine rules, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
