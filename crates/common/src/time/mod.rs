//! Wall-clock abstraction
//!
//! Every scheduling decision (due selection, backoff, session expiry) reads
//! time through [`Clock`] so tests can pin and advance it.

pub mod clock;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
