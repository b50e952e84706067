//! Exponential backoff calculation
//!
//! `delay = min(base * 2^failures, max)`, saturating on overflow.

use std::time::Duration;

/// Exponent ceiling; 2^30 times any sane base already exceeds every cap.
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Backoff parameters for retrying a failing unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base) }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay to wait after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let base_millis = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let max_millis = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);

        let exponent = failures.min(MAX_BACKOFF_EXPONENT);
        let multiplier = 2_u64.saturating_pow(exponent);
        let delay_millis = base_millis.saturating_mul(multiplier).min(max_millis);

        Duration::from_millis(delay_millis)
    }
}
