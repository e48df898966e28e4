//! Retry delay policy.
//!
//! The delivery engine waits before every resubmission: after a throttled
//! write, after a token refresh, and between provisioning confirmation
//! describes. The default is a fixed interval (zero unless configured). A
//! capped exponential backoff is available for deployments that prefer to
//! slow down under sustained remote unavailability.
//!
//! - [`RetryPolicy`]: fixed or backoff policy, `delay(attempt)`
//! - [`calculate_backoff_delay`]: `min(max, base * 2^attempt)`

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum delay for backoff in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Delay between successive attempts of the same write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// The same delay before every attempt.
    Fixed {
        /// Delay in milliseconds (0 retries on the next scheduler turn).
        interval_ms: u64,
    },
    /// Exponential growth from `base_delay_ms`, capped at `max_delay_ms`.
    Backoff {
        /// Delay before the first retry.
        base_delay_ms: u64,
        /// Upper bound on any single delay.
        max_delay_ms: u64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed { interval_ms: 0 }
    }
}

impl RetryPolicy {
    /// A fixed-interval policy.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn fixed(interval: Duration) -> Self {
        Self::Fixed {
            interval_ms: interval.as_millis() as u64,
        }
    }

    /// Delay before retry number `attempt` (zero-based: 0 is the first retry).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { interval_ms } => Duration::from_millis(interval_ms),
            Self::Backoff {
                base_delay_ms,
                max_delay_ms,
            } => Duration::from_millis(calculate_backoff_delay(
                attempt,
                base_delay_ms,
                max_delay_ms,
            )),
        }
    }
}

/// Calculate a capped exponential backoff delay.
///
/// Formula: `min(max_delay, base_delay * 2^attempt)`. Saturates instead of
/// overflowing for large attempt numbers.
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    exponential.min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
