// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backoff policies used by the tail and batch engines.
//!
//! Three independent policies exist:
//! - [`calculate_backoff`]: generic failures (transport, 5xx, decode),
//!   `2^n` seconds capped at 30 s with ±10% jitter and a 1 s floor.
//! - [`RateLimitBackoff`]: tail-mode 429 handling, grows by 1.5x up to 60 s
//!   and is reset by the caller after a run of successes.
//! - [`batch_rate_limit_delay`]: batch-mode 429 handling, `2 s * 2^attempt`
//!   plus up to 25% jitter.

use std::time::Duration;

/// Lower bound for the generic retry delay.
pub const MIN_RETRY_BACKOFF: Duration = Duration::from_secs(1);
/// Upper bound for the generic retry delay.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);
/// Share of the generic delay used as jitter amplitude (±half of it).
const RETRY_JITTER_RATIO: f64 = 0.2;

/// Initial rate limit delay in tail mode.
pub const INITIAL_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);
/// Ceiling of the tail-mode rate limit delay.
pub const MAX_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);
const RATE_LIMIT_FACTOR: f64 = 1.5;

/// Base delay of the batch-mode rate limit policy.
pub const BATCH_BASE_DELAY: Duration = Duration::from_secs(2);

/// Computes the wait before the next attempt after `retry_count` consecutive
/// generic failures.
///
/// A retry count of zero is the sentinel "no failure yet" case and returns the
/// floor without jitter.
pub fn calculate_backoff(retry_count: u32) -> Duration {
    calculate_backoff_with_jitter(retry_count, fastrand::f64())
}

/// Same as [`calculate_backoff`] with the random sample (in `[0, 1)`) supplied
/// by the caller.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use dd_log_tail::backoff::calculate_backoff_with_jitter;
///
/// // A sample of 0.5 adds no jitter.
/// assert_eq!(calculate_backoff_with_jitter(3, 0.5), Duration::from_secs(8));
/// assert_eq!(calculate_backoff_with_jitter(10, 0.5), Duration::from_secs(30));
/// assert_eq!(calculate_backoff_with_jitter(0, 0.9), Duration::from_secs(1));
/// ```
pub fn calculate_backoff_with_jitter(retry_count: u32, sample: f64) -> Duration {
    if retry_count == 0 {
        return MIN_RETRY_BACKOFF;
    }

    let max = MAX_RETRY_BACKOFF.as_secs_f64();
    // 2^5 already exceeds the cap, larger exponents only risk overflow.
    let exponent = retry_count.min(16) as i32;
    let base = 2f64.powi(exponent).min(max);
    let jitter = base * RETRY_JITTER_RATIO * (sample - 0.5);
    let seconds = (base + jitter).clamp(MIN_RETRY_BACKOFF.as_secs_f64(), max);

    Duration::from_secs_f64(seconds)
}

/// Tracks the tail-mode rate limit delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitBackoff {
    current: Duration,
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self {
            current: INITIAL_RATE_LIMIT_BACKOFF,
        }
    }
}

impl RateLimitBackoff {
    /// Current delay before jitter.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Grows the delay for a new rate limit answer and returns the wait,
    /// including up to 10% jitter.
    pub fn register_rate_limit(&mut self) -> Duration {
        let grown = self.current.mul_f64(RATE_LIMIT_FACTOR);
        self.current = grown.min(MAX_RATE_LIMIT_BACKOFF);
        self.current + random_below(self.current / 10)
    }

    /// Returns to the initial delay.
    pub fn reset(&mut self) {
        self.current = INITIAL_RATE_LIMIT_BACKOFF;
    }
}

/// Wait before retry `attempt` (zero based) after a batch page was rate limited.
pub fn batch_rate_limit_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(16) as i32;
    let delay = BATCH_BASE_DELAY.mul_f64(2f64.powi(exponent));
    delay + random_below(delay / 4)
}

/// Uniform duration in `[0, upper)`, zero when `upper` is zero.
fn random_below(upper: Duration) -> Duration {
    let nanos = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(fastrand::u64(..nanos))
}
