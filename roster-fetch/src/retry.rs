//! Backoff policy between fetch attempts.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential backoff between attempts.
///
/// The number of attempts is not part of the policy; it comes from each
/// request's retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry. Zero retries immediately.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Random extra delay in `[0, jitter)` added to each backoff.
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn new(initial_backoff: Duration, max_backoff: Duration, multiplier: f64) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            multiplier,
            jitter: Duration::ZERO,
        }
    }

    /// Retry without waiting.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1.0)
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.initial_backoff.as_millis() as f64;
        let scaled = base_ms * self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let capped = scaled.min(self.max_backoff.as_millis() as f64);
        jittered(Duration::from_millis(capped as u64), self.jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(5), 2.0)
    }
}

fn jittered(base: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return base;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    base.saturating_add(Duration::from_millis(nanos % jitter_ms))
}
