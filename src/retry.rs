//! Retry policy with exponential backoff.
//!
//! Transient worker failures are retried with `base * multiplier^attempt`
//! delays, capped at a maximum, with optional multiplicative jitter to avoid
//! thundering herds. Jitter is off by default so delay growth is
//! deterministic and monotone unless explicitly requested.

use std::time::Duration;

/// Backoff configuration applied to transient computation failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt. Zero disables retries.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Hard cap on any single delay.
    pub max_delay: Duration,
    /// Exponential growth factor, typically 2.0.
    pub multiplier: f64,
    /// Jitter factor in `[0.0, 1.0]`; the delay is scaled by a random value
    /// in `[1 - jitter, 1 + jitter]`.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_millis() as f64);

        let jittered = if self.jitter_factor > 0.0 {
            let scale = 1.0 + (rand::random::<f64>() * 2.0 - 1.0) * self.jitter_factor;
            capped * scale
        } else {
            capped
        };

        Duration::from_millis(jittered.max(0.0) as u64)
    }
}
