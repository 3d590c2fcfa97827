use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry schedule for destination writes, with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Multiplier applied for each subsequent retry.
    pub backoff_factor: f64,
    /// Backoff cap.
    pub max_delay_ms: u64,
    /// Adds ±25% jitter so concurrent workers do not retry in lockstep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let initial = Duration::from_millis(self.initial_delay_ms).as_secs_f64();
        let secs = initial * self.backoff_factor.powi(exp);
        let capped = secs.min(Duration::from_millis(self.max_delay_ms).as_secs_f64());
        if !self.jitter {
            return Duration::from_secs_f64(capped.max(0.0));
        }
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / 1_000_000_000.0)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + jitter * offset).max(0.0))
    }
}
