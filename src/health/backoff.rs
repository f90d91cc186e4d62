// src/health/backoff.rs

use std::time::Duration;

/// Configuration for retry backoff
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Base delay; attempt n waits base * n
    pub base_delay: Duration,
    /// Ceiling on any single delay
    pub max_delay: Duration,
    /// Whether to scale delays by a random factor in [0.5, 1.0]
    pub use_jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            use_jitter: false,
        }
    }
}

/// Backoff schedule growing linearly with the attempt number.
///
/// Without jitter the schedule is non-decreasing, which keeps retry spacing
/// predictable for tests and for log correlation.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    config: BackoffConfig,
}

impl RetryBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.config.base_delay.as_millis() as u64;
        let scaled_ms = base_ms.saturating_mul(attempt.max(1) as u64);
        let capped_ms = scaled_ms.min(self.config.max_delay.as_millis() as u64);

        let final_ms = if self.config.use_jitter {
            let jitter = rand::random::<f64>() * 0.5 + 0.5;
            (capped_ms as f64 * jitter) as u64
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
