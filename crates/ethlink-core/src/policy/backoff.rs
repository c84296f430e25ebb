//! Exponential backoff between consecutive reconnect attempts.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first delayed attempt.
    pub initial: Duration,
    /// Cap for exponential growth.
    pub max: Duration,
    /// Multiplier applied on each consecutive attempt.
    pub multiplier: f64,
    /// The first attempt after a reset happens without delay.
    pub immediate_first: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            immediate_first: true,
        }
    }
}

/// Stateful backoff. Call [`reset`](Backoff::reset) once the link is healthy.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let exponent = if self.config.immediate_first {
            if self.attempt == 1 {
                return Duration::ZERO;
            }
            self.attempt - 2
        } else {
            self.attempt - 1
        };

        let base_ms =
            self.config.initial.as_millis() as f64 * self.config.multiplier.powi(exponent as i32);
        let cap_ms = self.config.max.as_millis() as f64;
        Duration::from_millis(base_ms.min(cap_ms) as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
