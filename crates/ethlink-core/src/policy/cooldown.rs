//! Minimum spacing between two sends on one connection.
//!
//! Unlike a token bucket, a cooldown never rejects: the caller waits until
//! `interval` has passed since the previous send.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Cooldown {
    interval: Duration,
    last: Option<Instant>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left before the next send is allowed at `now`.
    pub fn wait_time(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => (last + self.interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Record a send at `now`.
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Sleep until the next send is allowed, then record it.
    pub async fn acquire(&mut self) {
        let wait = self.wait_time(Instant::now());
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "request cooldown");
            tokio::time::sleep(wait).await;
        }
        self.mark(Instant::now());
    }
}
