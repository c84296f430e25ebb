//! Outbound queue shared by every transport.
//!
//! Payloads pushed into an [`Outbox`] are paced by a background task that
//! applies the endpoint's request cooldown and, when a batch window is set,
//! coalesces everything queued within the window into one JSON array. The
//! transport's writer consumes the resulting frames.
//!
//! ```text
//! send() → Outbox → [batch window] → [cooldown] → frames → writer
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use crate::endpoint::EndpointSettings;
use crate::policy::Cooldown;
use crate::wire::join_batch;

/// Upper bound on requests per batch frame.
pub const MAX_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxConfig {
    pub cooldown: Option<Duration>,
    pub batch_window: Option<Duration>,
    pub max_batch: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            cooldown: None,
            batch_window: None,
            max_batch: MAX_BATCH_SIZE,
        }
    }
}

impl OutboxConfig {
    pub fn from_settings(settings: &EndpointSettings) -> Self {
        Self {
            cooldown: settings.request_cooldown.filter(|d| !d.is_zero()),
            batch_window: settings.batch_window.filter(|d| !d.is_zero()),
            max_batch: MAX_BATCH_SIZE,
        }
    }
}

/// Sending half. Dropping it stops the pacing task once drained.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbox {
    /// Start the pacing task on the current runtime.
    ///
    /// Returns the outbox and the receiver of paced frames.
    pub fn spawn(config: OutboxConfig) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            pace_loop(rx, frame_tx, config).await;
        });
        (Self { tx }, frame_rx)
    }

    /// Queue a payload. Returns `false` once the pacing task has stopped.
    pub fn push(&self, payload: String) -> bool {
        self.tx.send(payload).is_ok()
    }
}

async fn pace_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    frames: mpsc::UnboundedSender<String>,
    config: OutboxConfig,
) {
    let mut cooldown = config.cooldown.map(Cooldown::new);
    let max_batch = config.max_batch.max(1);

    loop {
        let first = match rx.recv().await {
            Some(payload) => payload,
            None => break,
        };
        let mut batch = vec![first];

        if let Some(window) = config.batch_window {
            let deadline = time::sleep(window);
            tokio::pin!(deadline);

            while batch.len() < max_batch {
                tokio::select! {
                    _ = &mut deadline => break,
                    item = rx.recv() => {
                        match item {
                            Some(payload) => batch.push(payload),
                            None => break,
                        }
                    }
                }
            }
        }

        if let Some(cooldown) = cooldown.as_mut() {
            cooldown.acquire().await;
        }

        let frame = if batch.len() == 1 {
            batch.remove(0)
        } else {
            tracing::trace!(size = batch.len(), "flushing batch");
            join_batch(&batch)
        };
        if frames.send(frame).is_err() {
            break;
        }
    }
}
