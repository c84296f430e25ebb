//! Pacing policies.
//!
//! ```text
//! fault → [Backoff] → reconnect          send → [Cooldown] → wire
//! ```

pub mod backoff;
pub mod cooldown;

pub use backoff::{Backoff, BackoffConfig};
pub use cooldown::Cooldown;
