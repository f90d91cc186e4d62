// src/ratelimit/window.rs

use std::time::Instant;

/// Counter state for one key in the current fixed window.
///
/// Entries are created lazily on the first check for a key, replaced (not
/// mutated) once the window has expired, and removed by periodic cleanup.
/// The `blocked` flag is sticky until the window resets.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    /// Requests recorded in the current window
    pub count: u64,

    /// When the current window ends
    pub reset_at: Instant,

    /// Set once the limit has been tripped; cleared only by window reset
    pub blocked: bool,
}

impl WindowEntry {
    /// A fresh, unblocked window ending at the given deadline
    pub fn fresh(reset_at: Instant) -> Self {
        Self {
            count: 0,
            reset_at,
            blocked: false,
        }
    }

    /// Whether the window has ended as of `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }
}
