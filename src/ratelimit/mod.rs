// src/ratelimit/mod.rs
//! Fixed-window admission control keyed by composite `action_identifier` keys.
//!
//! Application code asks [`RateLimiter::is_allowed`] before performing a call
//! and reports the outcome with [`RateLimiter::record_request`], or wraps the
//! whole thing in [`RateLimiter::guard`]. Keys with no matching rule are
//! always admitted (open by default).

mod limiter;
mod rule;
mod window;

#[cfg(test)]
mod tests;

use std::time::Duration;

// Re-export key components
pub use limiter::RateLimiter;
pub use rule::{KeyPattern, RateLimitRule};
pub use window::WindowEntry;

/// Read-only snapshot of the limit state for one key
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    /// Whether the next request would be allowed
    pub allowed: bool,

    /// Remaining requests in the current window; `None` when no rule matches
    /// the key (unlimited)
    pub remaining: Option<u64>,

    /// Total capacity of the window; `None` when no rule matches
    pub limit: Option<u64>,

    /// Time until the current window resets; `None` when no window is open
    pub reset_after: Option<Duration>,

    /// Whether the key is currently blocked
    pub blocked: bool,
}
