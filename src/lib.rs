// library entry
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod ratelimit;

#[cfg(test)]
pub mod test_utils;

// Re-export key components for convenience
pub use error::{GuardedCallError, GuardrailError, Result};
pub use health::{ServiceConfig, ServiceHealthManager, ServiceState, ServiceStatus};
pub use logging::init as init_logging;
pub use ratelimit::{KeyPattern, RateLimitRule, RateLimitStatus, RateLimiter};
