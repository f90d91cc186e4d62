// src/health/mod.rs
//! Best-effort asynchronous bootstrapping of named subsystems.
//!
//! Integrations that may be missing or flaky (voice synthesis, analytics,
//! payments) are registered with a loader, a timeout and a retry policy;
//! the rest of the application then asks [`ServiceHealthManager`] whether a
//! feature is available instead of crashing on a missing dependency:
//!
//! 1. **Timeout-bounded loading** - a hung loader cannot stall startup
//! 2. **Retry with backoff** - optional services get several chances
//! 3. **Status queries** - availability is checked, failures never propagate
//! 4. **Listener notification** - interested code observes transitions

mod backoff;
mod loader;
mod manager;
mod status;

#[cfg(test)]
mod tests;

// Re-export key components
pub use backoff::{BackoffConfig, RetryBackoff};
pub use loader::{loader_fn, ServiceConfig, ServiceInstance, ServiceLoader};
pub use manager::{ListenerId, ServiceHealthManager, DEFAULT_HEALTH_CHECK_INTERVAL};
pub use status::{HealthSummary, ServiceState, ServiceStatus};
