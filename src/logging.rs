use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,guardrail=trace
pub fn init() {
    INIT.call_once(|| {
        // Default to 'info' level if RUST_LOG is not specified
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .init();

        tracing::info!("Logging initialized");
    });
}

/// Macro for logging admission-control decisions
#[macro_export]
macro_rules! admission_event {
    ($key:expr, $rule:expr, $allowed:expr, $remaining:expr) => {
        tracing::info!(
            key = $key,
            rule = $rule,
            allowed = $allowed,
            remaining = $remaining,
            "Admission check"
        )
    };
}

/// Macro for logging service lifecycle transitions
#[macro_export]
macro_rules! service_event {
    ($name:expr, $state:expr, $attempts:expr) => {
        tracing::info!(
            service = $name,
            state = ?$state,
            attempts = $attempts,
            "Service state transition"
        )
    };
}
