// src/error.rs

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardrailError {
    /// Returned when a rate limit has been exceeded for a key
    #[error("Rate limit exceeded for key '{key}', retry after {reset_after:?}")]
    RateLimited { key: String, reset_after: Duration },

    /// A service loader did not finish within its configured timeout
    #[error("Service '{name}' load timed out after {after:?}")]
    Timeout { name: String, after: Duration },

    /// A service loader returned an error
    #[error("Service '{name}' failed to load: {reason}")]
    LoadFailed { name: String, reason: String },

    /// Configuration-related errors (bad patterns, unparseable settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error returned by the limiter's guarded-call combinator, separating
/// admission denial from the guarded operation's own failure.
#[derive(Error, Debug)]
pub enum GuardedCallError<E> {
    /// The call was denied before the operation ran
    #[error("Rate limit exceeded for key '{key}', retry after {reset_after:?}")]
    RateLimited { key: String, reset_after: Duration },

    /// The operation ran and failed; the original error is preserved unchanged
    #[error("operation failed: {0}")]
    Operation(E),
}

// implement conversions from serde_json::Error for settings parsing
impl From<serde_json::Error> for GuardrailError {
    fn from(err: serde_json::Error) -> Self {
        GuardrailError::Config(err.to_string())
    }
}

impl From<regex::Error> for GuardrailError {
    fn from(err: regex::Error) -> Self {
        GuardrailError::Config(format!("invalid rule pattern: {}", err))
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, GuardrailError>;
