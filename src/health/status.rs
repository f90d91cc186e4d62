// src/health/status.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Load in progress (including waits between retries)
    Loading,
    /// Instance is available
    Loaded,
    /// Required service failed terminally
    Failed,
    /// Optional service exhausted its retries
    Unavailable,
}

/// Snapshot of one service's lifecycle bookkeeping.
///
/// The loaded instance itself is not part of the snapshot; fetch it with
/// [`ServiceHealthManager::get_service`](super::ServiceHealthManager::get_service).
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub state: ServiceState,

    /// Message from the most recent failure, if any
    pub error: Option<String>,

    /// Timestamp of the last status transition
    pub last_check: DateTime<Utc>,

    /// Load attempts made so far
    pub attempts: u32,
}

impl ServiceStatus {
    pub(crate) fn loading() -> Self {
        Self {
            state: ServiceState::Loading,
            error: None,
            last_check: Utc::now(),
            attempts: 0,
        }
    }
}

/// Aggregate view across all registered services
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub loaded: usize,
    pub loading: usize,
    pub failed: usize,
    pub unavailable: usize,

    /// Fraction of services loaded; 1.0 when nothing is registered
    pub healthy: f64,
}
