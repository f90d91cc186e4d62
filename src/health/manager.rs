// src/health/manager.rs

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backoff::{BackoffConfig, RetryBackoff};
use super::loader::{ServiceConfig, ServiceInstance};
use super::status::{HealthSummary, ServiceState, ServiceStatus};
use crate::config::HealthSettings;
use crate::error::GuardrailError;

/// Default interval for the observational health-check task
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Handle for unregistering a status listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

type Listener = Arc<dyn Fn(&str, &ServiceStatus) + Send + Sync>;

/// Registry entry: lifecycle snapshot plus the loaded instance.
///
/// `epoch` ties in-flight load tasks to the registration that spawned them,
/// so a task left over from a replaced registration cannot clobber state.
struct ServiceRecord {
    status: ServiceStatus,
    instance: Option<ServiceInstance>,
    epoch: u64,
}

/// Registry of named optional/required subsystems with graceful degradation.
///
/// Construct one instance at application startup and share it by cloning
/// (state is Arc-backed); there is deliberately no global singleton. UI and
/// feature code query availability before use instead of crashing on a
/// missing integration; load failures are observable only through status
/// queries and never propagate as errors.
#[derive(Clone)]
pub struct ServiceHealthManager {
    services: Arc<RwLock<HashMap<String, ServiceRecord>>>,
    listeners: Arc<Mutex<HashMap<ListenerId, Listener>>>,
    backoff: RetryBackoff,
    next_epoch: Arc<AtomicU64>,
    checks_cancel: Arc<AtomicBool>,
}

impl ServiceHealthManager {
    pub fn new() -> Self {
        Self::with_backoff(RetryBackoff::default())
    }

    /// Build a manager whose retry schedule comes from settings
    pub fn with_settings(settings: &HealthSettings) -> Self {
        Self::with_backoff(RetryBackoff::new(BackoffConfig {
            base_delay: settings.retry_base_delay,
            max_delay: settings.max_retry_delay,
            use_jitter: false,
        }))
    }

    pub fn with_backoff(backoff: RetryBackoff) -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            backoff,
            next_epoch: Arc::new(AtomicU64::new(0)),
            checks_cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a service and begin loading it in the background.
    ///
    /// Returns immediately; progress is observable through the query API
    /// and status listeners. Re-registering a name replaces the previous
    /// record and orphans any load still in flight for it.
    pub fn register_service(&self, config: ServiceConfig) {
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        let name = config.name.clone();

        {
            let mut services = self.services.write().unwrap();
            services.insert(
                name.clone(),
                ServiceRecord {
                    status: ServiceStatus::loading(),
                    instance: None,
                    epoch,
                },
            );
        }

        debug!(service = name.as_str(), required = config.required, "Service registered");

        let manager = self.clone();
        task::spawn(async move {
            manager.load_service(config, epoch).await;
        });
    }

    /// Drive a single service through load, retry and terminal states.
    ///
    /// The timeout uses `tokio::time::timeout`, so a loader losing the race
    /// is dropped and genuinely cancelled rather than left running.
    async fn load_service(&self, config: ServiceConfig, epoch: u64) {
        loop {
            let Some(attempt) = self.bump_attempts(&config.name, epoch) else {
                // Registration was replaced or cleaned up; this task is stale
                return;
            };

            let outcome = time::timeout(config.timeout, config.loader.load()).await;

            match outcome {
                Ok(Ok(instance)) => {
                    if let Some(status) = self.set_loaded(&config.name, epoch, instance) {
                        info!(
                            service = config.name.as_str(),
                            attempts = status.attempts,
                            "Service loaded"
                        );
                        self.notify_listeners(&config.name, &status);
                    }
                    return;
                }
                Ok(Err(err)) => {
                    self.record_failure(&config.name, epoch, err.to_string());
                }
                Err(_) => {
                    let err = GuardrailError::Timeout {
                        name: config.name.clone(),
                        after: config.timeout,
                    };
                    self.record_failure(&config.name, epoch, err.to_string());
                }
            }

            if !config.required && attempt < config.retry_attempts {
                let delay = self.backoff.delay_for(attempt);
                debug!(
                    service = config.name.as_str(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Service load failed, retrying after backoff"
                );
                time::sleep(delay).await;
                continue;
            }

            // Terminal: a required service fails hard, an optional one
            // degrades. Neither propagates to the caller.
            let state = if config.required {
                ServiceState::Failed
            } else {
                ServiceState::Unavailable
            };
            if let Some(status) = self.set_terminal(&config.name, epoch, state) {
                error!(
                    service = config.name.as_str(),
                    state = ?state,
                    attempts = status.attempts,
                    error = status.error.as_deref().unwrap_or("unknown"),
                    "Service load gave up"
                );
                self.notify_listeners(&config.name, &status);
            }
            return;
        }
    }

    /// Increment the attempt counter; `None` means the record is stale
    fn bump_attempts(&self, name: &str, epoch: u64) -> Option<u32> {
        let mut services = self.services.write().unwrap();
        let record = services.get_mut(name).filter(|r| r.epoch == epoch)?;
        record.status.attempts += 1;
        Some(record.status.attempts)
    }

    fn record_failure(&self, name: &str, epoch: u64, message: String) {
        let mut services = self.services.write().unwrap();
        if let Some(record) = services.get_mut(name).filter(|r| r.epoch == epoch) {
            warn!(service = name, error = message.as_str(), "Service load attempt failed");
            record.status.error = Some(message);
            record.status.last_check = chrono::Utc::now();
        }
    }

    fn set_loaded(
        &self,
        name: &str,
        epoch: u64,
        instance: ServiceInstance,
    ) -> Option<ServiceStatus> {
        let mut services = self.services.write().unwrap();
        let record = services.get_mut(name).filter(|r| r.epoch == epoch)?;
        record.status.state = ServiceState::Loaded;
        record.status.error = None;
        record.status.last_check = chrono::Utc::now();
        record.instance = Some(instance);
        Some(record.status.clone())
    }

    fn set_terminal(&self, name: &str, epoch: u64, state: ServiceState) -> Option<ServiceStatus> {
        let mut services = self.services.write().unwrap();
        let record = services.get_mut(name).filter(|r| r.epoch == epoch)?;
        record.status.state = state;
        record.status.last_check = chrono::Utc::now();
        Some(record.status.clone())
    }

    /// The loaded instance, or `None` when the service is missing, not yet
    /// loaded, or registered with a different concrete type
    pub fn get_service<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let services = self.services.read().unwrap();
        let record = services.get(name)?;
        if record.status.state != ServiceState::Loaded {
            return None;
        }
        record.instance.clone()?.downcast::<T>().ok()
    }

    pub fn is_service_available(&self, name: &str) -> bool {
        let services = self.services.read().unwrap();
        services
            .get(name)
            .map(|r| r.status.state == ServiceState::Loaded)
            .unwrap_or(false)
    }

    pub fn service_status(&self, name: &str) -> Option<ServiceStatus> {
        let services = self.services.read().unwrap();
        services.get(name).map(|r| r.status.clone())
    }

    pub fn all_services(&self) -> HashMap<String, ServiceStatus> {
        let services = self.services.read().unwrap();
        services
            .iter()
            .map(|(name, record)| (name.clone(), record.status.clone()))
            .collect()
    }

    /// Aggregate counts per state plus the loaded fraction
    pub fn health_summary(&self) -> HealthSummary {
        let services = self.services.read().unwrap();

        let mut summary = HealthSummary {
            total: services.len(),
            loaded: 0,
            loading: 0,
            failed: 0,
            unavailable: 0,
            healthy: 1.0,
        };

        for record in services.values() {
            match record.status.state {
                ServiceState::Loaded => summary.loaded += 1,
                ServiceState::Loading => summary.loading += 1,
                ServiceState::Failed => summary.failed += 1,
                ServiceState::Unavailable => summary.unavailable += 1,
            }
        }

        if summary.total > 0 {
            summary.healthy = summary.loaded as f64 / summary.total as f64;
        }
        summary
    }

    /// Run a typed closure against a loaded service, absorbing all failure
    /// paths into `None`.
    ///
    /// Missing service, wrong concrete type and closure errors are logged
    /// and swallowed, so call sites need no scattered availability checks.
    pub fn safe_call<S, R, E, F>(&self, name: &str, f: F) -> Option<R>
    where
        S: Any + Send + Sync,
        F: FnOnce(&S) -> Result<R, E>,
        E: fmt::Display,
    {
        let Some(service) = self.get_service::<S>(name) else {
            debug!(service = name, "safe_call on unavailable service");
            return None;
        };

        match f(&service) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(service = name, error = %err, "safe_call operation failed");
                None
            }
        }
    }

    /// Register a listener invoked with `(name, status)` after every status
    /// transition and on each periodic health check.
    ///
    /// A panicking listener is isolated and logged; it cannot break
    /// notification of the others. Callbacks run outside the registry lock,
    /// so a listener may register or remove listeners; such changes take
    /// effect from the next notification.
    pub fn on_status_change(
        &self,
        listener: impl Fn(&str, &ServiceStatus) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners
            .lock()
            .unwrap()
            .insert(id, Arc::new(listener));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.lock().unwrap().remove(&id).is_some()
    }

    fn notify_listeners(&self, name: &str, status: &ServiceStatus) {
        // Snapshot first so callbacks run without the lock held; a listener
        // re-entering the registry would otherwise deadlock
        let snapshot: Vec<(ListenerId, Listener)> = {
            let listeners = self.listeners.lock().unwrap();
            listeners
                .iter()
                .map(|(id, listener)| (*id, Arc::clone(listener)))
                .collect()
        };

        for (id, listener) in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| listener(name, status)));
            if result.is_err() {
                error!(listener = ?id, service = name, "Status listener panicked");
            }
        }
    }

    /// Start the observational health-check task.
    ///
    /// Each tick logs the current summary and re-notifies listeners with
    /// every service's status. It never re-attempts loading a failed
    /// service. Cancel with [`stop_health_checks`](Self::stop_health_checks).
    pub fn start_health_checks(&self, interval: Duration) -> task::JoinHandle<()> {
        self.checks_cancel.store(false, Ordering::SeqCst);

        let manager = self.clone();
        let cancel_flag = Arc::clone(&self.checks_cancel);

        task::spawn(async move {
            let mut interval_timer = time::interval(interval);

            loop {
                if cancel_flag.load(Ordering::SeqCst) {
                    break;
                }

                interval_timer.tick().await;

                let summary = manager.health_summary();
                info!(
                    total = summary.total,
                    loaded = summary.loaded,
                    loading = summary.loading,
                    failed = summary.failed,
                    unavailable = summary.unavailable,
                    healthy = summary.healthy,
                    "Service health check"
                );

                for (name, status) in manager.all_services() {
                    manager.notify_listeners(&name, &status);
                }
            }

            debug!("Health check task stopped");
        })
    }

    /// Stop the observational health-check task
    pub fn stop_health_checks(&self) {
        self.checks_cancel.store(true, Ordering::SeqCst);
    }

    /// Full teardown: stops health checks, clears listeners and services.
    ///
    /// In-flight load tasks notice their record is gone and exit. Intended
    /// for test teardown or application shutdown.
    pub fn cleanup(&self) {
        self.stop_health_checks();
        self.listeners.lock().unwrap().clear();
        self.services.write().unwrap().clear();
    }
}

impl Default for ServiceHealthManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceHealthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let services = self.services.read().unwrap();
        f.debug_struct("ServiceHealthManager")
            .field("services", &services.len())
            .field("listeners", &self.listeners.lock().unwrap().len())
            .finish()
    }
}
