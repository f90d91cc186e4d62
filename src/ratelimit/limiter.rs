// src/ratelimit/limiter.rs

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task;
use tokio::time;
use tracing::{debug, warn};

use super::rule::RateLimitRule;
use super::window::WindowEntry;
use super::RateLimitStatus;
use crate::error::GuardedCallError;

/// Fixed-window rate limiter facade.
///
/// Construct one instance at startup and share it by cloning (state is
/// Arc-backed); there is deliberately no global singleton, so tests get
/// isolated limiters for free.
///
/// All methods except [`guard`](Self::guard) are synchronous; the limiter
/// never retries on the caller's behalf.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    rules: Arc<RwLock<Vec<RateLimitRule>>>,
    entries: Arc<RwLock<HashMap<String, WindowEntry>>>,
    cleanup_cancel: Arc<AtomicBool>,
}

impl RateLimiter {
    /// Create a limiter with the given rules, evaluated in order
    pub fn new(rules: Vec<RateLimitRule>) -> Self {
        Self {
            rules: Arc::new(RwLock::new(rules)),
            entries: Arc::new(RwLock::new(HashMap::new())),
            cleanup_cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Append a rule. Order matters: the first matching rule wins.
    pub fn add_rule(&self, rule: RateLimitRule) {
        self.rules.write().unwrap().push(rule);
    }

    /// Build the composite key scoping a counter to one action + identifier
    pub fn composite_key(identifier: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}_{}", action, identifier),
            None => identifier.to_string(),
        }
    }

    /// First rule matching the key, in registration order
    fn matching_rule(&self, key: &str) -> Option<RateLimitRule> {
        let rules = self.rules.read().unwrap();
        rules.iter().find(|rule| rule.matches(key)).cloned()
    }

    /// Check whether a request for this identifier/action may proceed.
    ///
    /// A `true` result does not consume capacity; callers must follow up
    /// with [`record_request`](Self::record_request). The check that trips
    /// blocking does not itself count as a request.
    pub fn is_allowed(&self, identifier: &str, action: Option<&str>) -> bool {
        let key = Self::composite_key(identifier, action);

        // No matching rule: open by default, no state is created
        let Some(rule) = self.matching_rule(&key) else {
            return true;
        };

        let now = Instant::now();
        let fired;
        {
            let mut entries = self.entries.write().unwrap();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| WindowEntry::fresh(now + rule.window()));

            // Fixed windows: an ended window is replaced wholesale, which
            // also clears a sticky block
            if entry.is_expired(now) {
                *entry = WindowEntry::fresh(now + rule.window());
            }

            if entry.blocked {
                return false;
            }

            if entry.count >= rule.max_requests() {
                entry.blocked = true;
                fired = true;
            } else {
                return true;
            }
        }

        // Hook and logging run outside the entries lock
        if fired {
            warn!(
                key = key.as_str(),
                rule = rule.id(),
                limit = rule.max_requests(),
                "Rate limit reached, key blocked until window reset"
            );
            rule.fire_limit_reached(&key);
        }
        false
    }

    /// Record the outcome of a request previously admitted by
    /// [`is_allowed`](Self::is_allowed).
    ///
    /// Silently does nothing when no rule matches, the rule's skip flags
    /// exclude this outcome, the entry is blocked or expired, or no entry
    /// exists yet (the caller skipped `is_allowed`).
    pub fn record_request(&self, identifier: &str, action: Option<&str>, success: bool) {
        let key = Self::composite_key(identifier, action);

        let Some(rule) = self.matching_rule(&key) else {
            return;
        };

        if !rule.counts_outcome(success) {
            return;
        }

        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(&key) {
            Some(entry) if !entry.blocked && !entry.is_expired(now) => {
                entry.count += 1;
            }
            Some(_) => {}
            None => {
                // Callers are expected to check admission first
                debug!(
                    key = key.as_str(),
                    "record_request without a prior is_allowed call, ignoring"
                );
            }
        }
    }

    /// Read-only snapshot of the limit state for a key
    pub fn status(&self, identifier: &str, action: Option<&str>) -> RateLimitStatus {
        let key = Self::composite_key(identifier, action);

        let Some(rule) = self.matching_rule(&key) else {
            return RateLimitStatus {
                allowed: true,
                remaining: None,
                limit: None,
                reset_after: None,
                blocked: false,
            };
        };

        let now = Instant::now();
        let entries = self.entries.read().unwrap();
        match entries.get(&key) {
            Some(entry) if !entry.is_expired(now) => RateLimitStatus {
                allowed: !entry.blocked && entry.count < rule.max_requests(),
                remaining: Some(rule.max_requests().saturating_sub(entry.count)),
                limit: Some(rule.max_requests()),
                reset_after: Some(entry.reset_at - now),
                blocked: entry.blocked,
            },
            _ => RateLimitStatus {
                allowed: true,
                remaining: Some(rule.max_requests()),
                limit: Some(rule.max_requests()),
                reset_after: None,
                blocked: false,
            },
        }
    }

    /// Run an operation under admission control.
    ///
    /// Denial surfaces as [`GuardedCallError::RateLimited`] before the
    /// operation runs. Otherwise the operation is awaited and its outcome
    /// recorded (success on `Ok`, failure on `Err`); an operation error is
    /// propagated unchanged.
    pub async fn guard<T, E, F, Fut>(
        &self,
        identifier: &str,
        action: Option<&str>,
        operation: F,
    ) -> Result<T, GuardedCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.is_allowed(identifier, action) {
            let status = self.status(identifier, action);
            return Err(GuardedCallError::RateLimited {
                key: Self::composite_key(identifier, action),
                reset_after: status.reset_after.unwrap_or_default(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_request(identifier, action, true);
                Ok(value)
            }
            Err(err) => {
                self.record_request(identifier, action, false);
                Err(GuardedCallError::Operation(err))
            }
        }
    }

    /// Drop the window entry for a key, restoring full allowance
    pub fn reset(&self, identifier: &str, action: Option<&str>) {
        let key = Self::composite_key(identifier, action);
        self.entries.write().unwrap().remove(&key);
    }

    /// Remove every expired entry; returns how many were dropped
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Spawn a background task sweeping expired entries on an interval.
    ///
    /// Bounds memory for workloads with many short-lived keys. Cancel with
    /// [`stop_cleanup`](Self::stop_cleanup).
    pub fn start_cleanup(&self, interval: Duration) -> task::JoinHandle<()> {
        self.cleanup_cancel.store(false, Ordering::SeqCst);

        let limiter = self.clone();
        let cancel_flag = Arc::clone(&self.cleanup_cancel);

        task::spawn(async move {
            let mut interval_timer = time::interval(interval);

            loop {
                if cancel_flag.load(Ordering::SeqCst) {
                    break;
                }

                interval_timer.tick().await;

                let removed = limiter.cleanup();
                if removed > 0 {
                    debug!(removed, "Swept expired rate-limit entries");
                }
            }

            debug!("Rate-limit cleanup task stopped");
        })
    }

    /// Stop the background cleanup task
    pub fn stop_cleanup(&self) {
        self.cleanup_cancel.store(true, Ordering::SeqCst);
    }

    /// Number of live window entries (expired entries count until swept)
    pub fn entry_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
