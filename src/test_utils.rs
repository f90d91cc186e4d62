// src/test_utils.rs

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time;

use crate::error::{GuardrailError, Result};
use crate::health::{ServiceInstance, ServiceLoader};

/// Concrete service type used across tests
#[derive(Debug, PartialEq, Eq)]
pub struct DemoService {
    pub label: String,
}

impl DemoService {
    pub fn greet(&self, name: &str) -> String {
        format!("{}: hello {}", self.label, name)
    }
}

/// Loader with scriptable failures, delay and attempt bookkeeping
#[derive(Debug)]
pub struct MockLoader {
    /// Attempts to fail before succeeding; `u32::MAX` means always fail
    fail_first: u32,
    /// Sleep before each attempt resolves (drives timeout tests)
    delay: Option<Duration>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl MockLoader {
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub fn failing_first(fail_first: u32) -> Self {
        Self {
            fail_first,
            delay: None,
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Timestamps of every load attempt, for retry-spacing assertions
    pub fn attempt_times(&self) -> Arc<Mutex<Vec<Instant>>> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl ServiceLoader for MockLoader {
    async fn load(&self) -> Result<ServiceInstance> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(Instant::now());
            attempts.len() as u32
        };

        if let Some(delay) = self.delay {
            time::sleep(delay).await;
        }

        if attempt <= self.fail_first {
            return Err(GuardrailError::LoadFailed {
                name: "mock".to_string(),
                reason: format!("scripted failure on attempt {}", attempt),
            });
        }

        Ok(Arc::new(DemoService {
            label: format!("mock-{}", attempt),
        }))
    }
}

/// Poll a condition until it holds or the timeout elapses
pub async fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
