// src/health/loader.rs

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// A loaded service instance, type-erased for storage in the registry.
///
/// Retrieve it with a concrete type through
/// [`ServiceHealthManager::get_service`](super::ServiceHealthManager::get_service).
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Async factory producing a service instance.
///
/// Implement this directly for loaders with their own state, or build one
/// from an async closure with [`loader_fn`].
#[async_trait]
pub trait ServiceLoader: Send + Sync {
    async fn load(&self) -> Result<ServiceInstance>;
}

struct FnLoader {
    f: Box<dyn Fn() -> BoxFuture<'static, Result<ServiceInstance>> + Send + Sync>,
}

#[async_trait]
impl ServiceLoader for FnLoader {
    async fn load(&self) -> Result<ServiceInstance> {
        (self.f)().await
    }
}

/// Wrap an async closure as a [`ServiceLoader`]
pub fn loader_fn<F, Fut>(f: F) -> Arc<dyn ServiceLoader>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ServiceInstance>> + Send + 'static,
{
    Arc::new(FnLoader {
        f: Box::new(move || Box::pin(f())),
    })
}

/// Registration-time description of a service
#[derive(Clone)]
pub struct ServiceConfig {
    /// Unique service name
    pub name: String,

    /// Factory for the service instance
    pub loader: Arc<dyn ServiceLoader>,

    /// A required service fails terminally on its first error; optional
    /// services retry and then degrade to unavailable
    pub required: bool,

    /// Time allowed for a single load attempt
    pub timeout: Duration,

    /// Total load attempts for optional services (ignored when required)
    pub retry_attempts: u32,
}

impl ServiceConfig {
    /// New optional service with a 10s timeout and 3 attempts
    pub fn new(name: impl Into<String>, loader: Arc<dyn ServiceLoader>) -> Self {
        Self {
            name: name.into(),
            loader,
            required: false,
            timeout: Duration::from_secs(10),
            retry_attempts: 3,
        }
    }

    /// Mark the service required: one attempt, terminal failure
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}
