// src/ratelimit/rule.rs

use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Pattern matched against a composite rate-limit key
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Matches when the key contains the string anywhere
    Contains(String),
    /// Matches with full regex semantics
    Regex(Regex),
}

impl KeyPattern {
    /// Substring pattern
    pub fn contains(pattern: impl Into<String>) -> Self {
        KeyPattern::Contains(pattern.into())
    }

    /// Regex pattern; compilation errors surface as `Config` errors
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(KeyPattern::Regex(Regex::new(pattern)?))
    }

    /// Check whether the pattern matches the given key
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Contains(s) => key.contains(s.as_str()),
            KeyPattern::Regex(re) => re.is_match(key),
        }
    }
}

type LimitReachedHook = Arc<dyn Fn(&str) + Send + Sync>;

/// A single admission-control policy.
///
/// Rules are evaluated in registration order and the first match wins, so
/// more specific patterns must be registered before broader ones.
#[derive(Clone)]
pub struct RateLimitRule {
    id: String,
    pattern: KeyPattern,
    window: Duration,
    max_requests: u64,
    skip_successful: bool,
    skip_failed: bool,
    on_limit_reached: Option<LimitReachedHook>,
}

impl RateLimitRule {
    /// Create a rule counting every outcome against the limit
    pub fn new(
        id: impl Into<String>,
        pattern: KeyPattern,
        window: Duration,
        max_requests: u64,
    ) -> Self {
        Self {
            id: id.into(),
            pattern,
            window,
            max_requests,
            skip_successful: false,
            skip_failed: false,
            on_limit_reached: None,
        }
    }

    /// Do not count successful outcomes against the limit
    pub fn skip_successful(mut self) -> Self {
        self.skip_successful = true;
        self
    }

    /// Do not count failed outcomes against the limit
    pub fn skip_failed(mut self) -> Self {
        self.skip_failed = true;
        self
    }

    /// Hook invoked with the composite key when a key first trips the limit
    pub fn on_limit_reached(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_limit_reached = Some(Arc::new(hook));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Check whether this rule applies to the given key
    pub fn matches(&self, key: &str) -> bool {
        self.pattern.matches(key)
    }

    /// Whether a request with this outcome counts against the limit
    pub(crate) fn counts_outcome(&self, success: bool) -> bool {
        if success {
            !self.skip_successful
        } else {
            !self.skip_failed
        }
    }

    pub(crate) fn fire_limit_reached(&self, key: &str) {
        if let Some(hook) = &self.on_limit_reached {
            hook(key);
        }
    }
}

impl fmt::Debug for RateLimitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitRule")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("window", &self.window)
            .field("max_requests", &self.max_requests)
            .field("skip_successful", &self.skip_successful)
            .field("skip_failed", &self.skip_failed)
            .field("on_limit_reached", &self.on_limit_reached.is_some())
            .finish()
    }
}
