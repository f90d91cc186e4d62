// src/config/mod.rs

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::ratelimit::{KeyPattern, RateLimitRule};

/// Top-level settings for the crate, loadable from JSON
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GuardrailSettings {
    /// Rate-limit rules, evaluated in listed order
    #[serde(default)]
    pub rules: Vec<RuleSpec>,

    /// Limiter housekeeping settings
    #[serde(default)]
    pub limiter: LimiterSettings,

    /// Service health manager settings
    #[serde(default)]
    pub health: HealthSettings,
}

impl GuardrailSettings {
    /// Parse settings from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::error::GuardrailError::Config(e.to_string()))?;
        Self::from_json_str(&contents)
    }
}

/// Declarative form of a rate-limit rule.
///
/// Callbacks cannot be expressed in settings; attach them with
/// `RateLimitRule::on_limit_reached` after conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Unique rule name
    pub id: String,

    /// Pattern matched against the composite key
    pub pattern: String,

    /// Interpret `pattern` as a regular expression instead of a substring
    #[serde(default)]
    pub regex: bool,

    /// Window duration
    #[serde(with = "duration_serde")]
    pub window: Duration,

    /// Maximum number of requests allowed in the window
    pub max_requests: u64,

    /// Do not count successful outcomes against the limit
    #[serde(default)]
    pub skip_successful: bool,

    /// Do not count failed outcomes against the limit
    #[serde(default)]
    pub skip_failed: bool,
}

impl TryFrom<RuleSpec> for RateLimitRule {
    type Error = crate::error::GuardrailError;

    fn try_from(spec: RuleSpec) -> Result<RateLimitRule> {
        let pattern = if spec.regex {
            KeyPattern::regex(&spec.pattern)?
        } else {
            KeyPattern::contains(&spec.pattern)
        };

        let mut rule = RateLimitRule::new(spec.id, pattern, spec.window, spec.max_requests);
        if spec.skip_successful {
            rule = rule.skip_successful();
        }
        if spec.skip_failed {
            rule = rule.skip_failed();
        }
        Ok(rule)
    }
}

/// Housekeeping settings for the rate limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// How often expired window entries are swept
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub cleanup_interval: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

/// Settings for the service health manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// How often the health-check task logs and re-notifies
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,

    /// Default timeout for a single load attempt
    #[serde(default = "default_load_timeout", with = "duration_serde")]
    pub load_timeout: Duration,

    /// Base delay for retry backoff (attempt n waits base * n)
    #[serde(default = "default_retry_base_delay", with = "duration_serde")]
    pub retry_base_delay: Duration,

    /// Ceiling on any single retry delay
    #[serde(default = "default_max_retry_delay", with = "duration_serde")]
    pub max_retry_delay: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            load_timeout: default_load_timeout(),
            retry_base_delay: default_retry_base_delay(),
            max_retry_delay: default_max_retry_delay(),
        }
    }
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_load_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_base_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_retry_delay() -> Duration {
    Duration::from_secs(60)
}

// Helper module to serialize/deserialize Duration as milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
