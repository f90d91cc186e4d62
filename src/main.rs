// src/main.rs

use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{info, warn};

use guardrail::config::GuardrailSettings;
use guardrail::error::GuardedCallError;
use guardrail::health::{loader_fn, ServiceConfig, ServiceInstance};
use guardrail::{init_logging, KeyPattern, RateLimitRule, RateLimiter, ServiceHealthManager};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "guardrail_demo",
    about = "Demo of admission control and service health management"
)]
struct Opt {
    /// Path to a JSON settings file
    #[structopt(short, long)]
    settings: Option<PathBuf>,

    /// Number of requests to simulate
    #[structopt(short = "n", long, default_value = "12")]
    num_requests: usize,

    /// Time between simulated requests in milliseconds
    #[structopt(short = "t", long, default_value = "250")]
    request_interval_ms: u64,
}

/// Demo integration resolved through the health manager
struct Greeter {
    tone: &'static str,
}

impl Greeter {
    fn greet(&self, who: &str) -> String {
        format!("({}) hello, {}", self.tone, who)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let opt = Opt::from_args();

    let settings = match &opt.settings {
        Some(path) => GuardrailSettings::from_json_file(path)?,
        None => GuardrailSettings::default(),
    };

    // Rules from settings, or a small demo policy
    let mut rules: Vec<RateLimitRule> = settings
        .rules
        .iter()
        .cloned()
        .map(TryInto::try_into)
        .collect::<Result<_, _>>()?;
    if rules.is_empty() {
        rules = vec![
            RateLimitRule::new(
                "auth",
                KeyPattern::regex("^auth_")?,
                Duration::from_secs(900),
                5,
            ),
            RateLimitRule::new("ai", KeyPattern::contains("ai_"), Duration::from_secs(5), 3)
                .on_limit_reached(|key| warn!(key, "AI quota exhausted for key")),
        ];
    }

    let limiter = RateLimiter::new(rules);
    let _cleanup_task = limiter.start_cleanup(settings.limiter.cleanup_interval);

    let manager = ServiceHealthManager::with_settings(&settings.health);

    manager.register_service(
        ServiceConfig::new(
            "greeter",
            loader_fn(|| async {
                // Pretend to dial an external API
                time::sleep(Duration::from_millis(100)).await;
                let instance: ServiceInstance = Arc::new(Greeter { tone: "warm" });
                Ok(instance)
            }),
        )
        .timeout(Duration::from_secs(2)),
    );

    manager.register_service(
        ServiceConfig::new(
            "analytics",
            loader_fn(|| async {
                Err::<ServiceInstance, _>(guardrail::GuardrailError::LoadFailed {
                    name: "analytics".to_string(),
                    reason: "endpoint not configured".to_string(),
                })
            }),
        )
        .timeout(Duration::from_secs(1))
        .retry_attempts(2),
    );

    manager.on_status_change(|name, status| {
        info!(service = name, state = ?status.state, "Service status changed");
    });
    let _health_task = manager.start_health_checks(settings.health.check_interval);

    // Simulate a burst of keyed traffic against the ai_ rule
    for i in 0..opt.num_requests {
        let mgr = manager.clone();
        let outcome = limiter
            .guard("demo_user", Some("ai"), move || async move {
                let greeting = mgr
                    .safe_call("greeter", |g: &Greeter| Ok::<_, String>(g.greet("demo_user")))
                    .unwrap_or_else(|| "greeter unavailable, degraded reply".to_string());
                Ok::<_, String>(greeting)
            })
            .await;

        match outcome {
            Ok(reply) => info!(request = i, reply = reply.as_str(), "Request served"),
            Err(GuardedCallError::RateLimited { key, reset_after }) => {
                warn!(request = i, key = key.as_str(), ?reset_after, "Request rejected")
            }
            Err(GuardedCallError::Operation(err)) => {
                warn!(request = i, error = err.as_str(), "Request failed")
            }
        }

        time::sleep(Duration::from_millis(opt.request_interval_ms)).await;
    }

    info!(summary = ?manager.health_summary(), "Simulation finished, Ctrl-C to exit");

    let (tx, mut rx) = mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = tx.blocking_send(());
    })?;
    rx.recv().await;

    limiter.stop_cleanup();
    manager.cleanup();
    info!("Shutdown complete");
    Ok(())
}
