// src/ratelimit/tests/limiter_tests.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time;

use crate::error::GuardedCallError;
use crate::ratelimit::{KeyPattern, RateLimitRule, RateLimiter};

fn auth_rule(max_requests: u64, window: Duration) -> RateLimitRule {
    RateLimitRule::new(
        "auth",
        KeyPattern::regex("^auth_").unwrap(),
        window,
        max_requests,
    )
}

/// Five allowed+recorded auth calls, the sixth is denied and remaining
/// drops to zero
#[test]
fn test_limit_trips_after_max_requests() {
    let limiter = RateLimiter::new(vec![auth_rule(5, Duration::from_secs(900))]);

    for i in 0..5 {
        assert!(
            limiter.is_allowed("user1", Some("auth")),
            "Request {} should be allowed",
            i
        );
        limiter.record_request("user1", Some("auth"), true);
    }

    assert!(
        !limiter.is_allowed("user1", Some("auth")),
        "Sixth request should be denied"
    );

    let status = limiter.status("user1", Some("auth"));
    assert_eq!(status.remaining, Some(0), "Remaining should be 0 at the limit");
    assert_eq!(status.limit, Some(5));
    assert!(status.blocked, "Key should be blocked after tripping the limit");

    // Denial is sticky for the rest of the window
    for _ in 0..3 {
        assert!(!limiter.is_allowed("user1", Some("auth")));
    }
}

#[tokio::test]
async fn test_window_reset_clears_block() {
    let limiter = RateLimiter::new(vec![auth_rule(2, Duration::from_millis(100))]);

    for _ in 0..2 {
        assert!(limiter.is_allowed("user1", Some("auth")));
        limiter.record_request("user1", Some("auth"), true);
    }
    assert!(!limiter.is_allowed("user1", Some("auth")), "Should be blocked");

    // Wait out the window (with a little buffer)
    time::sleep(Duration::from_millis(150)).await;

    assert!(
        limiter.is_allowed("user1", Some("auth")),
        "New window should clear the block"
    );
    let status = limiter.status("user1", Some("auth"));
    assert!(!status.blocked);
    assert_eq!(status.remaining, Some(2), "Fresh window should have full allowance");
}

/// The check that trips blocking does not itself consume capacity
#[test]
fn test_blocking_check_does_not_count() {
    let limiter = RateLimiter::new(vec![auth_rule(2, Duration::from_secs(60))]);

    for _ in 0..2 {
        assert!(limiter.is_allowed("user1", Some("auth")));
        limiter.record_request("user1", Some("auth"), true);
    }

    // Several denied checks must not push the counter past the limit
    for _ in 0..5 {
        assert!(!limiter.is_allowed("user1", Some("auth")));
    }
    let status = limiter.status("user1", Some("auth"));
    assert_eq!(status.remaining, Some(0), "Denied checks must not consume capacity");
}

#[test]
fn test_skip_successful_never_increments() {
    let rule = auth_rule(3, Duration::from_secs(60)).skip_successful();
    let limiter = RateLimiter::new(vec![rule]);

    for i in 0..10 {
        assert!(
            limiter.is_allowed("user1", Some("auth")),
            "Request {} should be allowed when successes are skipped",
            i
        );
        limiter.record_request("user1", Some("auth"), true);
    }

    let status = limiter.status("user1", Some("auth"));
    assert_eq!(
        status.remaining,
        Some(3),
        "Successful recordings must never increment the counter"
    );
}

#[test]
fn test_no_matching_rule_is_open_by_default() {
    let limiter = RateLimiter::new(vec![auth_rule(1, Duration::from_secs(60))]);

    for _ in 0..10 {
        assert!(limiter.is_allowed("user1", Some("upload")));
        limiter.record_request("user1", Some("upload"), true);
    }

    let status = limiter.status("user1", Some("upload"));
    assert!(status.allowed);
    assert_eq!(status.remaining, None, "No rule means unlimited");
    assert_eq!(status.limit, None);
    assert_eq!(limiter.entry_count(), 0, "Unmatched keys must not create state");
}

#[test]
fn test_record_without_prior_check_is_noop() {
    let limiter = RateLimiter::new(vec![auth_rule(3, Duration::from_secs(60))]);

    limiter.record_request("user1", Some("auth"), true);

    let status = limiter.status("user1", Some("auth"));
    assert_eq!(
        status.remaining,
        Some(3),
        "Recording without a prior check must not create a counter"
    );
}

#[test]
fn test_first_matching_rule_wins() {
    // Both patterns match "auth_user1"; registration order decides
    let broad = RateLimitRule::new(
        "broad",
        KeyPattern::contains("user1"),
        Duration::from_secs(60),
        1,
    );
    let specific = auth_rule(5, Duration::from_secs(60));
    let limiter = RateLimiter::new(vec![broad, specific]);

    assert!(limiter.is_allowed("user1", Some("auth")));
    limiter.record_request("user1", Some("auth"), true);

    assert!(
        !limiter.is_allowed("user1", Some("auth")),
        "The first-registered rule (limit 1) should govern the key"
    );
}

#[test]
fn test_separate_keys_are_independent() {
    let limiter = RateLimiter::new(vec![auth_rule(1, Duration::from_secs(60))]);

    assert!(limiter.is_allowed("user1", Some("auth")));
    limiter.record_request("user1", Some("auth"), true);
    assert!(!limiter.is_allowed("user1", Some("auth")));

    assert!(
        limiter.is_allowed("user2", Some("auth")),
        "Other identifiers keep their own windows"
    );
}

#[test]
fn test_on_limit_reached_fires_once_per_block() {
    let tripped: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let tripped_clone = Arc::clone(&tripped);

    let rule = auth_rule(1, Duration::from_secs(60)).on_limit_reached(move |key| {
        tripped_clone.lock().unwrap().push(key.to_string());
    });
    let limiter = RateLimiter::new(vec![rule]);

    assert!(limiter.is_allowed("user1", Some("auth")));
    limiter.record_request("user1", Some("auth"), true);

    // First denied check trips the hook, later ones hit the sticky block
    assert!(!limiter.is_allowed("user1", Some("auth")));
    assert!(!limiter.is_allowed("user1", Some("auth")));

    let tripped = tripped.lock().unwrap();
    assert_eq!(tripped.as_slice(), ["auth_user1"], "Hook should fire exactly once");
}

#[test]
fn test_guard_records_failure_and_propagates_error() {
    let limiter = RateLimiter::new(vec![auth_rule(3, Duration::from_secs(60))]);

    // guard never sleeps, so a plain blocking executor is enough here
    let result: Result<(), GuardedCallError<String>> = tokio_test::block_on(limiter.guard(
        "user1",
        Some("auth"),
        || async { Err("boom".to_string()) },
    ));

    match result {
        Err(GuardedCallError::Operation(err)) => {
            assert_eq!(err, "boom", "Original error must be propagated unchanged");
        }
        other => panic!("Expected Operation error, got {:?}", other),
    }

    let status = limiter.status("user1", Some("auth"));
    assert_eq!(
        status.remaining,
        Some(2),
        "Failed operation should still consume capacity"
    );
}

#[tokio::test]
async fn test_guard_denies_without_running_operation() {
    let limiter = RateLimiter::new(vec![auth_rule(1, Duration::from_secs(60))]);
    let runs = Arc::new(AtomicUsize::new(0));

    let run_op = |runs: Arc<AtomicUsize>| async move {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(())
    };

    limiter
        .guard("user1", Some("auth"), || run_op(Arc::clone(&runs)))
        .await
        .unwrap();
    assert!(!limiter.is_allowed("user1", Some("auth")));

    let result = limiter
        .guard("user1", Some("auth"), || run_op(Arc::clone(&runs)))
        .await;

    match result {
        Err(GuardedCallError::RateLimited { key, .. }) => {
            assert_eq!(key, "auth_user1");
        }
        other => panic!("Expected RateLimited, got {:?}", other),
    }
    assert_eq!(
        runs.load(Ordering::SeqCst),
        1,
        "Denied guard must not run the operation"
    );
}

#[tokio::test]
async fn test_guard_skip_failed_does_not_count_failures() {
    let rule = auth_rule(2, Duration::from_secs(60)).skip_failed();
    let limiter = RateLimiter::new(vec![rule]);

    for _ in 0..5 {
        let result: Result<(), GuardedCallError<String>> = limiter
            .guard("user1", Some("auth"), || async { Err("flaky".to_string()) })
            .await;
        assert!(matches!(result, Err(GuardedCallError::Operation(_))));
    }

    let status = limiter.status("user1", Some("auth"));
    assert_eq!(
        status.remaining,
        Some(2),
        "Skipped failures must leave the counter untouched"
    );
}

#[tokio::test]
async fn test_cleanup_sweeps_expired_entries() {
    let limiter = RateLimiter::new(vec![auth_rule(5, Duration::from_millis(50))]);

    for user in ["user1", "user2", "user3"] {
        assert!(limiter.is_allowed(user, Some("auth")));
        limiter.record_request(user, Some("auth"), true);
    }
    assert_eq!(limiter.entry_count(), 3);

    time::sleep(Duration::from_millis(100)).await;

    assert_eq!(limiter.cleanup(), 3, "All expired entries should be swept");
    assert_eq!(limiter.entry_count(), 0);
}

#[tokio::test]
async fn test_background_cleanup_task() {
    let limiter = RateLimiter::new(vec![auth_rule(5, Duration::from_millis(30))]);

    assert!(limiter.is_allowed("user1", Some("auth")));
    limiter.record_request("user1", Some("auth"), true);

    let handle = limiter.start_cleanup(Duration::from_millis(40));

    time::sleep(Duration::from_millis(150)).await;
    assert_eq!(limiter.entry_count(), 0, "Background task should sweep the entry");

    limiter.stop_cleanup();
    let _ = handle.await;
}

#[test]
fn test_reset_restores_allowance() {
    let limiter = RateLimiter::new(vec![auth_rule(1, Duration::from_secs(60))]);

    assert!(limiter.is_allowed("user1", Some("auth")));
    limiter.record_request("user1", Some("auth"), true);
    assert!(!limiter.is_allowed("user1", Some("auth")));

    limiter.reset("user1", Some("auth"));

    assert!(limiter.is_allowed("user1", Some("auth")), "Reset should clear the window");
}

#[test]
fn test_composite_key_shapes() {
    assert_eq!(RateLimiter::composite_key("user1", Some("auth")), "auth_user1");
    assert_eq!(RateLimiter::composite_key("user1", None), "user1");
}
