use crate::error::{ErrorCategory, Result, SvcdeckError};
use crate::resilience::{
    with_retry, with_timeout, CircuitBreaker, CircuitState, RateLimiter, RetryConfig, TtlCache,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn retry_recovers_from_transient_failures() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        exponential: false,
        retryable: vec![ErrorCategory::Network, ErrorCategory::Timeout],
    };

    let call_count = Arc::new(AtomicU32::new(0));
    let call_count_clone = call_count.clone();

    let result = with_retry(&config, "test_operation", move || {
        let count = call_count_clone.clone();
        async move {
            let current = count.fetch_add(1, Ordering::SeqCst) + 1;
            if current < 2 {
                Err(anyhow::anyhow!("connection reset by peer"))
            } else {
                Ok("success")
            }
        }
    })
    .await;

    assert_eq!(result?, "success");
    assert_eq!(call_count.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn retry_does_not_touch_validation_errors() {
    let config = RetryConfig {
        max_attempts: 5,
        base_delay: Duration::from_millis(1),
        exponential: false,
        retryable: vec![ErrorCategory::Network, ErrorCategory::Timeout],
    };

    let call_count = Arc::new(AtomicU32::new(0));
    let call_count_clone = call_count.clone();

    let result: Result<()> = with_retry(&config, "validation_op", move || {
        let count = call_count_clone.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Err(SvcdeckError::Validation("bad action".into()).into())
        }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(call_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_exhaustion_surfaces_last_error() {
    let config = RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        exponential: false,
        retryable: vec![ErrorCategory::Network],
    };

    let call_count = Arc::new(AtomicU32::new(0));
    let call_count_clone = call_count.clone();

    let result: Result<()> = with_retry(&config, "always_down", move || {
        let count = call_count_clone.clone();
        async move {
            let attempt = count.fetch_add(1, Ordering::SeqCst) + 1;
            Err(anyhow::anyhow!("network unreachable (attempt {})", attempt))
        }
    })
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("attempt 3"));
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
}

#[test]
fn retry_delay_schedule() {
    let exponential = RetryConfig {
        max_attempts: 4,
        base_delay: Duration::from_millis(100),
        exponential: true,
        retryable: vec![],
    };
    assert_eq!(exponential.delay(1), Duration::from_millis(100));
    assert_eq!(exponential.delay(2), Duration::from_millis(200));
    assert_eq!(exponential.delay(3), Duration::from_millis(400));

    let constant = RetryConfig {
        exponential: false,
        ..exponential
    };
    assert_eq!(constant.delay(1), Duration::from_millis(100));
    assert_eq!(constant.delay(3), Duration::from_millis(100));
}

#[tokio::test]
async fn timeout_rejects_with_caller_message() {
    let result: Result<()> = with_timeout(Duration::from_millis(10), "listing services", async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    })
    .await;

    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SvcdeckError>(),
        Some(SvcdeckError::Timeout(_))
    ));
    assert!(err.to_string().contains("listing services"));
}

#[tokio::test]
async fn timeout_passes_through_fast_operations() -> Result<()> {
    let value = with_timeout(Duration::from_secs(1), "quick", async { Ok(42) }).await?;
    assert_eq!(value, 42);
    Ok(())
}

#[test]
fn breaker_opens_at_threshold_and_rejects_without_calling() {
    let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
    assert_eq!(breaker.state(), CircuitState::Closed);

    for _ in 0..3 {
        assert!(breaker.check().is_ok());
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // Before the cool-down elapses the wrapped operation is never admitted
    let err = breaker.check().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SvcdeckError>(),
        Some(SvcdeckError::CircuitOpen(_))
    ));
}

#[test]
fn breaker_half_open_probe_success_closes() {
    let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
    assert!(breaker.check().is_ok());
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    // Zero cool-down: next check admits exactly one probe
    assert!(breaker.check().is_ok());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    // A second caller during the probe is rejected
    assert!(breaker.check().is_err());

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.check().is_ok());
}

#[test]
fn breaker_half_open_probe_failure_reopens() {
    let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
    assert!(breaker.check().is_ok());
    breaker.record_failure();

    assert!(breaker.check().is_ok());
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[test]
fn limiter_rejects_within_cooldown_without_mutating() {
    let limiter = RateLimiter::new(Duration::from_secs(60));

    assert!(limiter.is_allowed("restart:nginx.service"));
    // Second and third calls within the cooldown are rejected
    assert!(!limiter.is_allowed("restart:nginx.service"));
    assert!(!limiter.is_allowed("restart:nginx.service"));

    // Other keys are unaffected
    assert!(limiter.is_allowed("stop:nginx.service"));
}

#[tokio::test]
async fn limiter_allows_again_after_cooldown() {
    let limiter = RateLimiter::new(Duration::from_millis(20));
    assert!(limiter.is_allowed("key"));
    assert!(!limiter.is_allowed("key"));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(limiter.is_allowed("key"));
}

#[test]
fn cache_returns_fresh_and_ignores_stale() {
    let cache: TtlCache<u32> = TtlCache::new(10);
    cache.set("a", 1);

    assert_eq!(cache.get("a", Duration::from_secs(60)), Some(1));
    assert_eq!(cache.get("a", Duration::from_nanos(0)), None);
    assert_eq!(cache.get("missing", Duration::from_secs(60)), None);
}

#[test]
fn cache_evicts_oldest_on_overflow() {
    let cache: TtlCache<u32> = TtlCache::new(2);
    cache.set("a", 1);
    cache.set("b", 2);
    cache.set("c", 3);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("a", Duration::from_secs(60)), None);
    assert_eq!(cache.get("b", Duration::from_secs(60)), Some(2));
    assert_eq!(cache.get("c", Duration::from_secs(60)), Some(3));
}

#[test]
fn cache_reinsertion_moves_key_to_most_recent() {
    let cache: TtlCache<u32> = TtlCache::new(2);
    cache.set("a", 1);
    cache.set("b", 2);
    // Re-set "a": it becomes most recent, so "b" is now the eviction victim
    cache.set("a", 10);
    cache.set("c", 3);

    assert_eq!(cache.get("a", Duration::from_secs(60)), Some(10));
    assert_eq!(cache.get("b", Duration::from_secs(60)), None);
    assert_eq!(cache.get("c", Duration::from_secs(60)), Some(3));
}

#[tokio::test]
async fn cache_expired_sweep_is_independent_of_capacity() {
    let cache: TtlCache<u32> = TtlCache::new(10);
    cache.set("old", 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.set("new", 2);

    cache.clear_expired(Duration::from_millis(15));
    assert_eq!(cache.get("old", Duration::from_secs(60)), None);
    assert_eq!(cache.get("new", Duration::from_secs(60)), Some(2));
    assert_eq!(cache.len(), 1);
}

#[test]
fn cache_clear_drops_everything() {
    let cache: TtlCache<u32> = TtlCache::new(10);
    cache.set("a", 1);
    cache.set("b", 2);
    cache.clear();
    assert!(cache.is_empty());
}
