//! Retry, breaker and timeout behaviour.

use std::time::Duration;

use futures_util::future::join_all;
use serde_json::json;

use ha_store::config::{BreakerConfig, CurveConfig};
use ha_store::{resolver_fn, HaStore, Params, ResolverError, StoreConfig, StoreError, StoreEvent};

mod common;
use common::{store, MockResolver};

fn retrying(steps: u32) -> StoreConfig {
    StoreConfig {
        cache: None,
        batch: None,
        retry: Some(CurveConfig {
            base_ms: 10,
            steps,
            limit_ms: 90,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn breaking(tolerance: u32) -> StoreConfig {
    StoreConfig {
        cache: None,
        batch: None,
        breaker: Some(BreakerConfig {
            base_ms: 1_000,
            steps: 4,
            limit_ms: 17_000,
            tolerance,
            tolerance_frame_ms: 10_000,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_success() {
    let resolver = MockResolver::new();
    resolver.fail_first(2);
    let store = store(&resolver, retrying(3));

    let value = store.get("1", &Params::new(), None).await.unwrap();
    assert!(value.is_some());
    assert_eq!(resolver.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rejects_after_retry_budget() {
    let resolver = MockResolver::new();
    resolver.fail_first(5);
    let store = store(&resolver, retrying(1));

    let err = store.get("1", &Params::new(), None).await.unwrap_err();
    assert!(matches!(err, StoreError::RetryExhausted { attempts: 2, .. }));
    assert!(matches!(err.root_cause(), StoreError::Resolver(e) if e.message() == "backend unavailable"));
    assert_eq!(resolver.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_disabled_fails_on_first_error() {
    let resolver = MockResolver::new();
    resolver.set_failing(true);
    let store = store(
        &resolver,
        StoreConfig {
            cache: None,
            ..Default::default()
        },
    );

    let err = store.get("1", &Params::new(), None).await.unwrap_err();
    assert!(matches!(err, StoreError::RetryExhausted { attempts: 1, .. }));
    assert_eq!(resolver.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_delays_follow_curve() {
    let resolver = MockResolver::new();
    resolver.set_failing(true);
    let store = store(&resolver, retrying(2));
    let mut events = store.subscribe();

    let err = store.get("1", &Params::new(), None).await.unwrap_err();
    assert!(matches!(err, StoreError::RetryExhausted { attempts: 3, .. }));

    let mut delays = Vec::new();
    let mut cancelled = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            StoreEvent::RetryScheduled { delay, .. } => delays.push(delay),
            StoreEvent::RetryCancelled { attempts, .. } => {
                assert_eq!(attempts, 3);
                cancelled += 1;
            }
            _ => {}
        }
    }
    assert_eq!(delays, vec![Duration::from_millis(30), Duration::from_millis(90)]);
    assert_eq!(cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_coalesced_waiters_share_the_failure() {
    let resolver = MockResolver::new();
    resolver.set_failing(true);
    let store = store(
        &resolver,
        StoreConfig {
            cache: None,
            ..Default::default()
        },
    );
    let params = Params::new();

    let results = join_all((0..3).map(|_| store.get("1", &params, None))).await;
    assert_eq!(resolver.call_count(), 1);
    for result in results {
        assert!(matches!(result, Err(StoreError::RetryExhausted { attempts: 1, .. })));
    }
}

#[tokio::test(start_paused = true)]
async fn test_breaker_trips_and_restores() {
    let resolver = MockResolver::new();
    resolver.set_failing(true);
    let store = store(&resolver, breaking(1));
    let mut events = store.subscribe();
    let params = Params::new();

    let err = store.get("1", &params, None).await.unwrap_err();
    assert!(matches!(err, StoreError::RetryExhausted { .. }));
    let status = store.breaker_status();
    assert!(status.active);
    assert_eq!(status.ttl, Some(Duration::from_millis(1_000)));

    // Open: rejected without reaching the resolver.
    for id in ["1", "2", "3"] {
        let err = store.get(id, &params, None).await.unwrap_err();
        assert!(matches!(err, StoreError::CircuitOpen));
    }
    assert_eq!(resolver.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(1_001)).await;
    assert!(!store.breaker_status().active);

    resolver.set_failing(false);
    assert!(store.get("1", &params, None).await.unwrap().is_some());
    assert_eq!(resolver.call_count(), 2);

    let mut broken = 0;
    let mut transitions = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            StoreEvent::CircuitBroken(_) => broken += 1,
            StoreEvent::CircuitRestored(_) | StoreEvent::CircuitRecovered(_) => transitions += 1,
            _ => {}
        }
    }
    assert_eq!((broken, transitions), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_tolerates_violations_below_threshold() {
    let resolver = MockResolver::new();
    resolver.set_failing(true);
    let store = store(&resolver, breaking(2));
    let params = Params::new();

    let first = store.get("1", &params, None).await.unwrap_err();
    assert!(matches!(first, StoreError::RetryExhausted { .. }));
    assert!(!store.breaker_status().active);
    assert_eq!(store.breaker_status().violations, 1);

    let second = store.get("1", &params, None).await.unwrap_err();
    assert!(matches!(second, StoreError::RetryExhausted { .. }));
    assert!(store.breaker_status().active);

    let third = store.get("1", &params, None).await.unwrap_err();
    assert!(matches!(third, StoreError::CircuitOpen));
    assert_eq!(resolver.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_trips_lengthen_the_window() {
    let resolver = MockResolver::new();
    resolver.set_failing(true);
    let store = store(&resolver, breaking(1));
    let params = Params::new();

    let _ = store.get("1", &params, None).await;
    assert_eq!(store.breaker_status().ttl, Some(Duration::from_millis(1_000)));

    tokio::time::sleep(Duration::from_millis(1_001)).await;
    let _ = store.get("1", &params, None).await;
    // step 1 of 4: 1000 + 16000 * (1/4)^2
    assert_eq!(store.breaker_status().ttl, Some(Duration::from_millis(2_000)));
    assert_eq!(store.breaker_status().step, 2);

    // A success resets the break count.
    tokio::time::sleep(Duration::from_millis(2_001)).await;
    resolver.set_failing(false);
    store.get("1", &params, None).await.unwrap();
    assert_eq!(store.breaker_status().step, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_failure() {
    let resolver = MockResolver::with_latency(Duration::from_millis(100));
    let config = StoreConfig {
        cache: None,
        timeout_ms: Some(20),
        ..Default::default()
    };
    let store = store(&resolver, config);

    let err = store.get("1", &Params::new(), None).await.unwrap_err();
    assert!(matches!(err, StoreError::RetryExhausted { attempts: 1, .. }));
    assert!(matches!(err.root_cause(), StoreError::Timeout(d) if *d == Duration::from_millis(20)));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_response_is_retried() {
    let resolver = resolver_fn(|_ids, _params, _metadata| async {
        Ok::<_, ResolverError>(json!("not a record set"))
    });
    let store = HaStore::builder(resolver)
        .config(retrying(1))
        .build()
        .unwrap();

    let err = store.get("1", &Params::new(), None).await.unwrap_err();
    assert!(matches!(err, StoreError::RetryExhausted { attempts: 2, .. }));
    assert!(matches!(err.root_cause(), StoreError::Parse(_)));
}
