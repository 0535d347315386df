//! Coalescing, context isolation and batch sizing.

use std::time::Duration;

use futures_util::future::join_all;
use serde_json::json;

use ha_store::config::BatchConfig;
use ha_store::{Params, StoreConfig, StoreEvent};

mod common;
use common::{ids, params, store, MockResolver};

fn uncached() -> StoreConfig {
    StoreConfig {
        cache: None,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_gets_coalesce() {
    let resolver = MockResolver::new();
    let store = store(&resolver, StoreConfig::default());
    let params = Params::new();

    let gets = (0..10).map(|_| store.get("1", &params, None));
    let results = join_all(gets).await;

    assert_eq!(resolver.call_ids(), vec![ids(&["1"])]);
    for result in results {
        assert_eq!(result.unwrap(), Some(json!({"id": "1", "language": null})));
    }
}

#[tokio::test(start_paused = true)]
async fn test_get_coalesces_onto_in_flight_dispatch() {
    let resolver = MockResolver::with_latency(Duration::from_millis(100));
    let store = store(&resolver, uncached());
    let mut events = store.subscribe();

    let first = tokio::spawn({
        let store = store.clone();
        async move { store.get("a", &Params::new(), None).await }
    });
    // Past the 50ms window: the first dispatch is in flight.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(resolver.call_count(), 1);

    let second = store.get("a", &Params::new(), None).await.unwrap();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(resolver.call_count(), 1);

    let mut coalesced = 0;
    while let Ok(event) = events.try_recv() {
        if let StoreEvent::CoalescedHit { found, .. } = event {
            coalesced += found;
        }
    }
    assert_eq!(coalesced, 1);
}

#[tokio::test(start_paused = true)]
async fn test_contexts_never_share_a_dispatch() {
    let resolver = MockResolver::new();
    let config = StoreConfig {
        delimiter: vec!["language".into()],
        ..uncached()
    };
    let store = store(&resolver, config);
    let fr = params(json!({"language": "fr"}));
    let en = params(json!({"language": "en"}));

    let (a, b) = tokio::join!(store.get("1", &fr, None), store.get("1", &en, None));
    assert_eq!(a.unwrap(), Some(json!({"id": "1", "language": "fr"})));
    assert_eq!(b.unwrap(), Some(json!({"id": "1", "language": "en"})));

    let calls = resolver.calls();
    assert_eq!(calls.len(), 2);
    let mut languages: Vec<_> = calls
        .iter()
        .map(|call| call.params["language"].as_str().unwrap().to_string())
        .collect();
    languages.sort();
    assert_eq!(languages, vec!["en", "fr"]);
}

#[tokio::test(start_paused = true)]
async fn test_non_delimiter_params_share_a_dispatch() {
    let resolver = MockResolver::new();
    let config = StoreConfig {
        delimiter: vec!["language".into()],
        ..uncached()
    };
    let store = store(&resolver, config);

    let params_a = params(json!({"language": "fr", "trace": 1}));
    let params_b = params(json!({"language": "fr", "trace": 2}));
    let (a, b) = tokio::join!(
        store.get("1", &params_a, None),
        store.get("2", &params_b, None)
    );
    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_some());
    assert_eq!(resolver.call_ids(), vec![ids(&["1", "2"])]);
}

#[tokio::test(start_paused = true)]
async fn test_limit_splits_into_chunks_in_order() {
    let resolver = MockResolver::new();
    let config = StoreConfig {
        batch: Some(BatchConfig {
            limit: 2,
            ..Default::default()
        }),
        ..uncached()
    };
    let store = store(&resolver, config);

    let results = store
        .get_many(["1", "2", "3", "4", "5"], &Params::new(), None)
        .await;
    assert_eq!(results.len(), 5);
    assert!(results.values().all(|r| matches!(r, Ok(Some(_)))));

    assert_eq!(
        resolver.call_ids(),
        vec![ids(&["1", "2"]), ids(&["3", "4"]), ids(&["5"])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_window_groups_staggered_requests() {
    let resolver = MockResolver::new();
    let store = store(&resolver, uncached());

    let early = tokio::spawn({
        let store = store.clone();
        async move { store.get("1", &Params::new(), None).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.get("2", &Params::new(), None).await.unwrap();
    early.await.unwrap().unwrap();
    assert_eq!(resolver.call_ids(), vec![ids(&["1", "2"])]);

    // A new window opens for the next request.
    store.get("3", &Params::new(), None).await.unwrap();
    assert_eq!(resolver.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batching_disabled_dispatches_each_call() {
    let resolver = MockResolver::with_latency(Duration::from_millis(10));
    let config = StoreConfig {
        batch: None,
        ..uncached()
    };
    let store = store(&resolver, config);
    let params = Params::new();

    let (a, b, c) = tokio::join!(
        store.get_many(["1", "2"], &params, None),
        store.get("3", &params, None),
        store.get("1", &params, None)
    );
    assert_eq!(a.len(), 2);
    assert!(b.unwrap().is_some());
    assert!(c.unwrap().is_some());

    // The third call coalesced onto the first call's dispatch.
    assert_eq!(resolver.call_ids(), vec![ids(&["1", "2"]), ids(&["3"])]);
}

#[tokio::test(start_paused = true)]
async fn test_tags_are_grouped_per_id() {
    let resolver = MockResolver::new();
    let store = store(&resolver, uncached());
    let params = Params::new();

    let _ = tokio::join!(
        store.get("1", &params, Some(json!("alpha"))),
        store.get("2", &params, Some(json!("beta"))),
        store.get("1", &params, Some(json!("gamma")))
    );

    let calls = resolver.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].metadata["1"], vec![json!("alpha"), json!("gamma")]);
    assert_eq!(calls[0].metadata["2"], vec![json!("beta")]);
}

#[tokio::test(start_paused = true)]
async fn test_omitted_ids_resolve_absent() {
    let resolver = MockResolver::new();
    resolver.omit("2");
    let store = store(&resolver, StoreConfig::default());

    let results = store.get_many(["1", "2"], &Params::new(), None).await;
    assert!(matches!(results["1"], Ok(Some(_))));
    assert!(matches!(results["2"], Ok(None)));

    // Absent values are not cached.
    assert_eq!(store.get("2", &Params::new(), None).await.unwrap(), None);
    assert_eq!(resolver.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_buffers_drain_after_settling() {
    let resolver = MockResolver::with_latency(Duration::from_millis(100));
    let store = store(&resolver, uncached());

    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.get("1", &Params::new(), None).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.size().await.buffers.pending, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let size = store.size().await;
    assert_eq!(size.buffers.pending, 0);
    assert_eq!(size.buffers.active, 1);

    pending.await.unwrap().unwrap();
    assert_eq!(store.size().await.buffers.active, 0);
}
