//! Integration Tests for the Caching and Synchronization Core
//!
//! These tests verify that the memoization, stabilization, resource, and
//! pub-sub primitives compose the way a caller-facing layer would use them:
//! debounced input driving fetches, fetch results flowing into selector
//! stores, and memoized projections keyed off store versions.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;

use reflow_core::memo::{DepToken, DependencySnapshot, MemoSlot, StableRef};
use reflow_core::resource::{
    FetchStatus, Fetcher, ResourceKey, ResourceOptions, ResourceStore,
};
use reflow_core::stabilize::{debounce_callback, Debouncer, Throttler};
use reflow_core::store::Store;

#[derive(Debug, Clone, PartialEq)]
struct SearchState {
    results: Vec<String>,
    unrelated: i32,
}

fn query_key(q: &str) -> ResourceKey {
    ResourceKey::new("search", &q).unwrap()
}

/// Typing a burst of queries through a debouncer issues exactly one fetch,
/// for the final query.
#[tokio::test(start_paused = true)]
async fn debounced_input_drives_a_single_fetch() {
    let store: ResourceStore<String> = ResourceStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let subs = Arc::new(Mutex::new(Vec::new()));

    let fetch_calls = calls.clone();
    let fetcher: Fetcher<String> = Arc::new(move |key, _abort| {
        fetch_calls.fetch_add(1, Ordering::SeqCst);
        let echo = key.to_string();
        Box::pin(async move { Ok(echo) })
    });

    let sink_store = store.clone();
    let sink_fetcher = fetcher.clone();
    let sink_subs = subs.clone();
    let debouncer = Debouncer::new(Duration::from_millis(200), move |query: String| {
        let sub = sink_store.subscribe(
            query_key(&query),
            sink_fetcher.clone(),
            ResourceOptions::default(),
        );
        sink_subs.lock().unwrap().push(sub);
    });

    // A typing burst: only the settled query should fetch.
    debouncer.push("r".to_string());
    sleep(Duration::from_millis(50)).await;
    debouncer.push("re".to_string());
    sleep(Duration::from_millis(50)).await;
    debouncer.push("reflow".to_string());

    sleep(Duration::from_millis(300)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let subs = subs.lock().unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].key(), &query_key("reflow"));
    assert_eq!(subs[0].state().status, FetchStatus::Success);
}

/// A committed fetch flows into a pub-sub store, and only the subscriber
/// selecting the results slice is notified.
#[tokio::test(start_paused = true)]
async fn fetch_results_notify_only_the_results_slice() {
    let resources: ResourceStore<Vec<String>> = ResourceStore::new();
    let app = Store::new(SearchState {
        results: Vec::new(),
        unrelated: 0,
    });

    let fetcher: Fetcher<Vec<String>> = Arc::new(|_key, _abort| {
        Box::pin(async move { Ok(vec!["a".to_string(), "b".to_string()]) })
    });

    let results_calls = Arc::new(AtomicI32::new(0));
    let unrelated_calls = Arc::new(AtomicI32::new(0));

    let counter = results_calls.clone();
    let _results_sub = app.subscribe(
        |s: &SearchState| s.results.clone(),
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );
    let counter = unrelated_calls.clone();
    let _unrelated_sub = app.subscribe(
        |s: &SearchState| s.unrelated,
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    let mut sub = resources.subscribe(
        query_key("q"),
        fetcher,
        ResourceOptions::default(),
    );
    let state = loop {
        let state = sub.changed().await;
        if state.status == FetchStatus::Success {
            break state;
        }
    };

    app.update(|s| SearchState {
        results: state.data.as_deref().cloned().unwrap_or_default(),
        ..s.clone()
    });

    assert_eq!(results_calls.load(Ordering::SeqCst), 1);
    assert_eq!(unrelated_calls.load(Ordering::SeqCst), 0);
}

/// A projection memoized on the store version recomputes only after a
/// commit.
#[test]
fn memoized_projection_follows_store_versions() {
    let store = Store::new(SearchState {
        results: vec!["x".to_string()],
        unrelated: 0,
    });
    let slot: MemoSlot<usize> = MemoSlot::new();
    let computes = Arc::new(AtomicI32::new(0));

    let project = |store: &Store<SearchState>, slot: &MemoSlot<usize>, computes: &Arc<AtomicI32>| {
        let snapshot = DependencySnapshot::of([DepToken::value(&store.version())]);
        let state = store.get();
        let computes = computes.clone();
        slot.memoize(&snapshot, move || {
            computes.fetch_add(1, Ordering::SeqCst);
            state.results.len()
        })
    };

    // Repeated passes without a commit reuse the cached projection.
    assert_eq!(project(&store, &slot, &computes), 1);
    assert_eq!(project(&store, &slot, &computes), 1);
    assert_eq!(computes.load(Ordering::SeqCst), 1);

    store.update(|s| SearchState {
        results: vec!["x".to_string(), "y".to_string()],
        ..s.clone()
    });

    assert_eq!(project(&store, &slot, &computes), 2);
    assert_eq!(computes.load(Ordering::SeqCst), 2);
}

/// A debounced callback built once per "pass" keeps one timer alive, so a
/// burst spread across passes still collapses to a single call.
#[tokio::test(start_paused = true)]
async fn stable_debounced_callback_across_passes() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: Arc<dyn Fn(i32) + Send + Sync> =
        Arc::new(move |v| sink.lock().unwrap().push(v));

    let slot: StableRef<i32, ()> = StableRef::new();
    let snapshot = DependencySnapshot::of([
        DepToken::ptr(&*callback),
        DepToken::value(&100u64),
    ]);

    // Three passes, each rebuilding the wrapper and pushing a value.
    for pass in 0..3 {
        let wrapped = debounce_callback(
            &slot,
            &snapshot,
            callback.clone(),
            Duration::from_millis(100),
        );
        wrapped(pass);
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(slot.version(), 1);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(*seen.lock().unwrap(), vec![2]);
}

/// Throttled updates land in a store without flooding its subscribers,
/// and the final value of the burst is delivered.
#[tokio::test(start_paused = true)]
async fn throttled_updates_bound_store_notifications() {
    let store = Store::new(0i32);
    let calls = Arc::new(AtomicI32::new(0));

    let counter = calls.clone();
    let _sub = store.subscribe(
        |s: &i32| *s,
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    let sink_store = store.clone();
    let throttler = Throttler::new(Duration::from_millis(100), move |v: i32| {
        sink_store.set(v);
    });

    for i in 1..=50 {
        throttler.push(i);
        sleep(Duration::from_millis(10)).await;
    }
    sleep(Duration::from_millis(100)).await;

    assert!(calls.load(Ordering::SeqCst) <= 6);
    assert_eq!(*store.get(), 50);
}

/// Two views of the same key share one in-flight fetch, and a later
/// refetch supersedes: every view converges on the newest data.
#[tokio::test(start_paused = true)]
async fn shared_key_views_converge_on_the_newest_fetch() {
    let store: ResourceStore<String> = ResourceStore::new();
    let calls = Arc::new(AtomicU32::new(0));

    let fetch_calls = calls.clone();
    let fetcher: Fetcher<String> = Arc::new(move |_key, _abort| {
        let n = fetch_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            // The first fetch is slower than its replacement.
            let delay = if n == 0 { 300 } else { 30 };
            sleep(Duration::from_millis(delay)).await;
            Ok(format!("v{n}"))
        })
    });

    let sub1 = store.subscribe(query_key("k"), fetcher.clone(), ResourceOptions::default());
    let sub2 = store.subscribe(query_key("k"), fetcher, ResourceOptions::default());
    sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    sub2.refetch();
    sleep(Duration::from_millis(500)).await;

    // The superseded slow fetch resolved last but was discarded.
    assert_eq!(sub1.state().data.as_deref(), Some(&"v1".to_string()));
    assert_eq!(sub2.state().data.as_deref(), Some(&"v1".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
