//! Property-Based Tests for the cache, classifier and replay ordering
//!
//! Uses proptest; async properties run on a fresh runtime via `tokio_test::block_on`.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;

use crate::cache::{CacheStore, NamespacePolicy, IMAGES};
use crate::clock::{Clock, ManualClock};
use crate::db::Database;
use crate::models::{Destination, RequestMode, ResponsePayload};
use crate::queue::{ReplayQueue, RetentionPolicy};
use crate::routing::{RouteClassifier, Strategy as Route};
use crate::test_support::{api_request, FakeUpstream};

// == Test Configuration ==
const T0: u64 = 1_700_000_000_000;
const NS: &str = "bounded";

fn store_with(policy: NamespacePolicy) -> (CacheStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    (CacheStore::new(vec![policy], clock.clone()), clock)
}

fn payload(body: &str) -> ResponsePayload {
    ResponsePayload::new(200, vec![], body)
}

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

fn method_strategy() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::GET),
        Just(Method::HEAD),
        Just(Method::POST),
        Just(Method::PUT),
        Just(Method::DELETE),
        Just(Method::PATCH),
        Just(Method::OPTIONS),
    ]
}

fn destination_strategy() -> impl Strategy<Value = Destination> {
    prop_oneof![
        Just(Destination::Document),
        Just(Destination::Style),
        Just(Destination::Script),
        Just(Destination::Worker),
        Just(Destination::Image),
        Just(Destination::Font),
        Just(Destination::Empty),
        Just(Destination::Other),
    ]
}

fn path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "/api/[a-z]{0,8}",
        "/[a-z]{1,8}",
        "/[a-z]{1,8}\\.(css|js|png|html|txt)",
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String },
    Read { key: String },
    Advance { secs: u64 },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        key_strategy().prop_map(|key| CacheOp::Put { key }),
        key_strategy().prop_map(|key| CacheOp::Read { key }),
        (0u64..120).prop_map(|secs| CacheOp::Advance { secs }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Eviction bound: count(N) <= maxEntries after any sequence of operations
    #[test]
    fn prop_eviction_bound(
        max in 1usize..8,
        ops in prop::collection::vec(cache_op_strategy(), 1..80)
    ) {
        let (mut store, clock) = store_with(
            NamespacePolicy::new(NS)
                .with_max_entries(max)
                .with_max_age(Duration::from_secs(60)),
        );

        for op in ops {
            match op {
                CacheOp::Put { key } => {
                    store.put(NS, &key, payload(&key), clock.now_ms());
                }
                CacheOp::Read { key } => {
                    store.lookup_fresh(NS, &key);
                }
                CacheOp::Advance { secs } => clock.advance(Duration::from_secs(secs)),
            }
            prop_assert!(store.len(NS) <= max, "{} entries over bound {}", store.len(NS), max);
        }

        let stats = store.stats();
        prop_assert_eq!(stats[NS].total_entries, store.len(NS));
    }

    // TTL expiry: present at exactly t0 + T, absent at t0 + T + ε
    #[test]
    fn prop_ttl_expiry(ttl_secs in 1u64..10_000, epsilon_ms in 1u64..5_000, key in key_strategy()) {
        let (mut store, clock) = store_with(
            NamespacePolicy::new(NS).with_max_age(Duration::from_secs(ttl_secs)),
        );
        store.put(NS, &key, payload("v"), clock.now_ms());

        clock.set(T0 + ttl_secs * 1000);
        prop_assert!(store.lookup_fresh(NS, &key).is_some());

        clock.set(T0 + ttl_secs * 1000 + epsilon_ms);
        prop_assert!(store.lookup_fresh(NS, &key).is_none());
        prop_assert_eq!(store.len(NS), 0);
    }

    // Last write wins by stored_at, whatever order the writes arrive in
    #[test]
    fn prop_latest_stored_at_wins(stamps in prop::collection::vec(0u64..1_000, 1..20)) {
        let (mut store, _) = store_with(NamespacePolicy::new(NS));

        for stamp in &stamps {
            store.put(NS, "k", payload(&stamp.to_string()), T0 + stamp);
        }

        let newest = stamps.iter().max().copied().unwrap_or_default();
        let entry = store.lookup_any(NS, "k").unwrap().entry;
        prop_assert_eq!(entry.stored_at, T0 + newest);
    }

    // The most recently read key survives the next eviction
    #[test]
    fn prop_lru_keeps_recently_read(max in 2usize..8) {
        let (mut store, clock) = store_with(NamespacePolicy::new(NS).with_max_entries(max));

        let keys: Vec<String> = (0..max).map(|i| format!("k{i}")).collect();
        for key in &keys {
            store.put(NS, key, payload(key), clock.now_ms());
        }
        prop_assert!(store.lookup_fresh(NS, &keys[0]).is_some());

        store.put(NS, "newcomer", payload("n"), clock.now_ms());

        prop_assert!(store.lookup_any(NS, &keys[0]).is_some());
        prop_assert!(store.lookup_any(NS, &keys[1]).is_none());
        prop_assert_eq!(store.len(NS), max);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Classification is total and a namespace is present exactly when something is cached
    #[test]
    fn prop_classifier_total(
        method in method_strategy(),
        path in path_strategy(),
        destination in destination_strategy(),
        navigate in any::<bool>()
    ) {
        let mode = if navigate { RequestMode::Navigate } else { RequestMode::Cors };
        let req = api_request(method, &path)
            .with_destination(destination)
            .with_mode(mode);

        let route = RouteClassifier::default().classify(&req);

        prop_assert_eq!(route.namespace.is_none(), route.strategy == Route::Passthrough);
        let under_api = path.starts_with("/api/") || path == "/api";
        if !req.is_read() && !under_api {
            prop_assert_eq!(route.strategy, Route::Passthrough);
        }
        if under_api && req.is_mutation() {
            prop_assert_eq!(route.strategy, Route::Api);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    // Cache-first never calls the network on a hit
    #[test]
    fn prop_cache_first_hit_is_offline(paths in prop::collection::vec("/img/[a-z]{1,4}\\.png", 1..10)) {
        tokio_test::block_on(async {
            let upstream = Arc::new(FakeUpstream::new());
            let clock = Arc::new(ManualClock::new(T0));
            let controller = crate::test_support::controller(upstream.clone(), clock);
            let engine = controller.engine();

            let mut first_seen = HashMap::new();
            for path in &paths {
                let served = engine.cache_first(&api_request(Method::GET, path), IMAGES).await.unwrap();
                first_seen.entry(path.clone()).or_insert(served.payload);
            }

            let calls = upstream.call_count();
            upstream.set_online(false);
            for path in &paths {
                let served = engine.cache_first(&api_request(Method::GET, path), IMAGES).await.unwrap();
                assert_eq!(&served.payload, &first_seen[path]);
            }
            assert_eq!(upstream.call_count(), calls);
        });
    }

    // Replay FIFO: nothing after the first failing entry is attempted
    #[test]
    fn prop_replay_stops_at_first_failure(count in 1usize..8, failing in 0usize..8) {
        tokio_test::block_on(async {
            let upstream = Arc::new(FakeUpstream::new());
            let clock = Arc::new(ManualClock::new(T0));
            let queue = ReplayQueue::new(
                Arc::new(Database::open_in_memory().unwrap()),
                upstream.clone(),
                clock,
                RetentionPolicy::default(),
            );

            let paths: Vec<String> = (0..count).map(|i| format!("/api/m{i}")).collect();
            for path in &paths {
                queue.enqueue(&api_request(Method::POST, path)).await.unwrap();
            }
            if failing < count {
                upstream.fail_path(&paths[failing]);
            }

            let report = queue.replay_all().await.unwrap();
            let attempted = upstream.paths();

            let expected_len = if failing < count { failing + 1 } else { count };
            assert_eq!(attempted, paths[..expected_len].to_vec());
            assert_eq!(report.remaining, count - report.succeeded());
            assert_eq!(report.halted, failing < count);
        });
    }
}
