//! End-to-end behaviour of the cache orchestrator over in-process backends
//!
//! Several orchestrators built over clones of one `MemoryStore` and one
//! `MemoryMutex` stand in for several processes sharing Redis.

use futures::future::join_all;
use layered_cache::cache::types::NEGATIVE_MARKER;
use layered_cache::{
    BoxError, CacheConfig, CacheError, CacheNamespace, CacheOrchestrator, CacheTier,
    DistributedStore, HealthCheckConfig, HealthStatus, MemoryMutex, MemoryStore,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

fn base_config() -> CacheConfig {
    CacheConfig::builder()
        .ttl_jitter(0.0)
        .double_delete_delay(Duration::from_millis(50))
        .build()
}

fn namespaces() -> Vec<CacheNamespace> {
    vec![
        CacheNamespace::new("user", "user", Duration::from_secs(1800)),
        CacheNamespace::new("users", "users", Duration::from_secs(1800)),
    ]
}

fn node(config: CacheConfig, store: &MemoryStore, mutex: Option<&MemoryMutex>) -> CacheOrchestrator {
    let mut builder = CacheOrchestrator::builder(config).distributed(Arc::new(store.clone()));
    if let Some(mutex) = mutex {
        builder = builder.mutex(Arc::new(mutex.clone()));
    }
    for namespace in namespaces() {
        builder = builder.namespace(namespace);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn round_trip_is_served_from_local_tier() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));

    assert!(cache.set("user", "42", &"Alice").await.is_success());

    let gets_before = store.get_calls();
    let result = cache.get::<String>("user", "42").await;
    assert_eq!(result.data().map(String::as_str), Some("Alice"));
    assert_eq!(store.get_calls(), gets_before);
}

#[tokio::test]
async fn distributed_hit_is_promoted_into_local_tier() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let writer = node(base_config(), &store, Some(&mutex));
    let reader = node(base_config(), &store, Some(&mutex));

    writer.set("user", "42", &"Alice").await;

    let first = reader.get::<String>("user", "42").await;
    assert_eq!(first.into_data().as_deref(), Some("Alice"));

    let gets_after_promotion = store.get_calls();
    let second = reader.get::<String>("user", "42").await;
    assert_eq!(second.into_data().as_deref(), Some("Alice"));
    assert_eq!(store.get_calls(), gets_after_promotion);

    let metrics = reader.metrics().unwrap();
    assert_eq!(metrics.hits(CacheTier::L1), 1);
    assert_eq!(metrics.misses(CacheTier::L1), 1);
    assert_eq!(metrics.hits(CacheTier::L2), 1);
}

#[tokio::test]
async fn concurrent_misses_load_once_across_nodes() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let nodes: Vec<CacheOrchestrator> = (0..4)
        .map(|_| node(base_config(), &store, Some(&mutex)))
        .collect();
    let loads = Arc::new(AtomicUsize::new(0));

    let mut requests = Vec::new();
    for cache in &nodes {
        for _ in 0..5 {
            let loads = Arc::clone(&loads);
            requests.push(cache.get_or_load(
                "user",
                "42",
                move || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, BoxError>(Some(User {
                        id: 42,
                        name: "Alice".to_string(),
                    }))
                },
                None,
            ));
        }
    }

    let results = join_all(requests).await;

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap().unwrap().name, "Alice");
    }
}

#[tokio::test]
async fn absent_keys_are_cached_negatively() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));
    let loads = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let loads = Arc::clone(&loads);
        let found: Option<User> = cache
            .get_or_load(
                "user",
                "404",
                move || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(None)
                },
                None,
            )
            .await
            .unwrap();
        assert!(found.is_none());
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    assert_eq!(store.peek("user:404").as_deref(), Some(NEGATIVE_MARKER));
    let ttl = store.ttl("user:404").await.unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(60));

    // Known-absent is a successful result without data
    let result = cache.get::<User>("user", "404").await;
    assert!(result.is_success());
    assert!(result.data().is_none());

    let info = cache.describe("user", "404").await.unwrap();
    assert!(info.negative);
    assert!(!info.held_by(CacheTier::L1));
}

#[tokio::test]
async fn write_after_negative_marker_is_visible() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));

    let missing: Option<String> = cache
        .get_or_load("user", "7", || async { Ok::<_, BoxError>(None) }, None)
        .await
        .unwrap();
    assert!(missing.is_none());

    assert!(cache.set("user", "7", &"Bob").await.is_success());

    let result = cache.get::<String>("user", "7").await;
    assert_eq!(result.into_data().as_deref(), Some("Bob"));

    let loaded: Option<String> = cache
        .get_or_load(
            "user",
            "7",
            || async { Ok::<_, BoxError>(Some("never".to_string())) },
            None,
        )
        .await
        .unwrap();
    assert_eq!(loaded.as_deref(), Some("Bob"));
}

#[tokio::test]
async fn negative_caching_can_be_disabled() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let config = CacheConfig::builder()
        .ttl_jitter(0.0)
        .enable_negative_caching(false)
        .build();
    let cache = node(config, &store, Some(&mutex));
    let loads = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let loads = Arc::clone(&loads);
        let _: Option<String> = cache
            .get_or_load(
                "user",
                "404",
                move || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(None)
                },
                None,
            )
            .await
            .unwrap();
    }

    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert!(store.peek("user:404").is_none());
}

#[tokio::test]
async fn double_delete_removes_repopulated_value() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));

    cache.set("user", "42", &"Alice").await;
    assert!(cache.remove_cache_double_delete("user:42").await);
    assert!(!cache.remove_cache_double_delete("user:42").await);

    // A reader re-populates from a lagging replica in between
    store
        .set("user:42", "\"stale\"", Duration::from_secs(60))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.peek("user:42").is_none());
    assert!(!cache.get::<String>("user", "42").await.is_success());

    cache.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_delayed_deletes() {
    let store = MemoryStore::new();
    let config = CacheConfig::builder()
        .ttl_jitter(0.0)
        .double_delete_delay(Duration::from_millis(100))
        .build();
    let cache = node(config, &store, None);

    cache.remove_cache_double_delete("user:1").await;
    store.set("user:1", "\"stale\"", Duration::from_secs(60)).await.unwrap();

    cache.shutdown().await;
    assert!(store.peek("user:1").is_none());
}

#[tokio::test]
async fn clear_namespace_leaves_other_namespaces_alone() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));

    cache.set("user", "1", &"a").await;
    cache.set("user", "2", &"b").await;
    cache.set("users", "1", &"c").await;

    assert_eq!(cache.clear_namespace("user").await.unwrap(), 2);

    assert!(!cache.get::<String>("user", "1").await.is_success());
    assert!(!cache.get::<String>("user", "2").await.is_success());
    assert_eq!(
        cache.get::<String>("users", "1").await.into_data().as_deref(),
        Some("c")
    );
    assert!(store.peek("users:1").is_some());

    assert!(matches!(
        cache.clear_namespace("orders").await,
        Err(CacheError::UnknownNamespace(_))
    ));
}

#[tokio::test]
async fn hit_rates_follow_request_accounting() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));

    assert_eq!(cache.get_overall_hit_rate(), 0.0);

    // Miss everywhere, then a local hit
    for _ in 0..2 {
        let value: Option<String> = tokio_test::assert_ok!(
            cache
                .get_or_load(
                    "user",
                    "42",
                    || async { Ok::<_, BoxError>(Some("Alice".to_string())) },
                    None,
                )
                .await
        );
        assert_eq!(value.as_deref(), Some("Alice"));
    }

    assert_eq!(cache.get_hit_rate(CacheTier::L1), 50.0);
    assert_eq!(cache.get_hit_rate(CacheTier::L2), 0.0);
    assert_eq!(cache.get_overall_hit_rate(), 50.0);

    let l1 = cache.get_stats(CacheTier::L1).await;
    assert_eq!(l1.requests(), 2);
    assert_eq!(l1.estimated_size, 1);

    let loads = cache.get_stats(CacheTier::SourceLoad).await;
    assert_eq!(loads.misses, 1);
}

#[tokio::test]
async fn hit_rates_are_zero_without_metrics() {
    let store = MemoryStore::new();
    let config = CacheConfig::builder()
        .ttl_jitter(0.0)
        .enable_metrics(false)
        .build();
    let cache = node(config, &store, None);

    cache.set("user", "1", &"a").await;
    cache.get::<String>("user", "1").await;

    assert!(cache.metrics().is_none());
    assert_eq!(cache.get_hit_rate(CacheTier::L1), 0.0);
    assert_eq!(cache.get_overall_hit_rate(), 0.0);
    assert_eq!(cache.get_stats(CacheTier::L2).await.requests(), 0);
}

#[tokio::test]
async fn user_42_end_to_end() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));
    let alice = User {
        id: 42,
        name: "Alice".to_string(),
    };

    let loaded = cache
        .get_or_load(
            "user",
            "42",
            || {
                let alice = alice.clone();
                async move { Ok::<_, BoxError>(Some(alice)) }
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(loaded.as_ref(), Some(&alice));

    let cached = cache.get::<User>("user", "42").await;
    assert_eq!(cached.data(), Some(&alice));

    let info = cache.describe("user", "42").await.unwrap();
    assert!(info.held_by(CacheTier::L1));
    assert!(info.held_by(CacheTier::L2));
    assert!(!info.negative);
    assert!(info.distributed_ttl.unwrap() <= Duration::from_secs(1800));
    assert!(info.local_ttl.unwrap() <= info.distributed_ttl.unwrap());

    assert!(cache.delete("user", "42").await);
    assert!(!cache.describe("user", "42").await.unwrap().is_cached());
    assert!(!cache.get::<User>("user", "42").await.is_success());
}

#[tokio::test]
async fn loader_errors_propagate_and_release_the_lock() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));

    let result: Result<Option<String>, CacheError> = cache
        .get_or_load(
            "user",
            "42",
            || async { Err::<Option<String>, _>(std::io::Error::new(std::io::ErrorKind::Other, "database down")) },
            None,
        )
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, CacheError::Loader(_)));
    assert!(err.to_string().contains("database down"));
    assert!(!mutex.is_locked("lock:user:42"));
    assert!(store.peek("user:42").is_none());

    let retried: Option<String> = cache
        .get_or_load(
            "user",
            "42",
            || async { Ok::<_, BoxError>(Some("Alice".to_string())) },
            None,
        )
        .await
        .unwrap();
    assert_eq!(retried.as_deref(), Some("Alice"));
}

#[tokio::test]
async fn unreachable_lock_provider_loads_directly() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));
    let loads = Arc::new(AtomicUsize::new(0));
    mutex.set_available(false);

    for _ in 0..2 {
        let loads = Arc::clone(&loads);
        let value: Option<String> = cache
            .get_or_load(
                "user",
                "42",
                move || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(Some("Alice".to_string()))
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("Alice"));
    }

    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert!(store.peek("user:42").is_none());
}

#[tokio::test]
async fn missing_lock_provider_loads_directly() {
    let store = MemoryStore::new();
    let cache = node(base_config(), &store, None);

    let value: Option<u32> = cache
        .get_or_load("user", "1", || async { Ok::<_, BoxError>(Some(7)) }, None)
        .await
        .unwrap();

    assert_eq!(value, Some(7));
    assert!(store.is_empty());
}

#[tokio::test]
async fn busy_lock_falls_back_to_direct_load() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let config = CacheConfig::builder()
        .ttl_jitter(0.0)
        .lock_wait(Duration::from_millis(30))
        .lock_lease(Duration::from_secs(10))
        .lock_max_retries(2)
        .lock_backoff(Duration::from_millis(5))
        .build();
    let cache = node(config, &store, Some(&mutex));

    // Another node holds the lock and never finishes
    let _held = layered_cache::DistributedMutex::try_acquire(
        &mutex,
        "lock:user:9",
        Duration::from_millis(10),
        Duration::from_secs(10),
    )
    .await
    .unwrap()
    .unwrap();

    let value: Option<String> = cache
        .get_or_load(
            "user",
            "9",
            || async { Ok::<_, BoxError>(Some("direct".to_string())) },
            None,
        )
        .await
        .unwrap();

    assert_eq!(value.as_deref(), Some("direct"));
    assert!(store.peek("user:9").is_none());
}

#[tokio::test]
async fn circuit_breaker_stops_calling_a_failing_tier() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let config = CacheConfig::builder()
        .ttl_jitter(0.0)
        .breaker_failure_threshold(2)
        .breaker_recover_after(Duration::from_millis(100))
        .build();
    let cache = node(config, &store, Some(&mutex));

    store.set_available(false);
    for _ in 0..2 {
        let result = cache.get::<String>("user", "1").await;
        assert_eq!(result.error.as_deref(), Some("cache miss"));
    }

    // Open: reads degrade to misses without reaching the store
    let calls = store.get_calls();
    assert!(!cache.get::<String>("user", "1").await.is_success());
    assert_eq!(store.get_calls(), calls);
    assert!(cache.get_stats(CacheTier::Error).await.misses >= 2);

    // Loads still work and keep serving from the local tier
    let loaded: Option<String> = cache
        .get_or_load(
            "user",
            "1",
            || async { Ok::<_, BoxError>(Some("local".to_string())) },
            None,
        )
        .await
        .unwrap();
    assert_eq!(loaded.as_deref(), Some("local"));
    assert_eq!(
        cache.get::<String>("user", "1").await.into_data().as_deref(),
        Some("local")
    );

    store.set_available(true);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(cache.set("user", "2", &"back").await.is_success());
    assert_eq!(store.peek("user:2").as_deref(), Some("\"back\""));
}

#[tokio::test]
async fn set_reports_failure_when_distributed_write_fails() {
    let store = MemoryStore::new();
    let cache = node(base_config(), &store, None);

    cache.set("user", "1", &"old").await;
    store.set_available(false);

    let result = cache.set("user", "1", &"new").await;
    assert!(!result.is_success());

    // The stale local copy is dropped rather than left behind
    assert!(!cache.local_store().contains_key("user:1").await);
}

#[tokio::test]
async fn warm_up_populates_both_tiers() {
    let store = MemoryStore::new();
    let cache = node(base_config(), &store, None);

    let report = cache
        .warm_up(
            "user",
            (1..=3).map(|id| {
                (
                    id.to_string(),
                    User {
                        id,
                        name: format!("user-{}", id),
                    },
                )
            }),
        )
        .await;

    assert!(report.is_complete());
    assert_eq!(report.succeeded, 3);
    assert_eq!(store.len(), 3);
    assert_eq!(
        cache.get::<User>("user", "2").await.into_data().map(|u| u.name),
        Some("user-2".to_string())
    );
}

#[tokio::test]
async fn health_check_reports_backend_state() {
    let store = MemoryStore::new();
    let cache = CacheOrchestrator::builder(base_config())
        .distributed(Arc::new(store.clone()))
        .health_config(HealthCheckConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        })
        .build()
        .unwrap();

    let healthy = cache.health_check().await;
    assert_eq!(healthy.status, HealthStatus::Healthy);
    assert_eq!(healthy.backend, "memory");

    store.set_available(false);
    let unhealthy = cache.health_check().await;
    assert_eq!(unhealthy.status, HealthStatus::Unhealthy);
    assert_eq!(unhealthy.retry_count, 1);
    assert!(unhealthy.error.is_some());
}

#[tokio::test]
async fn invalid_keys_are_rejected() {
    let store = MemoryStore::new();
    let cache = node(base_config(), &store, None);

    assert!(!cache.set("user", "", &"x").await.is_success());
    assert!(!cache.set("orders", "1", &"x").await.is_success());
    assert!(!cache.delete("orders", "1").await);

    let result: Result<Option<String>, CacheError> = cache
        .get_or_load("orders", "1", || async { Ok::<_, BoxError>(None) }, None)
        .await;
    assert!(matches!(result, Err(CacheError::UnknownNamespace(_))));
}

#[tokio::test]
async fn promoted_entry_expires_with_distributed_key() {
    let store = MemoryStore::new();
    let writer = node(base_config(), &store, None);
    let reader = node(base_config(), &store, None);

    assert!(writer
        .set_with_ttl("user", "1", &"v", Duration::from_millis(300))
        .await
        .is_success());

    let first = reader.get::<String>("user", "1").await;
    assert_eq!(first.into_data().as_deref(), Some("v"));
    let local_ttl = reader.local_store().remaining_ttl("user:1").await.unwrap();
    assert!(local_ttl <= Duration::from_millis(300));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.peek("user:1").is_none());
    assert!(!reader.get::<String>("user", "1").await.is_success());
}

#[tokio::test]
async fn local_expiry_falls_back_to_distributed_tier() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let config = CacheConfig::builder()
        .ttl_jitter(0.0)
        .local_expire_after_write(Duration::from_millis(100))
        .build();
    let cache = node(config, &store, Some(&mutex));

    cache.set("user", "42", &"Alice").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!cache.local_store().contains_key("user:42").await);

    let result = cache.get::<String>("user", "42").await;
    assert_eq!(result.into_data().as_deref(), Some("Alice"));
    assert!(cache.local_store().contains_key("user:42").await);

    let metrics = cache.metrics().unwrap();
    assert_eq!(metrics.misses(CacheTier::L1), 1);
    assert_eq!(metrics.hits(CacheTier::L2), 1);
}

#[tokio::test]
async fn negative_marker_stays_shorter_than_namespace_ttl() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));
    cache
        .register_namespace(CacheNamespace::new("otp", "otp", Duration::from_secs(10)))
        .unwrap();

    let code: Option<String> = cache
        .get_or_load("otp", "1", || async { Ok::<_, BoxError>(None) }, None)
        .await
        .unwrap();
    assert!(code.is_none());

    assert_eq!(store.peek("otp:1").as_deref(), Some(NEGATIVE_MARKER));
    let marker_ttl = store.ttl("otp:1").await.unwrap().unwrap();
    assert!(marker_ttl <= Duration::from_secs(5));

    // An explicit call TTL caps the marker the same way
    let _: Option<String> = cache
        .get_or_load(
            "user",
            "2",
            || async { Ok::<_, BoxError>(None) },
            Some(Duration::from_secs(4)),
        )
        .await
        .unwrap();
    assert!(store.ttl("user:2").await.unwrap().unwrap() <= Duration::from_secs(2));
}

#[tokio::test]
async fn value_found_after_lock_wait_is_not_loaded() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));
    let writer = node(base_config(), &store, Some(&mutex));

    let held = layered_cache::DistributedMutex::try_acquire(
        &mutex,
        "lock:user:5",
        Duration::from_millis(10),
        Duration::from_secs(10),
    )
    .await
    .unwrap()
    .unwrap();

    let (value, ()) = tokio::join!(
        cache.get_or_load(
            "user",
            "5",
            || async { Ok::<_, BoxError>(Some("loaded".to_string())) },
            None,
        ),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.set("user", "5", &"written").await;
            layered_cache::DistributedMutex::release(&mutex, &held)
                .await
                .unwrap();
        }
    );
    assert_eq!(value.unwrap().as_deref(), Some("written"));

    // L2 counts probes: the first probe missed, the re-probe hit
    let metrics = cache.metrics().unwrap();
    assert_eq!(metrics.misses(CacheTier::L1), 1);
    assert_eq!(metrics.misses(CacheTier::L2), 1);
    assert_eq!(metrics.hits(CacheTier::L2), 1);
    assert_eq!(metrics.misses(CacheTier::SourceLoad), 0);
    assert_eq!(cache.get_overall_hit_rate(), 100.0);

    let user = cache.get_namespace_stats("user").unwrap();
    assert_eq!(user.hits, 1);
    assert_eq!(user.misses, 0);
}

#[tokio::test]
async fn namespace_and_write_counters_are_recorded() {
    let store = MemoryStore::new();
    let mutex = MemoryMutex::new();
    let cache = node(base_config(), &store, Some(&mutex));

    assert!(cache.get_namespace_stats("user").is_none());

    cache.set("user", "1", &"a").await;
    cache.set("users", "1", &"b").await;
    cache.get::<String>("user", "1").await;
    cache.get::<String>("user", "missing").await;
    let _: Option<String> = cache
        .get_or_load("user", "2", || async { Ok::<_, BoxError>(Some("c".to_string())) }, None)
        .await
        .unwrap();
    cache.delete("user", "1").await;
    cache.clear_namespace("users").await.unwrap();

    let user = cache.get_namespace_stats("user").unwrap();
    assert_eq!(user.sets, 1);
    assert_eq!(user.hits, 1);
    assert_eq!(user.misses, 2);
    assert_eq!(user.deletes, 1);
    assert_eq!(user.clears, 0);

    let users = cache.get_namespace_stats("users").unwrap();
    assert_eq!(users.sets, 1);
    assert_eq!(users.clears, 1);

    let global = cache.get_global_stats();
    assert_eq!(global.sets, 2);
    assert_eq!(global.deletes, 1);
    assert_eq!(global.clears, 1);
    assert_eq!(global.requests, 3);
    assert_eq!(global.error_rate(), 0.0);
}
