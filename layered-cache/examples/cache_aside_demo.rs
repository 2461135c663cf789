//! Cache-Aside Demo Application
//!
//! Walks through loading, negative caching, double delete and statistics.
//!
//! Usage:
//!   cargo run --example cache_aside_demo
//!
//! Environment variables:
//!   LAYERED_CACHE_REDIS_URL - Redis URL; without it an in-process tier is used
//!   RUST_LOG                - log filter (default: info,layered_cache=debug)

use layered_cache::{
    CacheConfig, CacheNamespace, CacheOrchestrator, CacheTier, MemoryMutex, MemoryStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

async fn find_user(id: u64) -> anyhow::Result<Option<User>> {
    // Stand-in for a database round trip
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok((id == 42).then(|| User {
        id,
        name: "Alice".to_string(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,layered_cache=debug")),
        )
        .init();

    info!("=== Layered Cache Demo ===");

    let config = CacheConfig::from_env()?;
    let cache = if config.redis_url.is_some() {
        info!("Connecting to Redis");
        CacheOrchestrator::connect(config).await?
    } else {
        info!("No Redis configured, using the in-process distributed tier");
        CacheOrchestrator::builder(config)
            .distributed(Arc::new(MemoryStore::new()))
            .mutex(Arc::new(MemoryMutex::new()))
            .build()?
    };
    cache.register_namespace(CacheNamespace::new("user", "user", Duration::from_secs(1800)))?;

    info!("\n--- Cache-aside load ---");
    let first = cache
        .get_or_load("user", "42", || find_user(42), None)
        .await?;
    info!("First read (source): {:?}", first);
    let second: Option<User> = cache
        .get_or_load("user", "42", || find_user(42), None)
        .await?;
    info!("Second read (L1): {:?}", second);

    info!("\n--- Negative caching ---");
    let missing: Option<User> = cache
        .get_or_load("user", "7", || find_user(7), None)
        .await?;
    info!("Unknown user: {:?}", missing);
    let entry = cache.describe("user", "7").await?;
    info!("Entry for user 7: {:?}", entry);

    info!("\n--- Write with double delete ---");
    let renamed = User {
        id: 42,
        name: "Alice Liddell".to_string(),
    };
    // The source write would happen here
    info!("Updated source record: {:?}", renamed);
    let key = cache.namespaces().build_key("user", "42")?;
    cache.remove_cache_double_delete(&key).await;

    info!("\n--- Statistics ---");
    for tier in CacheTier::ALL {
        let stats = cache.get_stats(tier).await;
        info!(
            "{}: hits={} misses={} hit_rate={:.1}%",
            tier.label(),
            stats.hits,
            stats.misses,
            stats.hit_rate()
        );
    }
    info!("Overall hit rate: {:.1}%", cache.get_overall_hit_rate());

    let health = cache.health_check().await;
    info!("Health: {:?} in {}ms", health.status, health.response_time_ms);

    cache.shutdown().await;
    info!("\n=== Demo Complete ===");
    Ok(())
}
