//! # Layered Cache (layered-cache)
//!
//! A two-tier caching core for Rust services: a process-local cache in front
//! of a shared Redis tier, with cache-aside loading and protection against
//! the usual failure modes of a shared cache.
//!
//! ## Features
//!
//! - Process-local LRU tier with fixed expire-after-write
//! - Redis-backed distributed tier (or an in-process stand-in)
//! - Per-key distributed mutex so a missing key is loaded once cluster-wide
//! - Negative caching of absent keys
//! - Delayed double delete for write consistency
//! - Circuit breaker and jittered TTLs on the distributed tier
//! - Hit/miss/latency metrics per tier via the `metrics` facade
//! - Health checks with degraded state detection
//!
//! ## Connecting to Redis
//!
//! ```no_run
//! use layered_cache::{CacheConfig, CacheNamespace, CacheOrchestrator};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CacheConfig::builder()
//!         .redis_url("redis://127.0.0.1:6379")
//!         .build();
//!     let cache = CacheOrchestrator::connect(config).await?;
//!     cache.register_namespace(CacheNamespace::new("user", "user", Duration::from_secs(1800)))?;
//!
//!     cache.set("user", "42", &"Alice").await;
//!     let hit = cache.get::<String>("user", "42").await;
//!     println!("Cached: {:?}", hit.data());
//!
//!     cache.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration from the environment
//!
//! Every option can be set with a `LAYERED_CACHE_*` variable (a `.env` file
//! is honored):
//!
//! ```no_run
//! use layered_cache::{CacheConfig, CacheOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CacheConfig::from_env()?;
//!     let cache = CacheOrchestrator::connect(config).await?;
//!
//!     let health = cache.health_check().await;
//!     if health.status.is_operational() {
//!         println!("Distributed tier answered in {}ms", health.response_time_ms);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod error;
pub mod health;
pub mod lock;

// Re-export main types for convenience
pub use backend::{DistributedStore, MemoryStore, RedisStore};
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheEntryInfo, CacheKey, CacheNamespace, CacheOrchestrator,
    CacheOrchestratorBuilder, CacheResult, CacheStats, CacheTier, CacheValue, GlobalStats,
    LocalStore, MetricsCollector, NamespaceRegistry, NamespaceStats, WarmUpReport,
};
pub use error::{BoxError, CacheError, Result};
pub use health::{HealthCheckConfig, HealthCheckResult, HealthStatus};
pub use lock::{DistributedMutex, LeaseGuard, MemoryMutex, RedisMutex};
