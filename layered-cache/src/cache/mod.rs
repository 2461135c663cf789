//! # Two-Tier Caching Layer
//!
//! A process-local LRU tier in front of a shared distributed tier, composed
//! by [`CacheOrchestrator`].
//!
//! ## Features
//!
//! - **Cache-Aside Loading**: `get_or_load` falls through Tier 1, Tier 2 and the caller's loader
//! - **Stampede Protection**: one loader per key across processes, via a distributed mutex
//! - **Penetration Protection**: absent results are cached as a short-lived negative marker
//! - **Avalanche Protection**: jittered Tier-2 TTLs and a circuit breaker on Tier 2
//! - **Double Delete**: immediate plus delayed invalidation after source writes
//! - **Metrics**: per-tier hits, misses and latency, mirrored to the `metrics` facade
//!
//! ## Example
//!
//! ```rust
//! use layered_cache::cache::{CacheConfig, CacheNamespace, CacheOrchestrator};
//! use layered_cache::lock::MemoryMutex;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = CacheOrchestrator::builder(CacheConfig::default())
//!     .mutex(Arc::new(MemoryMutex::new()))
//!     .namespace(CacheNamespace::new("user", "user", Duration::from_secs(1800)))
//!     .build()?;
//!
//! let name: Option<String> = cache
//!     .get_or_load("user", "42", || async { Ok::<_, std::io::Error>(Some("Alice".to_string())) }, None)
//!     .await?;
//! assert_eq!(name.as_deref(), Some("Alice"));
//!
//! // Served from Tier 1 from now on
//! let cached = cache.get::<String>("user", "42").await;
//! assert!(cached.is_success());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod invalidation;
pub mod metrics;
pub mod namespace;
pub mod orchestrator;
pub mod store;
pub mod tier;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, CacheEntryInfo};
pub use invalidation::{InvalidationReason, InvalidationWorker};
pub use self::metrics::{describe_metrics, GlobalStats, MetricsCollector, NamespaceStats};
pub use namespace::{CacheNamespace, NamespaceRegistry, ParsedKey};
pub use orchestrator::{CacheOrchestrator, CacheOrchestratorBuilder, WarmUpReport};
pub use store::LocalStore;
pub use tier::DistributedTier;
pub use types::{CacheKey, CacheResult, CacheStats, CacheTier, CacheValue, NEGATIVE_MARKER};
