//! Two-tier cache-aside orchestrator
//!
//! Reads go Tier 1, then Tier 2, then the caller's loader. Loads are
//! serialized per key across processes by the distributed mutex, absent
//! results are remembered with a short-lived negative marker, and every tier
//! access is mirrored into the metrics collector.
//!
//! Backend failures never reach the caller: a failed read is a miss, a failed
//! write is skipped, and a missing or unreachable lock provider turns a load
//! into a direct, uncached load. The only error `get_or_load` returns is the
//! loader's own (or a bad namespace/key).

use crate::backend::{CircuitBreaker, DistributedStore, MemoryStore, RedisStore};
use crate::backend::redis::RedisStoreConfig;
use crate::cache::config::CacheConfig;
use crate::cache::entry::CacheEntryInfo;
use crate::cache::invalidation::InvalidationWorker;
use crate::cache::metrics::{GlobalStats, MetricsCollector, NamespaceStats};
use crate::cache::namespace::{CacheNamespace, NamespaceRegistry};
use crate::cache::store::{start_auto_cleanup, LocalStore};
use crate::cache::tier::DistributedTier;
use crate::cache::types::{is_negative_marker, CacheKey, CacheResult, CacheStats, CacheTier, CacheValue, NEGATIVE_MARKER};
use crate::error::{BoxError, CacheError, Result};
use crate::health::{HealthCheckConfig, HealthCheckResult};
use crate::lock::{DistributedMutex, LeaseGuard, RedisMutex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Keys per Tier-2 delete when clearing a namespace
const CLEAR_BATCH: usize = 500;

/// What the cache tiers know about a key
enum Lookup {
    /// A serialized value
    Hit(CacheValue),
    /// The negative marker: known to be absent
    Absent,
    Miss,
}

/// Outcome of a warm-up run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmUpReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Business keys that were not written, with the reason
    pub failed: Vec<(String, String)>,
}

impl WarmUpReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The public entry point of the cache
///
/// Build one per process with [`CacheOrchestrator::builder`] (or
/// [`CacheOrchestrator::connect`] for Redis) and share it behind an `Arc`.
pub struct CacheOrchestrator {
    config: CacheConfig,
    namespaces: NamespaceRegistry,
    local: Arc<LocalStore>,
    distributed: Arc<DistributedTier>,
    mutex: Option<Arc<dyn DistributedMutex>>,
    metrics: Option<Arc<MetricsCollector>>,
    invalidation: InvalidationWorker,
    health: HealthCheckConfig,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`CacheOrchestrator`]
pub struct CacheOrchestratorBuilder {
    config: CacheConfig,
    store: Option<Arc<dyn DistributedStore>>,
    mutex: Option<Arc<dyn DistributedMutex>>,
    metrics: Option<Arc<MetricsCollector>>,
    namespaces: Vec<CacheNamespace>,
    health: HealthCheckConfig,
    auto_cleanup: bool,
}

impl CacheOrchestratorBuilder {
    /// Use this distributed store (defaults to an in-process [`MemoryStore`])
    pub fn distributed(mut self, store: Arc<dyn DistributedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Serialize loads through this lock provider
    ///
    /// Without one, every double miss loads directly and nothing is cached.
    pub fn mutex(mut self, mutex: Arc<dyn DistributedMutex>) -> Self {
        self.mutex = Some(mutex);
        self
    }

    /// Record into this collector instead of a private one
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a namespace at build time
    pub fn namespace(mut self, namespace: CacheNamespace) -> Self {
        self.namespaces.push(namespace);
        self
    }

    pub fn health_config(mut self, health: HealthCheckConfig) -> Self {
        self.health = health;
        self
    }

    /// Sweep expired Tier-1 entries every `local_cleanup_interval`
    ///
    /// Requires building inside a tokio runtime.
    pub fn auto_cleanup(mut self, enabled: bool) -> Self {
        self.auto_cleanup = enabled;
        self
    }

    pub fn build(self) -> Result<CacheOrchestrator> {
        self.config.validate()?;

        let namespaces = NamespaceRegistry::new();
        for namespace in self.namespaces {
            namespaces.register(namespace)?;
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn DistributedStore>);
        let breaker = CircuitBreaker::new(
            self.config.breaker_failure_threshold,
            self.config.breaker_recover_after,
        );
        let distributed = Arc::new(DistributedTier::new(store, breaker));
        let local = Arc::new(LocalStore::from_config(&self.config));

        let metrics = match (self.config.enable_metrics, self.metrics) {
            (false, _) => None,
            (true, Some(metrics)) => Some(metrics),
            (true, None) => Some(Arc::new(MetricsCollector::new())),
        };

        let cleanup = if self.auto_cleanup {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(CacheError::ConfigError(
                    "auto cleanup requires a tokio runtime".to_string(),
                ));
            }
            Some(start_auto_cleanup(
                Arc::clone(&local),
                self.config.local_cleanup_interval,
            ))
        } else {
            None
        };

        let invalidation = InvalidationWorker::new(Arc::clone(&local), Some(Arc::clone(&distributed)));

        info!(
            "Cache orchestrator ready (tier 2: {}, lock: {}, metrics: {})",
            distributed.backend_name(),
            self.mutex.as_ref().map_or("none", |m| m.name()),
            metrics.is_some()
        );

        Ok(CacheOrchestrator {
            config: self.config,
            namespaces,
            local,
            distributed,
            mutex: self.mutex,
            metrics,
            invalidation,
            health: self.health,
            cleanup: Mutex::new(cleanup),
        })
    }
}

impl CacheOrchestrator {
    pub fn builder(config: CacheConfig) -> CacheOrchestratorBuilder {
        CacheOrchestratorBuilder {
            config,
            store: None,
            mutex: None,
            metrics: None,
            namespaces: Vec::new(),
            health: HealthCheckConfig::default(),
            auto_cleanup: false,
        }
    }

    /// Build against Redis: `redis_url` for Tier 2 and `lock_endpoint()` for
    /// the mutex
    pub async fn connect(config: CacheConfig) -> Result<Self> {
        let url = config
            .redis_url
            .clone()
            .ok_or_else(|| CacheError::ConfigError("redis_url is not set".to_string()))?;

        let store_config = RedisStoreConfig {
            default_ttl: Some(config.default_ttl),
            ..RedisStoreConfig::new(url.as_str())
        };
        let connect_timeout = store_config.connect_timeout;
        let store = RedisStore::connect(store_config).await?;

        let lock_url = config.lock_endpoint().unwrap_or(url.as_str()).to_string();
        let mutex = RedisMutex::connect(&lock_url, connect_timeout).await?;

        Self::builder(config)
            .distributed(Arc::new(store))
            .mutex(Arc::new(mutex))
            .auto_cleanup(true)
            .build()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.namespaces
    }

    /// Register a namespace after construction
    pub fn register_namespace(&self, namespace: CacheNamespace) -> Result<()> {
        self.namespaces.register(namespace)
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics.as_ref()
    }

    pub fn local_store(&self) -> &LocalStore {
        &self.local
    }

    /// Read a value without loading
    ///
    /// - success with data: cached value
    /// - success without data: the key is known to be absent
    /// - failure: not cached, or the key could not be built
    pub async fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> CacheResult<T> {
        let (ns, full_key) = match self.resolve(namespace, key) {
            Ok(resolved) => resolved,
            Err(e) => return CacheResult::failure(e.to_string()),
        };

        match self.lookup(&ns.name, &full_key, ns.default_ttl).await {
            Lookup::Hit(raw) => match decode::<T>(&raw) {
                Ok(value) => CacheResult::ok(value),
                Err(e) => {
                    warn!("Discarding undecodable entry {}: {}", full_key, e);
                    CacheResult::failure(e.to_string())
                }
            },
            Lookup::Absent => CacheResult::empty(),
            Lookup::Miss => {
                self.with_metrics(|m| m.record_namespace_miss(&ns.name));
                CacheResult::failure("cache miss")
            }
        }
    }

    /// Read through both tiers, loading from the source on a double miss
    ///
    /// `ttl` overrides the namespace default for the Tier-2 write. The loader
    /// runs at most once per call.
    pub async fn get_or_load<T, F, Fut, E>(
        &self,
        namespace: &str,
        key: &str,
        loader: F,
        ttl: Option<Duration>,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        let (ns, full_key) = self.resolve(namespace, key)?;
        let ttl = ttl.unwrap_or(ns.default_ttl);

        match self.lookup(&ns.name, &full_key, ttl).await {
            Lookup::Hit(raw) => match decode::<T>(&raw) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => warn!("Reloading undecodable entry {}: {}", full_key, e),
            },
            Lookup::Absent => return Ok(None),
            Lookup::Miss => {}
        }

        let Some(mutex) = self.mutex.as_ref() else {
            debug!("No lock provider, loading {} directly", full_key);
            return self.load_direct(&ns.name, &full_key, loader).await;
        };

        let lock_key = format!("{}{}", self.config.lock_key_prefix, full_key);
        let mut attempt: u32 = 0;

        loop {
            let acquired = LeaseGuard::acquire(
                Arc::clone(mutex),
                &lock_key,
                self.config.lock_wait,
                self.config.lock_lease,
            )
            .await;

            match acquired {
                Ok(Some(guard)) => {
                    // Dropping this future mid-load still releases via the guard
                    let outcome = self.load_under_lock(&ns.name, &full_key, ttl, loader).await;
                    guard.release().await;
                    return outcome;
                }
                Ok(None) => {
                    attempt += 1;
                    if attempt > self.config.lock_max_retries {
                        let timeout = CacheError::LockTimeout {
                            key: lock_key,
                            wait_ms: self.config.lock_wait.as_millis() as u64,
                        };
                        warn!("{} after {} attempts, loading directly", timeout, attempt);
                        return self.load_direct(&ns.name, &full_key, loader).await;
                    }

                    let backoff = self.config.backoff_for_attempt(attempt);
                    debug!(
                        "Lock {} busy (attempt {}), retrying in {:?}",
                        lock_key, attempt, backoff
                    );
                    tokio::time::sleep(backoff).await;

                    // The holder has most likely populated the key by now
                    match self.reprobe(&ns.name, &full_key, ttl).await {
                        Lookup::Hit(raw) => {
                            if let Ok(value) = decode::<T>(&raw) {
                                return Ok(Some(value));
                            }
                        }
                        Lookup::Absent => return Ok(None),
                        Lookup::Miss => {}
                    }
                }
                Err(e) => {
                    warn!("Lock provider unavailable ({}), loading {} directly", e, full_key);
                    self.record_error(Duration::ZERO);
                    return self.load_direct(&ns.name, &full_key, loader).await;
                }
            }
        }
    }

    /// Write a value with the namespace default TTL
    pub async fn set<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> CacheResult<()> {
        match self.namespaces.get(namespace) {
            Ok(ns) => self.set_with_ttl(namespace, key, value, ns.default_ttl).await,
            Err(e) => CacheResult::failure(e.to_string()),
        }
    }

    /// Write a value to Tier 2, then Tier 1
    ///
    /// When the Tier-2 write fails, the Tier-1 copy is dropped rather than
    /// updated and the result is a failure.
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let full_key = match self.namespaces.build_key(namespace, key) {
            Ok(full_key) => full_key,
            Err(e) => return CacheResult::failure(e.to_string()),
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => return CacheResult::failure(CacheError::from(e).to_string()),
        };

        match self.write_distributed(&full_key, &raw, ttl).await {
            Ok(written_ttl) => {
                self.local.put_with_ttl(full_key, raw, written_ttl).await;
                self.with_metrics(|m| m.record_set(namespace));
                CacheResult::ok(())
            }
            Err(e) => {
                self.local.invalidate(&full_key).await;
                CacheResult::failure(e.to_string())
            }
        }
    }

    /// Remove a key from both tiers; returns whether Tier 2 held it
    pub async fn delete(&self, namespace: &str, key: &str) -> bool {
        match self.namespaces.build_key(namespace, key) {
            Ok(full_key) => self.evict(&full_key).await,
            Err(e) => {
                warn!("Cannot delete {}/{}: {}", namespace, key, e);
                false
            }
        }
    }

    /// Remove a fully-qualified key from both tiers; returns whether Tier 2
    /// held it
    pub async fn evict(&self, full_key: &str) -> bool {
        let started = Instant::now();
        let existed = match self.distributed.delete(full_key).await {
            Ok(existed) => existed,
            Err(e) => {
                self.backend_failure("delete", full_key, &e, started);
                false
            }
        };
        self.local.invalidate(full_key).await;

        if let Ok(parsed) = self.namespaces.parse_key(full_key) {
            self.with_metrics(|m| m.record_delete(&parsed.namespace));
        }
        debug!("Evicted {} (tier 2 held it: {})", full_key, existed);
        existed
    }

    /// Delete now and once more after `double_delete_delay`
    ///
    /// Call after writing the system of record. The second delete runs on a
    /// background worker and races freely with readers.
    pub async fn remove_cache_double_delete(&self, full_key: &str) -> bool {
        let existed = self.evict(full_key).await;
        if !self
            .invalidation
            .schedule(full_key.to_string(), self.config.double_delete_delay)
        {
            warn!("Second delete of {} not scheduled", full_key);
        }
        existed
    }

    /// Remove every key of a namespace from both tiers
    ///
    /// Returns the number of Tier-2 keys deleted.
    pub async fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        let ns = self.namespaces.get(namespace)?;
        let pattern = ns.pattern();
        let started = Instant::now();

        let keys = match self.distributed.keys(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                self.backend_failure("keys", &pattern, &e, started);
                Vec::new()
            }
        };

        let mut removed = 0usize;
        for batch in keys.chunks(CLEAR_BATCH) {
            match self.distributed.delete_many(batch).await {
                Ok(count) => removed += count as usize,
                Err(e) => {
                    self.backend_failure("delete_many", &pattern, &e, started);
                    break;
                }
            }
        }

        let local_removed = self.local.invalidate_prefix(&ns.key_prefix()).await;
        self.with_metrics(|m| m.record_clear(&ns.name));
        info!(
            "Cleared namespace {}: {} distributed keys, {} local entries",
            ns.name, removed, local_removed
        );
        Ok(removed)
    }

    /// Populate a namespace ahead of traffic
    ///
    /// Writes run one after another; failures are collected, not fatal.
    pub async fn warm_up<T, I>(&self, namespace: &str, entries: I) -> WarmUpReport
    where
        T: Serialize,
        I: IntoIterator<Item = (String, T)>,
    {
        let started = Instant::now();
        let mut report = WarmUpReport::default();

        for (key, value) in entries {
            report.attempted += 1;
            let result = self.set(namespace, &key, &value).await;
            if result.is_success() {
                report.succeeded += 1;
            } else {
                let reason = result.error.unwrap_or_else(|| "unknown".to_string());
                report.failed.push((key, reason));
            }
        }

        if report.is_complete() {
            info!(
                "Warmed up {} entries in namespace {} in {:?}",
                report.succeeded,
                namespace,
                started.elapsed()
            );
        } else {
            warn!(
                "Warm-up of namespace {} incomplete: {}/{} written",
                namespace, report.succeeded, report.attempted
            );
        }
        report
    }

    /// Hit rate of one tier as a percentage; 0 without metrics
    pub fn get_hit_rate(&self, tier: CacheTier) -> f64 {
        self.metrics.as_ref().map_or(0.0, |m| m.hit_rate(tier))
    }

    /// Share of requests answered by either cache tier; 0 without metrics
    pub fn get_overall_hit_rate(&self) -> f64 {
        self.metrics.as_ref().map_or(0.0, |m| m.overall_hit_rate())
    }

    /// Request and write counters of one namespace; `None` without metrics
    /// or before the namespace has seen traffic
    pub fn get_namespace_stats(&self, namespace: &str) -> Option<NamespaceStats> {
        self.metrics.as_ref().and_then(|m| m.namespace_stats(namespace))
    }

    /// Totals across namespaces, including the backend error rate
    pub fn get_global_stats(&self) -> GlobalStats {
        self.metrics
            .as_ref()
            .map(|m| m.global_stats())
            .unwrap_or_default()
    }

    /// Statistics of one tier
    ///
    /// Hits, misses and latency come from the metrics collector; for `L1`
    /// the entry count and evictions come from the local store itself.
    pub async fn get_stats(&self, tier: CacheTier) -> CacheStats {
        let mut stats = self
            .metrics
            .as_ref()
            .map(|m| m.stats(tier))
            .unwrap_or_default();

        if tier == CacheTier::L1 {
            let local = self.local.stats().await;
            stats.evictions = local.evictions;
            stats.estimated_size = local.estimated_size;
        }
        stats
    }

    /// Report which tiers hold a key
    pub async fn describe(&self, namespace: &str, key: &str) -> Result<CacheEntryInfo> {
        let full_key = self.namespaces.build_key(namespace, key)?;
        let mut tiers = Vec::new();

        let local_ttl = self.local.remaining_ttl(&full_key).await;
        if local_ttl.is_some() {
            tiers.push(CacheTier::L1);
        }

        let started = Instant::now();
        let (negative, distributed_ttl) = match self.distributed.get(&full_key).await {
            Ok(Some(raw)) => {
                tiers.push(CacheTier::L2);
                let ttl = self.distributed.ttl(&full_key).await.unwrap_or(None);
                (is_negative_marker(&raw), ttl)
            }
            Ok(None) => (false, None),
            Err(e) => {
                self.backend_failure("describe", &full_key, &e, started);
                (false, None)
            }
        };

        Ok(CacheEntryInfo {
            key: full_key,
            tiers,
            negative,
            local_ttl,
            distributed_ttl,
        })
    }

    /// Ping the distributed tier, retrying per the health configuration
    pub async fn health_check(&self) -> HealthCheckResult {
        let backend = self.distributed.backend_name();
        let mut retry_count = 0;

        loop {
            let start = Instant::now();
            let result = match tokio::time::timeout(self.health.timeout, self.distributed.ping()).await {
                Ok(Ok(())) => {
                    HealthCheckResult::healthy(start.elapsed(), backend, self.health.degraded_threshold_ms)
                }
                Ok(Err(e)) => HealthCheckResult::unhealthy(start.elapsed(), backend, &e.to_string()),
                Err(_) => HealthCheckResult::unhealthy(
                    start.elapsed(),
                    backend,
                    &format!("ping timed out after {:?}", self.health.timeout),
                ),
            };

            if result.status.is_operational() || retry_count >= self.health.max_retries {
                return HealthCheckResult {
                    retry_count,
                    breaker_open: self.distributed.breaker().is_open(),
                    local_entries: self.local.len().await,
                    ..result
                };
            }

            retry_count += 1;
            warn!(
                "Health check failed (attempt {}/{}), retrying after {:?}",
                retry_count,
                self.health.max_retries + 1,
                self.health.retry_delay
            );
            tokio::time::sleep(self.health.retry_delay).await;
        }
    }

    /// Stop background work, waiting for scheduled second deletes
    pub async fn shutdown(&self) {
        let cleanup = self
            .cleanup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = cleanup {
            handle.abort();
        }

        self.invalidation.shutdown().await;
        info!("Cache orchestrator shut down");
    }

    fn resolve(&self, namespace: &str, key: &str) -> Result<(CacheNamespace, CacheKey)> {
        let ns = self.namespaces.get(namespace)?;
        let full_key = self.namespaces.build_key(namespace, key)?;
        Ok((ns, full_key))
    }

    /// Tier 1, then Tier 2, recording the request against both
    async fn lookup(&self, namespace: &str, full_key: &str, promote_ttl: Duration) -> Lookup {
        let started = Instant::now();
        if let Some(raw) = self.local.get_if_present(full_key).await {
            self.record_hit(CacheTier::L1, started.elapsed());
            self.with_metrics(|m| m.record_namespace_hit(namespace));
            return Lookup::Hit(raw);
        }
        self.record_miss(CacheTier::L1, started.elapsed());

        let started = Instant::now();
        let found = self.read_distributed(full_key, promote_ttl).await;
        match &found {
            Lookup::Miss => self.record_miss(CacheTier::L2, started.elapsed()),
            _ => {
                self.record_hit(CacheTier::L2, started.elapsed());
                self.with_metrics(|m| m.record_namespace_hit(namespace));
            }
        }
        found
    }

    /// Repeat the Tier-2 probe for a request already counted by `lookup`
    ///
    /// Only a hit is recorded; the request's `L2` miss is already counted.
    async fn reprobe(&self, namespace: &str, full_key: &str, promote_ttl: Duration) -> Lookup {
        let started = Instant::now();
        let found = self.read_distributed(full_key, promote_ttl).await;
        if !matches!(found, Lookup::Miss) {
            self.record_hit(CacheTier::L2, started.elapsed());
            self.with_metrics(|m| m.record_namespace_hit(namespace));
        }
        found
    }

    /// Read Tier 2, promoting values into Tier 1
    ///
    /// The Tier-1 copy never outlives the Tier-2 key: it expires after the
    /// key's remaining Tier-2 TTL when that is shorter than `promote_ttl`.
    async fn read_distributed(&self, full_key: &str, promote_ttl: Duration) -> Lookup {
        let started = Instant::now();
        match self.distributed.get(full_key).await {
            Ok(Some(raw)) if is_negative_marker(&raw) => {
                debug!("Negative marker hit for {}", full_key);
                if let Some(metrics) = &self.metrics {
                    metrics.record_negative_hit();
                }
                Lookup::Absent
            }
            Ok(Some(raw)) => {
                let local_ttl = match self.distributed.ttl(full_key).await {
                    Ok(Some(remaining)) => remaining.min(promote_ttl),
                    Ok(None) => promote_ttl,
                    Err(e) => {
                        debug!("No remaining TTL for {} ({}), promoting for {:?}", full_key, e, promote_ttl);
                        promote_ttl
                    }
                };
                if !local_ttl.is_zero() {
                    self.local
                        .put_with_ttl(full_key.to_string(), raw.clone(), local_ttl)
                        .await;
                    debug!("Promoted {} into tier 1 for {:?}", full_key, local_ttl);
                }
                Lookup::Hit(raw)
            }
            Ok(None) => Lookup::Miss,
            Err(e) => {
                self.backend_failure("get", full_key, &e, started);
                Lookup::Miss
            }
        }
    }

    /// Double-check, load and populate while holding the key's lock
    async fn load_under_lock<T, F, Fut, E>(
        &self,
        namespace: &str,
        full_key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        match self.reprobe(namespace, full_key, ttl).await {
            Lookup::Hit(raw) => match decode::<T>(&raw) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => warn!("Reloading undecodable entry {}: {}", full_key, e),
            },
            Lookup::Absent => return Ok(None),
            Lookup::Miss => {}
        }

        match self.invoke_loader(namespace, full_key, loader).await? {
            Some(value) => {
                self.populate(full_key, &value, ttl).await;
                Ok(Some(value))
            }
            None => {
                self.cache_absence(full_key, ttl).await;
                Ok(None)
            }
        }
    }

    /// Load without touching either tier
    async fn load_direct<T, F, Fut, E>(&self, namespace: &str, full_key: &str, loader: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        self.invoke_loader(namespace, full_key, loader).await
    }

    async fn invoke_loader<T, F, Fut, E>(&self, namespace: &str, full_key: &str, loader: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        let started = Instant::now();
        let loaded = loader().await;
        self.record_miss(CacheTier::SourceLoad, started.elapsed());
        self.with_metrics(|m| m.record_namespace_miss(namespace));

        loaded.map_err(|e| {
            let err = CacheError::Loader(e.into());
            error!("Loading {} failed: {}", full_key, err);
            err
        })
    }

    async fn populate<T: Serialize>(&self, full_key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Not caching {}: {}", full_key, e);
                return;
            }
        };

        // Tier 1 keeps serving this process even if the shared write fails
        let local_ttl = match self.write_distributed(full_key, &raw, ttl).await {
            Ok(written_ttl) => written_ttl,
            Err(_) => ttl,
        };
        self.local.put_with_ttl(full_key.to_string(), raw, local_ttl).await;
    }

    /// Write the negative marker, kept shorter than the value TTL `ttl`
    async fn cache_absence(&self, full_key: &str, ttl: Duration) {
        if !self.config.enable_negative_caching {
            return;
        }

        let marker_ttl = self.config.negative_ttl_for(ttl);
        let started = Instant::now();
        match self.distributed.set(full_key, NEGATIVE_MARKER, marker_ttl).await {
            Ok(()) => debug!("Cached absence of {} for {:?}", full_key, marker_ttl),
            Err(e) => self.backend_failure("set", full_key, &e, started),
        }
    }

    /// Jittered Tier-2 write; returns the TTL actually written
    async fn write_distributed(&self, full_key: &str, raw: &str, ttl: Duration) -> Result<Duration> {
        let ttl = self.config.ttl_with_jitter(ttl);
        let started = Instant::now();
        match self.distributed.set(full_key, raw, ttl).await {
            Ok(()) => Ok(ttl),
            Err(e) => {
                self.backend_failure("set", full_key, &e, started);
                Err(e)
            }
        }
    }

    fn backend_failure(&self, op: &str, key: &str, err: &CacheError, started: Instant) {
        warn!("Distributed {} of {} failed: {}", op, key, err);
        self.record_error(started.elapsed());
    }

    fn with_metrics(&self, record: impl FnOnce(&MetricsCollector)) {
        if let Some(metrics) = &self.metrics {
            record(metrics);
        }
    }

    fn record_hit(&self, tier: CacheTier, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_hit(tier, elapsed);
        }
    }

    fn record_miss(&self, tier: CacheTier, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_miss(tier, elapsed);
        }
    }

    fn record_error(&self, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(elapsed);
        }
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}
