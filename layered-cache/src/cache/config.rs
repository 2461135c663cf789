//! Configuration for the cache system

use crate::error::{CacheError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Prefix for every environment variable read by [`CacheConfig::from_env`]
pub const ENV_PREFIX: &str = "LAYERED_CACHE_";

/// Configuration for the two-tier cache
///
/// Defaults follow the observed production profile:
/// - Tier 1: 10k entries, 5 minutes expire-after-write
/// - Tier 2: 30 minutes default TTL with 10% jitter
/// - Negative marker: 60 seconds
/// - Lock: 3s wait, 6s lease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries held in the process-local tier
    pub local_max_entries: usize,

    /// Fixed expire-after-write for the process-local tier
    /// Must not exceed `default_ttl`
    pub local_expire_after_write: Duration,

    /// Interval for the optional local cleanup task
    pub local_cleanup_interval: Duration,

    /// Default TTL for distributed entries when a namespace does not set one
    pub default_ttl: Duration,

    /// TTL jitter factor (0.0 - 1.0)
    /// Spreads distributed-tier expirations so a burst of writes does not
    /// expire as a burst
    pub ttl_jitter: f64,

    /// Cache a negative marker when a loader returns nothing
    pub enable_negative_caching: bool,

    /// TTL of the negative marker, strictly shorter than `default_ttl`
    pub negative_ttl: Duration,

    /// Distributed tier endpoint, e.g. `redis://127.0.0.1:6379`
    pub redis_url: Option<String>,

    /// Lock provider endpoint; falls back to `redis_url`
    pub lock_redis_url: Option<String>,

    /// Prefix prepended to cache keys to form lock keys
    pub lock_key_prefix: String,

    /// How long a loader waits to acquire the per-key lock
    pub lock_wait: Duration,

    /// Lease after which a held lock expires on its own
    pub lock_lease: Duration,

    /// Additional attempts after a lock wait times out
    pub lock_max_retries: u32,

    /// Base delay of the exponential retry backoff
    pub lock_backoff: Duration,

    /// Upper bound of the retry backoff
    pub lock_backoff_max: Duration,

    /// Enable hit/miss/latency collection
    pub enable_metrics: bool,

    /// Delay before the second delete of a double delete
    /// Should exceed the replication lag of the system of record
    pub double_delete_delay: Duration,

    /// Consecutive distributed-tier failures that open the circuit breaker
    pub breaker_failure_threshold: u32,

    /// How long the breaker stays open before a trial call
    pub breaker_recover_after: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_max_entries: 10_000,
            // 5 minutes local, 30 minutes distributed
            local_expire_after_write: Duration::from_secs(300),
            local_cleanup_interval: Duration::from_secs(60),
            default_ttl: Duration::from_secs(1800),
            ttl_jitter: 0.1,
            enable_negative_caching: true,
            negative_ttl: Duration::from_secs(60),
            redis_url: None,
            lock_redis_url: None,
            lock_key_prefix: "lock:".to_string(),
            lock_wait: Duration::from_secs(3),
            lock_lease: Duration::from_secs(6),
            lock_max_retries: 3,
            lock_backoff: Duration::from_millis(50),
            lock_backoff_max: Duration::from_secs(1),
            enable_metrics: true,
            double_delete_delay: Duration::from_millis(500),
            breaker_failure_threshold: 10,
            breaker_recover_after: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Load configuration from `LAYERED_CACHE_*` environment variables
    ///
    /// A `.env` file in the working directory is read first when present.
    /// Variables that are not set keep their default value.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var::<usize>(&lookup, "LOCAL_MAX_ENTRIES")? {
            config.local_max_entries = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "LOCAL_EXPIRE_SECS")? {
            config.local_expire_after_write = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "LOCAL_CLEANUP_SECS")? {
            config.local_cleanup_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "DEFAULT_TTL_SECS")? {
            config.default_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<f64>(&lookup, "TTL_JITTER")? {
            config.ttl_jitter = v;
        }
        if let Some(v) = parse_var::<bool>(&lookup, "NEGATIVE_CACHING")? {
            config.enable_negative_caching = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "NEGATIVE_TTL_SECS")? {
            config.negative_ttl = Duration::from_secs(v);
        }
        if let Some(v) = lookup("REDIS_URL").filter(|v| !v.is_empty()) {
            config.redis_url = Some(v);
        }
        if let Some(v) = lookup("LOCK_REDIS_URL").filter(|v| !v.is_empty()) {
            config.lock_redis_url = Some(v);
        }
        if let Some(v) = lookup("LOCK_KEY_PREFIX") {
            config.lock_key_prefix = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "LOCK_WAIT_MS")? {
            config.lock_wait = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "LOCK_LEASE_MS")? {
            config.lock_lease = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u32>(&lookup, "LOCK_MAX_RETRIES")? {
            config.lock_max_retries = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "LOCK_BACKOFF_MS")? {
            config.lock_backoff = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "LOCK_BACKOFF_MAX_MS")? {
            config.lock_backoff_max = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<bool>(&lookup, "METRICS")? {
            config.enable_metrics = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "DOUBLE_DELETE_DELAY_MS")? {
            config.double_delete_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u32>(&lookup, "BREAKER_THRESHOLD")? {
            config.breaker_failure_threshold = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "BREAKER_RECOVER_SECS")? {
            config.breaker_recover_after = Duration::from_secs(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.local_max_entries == 0 {
            return Err(CacheError::ConfigError(
                "local_max_entries must be greater than 0".to_string(),
            ));
        }

        if self.local_expire_after_write.is_zero() || self.default_ttl.is_zero() {
            return Err(CacheError::ConfigError(
                "expiry durations must be greater than 0".to_string(),
            ));
        }

        if self.local_expire_after_write > self.default_ttl {
            return Err(CacheError::ConfigError(
                "local_expire_after_write must not exceed default_ttl".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::ConfigError(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.negative_ttl.is_zero() || self.negative_ttl >= self.default_ttl {
            return Err(CacheError::ConfigError(
                "negative_ttl must be non-zero and shorter than default_ttl".to_string(),
            ));
        }

        if self.lock_lease <= self.lock_wait {
            return Err(CacheError::ConfigError(
                "lock_lease must be longer than lock_wait".to_string(),
            ));
        }

        if self.breaker_failure_threshold == 0 {
            return Err(CacheError::ConfigError(
                "breaker_failure_threshold must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply the configured jitter to a distributed-tier TTL
    pub fn ttl_with_jitter(&self, ttl: Duration) -> Duration {
        if self.ttl_jitter == 0.0 {
            return ttl;
        }

        let base_secs = ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(0.001);

        Duration::try_from_secs_f64(final_secs).unwrap_or(ttl)
    }

    /// Expiry of a negative marker cached in place of a value with `ttl`
    ///
    /// Capped at half the value TTL so a marker never outlives the entries
    /// of its namespace.
    pub fn negative_ttl_for(&self, ttl: Duration) -> Duration {
        self.negative_ttl
            .min(ttl / 2)
            .max(Duration::from_millis(1))
    }

    /// Backoff before lock attempt `attempt` (1-based), with full jitter
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .lock_backoff
            .saturating_mul(1u32 << exp)
            .min(self.lock_backoff_max);
        if ceiling.is_zero() {
            return ceiling;
        }
        let half = ceiling / 2;
        let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(spread)
    }

    /// Endpoint used by the lock provider
    pub fn lock_endpoint(&self) -> Option<&str> {
        self.lock_redis_url
            .as_deref()
            .or(self.redis_url.as_deref())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            CacheError::ConfigError(format!("{}{}={:?}: {}", ENV_PREFIX, name, raw, e))
        }),
    }
}

/// Builder for cache configuration with validation
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    local_max_entries: Option<usize>,
    local_expire_after_write: Option<Duration>,
    local_cleanup_interval: Option<Duration>,
    default_ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    enable_negative_caching: Option<bool>,
    negative_ttl: Option<Duration>,
    redis_url: Option<String>,
    lock_redis_url: Option<String>,
    lock_wait: Option<Duration>,
    lock_lease: Option<Duration>,
    lock_max_retries: Option<u32>,
    lock_backoff: Option<Duration>,
    enable_metrics: Option<bool>,
    double_delete_delay: Option<Duration>,
    breaker_failure_threshold: Option<u32>,
    breaker_recover_after: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set maximum number of local entries
    pub fn local_max_entries(mut self, max: usize) -> Self {
        self.local_max_entries = Some(max);
        self
    }

    /// Set local expire-after-write
    pub fn local_expire_after_write(mut self, ttl: Duration) -> Self {
        self.local_expire_after_write = Some(ttl);
        self
    }

    /// Set local cleanup interval
    pub fn local_cleanup_interval(mut self, interval: Duration) -> Self {
        self.local_cleanup_interval = Some(interval);
        self
    }

    /// Set default distributed TTL
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Enable or disable negative caching
    pub fn enable_negative_caching(mut self, enable: bool) -> Self {
        self.enable_negative_caching = Some(enable);
        self
    }

    /// Set negative marker TTL
    pub fn negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = Some(ttl);
        self
    }

    /// Set distributed tier endpoint
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Set lock provider endpoint
    pub fn lock_redis_url(mut self, url: impl Into<String>) -> Self {
        self.lock_redis_url = Some(url.into());
        self
    }

    /// Set lock wait timeout
    pub fn lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = Some(wait);
        self
    }

    /// Set lock lease
    pub fn lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = Some(lease);
        self
    }

    /// Set retry count after lock timeouts
    pub fn lock_max_retries(mut self, retries: u32) -> Self {
        self.lock_max_retries = Some(retries);
        self
    }

    /// Set base retry backoff
    pub fn lock_backoff(mut self, backoff: Duration) -> Self {
        self.lock_backoff = Some(backoff);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Set double delete delay
    pub fn double_delete_delay(mut self, delay: Duration) -> Self {
        self.double_delete_delay = Some(delay);
        self
    }

    /// Set circuit breaker threshold
    pub fn breaker_failure_threshold(mut self, threshold: u32) -> Self {
        self.breaker_failure_threshold = Some(threshold);
        self
    }

    /// Set circuit breaker recovery window
    pub fn breaker_recover_after(mut self, window: Duration) -> Self {
        self.breaker_recover_after = Some(window);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            local_max_entries: self.local_max_entries.unwrap_or(defaults.local_max_entries),
            local_expire_after_write: self
                .local_expire_after_write
                .unwrap_or(defaults.local_expire_after_write),
            local_cleanup_interval: self
                .local_cleanup_interval
                .unwrap_or(defaults.local_cleanup_interval),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            enable_negative_caching: self
                .enable_negative_caching
                .unwrap_or(defaults.enable_negative_caching),
            negative_ttl: self.negative_ttl.unwrap_or(defaults.negative_ttl),
            redis_url: self.redis_url.or(defaults.redis_url),
            lock_redis_url: self.lock_redis_url.or(defaults.lock_redis_url),
            lock_key_prefix: defaults.lock_key_prefix,
            lock_wait: self.lock_wait.unwrap_or(defaults.lock_wait),
            lock_lease: self.lock_lease.unwrap_or(defaults.lock_lease),
            lock_max_retries: self.lock_max_retries.unwrap_or(defaults.lock_max_retries),
            lock_backoff: self.lock_backoff.unwrap_or(defaults.lock_backoff),
            lock_backoff_max: defaults.lock_backoff_max,
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
            double_delete_delay: self
                .double_delete_delay
                .unwrap_or(defaults.double_delete_delay),
            breaker_failure_threshold: self
                .breaker_failure_threshold
                .unwrap_or(defaults.breaker_failure_threshold),
            breaker_recover_after: self
                .breaker_recover_after
                .unwrap_or(defaults.breaker_recover_after),
        }
    }
}

/// Preset configurations for common use cases
impl CacheConfig {
    /// Rapidly changing data: short TTLs on both tiers
    pub fn realtime() -> Self {
        Self {
            local_expire_after_write: Duration::from_secs(30),
            default_ttl: Duration::from_secs(300),
            negative_ttl: Duration::from_secs(10),
            ttl_jitter: 0.15,
            ..Default::default()
        }
    }

    /// Reference data that changes rarely
    pub fn static_content() -> Self {
        Self {
            local_max_entries: 50_000,
            local_expire_after_write: Duration::from_secs(1800),
            default_ttl: Duration::from_secs(24 * 3600),
            negative_ttl: Duration::from_secs(300),
            ttl_jitter: 0.05,
            ..Default::default()
        }
    }

    /// Memory-constrained processes
    pub fn small() -> Self {
        Self {
            local_max_entries: 1_000,
            ..Default::default()
        }
    }
}
