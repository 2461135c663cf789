//! Hit/miss/latency accounting per tier
//!
//! Accounting rules used by the orchestrator:
//! - every logical request passes through `L1` exactly once (hit or miss)
//! - an `L1` miss that is served by the distributed tier is an `L2` hit
//! - an `L1` miss that reaches the loader is an `L2` miss and a
//!   `source-load` sample
//! - backend failures are counted on the `error` tier
//!
//! so the overall hit rate is `(L1 hits + L2 hits) / (L1 hits + L1 misses)`.
//!
//! `L2` counts probes rather than requests. A request that misses Tier 2,
//! waits for the key's lock and then finds the value on the re-probe records
//! one `L2` miss and one `L2` hit. The overall rate is unaffected because it
//! is taken over `L1` requests.
//!
//! Namespaces are accounted separately: a request is one namespace hit when
//! either tier answered it and one namespace miss when it reached the loader
//! or found nothing. Sets, deletes and clears are counted per namespace and
//! globally.
//!
//! Each sample is also emitted through the `metrics` facade; whatever
//! recorder the host application installs receives it.

use crate::cache::types::{CacheStats, CacheTier};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once, RwLock};
use std::time::Duration;

pub const HITS_METRIC: &str = "layered_cache_hits_total";
pub const MISSES_METRIC: &str = "layered_cache_misses_total";
pub const RESPONSE_METRIC: &str = "layered_cache_response_seconds";
pub const NEGATIVE_HITS_METRIC: &str = "layered_cache_negative_hits_total";
pub const REQUESTS_METRIC: &str = "layered_cache_requests_total";
pub const WRITES_METRIC: &str = "layered_cache_writes_total";

/// Response-time samples retained per tier
pub const DEFAULT_SAMPLE_WINDOW: usize = 1024;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Register descriptions for every emitted metric with the installed recorder
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(HITS_METRIC, Unit::Count, "Cache hits by tier.");
        describe_counter!(MISSES_METRIC, Unit::Count, "Cache misses by tier.");
        describe_counter!(
            NEGATIVE_HITS_METRIC,
            Unit::Count,
            "Reads answered by a cached absence marker."
        );
        describe_histogram!(
            RESPONSE_METRIC,
            Unit::Seconds,
            "Time to answer a cache request, by the tier that answered it."
        );
        describe_counter!(
            REQUESTS_METRIC,
            Unit::Count,
            "Cache requests by namespace and outcome (hit or miss)."
        );
        describe_counter!(
            WRITES_METRIC,
            Unit::Count,
            "Cache mutations by namespace and operation (set, delete or clear)."
        );
    });
}

/// Counters of one namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub clears: u64,
}

impl NamespaceStats {
    /// Hit rate as a percentage; 0 without requests
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// Totals across every namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Logical requests (`L1` hits plus misses)
    pub requests: u64,
    pub sets: u64,
    pub deletes: u64,
    pub clears: u64,
    /// Backend failures
    pub errors: u64,
}

impl GlobalStats {
    /// Backend failures per logical request, as a percentage
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.requests as f64 * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct NamespaceCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    clears: AtomicU64,
}

impl NamespaceCounters {
    fn snapshot(&self) -> NamespaceStats {
        NamespaceStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    samples: Mutex<VecDeque<Duration>>,
}

impl TierCounters {
    fn push_sample(&self, elapsed: Duration, window: usize) {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if samples.len() == window {
            samples.pop_front();
        }
        samples.push_back(elapsed);
    }

    fn average_micros(&self) -> u64 {
        let samples = self
            .samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if samples.is_empty() {
            return 0;
        }
        let total: u128 = samples.iter().map(Duration::as_micros).sum();
        (total / samples.len() as u128) as u64
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

/// Per-tier counters and latency windows, plus per-namespace counters
#[derive(Debug)]
pub struct MetricsCollector {
    tiers: [TierCounters; 4],
    negative_hits: AtomicU64,
    namespaces: RwLock<HashMap<String, Arc<NamespaceCounters>>>,
    sets: AtomicU64,
    deletes: AtomicU64,
    clears: AtomicU64,
    sample_window: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_sample_window(DEFAULT_SAMPLE_WINDOW)
    }

    pub fn with_sample_window(window: usize) -> Self {
        describe_metrics();
        Self {
            tiers: Default::default(),
            negative_hits: AtomicU64::new(0),
            namespaces: RwLock::new(HashMap::new()),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            clears: AtomicU64::new(0),
            sample_window: window.max(1),
        }
    }

    fn tier(&self, tier: CacheTier) -> &TierCounters {
        &self.tiers[tier.index()]
    }

    fn namespace(&self, namespace: &str) -> Arc<NamespaceCounters> {
        let existing = self
            .namespaces
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(namespace)
            .cloned();
        if let Some(counters) = existing {
            return counters;
        }

        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(namespaces.entry(namespace.to_string()).or_default())
    }

    /// Count a request of `namespace` answered by either cache tier
    pub fn record_namespace_hit(&self, namespace: &str) {
        self.namespace(namespace).hits.fetch_add(1, Ordering::Relaxed);
        counter!(REQUESTS_METRIC, "namespace" => namespace.to_string(), "outcome" => "hit")
            .increment(1);
    }

    /// Count a request of `namespace` that no cache tier answered
    pub fn record_namespace_miss(&self, namespace: &str) {
        self.namespace(namespace).misses.fetch_add(1, Ordering::Relaxed);
        counter!(REQUESTS_METRIC, "namespace" => namespace.to_string(), "outcome" => "miss")
            .increment(1);
    }

    pub fn record_set(&self, namespace: &str) {
        self.namespace(namespace).sets.fetch_add(1, Ordering::Relaxed);
        self.sets.fetch_add(1, Ordering::Relaxed);
        counter!(WRITES_METRIC, "namespace" => namespace.to_string(), "op" => "set").increment(1);
    }

    pub fn record_delete(&self, namespace: &str) {
        self.namespace(namespace).deletes.fetch_add(1, Ordering::Relaxed);
        self.deletes.fetch_add(1, Ordering::Relaxed);
        counter!(WRITES_METRIC, "namespace" => namespace.to_string(), "op" => "delete")
            .increment(1);
    }

    pub fn record_clear(&self, namespace: &str) {
        self.namespace(namespace).clears.fetch_add(1, Ordering::Relaxed);
        self.clears.fetch_add(1, Ordering::Relaxed);
        counter!(WRITES_METRIC, "namespace" => namespace.to_string(), "op" => "clear")
            .increment(1);
    }

    /// Counters of one namespace; `None` until it has seen traffic
    pub fn namespace_stats(&self, namespace: &str) -> Option<NamespaceStats> {
        self.namespaces
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(namespace)
            .map(|counters| counters.snapshot())
    }

    /// Counters of every namespace that has seen traffic, sorted by name
    pub fn all_namespace_stats(&self) -> Vec<(String, NamespaceStats)> {
        let mut all: Vec<_> = self
            .namespaces
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(name, counters)| (name.clone(), counters.snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn global_stats(&self) -> GlobalStats {
        GlobalStats {
            requests: self.hits(CacheTier::L1) + self.misses(CacheTier::L1),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            errors: self.misses(CacheTier::Error),
        }
    }

    pub fn record_hit(&self, tier: CacheTier, elapsed: Duration) {
        let counters = self.tier(tier);
        counters.hits.fetch_add(1, Ordering::Relaxed);
        counters.push_sample(elapsed, self.sample_window);

        counter!(HITS_METRIC, "tier" => tier.label()).increment(1);
        histogram!(RESPONSE_METRIC, "tier" => tier.label()).record(elapsed.as_secs_f64());
    }

    pub fn record_miss(&self, tier: CacheTier, elapsed: Duration) {
        let counters = self.tier(tier);
        counters.misses.fetch_add(1, Ordering::Relaxed);
        counters.push_sample(elapsed, self.sample_window);

        counter!(MISSES_METRIC, "tier" => tier.label()).increment(1);
        histogram!(RESPONSE_METRIC, "tier" => tier.label()).record(elapsed.as_secs_f64());
    }

    /// Count a backend failure on the `error` tier
    pub fn record_error(&self, elapsed: Duration) {
        self.record_miss(CacheTier::Error, elapsed);
    }

    /// Count a read answered by the negative marker
    pub fn record_negative_hit(&self) {
        self.negative_hits.fetch_add(1, Ordering::Relaxed);
        counter!(NEGATIVE_HITS_METRIC).increment(1);
    }

    pub fn hits(&self, tier: CacheTier) -> u64 {
        self.tier(tier).hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self, tier: CacheTier) -> u64 {
        self.tier(tier).misses.load(Ordering::Relaxed)
    }

    pub fn negative_hits(&self) -> u64 {
        self.negative_hits.load(Ordering::Relaxed)
    }

    /// Hit rate of one tier as a percentage; 0 without samples
    pub fn hit_rate(&self, tier: CacheTier) -> f64 {
        let hits = self.hits(tier);
        let total = hits + self.misses(tier);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        }
    }

    /// Share of logical requests answered by either cache tier, as a percentage
    pub fn overall_hit_rate(&self) -> f64 {
        let requests = self.hits(CacheTier::L1) + self.misses(CacheTier::L1);
        if requests == 0 {
            return 0.0;
        }
        let answered = self.hits(CacheTier::L1) + self.hits(CacheTier::L2);
        answered as f64 / requests as f64 * 100.0
    }

    /// Hit/miss/latency snapshot of one tier; size and evictions are filled
    /// in by the owner of the tier
    pub fn stats(&self, tier: CacheTier) -> CacheStats {
        let counters = self.tier(tier);
        CacheStats {
            hits: self.hits(tier),
            misses: self.misses(tier),
            evictions: 0,
            estimated_size: 0,
            avg_response_micros: counters.average_micros(),
        }
    }

    pub fn reset(&self, tier: CacheTier) {
        self.tier(tier).reset();
    }

    pub fn reset_all(&self) {
        for tier in CacheTier::ALL {
            self.reset(tier);
        }
        self.negative_hits.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.clears.store(0, Ordering::Relaxed);
        self.namespaces
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
