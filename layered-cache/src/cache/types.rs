//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type - fully-qualified `prefix:businessKey[:version]`
pub type CacheKey = String;

/// Cache value type - JSON-serialized payload as stored in both tiers
pub type CacheValue = String;

/// Sentinel stored in the distributed tier in place of an absent loader result.
///
/// It is not valid JSON, so no serialized value can ever be equal to it.
pub const NEGATIVE_MARKER: &str = "<<layered-cache:absent>>";

/// Whether a raw stored value is the negative marker
pub fn is_negative_marker(raw: &str) -> bool {
    raw == NEGATIVE_MARKER
}

/// Tier label used for metrics and statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    /// Process-local tier
    L1,

    /// Distributed tier
    L2,

    /// Loads from the system of record
    SourceLoad,

    /// Backend failures
    Error,
}

impl CacheTier {
    /// All tiers in resolution order
    pub const ALL: [CacheTier; 4] = [
        CacheTier::L1,
        CacheTier::L2,
        CacheTier::SourceLoad,
        CacheTier::Error,
    ];

    /// Stable label used as the `tier` metric tag
    pub fn label(&self) -> &'static str {
        match self {
            CacheTier::L1 => "L1",
            CacheTier::L2 => "L2",
            CacheTier::SourceLoad => "source-load",
            CacheTier::Error => "error",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            CacheTier::L1 => 0,
            CacheTier::L2 => 1,
            CacheTier::SourceLoad => 2,
            CacheTier::Error => 3,
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Statistics for one tier
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Total number of hits
    pub hits: u64,

    /// Total number of misses
    pub misses: u64,

    /// Number of evictions due to capacity or expiry
    pub evictions: u64,

    /// Number of entries currently held (0 when the tier cannot tell)
    pub estimated_size: usize,

    /// Mean of the retained response-time samples, in microseconds
    pub avg_response_micros: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            100.0 - self.hit_rate()
        }
    }

    /// Total requests seen by the tier
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, size: {}, evictions: {}, avg: {}us }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.estimated_size,
            self.evictions,
            self.avg_response_micros
        )
    }
}

/// Outcome of a get or set
///
/// `success` with empty `data` is a deliberate negative result (the key is
/// known to be absent); a failure means the state is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> CacheResult<T> {
    /// Successful result carrying a value
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Successful result without a value
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Failed result
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Borrow the value, if any
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Take the value, dropping the outcome details
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.miss_rate(), 20.0);
        assert_eq!(stats.requests(), 100);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 0.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            hits: 100,
            misses: 50,
            evictions: 10,
            estimated_size: 75,
            avg_response_micros: 12,
        };

        let display = format!("{}", stats);
        assert!(display.contains("hits: 100"));
        assert!(display.contains("misses: 50"));
        assert!(display.contains("66.67%"));
    }

    #[test]
    fn test_tier_labels() {
        assert_eq!(CacheTier::L1.to_string(), "L1");
        assert_eq!(CacheTier::L2.to_string(), "L2");
        assert_eq!(CacheTier::SourceLoad.to_string(), "source-load");
        assert_eq!(CacheTier::Error.to_string(), "error");
    }

    #[test]
    fn test_negative_marker_never_parses_as_json() {
        assert!(serde_json::from_str::<serde_json::Value>(NEGATIVE_MARKER).is_err());
        assert!(is_negative_marker(NEGATIVE_MARKER));

        let serialized = serde_json::to_string(NEGATIVE_MARKER).unwrap();
        assert!(!is_negative_marker(&serialized));
    }

    #[test]
    fn test_cache_result_variants() {
        let hit = CacheResult::ok("Alice".to_string());
        assert!(hit.is_success());
        assert_eq!(hit.data().map(String::as_str), Some("Alice"));

        let absent: CacheResult<String> = CacheResult::empty();
        assert!(absent.is_success());
        assert!(absent.data().is_none());

        let failed: CacheResult<String> = CacheResult::failure("miss");
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("miss"));
    }
}
