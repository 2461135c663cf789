//! Cache entry management with TTL support

use crate::cache::types::{CacheKey, CacheTier, CacheValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A process-local cache entry with a fixed expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The fully-qualified cache key
    pub key: CacheKey,

    /// The cached value
    pub value: CacheValue,

    /// When the entry was written
    pub created_at: DateTime<Utc>,

    /// When the entry expires; never refreshed by reads
    pub expires_at: DateTime<Utc>,

    /// Number of times this entry has been read
    pub access_count: u64,
}

impl CacheEntry {
    /// Create a new entry expiring `ttl` after now
    pub fn new(key: CacheKey, value: CacheValue, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(300));

        Self {
            key,
            value,
            created_at: now,
            expires_at,
            access_count: 0,
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Get time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now();
        if now >= self.expires_at {
            None
        } else {
            (self.expires_at - now).to_std().ok()
        }
    }

    /// Record a read
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Approximate footprint in bytes
    pub fn calculate_size(&self) -> usize {
        self.key.len() + self.value.len() + std::mem::size_of::<Self>()
    }
}

/// Administrative view of where a key currently lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryInfo {
    /// The fully-qualified cache key
    pub key: CacheKey,

    /// Tiers currently holding the key
    pub tiers: Vec<CacheTier>,

    /// Whether the distributed tier holds the negative marker
    pub negative: bool,

    /// Remaining process-local lifetime
    pub local_ttl: Option<Duration>,

    /// Remaining distributed lifetime; `None` when absent or persistent
    pub distributed_ttl: Option<Duration>,
}

impl CacheEntryInfo {
    /// Whether any tier holds the key
    pub fn is_cached(&self) -> bool {
        !self.tiers.is_empty()
    }

    /// Whether the given tier holds the key
    pub fn held_by(&self, tier: CacheTier) -> bool {
        self.tiers.contains(&tier)
    }
}
