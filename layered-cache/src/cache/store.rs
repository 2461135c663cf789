//! Process-local tier: bounded LRU store with fixed expire-after-write

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    invalidation::InvalidationReason,
    types::{CacheKey, CacheStats, CacheValue},
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tier 1 of the cache
///
/// This implementation provides:
/// - Thread-safe async access via RwLock
/// - Fixed expiry after write (reads never extend it)
/// - LRU eviction when the entry bound is reached
/// - Hit/miss/eviction counters
///
/// Nothing here is visible to other processes.
pub struct LocalStore {
    max_entries: usize,
    expire_after_write: Duration,
    store: Arc<RwLock<StoreInner>>,
}

/// Internal cache storage
struct StoreInner {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry>,

    /// LRU tracking: front is least recently used
    lru_queue: VecDeque<CacheKey>,

    hits: u64,
    misses: u64,
    evictions: u64,
}

impl StoreInner {
    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }

    fn remove_entry(&mut self, key: &str, reason: InvalidationReason) -> bool {
        if self.entries.remove(key).is_some() {
            self.lru_queue.retain(|k| k != key);
            debug!(key, %reason, "Removed local entry");
            true
        } else {
            false
        }
    }
}

impl LocalStore {
    /// Create a new local store
    pub fn new(max_entries: usize, expire_after_write: Duration) -> Self {
        info!(
            max_entries,
            expire_after_write_ms = expire_after_write.as_millis() as u64,
            "Initializing local cache tier"
        );

        let inner = StoreInner {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            hits: 0,
            misses: 0,
            evictions: 0,
        };

        Self {
            max_entries: max_entries.max(1),
            expire_after_write,
            store: Arc::new(RwLock::new(inner)),
        }
    }

    /// Create a local store sized by the cache configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.local_max_entries, config.local_expire_after_write)
    }

    /// Configured expire-after-write
    pub fn expire_after_write(&self) -> Duration {
        self.expire_after_write
    }

    /// Get a value if present and not expired
    pub async fn get_if_present(&self, key: &str) -> Option<CacheValue> {
        let mut store = self.store.write().await;

        match store.entries.get(key).map(CacheEntry::is_expired) {
            None => {
                store.misses += 1;
                return None;
            }
            Some(true) => {
                debug!(key, "Local entry expired");
                store.misses += 1;
                store.evictions += 1;
                store.remove_entry(key, InvalidationReason::Expired);
                return None;
            }
            Some(false) => {}
        }

        let value = match store.entries.get_mut(key) {
            Some(entry) => {
                entry.mark_accessed();
                entry.value.clone()
            }
            None => return None,
        };
        store.hits += 1;
        store.touch(key);

        Some(value)
    }

    /// Remaining lifetime of a key without touching statistics
    pub async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let store = self.store.read().await;
        store.entries.get(key).and_then(|e| e.time_until_expiration())
    }

    /// Insert or overwrite using the configured expire-after-write
    pub async fn put(&self, key: CacheKey, value: CacheValue) {
        self.put_with_ttl(key, value, self.expire_after_write).await
    }

    /// Insert or overwrite with a lifetime no longer than expire-after-write
    pub async fn put_with_ttl(&self, key: CacheKey, value: CacheValue, ttl: Duration) {
        let ttl = ttl.min(self.expire_after_write);
        let entry = CacheEntry::new(key.clone(), value, ttl);

        let mut store = self.store.write().await;

        if store.entries.contains_key(&key) {
            debug!(key = %key, "Updating local entry");
            store.entries.insert(key.clone(), entry);
            store.touch(&key);
            return;
        }

        self.evict_if_needed(&mut store);

        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Inserting local entry");
        store.entries.insert(key.clone(), entry);
        store.lru_queue.push_back(key);
    }

    /// Remove a single entry; returns whether it was present
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut store = self.store.write().await;
        store.remove_entry(key, InvalidationReason::Manual)
    }

    /// Remove all entries
    pub async fn invalidate_all(&self) -> usize {
        let mut store = self.store.write().await;
        let count = store.entries.len();
        store.entries.clear();
        store.lru_queue.clear();
        info!("Cleared {} local entries", count);
        count
    }

    /// Remove every entry whose key starts with `prefix`
    ///
    /// There is no prefix index, so this is a full scan.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut store = self.store.write().await;

        let keys: Vec<CacheKey> = store
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();

        for key in &keys {
            store.remove_entry(key, InvalidationReason::Namespace);
        }

        debug!(prefix, removed = keys.len(), "Swept local entries by prefix");
        keys.len()
    }

    /// Remove all expired entries
    pub async fn cleanup_expired(&self) -> usize {
        let mut store = self.store.write().await;

        let expired: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            store.remove_entry(key, InvalidationReason::Expired);
        }
        store.evictions += expired.len() as u64;

        if !expired.is_empty() {
            debug!("Cleaned up {} expired local entries", expired.len());
        }
        expired.len()
    }

    /// Check presence without touching statistics or recency
    pub async fn contains_key(&self, key: &str) -> bool {
        let store = self.store.read().await;
        store.entries.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Snapshot of hit/miss/eviction counters and current size
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.read().await;
        CacheStats {
            hits: store.hits,
            misses: store.misses,
            evictions: store.evictions,
            estimated_size: store.entries.len(),
            avg_response_micros: 0,
        }
    }

    /// Number of entries, expired ones included until swept
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.entries.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        let store = self.store.read().await;
        store.entries.is_empty()
    }

    /// Approximate memory held by entries
    pub async fn size_bytes(&self) -> usize {
        let store = self.store.read().await;
        store.entries.values().map(CacheEntry::calculate_size).sum()
    }

    /// Internal: make room for one more entry
    fn evict_if_needed(&self, store: &mut StoreInner) {
        while store.entries.len() >= self.max_entries {
            match store.lru_queue.pop_front() {
                Some(key) => {
                    if store.entries.remove(&key).is_some() {
                        debug!(key = %key, reason = %InvalidationReason::Capacity, "Evicting local entry");
                        store.evictions += 1;
                    }
                }
                None => {
                    warn!("LRU queue empty while local tier is over capacity");
                    break;
                }
            }
        }
    }
}

/// Background task sweeping expired local entries
pub fn start_auto_cleanup(store: Arc<LocalStore>, interval: Duration) -> JoinHandle<()> {
    info!("Starting local cache cleanup task (interval: {:?})", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.cleanup_expired().await;
            if removed > 0 {
                debug!("Auto cleanup removed {} entries", removed);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_put_and_get() {
        let store = LocalStore::new(100, Duration::from_secs(60));

        store.put("user:1".to_string(), "\"Alice\"".to_string()).await;

        let value = store.get_if_present("user:1").await;
        assert_eq!(value, Some("\"Alice\"".to_string()));

        let stats = store.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.estimated_size, 1);
    }

    #[tokio::test]
    async fn test_miss() {
        let store = LocalStore::new(100, Duration::from_secs(60));

        assert_eq!(store.get_if_present("nonexistent").await, None);

        let stats = store.stats().await;
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expire_after_write() {
        let store = LocalStore::new(100, Duration::from_millis(100));

        store.put("key1".to_string(), "value1".to_string()).await;
        assert!(store.get_if_present("key1").await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(store.get_if_present("key1").await.is_none());
        let stats = store.stats().await;
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.estimated_size, 0);
    }

    #[tokio::test]
    async fn test_ttl_is_clamped_to_expire_after_write() {
        let store = LocalStore::new(100, Duration::from_secs(5));

        store
            .put_with_ttl("k".to_string(), "v".to_string(), Duration::from_secs(3600))
            .await;

        let ttl = store.remaining_ttl("k").await.unwrap();
        assert!(ttl <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let store = LocalStore::new(3, Duration::from_secs(60));

        store.put("key1".to_string(), "value1".to_string()).await;
        store.put("key2".to_string(), "value2".to_string()).await;
        store.put("key3".to_string(), "value3".to_string()).await;

        // key1 becomes most recently used
        store.get_if_present("key1").await;

        store.put("key4".to_string(), "value4".to_string()).await;

        assert!(store.get_if_present("key2").await.is_none());
        assert!(store.get_if_present("key1").await.is_some());
        assert!(store.get_if_present("key3").await.is_some());
        assert!(store.get_if_present("key4").await.is_some());

        let stats = store.stats().await;
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.estimated_size, 3);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let store = LocalStore::new(2, Duration::from_secs(60));

        store.put("a".to_string(), "1".to_string()).await;
        store.put("b".to_string(), "2".to_string()).await;
        store.put("a".to_string(), "3".to_string()).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get_if_present("a").await, Some("3".to_string()));
        assert_eq!(store.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let store = LocalStore::new(10, Duration::from_secs(60));

        store.put("key1".to_string(), "value1".to_string()).await;

        assert!(store.invalidate("key1").await);
        assert!(!store.invalidate("key1").await);
        assert!(store.get_if_present("key1").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_prefix() {
        let store = LocalStore::new(10, Duration::from_secs(60));

        store.put("a:1".to_string(), "1".to_string()).await;
        store.put("a:2".to_string(), "2".to_string()).await;
        store.put("ab:1".to_string(), "3".to_string()).await;
        store.put("b:1".to_string(), "4".to_string()).await;

        assert_eq!(store.invalidate_prefix("a:").await, 2);
        assert!(store.contains_key("ab:1").await);
        assert!(store.contains_key("b:1").await);
        assert!(!store.contains_key("a:1").await);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let store = LocalStore::new(10, Duration::from_secs(60));

        store.put("key1".to_string(), "value1".to_string()).await;
        store.put("key2".to_string(), "value2".to_string()).await;

        assert_eq!(store.invalidate_all().await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = LocalStore::new(10, Duration::from_millis(50));

        store.put("key1".to_string(), "value1".to_string()).await;
        store.put("key2".to_string(), "value2".to_string()).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.cleanup_expired().await, 2);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_auto_cleanup_task() {
        let store = Arc::new(LocalStore::new(10, Duration::from_millis(30)));
        store.put("key1".to_string(), "value1".to_string()).await;

        let handle = start_auto_cleanup(store.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();

        assert!(store.is_empty().await);
    }
}
