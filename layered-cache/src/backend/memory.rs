//! In-process distributed store
//!
//! Stands in for the shared tier when running a single process, and in tests.
//! Clones share the same map, so two orchestrators built from clones of one
//! `MemoryStore` behave like two processes talking to one Redis.

use crate::backend::{glob_match, DistributedStore};
use crate::cache::types::{CacheKey, CacheValue};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct StoredValue {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<CacheKey, StoredValue>>,
    default_ttl: Option<Duration>,
    unavailable: AtomicBool,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

/// Shared in-memory key/value store with absolute expiry
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store without a default expiry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose `set_default` writes expire after `ttl`
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                default_ttl: Some(ttl),
                ..Default::default()
            }),
        }
    }

    /// Simulate the backend going away (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of `get` calls served, including failed ones
    pub fn get_calls(&self) -> u64 {
        self.inner.gets.load(Ordering::Relaxed)
    }

    /// Number of writes served
    pub fn set_calls(&self) -> u64 {
        self.inner.sets.load(Ordering::Relaxed)
    }

    /// Number of delete calls served (`delete_many` counts once)
    pub fn delete_calls(&self) -> u64 {
        self.inner.deletes.load(Ordering::Relaxed)
    }

    /// Raw read that bypasses counters and availability, for inspection
    pub fn peek(&self, key: &str) -> Option<CacheValue> {
        let now = Instant::now();
        self.entries()
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.value.clone())
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries().values().filter(|s| s.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, StoredValue>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::BackendUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn write(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.inner.sets.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries().insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    /// Remove a key, reporting whether a live value was present
    fn remove_live(entries: &mut HashMap<CacheKey, StoredValue>, key: &str, now: Instant) -> bool {
        entries
            .remove(key)
            .map_or(false, |stored| stored.is_live(now))
    }
}

#[async_trait]
impl DistributedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.inner.gets.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.write(key, value, Some(ttl))
    }

    async fn set_default(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, value, self.inner.default_ttl)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.deletes.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        let now = Instant::now();
        Ok(Self::remove_live(&mut self.entries(), key, now))
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> Result<u64> {
        self.inner.deletes.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        let now = Instant::now();
        let mut entries = self.entries();
        let removed = keys
            .iter()
            .filter(|key| Self::remove_live(&mut entries, key, now))
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.peek(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;

        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get_mut(key) {
            Some(stored) if stored.is_live(now) => {
                stored.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.check_available()?;

        let now = Instant::now();
        Ok(self
            .entries()
            .get(key)
            .filter(|stored| stored.is_live(now))
            .and_then(|stored| stored.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<CacheKey>> {
        self.check_available()?;

        let now = Instant::now();
        let mut keys: Vec<CacheKey> = self
            .entries()
            .iter()
            .filter(|(key, stored)| stored.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
