//! Distributed tier access guarded by the circuit breaker

use crate::backend::{CircuitBreaker, DistributedStore};
use crate::cache::types::{CacheKey, CacheValue};
use crate::error::{CacheError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A [`DistributedStore`] plus the breaker that decides whether to call it
///
/// Only connectivity failures count towards the breaker. While it is open,
/// every call fails fast with [`CacheError::BackendUnavailable`].
pub struct DistributedTier {
    store: Arc<dyn DistributedStore>,
    breaker: CircuitBreaker,
}

impl DistributedTier {
    pub fn new(store: Arc<dyn DistributedStore>, breaker: CircuitBreaker) -> Self {
        Self { store, breaker }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if !self.breaker.allow() {
            return Err(CacheError::BackendUnavailable(format!(
                "{} circuit open",
                self.store.name()
            )));
        }

        let result = call.await;
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) if e.is_unavailable() => self.breaker.record_failure(),
            Err(_) => {}
        }
        result
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.guarded(self.store.get(key)).await
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.guarded(self.store.set(key, value, ttl)).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.guarded(self.store.delete(key)).await
    }

    pub async fn delete_many(&self, keys: &[CacheKey]) -> Result<u64> {
        self.guarded(self.store.delete_many(keys)).await
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<CacheKey>> {
        self.guarded(self.store.keys(pattern)).await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.guarded(self.store.ttl(key)).await
    }

    /// Round trip that ignores an open breaker, so health checks can observe
    /// recovery before the window elapses
    pub async fn ping(&self) -> Result<()> {
        let result = self.store.ping().await;
        match &result {
            Ok(()) => self.breaker.record_success(),
            Err(e) if e.is_unavailable() => self.breaker.record_failure(),
            Err(_) => {}
        }
        result
    }
}
