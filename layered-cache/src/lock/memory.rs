//! In-process lock provider

use crate::error::{CacheError, Result};
use crate::lock::{DistributedMutex, Lease};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Upper bound on a single wait, so expired leases are noticed promptly
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct Held {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    locks: Mutex<HashMap<String, Held>>,
    released: Notify,
    unavailable: AtomicBool,
    acquisitions: AtomicU64,
}

/// Lock provider for a single process or for tests
///
/// Clones share the same lock table.
#[derive(Debug, Clone, Default)]
pub struct MemoryMutex {
    inner: Arc<Inner>,
}

impl MemoryMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the provider going away (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Successful acquisitions so far
    pub fn acquisitions(&self) -> u64 {
        self.inner.acquisitions.load(Ordering::Relaxed)
    }

    /// Whether `key` is held by an unexpired lease
    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.locks()
            .get(key)
            .map_or(false, |held| held.expires_at > now)
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Held>> {
        self.inner
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::BackendUnavailable(
                "lock provider marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    /// Take the lock if free; otherwise report when the current lease ends
    fn try_take(&self, key: &str, lease: &Lease) -> std::result::Result<(), Instant> {
        let now = Instant::now();
        let mut locks = self.locks();
        match locks.get(key) {
            Some(held) if held.expires_at > now => Err(held.expires_at),
            _ => {
                locks.insert(
                    key.to_string(),
                    Held {
                        token: lease.token.clone(),
                        expires_at: now + lease.duration,
                    },
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl DistributedMutex for MemoryMutex {
    async fn try_acquire(&self, key: &str, wait: Duration, lease: Duration) -> Result<Option<Lease>> {
        self.check_available()?;

        let lease = Lease::new(key, lease);
        let deadline = Instant::now() + wait;

        loop {
            // Register before checking so a release in between is not missed
            let notified = self.inner.released.notified();

            let held_until = match self.try_take(key, &lease) {
                Ok(()) => {
                    self.inner.acquisitions.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(lease));
                }
                Err(until) => until,
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let nap = deadline
                .min(held_until)
                .saturating_duration_since(now)
                .min(POLL_INTERVAL);
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool> {
        self.check_available()?;

        let released = {
            let mut locks = self.locks();
            match locks.get(&lease.key) {
                Some(held) if held.token == lease.token => {
                    locks.remove(&lease.key);
                    true
                }
                _ => false,
            }
        };

        if released {
            self.inner.released.notify_waiters();
        }
        Ok(released)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let mutex = MemoryMutex::new();

        let first = mutex
            .try_acquire("k", Duration::from_millis(10), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = mutex
            .try_acquire("k", Duration::from_millis(50), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(second.is_none());

        // Different keys do not contend
        let other = mutex
            .try_acquire("other", Duration::from_millis(10), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let mutex = MemoryMutex::new();
        let lease = mutex
            .try_acquire("k", Duration::from_millis(10), Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        let contender = mutex.clone();
        let waiter = tokio::spawn(async move {
            contender
                .try_acquire("k", Duration::from_secs(2), Duration::from_secs(5))
                .await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(mutex.release(&lease).await.unwrap());

        let acquired = waiter.await.unwrap().unwrap();
        assert!(acquired.is_some());
        assert_eq!(mutex.acquisitions(), 2);
    }

    #[tokio::test]
    async fn test_lease_expires() {
        let mutex = MemoryMutex::new();
        let stale = mutex
            .try_acquire("k", Duration::from_millis(10), Duration::from_millis(40))
            .await
            .unwrap()
            .unwrap();

        let fresh = mutex
            .try_acquire("k", Duration::from_millis(500), Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stale.token, fresh.token);

        // The expired holder cannot release the new holder's lock
        assert!(!mutex.release(&stale).await.unwrap());
        assert!(mutex.is_locked("k"));
        assert!(mutex.release(&fresh).await.unwrap());
        assert!(!mutex.is_locked("k"));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let mutex = MemoryMutex::new();
        mutex.set_available(false);
        let err = mutex
            .try_acquire("k", Duration::from_millis(10), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
