//! Distributed mutual exclusion keyed by string
//!
//! Used to make sure at most one process reloads a given key at a time. A
//! lock is held under a [`Lease`]: it expires on its own after the lease
//! duration even if the holder dies, and only the holder's token can
//! release it early.

pub mod memory;
pub mod redis;

pub use memory::MemoryMutex;
pub use self::redis::RedisMutex;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Proof of holding a lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Lock key as stored by the provider
    pub key: String,

    /// Owner token; release only succeeds with a matching token
    pub token: String,

    /// How long the lock lives without an explicit release
    pub duration: Duration,
}

impl Lease {
    pub(crate) fn new(key: &str, duration: Duration) -> Self {
        Self {
            key: key.to_string(),
            token: Uuid::new_v4().to_string(),
            duration,
        }
    }
}

/// Lock provider shared by every process
#[async_trait]
pub trait DistributedMutex: Send + Sync {
    /// Try to take `key`, waiting at most `wait`
    ///
    /// Returns `Ok(None)` when the lock is still held by someone else after
    /// the wait, and `Err` when the provider cannot be reached.
    async fn try_acquire(&self, key: &str, wait: Duration, lease: Duration) -> Result<Option<Lease>>;

    /// Release a lease; returns `false` if it had already expired or was
    /// taken over by another holder
    async fn release(&self, lease: &Lease) -> Result<bool>;

    /// Get the provider name
    fn name(&self) -> &'static str;
}

/// Releases its lease when dropped
///
/// Call [`LeaseGuard::release`] to release eagerly and observe the outcome.
/// A guard dropped without that (for example on an early `?` return) hands
/// the release to the current tokio runtime; outside a runtime the lease is
/// left to expire.
pub struct LeaseGuard {
    mutex: Arc<dyn DistributedMutex>,
    lease: Option<Lease>,
}

impl LeaseGuard {
    /// Acquire `key` and wrap the lease in a guard
    pub async fn acquire(
        mutex: Arc<dyn DistributedMutex>,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<Option<Self>> {
        let lease = mutex.try_acquire(key, wait, lease).await?;
        Ok(lease.map(|lease| Self {
            mutex,
            lease: Some(lease),
        }))
    }

    pub fn key(&self) -> &str {
        self.lease.as_ref().map_or("", |lease| lease.key.as_str())
    }

    /// Release now
    pub async fn release(mut self) -> bool {
        let Some(lease) = self.lease.take() else {
            return false;
        };
        match self.mutex.release(&lease).await {
            Ok(released) => {
                if !released {
                    debug!("Lease on {} had already expired", lease.key);
                }
                released
            }
            Err(e) => {
                warn!("Failed to release lock {}: {}", lease.key, e);
                false
            }
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let mutex = Arc::clone(&self.mutex);
                handle.spawn(async move {
                    if let Err(e) = mutex.release(&lease).await {
                        warn!("Failed to release lock {}: {}", lease.key, e);
                    }
                });
            }
            Err(_) => debug!("No runtime to release {}; lease will expire", lease.key),
        }
    }
}
