//! Cache invalidation
//!
//! Reasons attached to removals for logging, and the background worker that
//! carries out the delayed half of a double delete.
//!
//! A double delete removes the key now and once more after a delay. The
//! second removal catches a value re-populated from a stale replica between
//! the write to the system of record and the first delete.

use crate::cache::store::LocalStore;
use crate::cache::tier::DistributedTier;
use crate::cache::types::CacheKey;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Reason for cache invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Entry expired based on TTL
    Expired,

    /// Manual invalidation by key
    Manual,

    /// Evicted to stay within the entry bound
    Capacity,

    /// Whole namespace cleared
    Namespace,

    /// Delayed second delete
    DoubleDelete,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "TTL expired"),
            InvalidationReason::Manual => write!(f, "manual invalidation"),
            InvalidationReason::Capacity => write!(f, "LRU eviction"),
            InvalidationReason::Namespace => write!(f, "namespace cleared"),
            InvalidationReason::DoubleDelete => write!(f, "delayed double delete"),
        }
    }
}

#[derive(Debug)]
struct DelayedDelete {
    key: CacheKey,
    delay: Duration,
}

struct Running {
    sender: mpsc::UnboundedSender<DelayedDelete>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    completed: AtomicU64,
}

/// Background executor for delayed deletes
///
/// The worker task is spawned on first use, so the owner can be built
/// outside a runtime. Jobs run concurrently; each sleeps for its own delay.
pub struct InvalidationWorker {
    local: Arc<LocalStore>,
    distributed: Option<Arc<DistributedTier>>,
    state: Mutex<WorkerState>,
    counters: Arc<Counters>,
}

enum WorkerState {
    Idle,
    Running(Running),
    Stopped,
}

impl InvalidationWorker {
    pub fn new(local: Arc<LocalStore>, distributed: Option<Arc<DistributedTier>>) -> Self {
        Self {
            local,
            distributed,
            state: Mutex::new(WorkerState::Idle),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queue a removal of `key` from both tiers after `delay`
    ///
    /// Returns `false` once the worker has been shut down. Must be called
    /// from within a tokio runtime.
    pub fn schedule(&self, key: CacheKey, delay: Duration) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if matches!(*state, WorkerState::Idle) {
            *state = WorkerState::Running(self.start());
        }

        match &*state {
            WorkerState::Running(running) => {
                let job = DelayedDelete { key, delay };
                match running.sender.send(job) {
                    Ok(()) => {
                        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
                        true
                    }
                    Err(mpsc::error::SendError(job)) => {
                        warn!("Invalidation worker gone, dropping delayed delete of {}", job.key);
                        false
                    }
                }
            }
            _ => {
                warn!("Invalidation worker stopped, dropping delayed delete of {}", key);
                false
            }
        }
    }

    /// Delayed deletes accepted so far
    pub fn scheduled(&self) -> u64 {
        self.counters.scheduled.load(Ordering::Relaxed)
    }

    /// Delayed deletes carried out so far
    pub fn completed(&self) -> u64 {
        self.counters.completed.load(Ordering::Relaxed)
    }

    /// Stop accepting work and wait for queued deletes to finish
    pub async fn shutdown(&self) {
        let previous = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *state, WorkerState::Stopped)
        };

        if let WorkerState::Running(Running { sender, handle }) = previous {
            drop(sender);
            if let Err(e) = handle.await {
                warn!("Invalidation worker ended abnormally: {}", e);
            }
            info!(
                "Invalidation worker stopped after {} delayed deletes",
                self.completed()
            );
        }
    }

    fn start(&self) -> Running {
        let (sender, mut receiver) = mpsc::unbounded_channel::<DelayedDelete>();
        let local = Arc::clone(&self.local);
        let distributed = self.distributed.clone();
        let counters = Arc::clone(&self.counters);

        let handle = tokio::spawn(async move {
            let mut pending = JoinSet::new();

            loop {
                tokio::select! {
                    job = receiver.recv() => match job {
                        Some(job) => {
                            pending.spawn(run_delayed_delete(
                                job,
                                Arc::clone(&local),
                                distributed.clone(),
                                Arc::clone(&counters),
                            ));
                        }
                        None => break,
                    },
                    Some(joined) = pending.join_next(), if !pending.is_empty() => {
                        if let Err(e) = joined {
                            warn!("Delayed delete task failed: {}", e);
                        }
                    }
                }
            }

            // Sender dropped: drain what is still sleeping
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    warn!("Delayed delete task failed: {}", e);
                }
            }
        });

        debug!("Invalidation worker started");
        Running { sender, handle }
    }
}

async fn run_delayed_delete(
    job: DelayedDelete,
    local: Arc<LocalStore>,
    distributed: Option<Arc<DistributedTier>>,
    counters: Arc<Counters>,
) {
    tokio::time::sleep(job.delay).await;

    if let Some(tier) = distributed {
        if let Err(e) = tier.delete(&job.key).await {
            warn!("Delayed delete of {} from distributed tier failed: {}", job.key, e);
        }
    }
    local.invalidate(&job.key).await;

    counters.completed.fetch_add(1, Ordering::Relaxed);
    debug!(key = %job.key, reason = %InvalidationReason::DoubleDelete, "Delayed delete done");
}
