//! Circuit breaker in front of the distributed tier
//!
//! After `threshold` consecutive failures the breaker opens and distributed
//! calls are skipped for `recover_after`. The first call after the window is
//! a trial: success closes the breaker, failure reopens it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    recover_after: Duration,
    consecutive_failures: AtomicU32,
    open_until: Mutex<Option<Instant>>,
    trips: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recover_after: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            recover_after,
            consecutive_failures: AtomicU32::new(0),
            open_until: Mutex::new(None),
            trips: AtomicU64::new(0),
        }
    }

    /// Whether a distributed call may proceed now
    pub fn allow(&self) -> bool {
        let mut open_until = self
            .open_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match *open_until {
            None => true,
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                // Half-open: one more failure trips it again
                *open_until = None;
                self.consecutive_failures
                    .store(self.threshold - 1, Ordering::SeqCst);
                info!("Circuit breaker half-open, allowing trial call");
                true
            }
        }
    }

    pub fn record_success(&self) {
        let previous = self.consecutive_failures.swap(0, Ordering::SeqCst);
        if previous > 0 {
            debug!("Distributed tier recovered after {} failures", previous);
        }
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures < self.threshold {
            return;
        }

        let mut open_until = self
            .open_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if open_until.is_none() {
            *open_until = Some(Instant::now() + self.recover_after);
            self.trips.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Circuit breaker opened after {} consecutive failures, retry in {:?}",
                failures, self.recover_after
            );
        }
    }

    /// Whether calls are currently being skipped
    pub fn is_open(&self) -> bool {
        self.open_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .map_or(false, |until| Instant::now() < until)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Number of times the breaker has opened
    pub fn trips(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }
}
