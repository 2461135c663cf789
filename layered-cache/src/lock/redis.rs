//! Redis lock provider
//!
//! Acquire is `SET key token NX PX lease`, polled until the wait runs out.
//! Release is a compare-and-delete script so a holder whose lease already
//! expired cannot remove a lock that now belongs to someone else.

use crate::backend::redis::{bounded, connect_manager};
use crate::error::Result;
use crate::lock::{DistributedMutex, Lease};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Delay between acquisition attempts while the lock is held elsewhere
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Clone)]
pub struct RedisMutex {
    conn: ConnectionManager,
    release_script: redis::Script,
    poll_interval: Duration,
    command_timeout: Duration,
}

impl RedisMutex {
    /// Connect to the lock endpoint
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        let conn = connect_manager(url, connect_timeout).await?;
        info!("Redis lock provider connected to {}", url);

        Ok(Self {
            conn,
            release_script: redis::Script::new(RELEASE_SCRIPT),
            poll_interval: DEFAULT_POLL_INTERVAL,
            command_timeout: Duration::from_secs(2),
        })
    }

    /// Override the delay between acquisition attempts
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn set_nx(&self, lease: &Lease) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = bounded(
            self.command_timeout,
            redis::cmd("SET")
                .arg(&lease.key)
                .arg(&lease.token)
                .arg("NX")
                .arg("PX")
                .arg((lease.duration.as_millis() as u64).max(1))
                .query_async(&mut conn),
        )
        .await?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl DistributedMutex for RedisMutex {
    async fn try_acquire(&self, key: &str, wait: Duration, lease: Duration) -> Result<Option<Lease>> {
        let lease = Lease::new(key, lease);
        let deadline = Instant::now() + wait;

        loop {
            if self.set_nx(&lease).await? {
                debug!("Acquired lock {}", key);
                return Ok(Some(lease));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = self.release_script.key(&lease.key);
        invocation.arg(&lease.token);

        let deleted: i64 = bounded(self.command_timeout, invocation.invoke_async(&mut conn)).await?;
        Ok(deleted == 1)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
