//! Redis-backed distributed store

use crate::backend::DistributedStore;
use crate::cache::types::{CacheKey, CacheValue};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, FromRedisValue};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Keys requested per SCAN round trip
const SCAN_COUNT: usize = 100;

/// Connection settings for [`RedisStore`]
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Endpoint, e.g. `redis://127.0.0.1:6379`
    pub url: String,

    /// Expiry applied by `set_default`; `None` writes persistent keys
    pub default_ttl: Option<Duration>,

    /// Bound on establishing the connection
    pub connect_timeout: Duration,

    /// Bound on any single command
    pub command_timeout: Duration,
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            default_ttl: None,
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(2),
        }
    }
}

/// Distributed store on a single Redis endpoint
///
/// Uses a [`ConnectionManager`], which multiplexes commands over one
/// connection and reconnects in the background after failures.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    default_ttl: Option<Duration>,
    command_timeout: Duration,
}

impl RedisStore {
    /// Connect and verify the endpoint with a PING
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        let conn = connect_manager(&config.url, config.connect_timeout).await?;

        let store = Self {
            conn,
            default_ttl: config.default_ttl,
            command_timeout: config.command_timeout,
        };
        store.ping().await?;

        info!("Redis distributed store connected to {}", config.url);
        Ok(store)
    }

    /// Run a command on a clone of the managed connection, bounded by the
    /// command timeout
    async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.conn.clone();
        bounded(self.command_timeout, cmd.query_async::<_, T>(&mut conn)).await
    }
}

/// Open a managed connection, bounded by `timeout`
pub(crate) async fn connect_manager(url: &str, timeout: Duration) -> Result<ConnectionManager> {
    let client = redis::Client::open(url)?;
    match tokio::time::timeout(timeout, client.get_connection_manager()).await {
        Ok(conn) => Ok(conn?),
        Err(_) => Err(CacheError::BackendUnavailable(format!(
            "connecting to {} timed out after {:?}",
            url, timeout
        ))),
    }
}

/// Await a Redis future, mapping an elapsed timeout to `BackendUnavailable`
pub(crate) async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res.map_err(CacheError::from),
        Err(_) => Err(CacheError::BackendUnavailable(format!(
            "redis command timed out after {:?}",
            timeout
        ))),
    }
}

/// Redis rejects a zero expiry, so sub-millisecond TTLs round up
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl DistributedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let mut conn = self.conn.clone();
        bounded(self.command_timeout, conn.get::<_, Option<String>>(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.query::<()>(
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ttl_millis(ttl)),
        )
        .await
    }

    async fn set_default(&self, key: &str, value: &str) -> Result<()> {
        match self.default_ttl {
            Some(ttl) => self.set(key, value, ttl).await,
            None => self.query::<()>(redis::cmd("SET").arg(key).arg(value)).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = bounded(self.command_timeout, conn.del(key)).await?;
        Ok(deleted > 0)
    }

    async fn delete_many(&self, keys: &[CacheKey]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let deleted: i64 = bounded(self.command_timeout, conn.del(keys)).await?;
        Ok(deleted.max(0) as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        bounded(self.command_timeout, conn.exists::<_, bool>(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let updated: i64 = self
            .query(redis::cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)))
            .await?;
        Ok(updated == 1)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        // -2: no such key, -1: no expiry
        let millis: i64 = self.query(redis::cmd("PTTL").arg(key)).await?;
        if millis < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(millis as u64)))
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<CacheKey>> {
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = self
                .query(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT),
                )
                .await?;
            found.extend(batch);

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        found.sort();
        found.dedup();
        debug!("SCAN {} matched {} keys", pattern, found.len());
        Ok(found)
    }

    async fn ping(&self) -> Result<()> {
        let _: String = self.query(&redis::cmd("PING")).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
