use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;

use super::{KvStore, StorageResult};
use crate::errors::StorageError;
use crate::models::Settings;

/// Extra attempts made when a command times out.
const RETRIES_ON_TIMEOUT: u32 = 1;

/// COUNT hint for cursor iteration.
const SCAN_BATCH: usize = 500;

/// Redis-backed [`KvStore`] over a pooled connection.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool", &self.pool.status())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Build `redis://[:password@]host:port/db`, percent-encoding the password.
pub fn connection_url(settings: &Settings) -> Result<String> {
    let base = format!(
        "redis://{}:{}/{}",
        settings.redis_host, settings.redis_port, settings.redis_db
    );
    let mut url = reqwest::Url::parse(&base)
        .with_context(|| format!("Invalid Redis address '{}'", base))?;
    if !settings.redis_password.is_empty() {
        url.set_password(Some(&settings.redis_password))
            .map_err(|_| anyhow::anyhow!("Cannot attach password to Redis URL"))?;
    }
    Ok(url.to_string())
}

impl RedisStore {
    /// Create the pool. No connection is opened until the first command;
    /// call [`KvStore::ping`] to probe the backend.
    pub fn new(settings: &Settings) -> Result<Self> {
        let timeout = settings.redis_timeout();
        let mut cfg = Config::from_url(connection_url(settings)?);

        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(timeout);
        timeouts.create = Some(timeout);
        timeouts.recycle = Some(timeout);
        let mut pool_cfg = PoolConfig::new(settings.redis_pool_size);
        pool_cfg.timeouts = timeouts;
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .context("Failed to create Redis connection pool")?;

        Ok(Self { pool, timeout })
    }

    async fn get_conn(&self) -> StorageResult<Connection> {
        Ok(self.pool.get().await?)
    }
}

/// Run `op` under `timeout`, retrying on timeout only.
async fn with_retry<T, F, Fut>(timeout: Duration, name: &'static str, op: F) -> StorageResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    for attempt in 0..=RETRIES_ON_TIMEOUT {
        match tokio::time::timeout(timeout, op()).await {
            Ok(result) => return result,
            Err(_) => {
                tracing::warn!(
                    "Redis {} timed out after {:?} (attempt {})",
                    name,
                    timeout,
                    attempt + 1
                );
            }
        }
    }
    Err(StorageError::Timeout(timeout))
}

/// Follow a SCAN cursor to completion. Each page gets its own timeout and
/// retry, so a slow page resumes from its cursor rather than from zero.
async fn scan_pages<F, Fut>(timeout: Duration, fetch_page: F) -> StorageResult<Vec<String>>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = StorageResult<(u64, Vec<String>)>>,
{
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, batch) = with_retry(timeout, "SCAN", || fetch_page(cursor)).await?;
        keys.extend(batch);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    // SCAN may return a key more than once.
    keys.sort();
    keys.dedup();
    Ok(keys)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        with_retry(self.timeout, "GET", || async move {
            let mut conn = self.get_conn().await?;
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn get_many(&self, keys: &[String]) -> StorageResult<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(SCAN_BATCH) {
            let batch: Vec<Option<String>> = with_retry(self.timeout, "MGET", || async move {
                let mut conn = self.get_conn().await?;
                let batch: Vec<Option<String>> =
                    redis::cmd("MGET").arg(chunk).query_async(&mut conn).await?;
                Ok(batch)
            })
            .await?;
            values.extend(batch);
        }
        Ok(values)
    }

    async fn scan_keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        scan_pages(self.timeout, |cursor| async move {
            let mut conn = self.get_conn().await?;
            let page: (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            Ok(page)
        })
        .await
    }

    async fn ping(&self) -> StorageResult<()> {
        with_retry(self.timeout, "PING", || async move {
            let mut conn = self.get_conn().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        self.pool.close();
        tracing::info!("Redis connection pool closed");
    }
}
