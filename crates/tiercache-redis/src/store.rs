//! [`KvStore`] over a `deadpool-redis` connection pool.
//!
//! TTLs are sent in milliseconds. A zero TTL writes the key without expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use thiserror::Error;
use tiercache::{KvStore, StoreError};

use crate::config::RedisStoreConfig;

#[derive(Debug, Error)]
pub enum RedisStoreError {
    #[error("redis store is disabled")]
    Disabled,

    #[error("invalid redis configuration: {0}")]
    Config(String),

    #[error("failed to create redis pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    #[error("redis connection unavailable: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("redis command failed: {0}")]
    Command(#[from] redis::RedisError),
}

impl From<RedisStoreError> for StoreError {
    fn from(err: RedisStoreError) -> Self {
        StoreError::with_source(err.to_string(), err)
    }
}

/// Build a connection pool and check that the server answers.
pub async fn create_pool(config: &RedisStoreConfig) -> Result<Pool, RedisStoreError> {
    config.validate().map_err(RedisStoreError::Config)?;

    tracing::info!(url = %config.url, pool_size = config.pool_size, "Connecting to Redis");

    let timeout = Duration::from_millis(config.timeout_ms);
    let mut pool_config = PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let mut redis_config = Config::from_url(&config.url);
    redis_config.pool = Some(pool_config);
    let pool = redis_config.create_pool(Some(Runtime::Tokio1))?;

    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    tracing::info!("Connected to Redis successfully");

    Ok(pool)
}

/// Redis-backed store for a networked cache layer.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Connect using `config`. Fails when the store is disabled or unreachable.
    pub async fn connect(config: &RedisStoreConfig) -> Result<Self, RedisStoreError> {
        if !config.enabled {
            return Err(RedisStoreError::Disabled);
        }
        Ok(Self::new(create_pool(config).await?))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> Result<Connection, RedisStoreError> {
        Ok(self.pool.get().await?)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // Sub-millisecond TTLs still expire instead of living forever
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn().await?;
        let value = conn
            .get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let result = if ttl.is_zero() {
            conn.set::<_, _, ()>(key, value).await
        } else {
            conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl)).await
        };
        result.map_err(RedisStoreError::from)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn().await?;
        // -2: no such key, -1: no expiry
        let millis = conn
            .pttl::<_, i64>(key)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(u64::try_from(millis)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }

    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.conn().await?;
        // Always MGET so the reply is an array even for one key
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| (key.clone(), value)))
            .collect())
    }

    async fn mset(&self, items: &[(&str, &[u8])], ttl: Duration) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (key, value) in items {
            pipe.cmd("SET").arg(*key).arg(*value);
            if !ttl.is_zero() {
                pipe.arg("PX").arg(ttl_millis(ttl));
            }
            pipe.ignore();
        }

        let mut conn = self.conn().await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(RedisStoreError::from)?;
        Ok(())
    }
}
