use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient, ErrorKind};

use super::{KeyValueStore, StoreError};

/// Redis 存储
#[derive(Clone)]
pub struct RedisStore {
    redis: Arc<RedisClient>,
}

impl RedisStore {
    pub fn new(redis: RedisClient) -> Self {
        Self {
            redis: Arc::new(redis),
        }
    }

    pub fn open(url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(RedisClient::open(url)?))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let result: Option<Vec<u8>> = conn.get(key).await?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        // 过期时间为零时不设置过期
        if ttl.is_zero() {
            let _: () = conn.set(key, value).await?;
        } else {
            let millis = ttl.as_millis().max(1) as u64;
            let _: () = conn.pset_ex(key, value, millis).await?;
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        // INCR 不会修改键的过期时间
        conn.incr(key, 1).await.map_err(|e| match e.kind() {
            ErrorKind::TypeError | ErrorKind::ResponseError => StoreError::InvalidCounter {
                key: key.to_string(),
            },
            _ => StoreError::Redis(e),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }

        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let millis = ttl.as_millis().max(1) as i64;
        let _: bool = conn.pexpire(key, millis).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
