// 缓存模块
// 外部键值存储的抽象与实现

pub mod keys;
pub mod memory_store;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("value stored at {key} is not an integer")]
    InvalidCounter { key: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Key-value store used for counters, cached users and cached responses.
///
/// Every operation is a single round trip and atomic on its own; callers that
/// chain several operations get no atomicity across them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` when the key does not exist (or has expired).
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// A zero `ttl` stores the value without expiration.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Adds one to the integer stored at `key`, keeping its expiration.
    /// A missing key counts from zero.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Sets the expiration of an existing key. A zero `ttl` leaves it
    /// unchanged; a missing key is not an error.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
