use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 内存存储，过期时间以 tokio 时钟计算
///
/// Intended for tests and single-process deployments. Expired entries are
/// dropped lazily when they are next touched.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of `key`, `None` when absent or without expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(self.entries.contains_key(key))
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let entry = occupied.get_mut();
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| StoreError::InvalidCounter {
                        key: key.to_string(),
                    })?;
                let next = current + 1;
                entry.value = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(StoredValue {
                    value: b"1".to_vec(),
                    expires_at: None,
                });
                Ok(1)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue {
                    value: b"1".to_vec(),
                    expires_at: None,
                });
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }

        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
