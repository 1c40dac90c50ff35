use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{KeyValueStore, StoreError, keys::counter_key};

/// Limit and window of a [`RequestLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: NonZeroU64,
    /// A zero duration means counters never expire and must be cleared
    /// explicitly.
    pub expire: Duration,
}

impl Quota {
    pub fn new(limit: NonZeroU64, expire: Duration) -> Self {
        Self { limit, expire }
    }
}

/// Counts actions per `(entity, identifier)` in an external store.
///
/// The limiter keeps no state of its own, so one instance can be shared by
/// any number of concurrent requests. Checking ([`allow`](Self::allow)) and
/// recording ([`seen`](Self::seen)) are separate round trips: two requests for
/// the same identifier may both pass `allow` before either records itself, so
/// the quota is approximate under concurrency.
#[derive(Clone)]
pub struct RequestLimiter {
    store: Arc<dyn KeyValueStore>,
    quota: Quota,
}

impl RequestLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, quota: Quota) -> Self {
        Self { store, quota }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Whether `identifier` may perform another action for `entity`.
    ///
    /// An identifier without a counter is always allowed. Store failures are
    /// returned as errors; deciding whether to fail open or closed is left to
    /// the caller.
    pub async fn allow(&self, identifier: &str, entity: &str) -> Result<bool, StoreError> {
        let key = counter_key(entity, identifier);

        let Some(raw) = self.store.get(&key).await? else {
            return Ok(true);
        };

        // 负数视为未达上限
        let count = parse_count(&key, &raw)?;
        Ok(u64::try_from(count).map_or(true, |count| count < self.quota.limit.get()))
    }

    /// Records one action for `identifier` under `entity`.
    ///
    /// The action that creates the counter also starts its expiration;
    /// later ones increment it without touching the expiration. A counter
    /// that expires between two actions starts over with a fresh window.
    pub async fn seen(&self, identifier: &str, entity: &str) -> Result<(), StoreError> {
        let key = counter_key(entity, identifier);

        let count = self.store.incr(&key).await?;
        if count == 1 {
            self.store.expire(&key, self.quota.expire).await?;
        }

        Ok(())
    }

    /// Binds the limiter to a single entity.
    pub fn scoped(&self, entity: impl Into<String>) -> EntityLimiter {
        EntityLimiter {
            limiter: self.clone(),
            entity: entity.into(),
        }
    }
}

fn parse_count(key: &str, raw: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| StoreError::InvalidCounter {
            key: key.to_string(),
        })
}

/// A [`RequestLimiter`] fixed to one entity.
#[derive(Clone)]
pub struct EntityLimiter {
    limiter: RequestLimiter,
    entity: String,
}

impl EntityLimiter {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub async fn allow(&self, identifier: &str) -> Result<bool, StoreError> {
        self.limiter.allow(identifier, &self.entity).await
    }

    pub async fn seen(&self, identifier: &str) -> Result<(), StoreError> {
        self.limiter.seen(identifier, &self.entity).await
    }
}
