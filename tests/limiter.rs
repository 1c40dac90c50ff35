mod common;

use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_toolkit::{
    cache::{KeyValueStore, MemoryStore, StoreError, keys::counter_key},
    limiter::{Quota, RequestLimiter},
};

use common::FailingStore;

const IDENTIFIER: &str = "alice";
const ENTITY: &str = "limit";

fn limiter(store: Arc<MemoryStore>, limit: u64, expire: Duration) -> RequestLimiter {
    RequestLimiter::new(
        store,
        Quota::new(NonZeroU64::new(limit).unwrap(), expire),
    )
}

/// Memory store whose every call takes `latency` on the tokio clock.
struct SlowStore {
    inner: Arc<MemoryStore>,
    latency: Duration,
}

impl SlowStore {
    async fn wait(&self) {
        tokio::time::advance(self.latency).await;
    }
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.wait().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.wait().await;
        self.inner.set(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.wait().await;
        self.inner.exists(key).await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.wait().await;
        self.inner.incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.wait().await;
        self.inner.expire(key, ttl).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

async fn stored(store: &MemoryStore, entity: &str) -> Option<String> {
    store
        .get(&counter_key(entity, IDENTIFIER))
        .await
        .unwrap()
        .map(|v| String::from_utf8(v).unwrap())
}

#[tokio::test]
async fn unseen_identifier_is_allowed() {
    let lmr = limiter(Arc::new(MemoryStore::new()), 1, Duration::from_secs(1));

    assert!(lmr.allow(IDENTIFIER, ENTITY).await.unwrap());
    assert!(lmr.allow("bob", "other").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn check_then_record_until_limit_then_reset() {
    let lmr = limiter(Arc::new(MemoryStore::new()), 3, Duration::from_secs(1));

    for _ in 0..3 {
        assert!(lmr.allow(IDENTIFIER, ENTITY).await.unwrap());
        lmr.seen(IDENTIFIER, ENTITY).await.unwrap();
    }
    assert!(!lmr.allow(IDENTIFIER, ENTITY).await.unwrap());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(lmr.allow(IDENTIFIER, ENTITY).await.unwrap());
}

#[tokio::test]
async fn limit_boundary() {
    let lmr = limiter(Arc::new(MemoryStore::new()), 5, Duration::from_secs(60));

    for _ in 0..4 {
        lmr.seen(IDENTIFIER, ENTITY).await.unwrap();
    }
    assert!(lmr.allow(IDENTIFIER, ENTITY).await.unwrap());

    lmr.seen(IDENTIFIER, ENTITY).await.unwrap();
    assert!(!lmr.allow(IDENTIFIER, ENTITY).await.unwrap());

    // counts past the limit keep the identifier blocked
    lmr.seen(IDENTIFIER, ENTITY).await.unwrap();
    assert!(!lmr.allow(IDENTIFIER, ENTITY).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn seen_increments_without_resetting_expiration() {
    let store = Arc::new(MemoryStore::new());
    let lmr = limiter(store.clone(), 10, Duration::from_secs(1));
    let key = counter_key(ENTITY, IDENTIFIER);

    lmr.seen(IDENTIFIER, ENTITY).await.unwrap();
    assert_eq!(stored(&store, ENTITY).await.as_deref(), Some("1"));

    tokio::time::advance(Duration::from_millis(400)).await;
    lmr.seen(IDENTIFIER, ENTITY).await.unwrap();
    assert_eq!(stored(&store, ENTITY).await.as_deref(), Some("2"));
    assert_eq!(store.ttl(&key), Some(Duration::from_millis(600)));

    lmr.seen(IDENTIFIER, ENTITY).await.unwrap();
    assert_eq!(stored(&store, ENTITY).await.as_deref(), Some("3"));

    tokio::time::advance(Duration::from_millis(600)).await;
    assert_eq!(stored(&store, ENTITY).await, None);

    lmr.seen(IDENTIFIER, ENTITY).await.unwrap();
    assert_eq!(stored(&store, ENTITY).await.as_deref(), Some("1"));
}

#[tokio::test(start_paused = true)]
async fn counter_expiring_mid_record_starts_a_new_window() {
    let store = Arc::new(MemoryStore::new());
    let expire = Duration::from_secs(1);
    let key = counter_key(ENTITY, IDENTIFIER);

    limiter(store.clone(), 1, expire)
        .seen(IDENTIFIER, ENTITY)
        .await
        .unwrap();

    // the counter runs out while the next action is being recorded
    let slow = RequestLimiter::new(
        Arc::new(SlowStore {
            inner: store.clone(),
            latency: expire,
        }),
        Quota::new(NonZeroU64::MIN, expire),
    );
    slow.seen(IDENTIFIER, ENTITY).await.unwrap();

    assert_eq!(stored(&store, ENTITY).await.as_deref(), Some("1"));
    assert!(store.ttl(&key).is_some_and(|ttl| ttl <= expire));

    let lmr = limiter(store.clone(), 1, expire);
    assert!(!lmr.allow(IDENTIFIER, ENTITY).await.unwrap());

    tokio::time::advance(expire).await;
    assert!(lmr.allow(IDENTIFIER, ENTITY).await.unwrap());
}

#[tokio::test]
async fn limits_beyond_i64_are_not_wrapped() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(&counter_key(ENTITY, IDENTIFIER), b"5", Duration::ZERO)
        .await
        .unwrap();
    let lmr = RequestLimiter::new(store, Quota::new(NonZeroU64::MAX, Duration::ZERO));

    assert!(lmr.allow(IDENTIFIER, ENTITY).await.unwrap());
}

#[tokio::test]
async fn entities_do_not_share_counts() {
    let store = Arc::new(MemoryStore::new());
    let pages = limiter(store.clone(), 2, Duration::from_secs(60)).scoped("pages");
    let exports = limiter(store.clone(), 2, Duration::from_secs(60)).scoped("exports");

    pages.seen(IDENTIFIER).await.unwrap();
    pages.seen(IDENTIFIER).await.unwrap();

    assert!(!pages.allow(IDENTIFIER).await.unwrap());
    assert!(exports.allow(IDENTIFIER).await.unwrap());
    assert_eq!(stored(&store, "pages").await.as_deref(), Some("2"));
    assert_eq!(stored(&store, "exports").await, None);
}

#[tokio::test(start_paused = true)]
async fn zero_expiration_keeps_counter_until_cleared() {
    let store = Arc::new(MemoryStore::new());
    let lmr = limiter(store.clone(), 1, Duration::ZERO);

    lmr.seen(IDENTIFIER, ENTITY).await.unwrap();
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert!(!lmr.allow(IDENTIFIER, ENTITY).await.unwrap());

    store.remove(&counter_key(ENTITY, IDENTIFIER));
    assert!(lmr.allow(IDENTIFIER, ENTITY).await.unwrap());
}

#[tokio::test]
async fn store_errors_are_returned() {
    let lmr = RequestLimiter::new(
        Arc::new(FailingStore),
        Quota::new(NonZeroU64::new(3).unwrap(), Duration::from_secs(1)),
    );

    assert!(matches!(
        lmr.allow(IDENTIFIER, ENTITY).await,
        Err(StoreError::Redis(_))
    ));
    assert!(matches!(
        lmr.seen(IDENTIFIER, ENTITY).await,
        Err(StoreError::Redis(_))
    ));
}

#[tokio::test]
async fn non_integer_counter_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(&counter_key(ENTITY, IDENTIFIER), b"many", Duration::ZERO)
        .await
        .unwrap();
    let lmr = limiter(store, 3, Duration::from_secs(1));

    assert!(matches!(
        lmr.allow(IDENTIFIER, ENTITY).await,
        Err(StoreError::InvalidCounter { .. })
    ));
}
