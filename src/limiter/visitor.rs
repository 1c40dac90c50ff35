use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota as BucketQuota, RateLimiter};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Per-key token bucket kept in process memory.
///
/// Each key refills one token per second up to `burst` tokens. Keys whose
/// bucket is full again are dropped by the cleanup task.
pub struct VisitorLimiter {
    visitors: DefaultKeyedRateLimiter<String>,
}

impl VisitorLimiter {
    pub fn new(burst: NonZeroU32) -> Self {
        let quota = BucketQuota::per_second(NonZeroU32::MIN).allow_burst(burst);
        Self {
            visitors: RateLimiter::keyed(quota),
        }
    }

    /// Takes one token from `key`'s bucket.
    pub fn allow(&self, key: &str) -> bool {
        self.visitors.check_key(&key.to_string()).is_ok()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops keys that are back to a full bucket.
    pub fn cleanup(&self) {
        self.visitors.retain_recent();
        self.visitors.shrink_to_fit();
    }

    /// Runs [`cleanup`](Self::cleanup) every `every` until `shutdown` is
    /// cancelled.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("visitor cleanup stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.cleanup();
                        tracing::debug!(visitors = limiter.len(), "visitor cleanup ran");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_reject() {
        let limiter = VisitorLimiter::new(NonZeroU32::new(3).unwrap());

        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));

        // other keys have their own bucket
        assert!(limiter.allow("10.0.0.2"));
        assert_eq!(limiter.len(), 2);
    }

    #[tokio::test]
    async fn cleanup_drops_refilled_keys() {
        let limiter = VisitorLimiter::new(NonZeroU32::new(2).unwrap());
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));

        // 令牌桶按真实时间补充
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.allow("10.0.0.2"));

        limiter.cleanup();
        assert_eq!(limiter.len(), 1);
        assert!(limiter.allow("10.0.0.2"));
        assert!(!limiter.allow("10.0.0.2"));
    }

    #[tokio::test]
    async fn cleanup_task_stops_on_cancel() {
        let limiter = Arc::new(VisitorLimiter::new(NonZeroU32::new(1).unwrap()));
        let shutdown = CancellationToken::new();
        let handle = limiter.spawn_cleanup(Duration::from_millis(10), shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
