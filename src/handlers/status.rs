use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use axum::{Json, routing::MethodRouter, routing::get};
use futures_util::future::{BoxFuture, join_all};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cache::KeyValueStore;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type StatusCheck = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub uptime: u64,
    pub online: BTreeMap<String, bool>,
    pub errors: BTreeMap<String, String>,
}

/// Named checks run by the status endpoint.
#[derive(Clone, Default)]
pub struct StatusChecks {
    checks: BTreeMap<String, StatusCheck>,
}

impl StatusChecks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F, Fut>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let check: StatusCheck =
            Arc::new(move || -> BoxFuture<'static, Result<(), BoxError>> { Box::pin(check()) });
        self.checks.insert(name.into(), check);
        self
    }

    /// Pings `store`.
    pub fn with_store(self, name: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        self.with(name, move || {
            let store = Arc::clone(&store);
            async move { store.ping().await.map_err(BoxError::from) }
        })
    }

    async fn run(&self) -> (BTreeMap<String, bool>, BTreeMap<String, String>) {
        let results = join_all(self.checks.iter().map(|(name, check)| {
            let fut = check();
            async move { (name.clone(), fut.await) }
        }))
        .await;

        let mut online = BTreeMap::new();
        let mut errors = BTreeMap::new();

        for (name, result) in results {
            if let Err(e) = &result {
                errors.insert(name.clone(), e.to_string());
            }
            online.insert(name, result.is_ok());
        }

        (online, errors)
    }
}

/// `GET` route reporting uptime and the outcome of every check. Always
/// answers 200; failures show up in the body.
pub fn status<S>(checks: StatusChecks) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    let startup = Instant::now();
    let checks = Arc::new(checks);

    get(move || {
        let checks = Arc::clone(&checks);
        async move {
            let (online, errors) = checks.run().await;

            Json(StatusResponse {
                uptime: startup.elapsed().as_secs(),
                online,
                errors,
            })
        }
    })
}
