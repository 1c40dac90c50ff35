#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use http_toolkit::{
    CognitoUser,
    cache::{KeyValueStore, StoreError},
};
use redis::{ErrorKind, RedisError};
use tower::ServiceExt;

/// Store whose every call fails like an unreachable Redis.
pub struct FailingStore;

fn unavailable() -> StoreError {
    StoreError::Redis(RedisError::from((ErrorKind::IoError, "connection refused")))
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(unavailable())
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn incr(&self, _key: &str) -> Result<i64, StoreError> {
        Err(unavailable())
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(unavailable())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(req).await.expect("infallible");
    let (parts, body) = response.into_parts();

    TestResponse {
        status: parts.status,
        headers: parts.headers,
        body: to_bytes(body, usize::MAX).await.expect("body"),
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_from(uri: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

/// Stands in for an authentication layer.
pub async fn with_user(State(user): State<CognitoUser>, mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(user);
    next.run(req).await
}
