use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    cache::{KeyValueStore, keys::response_key},
    error::HttpError,
};

/// 响应缓存数据模型
#[derive(Debug, Serialize, Deserialize, Clone)]
struct CachedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    body: Vec<u8>,
}

/// Caches successful responses in the store, keyed by path and query.
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    expire: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, expire: Duration) -> Self {
        Self { store, expire }
    }
}

pub async fn cache_response(
    State(cache): State<Arc<ResponseCache>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let key = response_key(&uri);

    match cache.store.get(&key).await {
        Ok(Some(data)) => match serde_json::from_slice::<CachedResponse>(&data) {
            Ok(cached) => return cached_response(cached),
            Err(e) => tracing::error!("corrupt cached response for {}: {}", uri, e),
        },
        Ok(None) => {}
        Err(e) => tracing::error!("failed to read cached response for {}: {}", uri, e),
    }

    let response = next.run(req).await;

    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("failed to read response body for {}: {}", uri, e);
            return HttpError::internal_server_error().into_response();
        }
    };

    let cached = CachedResponse {
        content_type: parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: bytes.to_vec(),
    };

    match serde_json::to_vec(&cached) {
        Ok(data) => {
            if let Err(e) = cache.store.set(&key, &data, cache.expire).await {
                tracing::error!("failed to cache response for {}: {}", uri, e);
            }
        }
        Err(e) => tracing::error!("failed to encode response for {}: {}", uri, e),
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn cached_response(cached: CachedResponse) -> Response {
    let mut response = (StatusCode::OK, cached.body).into_response();

    if let Some(content_type) = cached
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
    {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }

    response
}
