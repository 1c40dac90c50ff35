use std::time::Duration;

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

pub const CORS_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::DELETE,
    Method::PUT,
    Method::OPTIONS,
];

const CORS_MAX_AGE: Duration = Duration::from_secs(86400);

/// Any origin, any header, the usual REST methods, preflight cached a day.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(CORS_METHODS)
        .max_age(CORS_MAX_AGE)
}
