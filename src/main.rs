use std::net::{IpAddr, SocketAddr};
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Json, Router, middleware::from_fn, middleware::from_fn_with_state};
use http_toolkit::{
    CognitoUser,
    cache::{KeyValueStore, RedisStore},
    config::Config,
    handlers::{StatusChecks, status},
    limiter::{Quota, RequestLimiter, VisitorLimiter},
    middleware::{
        BasicAuth, CognitoAuth, CognitoDirectory, IpBasicAuth, IpLimit, LimitPerUser,
        ResponseCache, cache_response, cognito_auth, cognito_issuer, cors, ip_basic_auth, limit,
        limit_per_user, not_found, request_log,
    },
    routes::{self, Module, Route},
    utils::IpRanges,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn hello(Extension(user): Extension<CognitoUser>) -> Json<Value> {
    Json(json!({ "hello": user.username, "groups": user.groups() }))
}

async fn ping() -> &'static str {
    "pong"
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    let ranges: IpRanges = config.ip_ranges.parse().expect("Invalid IP_RANGES");
    let accounts = BasicAuth::from_accounts(&config.basic_auth).expect("Invalid BASIC_AUTH");

    // 设置 Redis 存储
    let store: Arc<dyn KeyValueStore> =
        Arc::new(RedisStore::open(&config.redis_url).expect("Failed to create Redis client"));

    let shutdown = CancellationToken::new();

    // 设置 IP 限流器，后台清理任务随关闭信号退出
    let visitors = Arc::new(VisitorLimiter::new(
        NonZeroU32::new(config.ip_rate_limit).unwrap_or(NonZeroU32::MIN),
    ));
    let cleanup = visitors.spawn_cleanup(Duration::from_secs(60), shutdown.clone());
    let ip_limit = Arc::new(IpLimit::with_visitors(visitors));

    // 设置用户限流器
    let quota = Quota::new(
        NonZeroU64::new(config.rate_limit_requests).unwrap_or(NonZeroU64::MIN),
        config.rate_limit_window(),
    );
    let limiter = RequestLimiter::new(store.clone(), quota);
    let per_user = Arc::new(LimitPerUser::new(&limiter, "api"));

    let cognito = Arc::new(
        CognitoAuth::new(
            Arc::new(CognitoDirectory::new(&config.cognito_region)),
            store.clone(),
            config.cognito_client_id.clone(),
            cognito_issuer(&config.cognito_region, &config.cognito_user_pool_id),
        )
        .bypass(ranges.clone(), "service", vec!["service".into()])
        .expire(config.access_token_expiration()),
    );

    let response_cache = Arc::new(ResponseCache::new(store.clone(), config.cache_expiration()));
    let internal_auth = Arc::new(IpBasicAuth::new(ranges, accounts));

    let modules: Vec<Module> = vec![
        Module::new("api")
            .middleware(move |r| r.route_layer(from_fn_with_state(cognito, cognito_auth)))
            .middleware(move |r| r.route_layer(from_fn_with_state(per_user, limit_per_user)))
            .route(Route::get("/hello", hello)),
        Module::new("internal")
            .middleware(move |r| r.route_layer(from_fn_with_state(internal_auth, ip_basic_auth)))
            .route(Route::get("/ping", ping).middleware(move |r| {
                r.layer(from_fn_with_state(response_cache, cache_response))
            })),
    ];

    let router = routes::init(Router::new(), modules).expect("Failed to register modules");

    let app = router
        .route(
            "/status",
            status(StatusChecks::new().with_store("redis", store.clone())),
        )
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(cors())
                .layer(from_fn(request_log))
                .layer(from_fn_with_state(ip_limit, limit)),
        );

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .expect("Failed to start server");

    shutdown.cancel();
    if let Err(e) = cleanup.await {
        tracing::error!("visitor cleanup task failed: {}", e);
    }
}
