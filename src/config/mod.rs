use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u64,
    pub ip_rate_limit: u32,
    pub ip_ranges: String,
    pub basic_auth: String,
    pub cognito_client_id: String,
    pub cognito_region: String,
    pub cognito_user_pool_id: String,
    pub access_token_expiration_secs: u64,
    pub cache_expiration_secs: u64,
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "::".into()),
            server_port: var_or("SERVER_PORT", 3000),
            rate_limit_window_secs: var_or("RATE_LIMIT_WINDOW", 60),
            rate_limit_requests: var_or("RATE_LIMIT_REQUESTS", 100),
            ip_rate_limit: var_or("IP_RATE_LIMIT", 10),
            ip_ranges: env::var("IP_RANGES").unwrap_or_default(),
            basic_auth: env::var("BASIC_AUTH").unwrap_or_default(),
            cognito_client_id: env::var("COGNITO_CLIENT_ID")?,
            cognito_region: env::var("COGNITO_REGION")?,
            cognito_user_pool_id: env::var("COGNITO_USER_POOL_ID")?,
            access_token_expiration_secs: var_or("ACCESS_TOKEN_EXPIRATION", 300),
            cache_expiration_secs: var_or("CACHE_EXPIRATION", 30),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn access_token_expiration(&self) -> Duration {
        Duration::from_secs(self.access_token_expiration_secs)
    }

    pub fn cache_expiration(&self) -> Duration {
        Duration::from_secs(self.cache_expiration_secs)
    }
}
