/// 缓存键模块
/// 提供各种缓存键生成函数
use sha2::{Digest, Sha256};

/// 访问令牌缓存键前缀
const ACCESS_TOKEN_PREFIX: &str = "access_token:";

/// 生成限流计数键
pub fn counter_key(entity: &str, identifier: &str) -> String {
    format!("{}:{}:count", entity, identifier)
}

/// 生成访问令牌缓存键，令牌本身不落入存储
pub fn access_token_key(token: &str) -> String {
    format!("{}{:x}", ACCESS_TOKEN_PREFIX, Sha256::digest(token.as_bytes()))
}

/// 生成响应缓存键
pub fn response_key(path_and_query: &str) -> String {
    format!("response:{}", path_and_query)
}
