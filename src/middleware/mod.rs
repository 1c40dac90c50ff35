mod basic_auth;
mod cache;
mod cognito;
mod cors;
mod logging;
mod not_found;
mod rate_limit;
mod rbac;

pub use basic_auth::{AccountsError, AuthUser, BasicAuth, IpBasicAuth, basic_auth, ip_basic_auth};
pub use cache::{ResponseCache, cache_response};
pub use cognito::{
    AuthError, CognitoAuth, CognitoClaims, CognitoDirectory, Jwk, Jwks, UserDirectory,
    cognito_auth, cognito_issuer,
};
pub use cors::{CORS_METHODS, cors};
pub use logging::{LogEntry, request_log};
pub use not_found::not_found;
pub use rate_limit::{FailurePolicy, IpLimit, LimitPerUser, limit, limit_per_user};
pub use rbac::{
    Authorizer, AuthzError, Enforcer, PolicyAuthorizer, PolicyTable, Rbac, rbac,
};
