use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{
    error::HttpError,
    utils::{IpRanges, client_ip},
};

const REALM: &str = "Basic realm=\"Authorization Required\"";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountsError {
    #[error("account {0:?} is not in \"user:password\" form")]
    Format(String),
}

/// Name of the user authenticated through basic auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

#[derive(Debug, Clone)]
struct AuthPair {
    value: String,
    user: String,
}

#[derive(Debug, Clone, Default)]
pub struct BasicAuth {
    pairs: Vec<AuthPair>,
}

impl BasicAuth {
    /// Parses `"user:pass,user2:pass2"`. Accounts with an empty user name
    /// are ignored.
    pub fn from_accounts(accounts: &str) -> Result<Self, AccountsError> {
        let mut pairs = Vec::new();

        for account in accounts.split(',').filter(|a| !a.is_empty()) {
            let (user, password) = account
                .split_once(':')
                .ok_or_else(|| AccountsError::Format(account.to_string()))?;

            if user.is_empty() {
                continue;
            }

            pairs.push(AuthPair {
                value: authorization_header(user, password),
                user: user.to_string(),
            });
        }

        Ok(Self { pairs })
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn search_credential(&self, value: Option<&HeaderValue>) -> Option<&str> {
        let value = value?.as_bytes();

        if value.is_empty() {
            return None;
        }

        self.pairs
            .iter()
            .find(|pair| constant_time_eq(pair.value.as_bytes(), value))
            .map(|pair| pair.user.as_str())
    }

    fn authenticate(&self, mut req: Request<Body>) -> Result<Request<Body>, Response> {
        let Some(user) = self
            .search_credential(req.headers().get(header::AUTHORIZATION))
            .map(str::to_string)
        else {
            let mut response = HttpError::unauthorized().into_response();
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
            return Err(response);
        };

        req.extensions_mut().insert(AuthUser(user));
        Ok(req)
    }
}

fn authorization_header(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn basic_auth(
    State(auth): State<Arc<BasicAuth>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match auth.authenticate(req) {
        Ok(req) => next.run(req).await,
        Err(response) => response,
    }
}

/// Basic auth that trusted address ranges skip.
#[derive(Debug, Clone, Default)]
pub struct IpBasicAuth {
    pub ranges: IpRanges,
    pub accounts: BasicAuth,
}

impl IpBasicAuth {
    pub fn new(ranges: IpRanges, accounts: BasicAuth) -> Self {
        Self { ranges, accounts }
    }
}

pub async fn ip_basic_auth(
    State(auth): State<Arc<IpBasicAuth>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !auth.ranges.is_empty() && client_ip(&req).is_some_and(|ip| auth.ranges.contains(ip)) {
        return next.run(req).await;
    }

    if auth.accounts.is_empty() {
        return next.run(req).await;
    }

    match auth.accounts.authenticate(req) {
        Ok(req) => next.run(req).await,
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_header_values() {
        let auth = BasicAuth::from_accounts("test:user,:skipped").unwrap();
        assert_eq!(auth.pairs.len(), 1);
        assert_eq!(auth.pairs[0].value, "Basic dGVzdDp1c2Vy");

        let header = HeaderValue::from_static("Basic dGVzdDp1c2Vy");
        assert_eq!(auth.search_credential(Some(&header)), Some("test"));
        assert_eq!(auth.search_credential(None), None);
    }

    #[test]
    fn password_may_contain_colons() {
        let auth = BasicAuth::from_accounts("svc:a:b").unwrap();
        assert_eq!(auth.pairs[0].value, authorization_header("svc", "a:b"));
    }

    #[test]
    fn rejects_account_without_password() {
        assert_eq!(
            BasicAuth::from_accounts("lonely").unwrap_err(),
            AccountsError::Format("lonely".into())
        );
    }
}
