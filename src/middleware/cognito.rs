use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::{
    cache::{KeyValueStore, keys::access_token_key},
    error::HttpError,
    user::CognitoUser,
    utils::{IpRanges, client_ip},
};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("unexpected signing method: {0:?}")]
    UnexpectedSigningMethod(Algorithm),
    #[error("kid header not found")]
    MissingKid,
    #[error("incorrect client id")]
    IncorrectClientId,
    #[error("unexpected issuer: {0}")]
    IncorrectIssuer(String),
    #[error("key not found")]
    KeyNotFound,
    #[error("jwks request failed with status {0}")]
    JwksStatus(StatusCode),
    #[error("invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("user lookup failed: {0}")]
    Directory(String),
}

/// One entry of a JSON web key set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub alg: String,
    pub e: String,
    pub kid: String,
    pub kty: String,
    pub n: String,
    #[serde(default, rename = "use")]
    pub use_: String,
}

impl Jwk {
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        Ok(DecodingKey::from_rsa_components(&self.n, &self.e)?)
    }
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// Issuer of the access tokens of a Cognito user pool.
pub fn cognito_issuer(region: &str, user_pool_id: &str) -> String {
    format!("https://cognito-idp.{}.amazonaws.com/{}", region, user_pool_id)
}

/// Key set of the token issuer, fetched once and kept for the lifetime of
/// the middleware.
#[derive(Debug)]
pub struct Jwks {
    url: String,
    keys: OnceCell<Vec<Jwk>>,
    http: reqwest::Client,
}

impl Jwks {
    /// Keys published at `<issuer>/.well-known/jwks.json`.
    pub fn new(issuer: &str) -> Self {
        Self {
            url: format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/')),
            keys: OnceCell::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Key set known up front; nothing will be fetched.
    pub fn from_keys(keys: Vec<Jwk>) -> Self {
        Self {
            url: String::new(),
            keys: OnceCell::new_with(Some(keys)),
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Loads the key set unless it is already known.
    pub async fn fetch(&self) -> Result<&[Jwk], AuthError> {
        let keys = self
            .keys
            .get_or_try_init(|| async {
                tracing::debug!("fetching jwks from {}", self.url);

                let res = self.http.get(&self.url).send().await?;
                if !res.status().is_success() {
                    return Err(AuthError::JwksStatus(res.status()));
                }

                Ok::<_, AuthError>(res.json::<JwkSet>().await?.keys)
            })
            .await?;

        Ok(keys.as_slice())
    }

    pub fn find(&self, kid: &str) -> Result<&Jwk, AuthError> {
        self.keys
            .get()
            .and_then(|keys| keys.iter().find(|key| key.kid == kid))
            .ok_or(AuthError::KeyNotFound)
    }
}

/// Claims of a Cognito access token.
#[derive(Debug, Clone, Deserialize)]
pub struct CognitoClaims {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default, rename = "cognito:groups")]
    pub groups: Vec<String>,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub exp: u64,
}

/// Resolves the user name behind an access token.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn username(&self, access_token: &str) -> Result<String, AuthError>;
}

/// Cognito identity provider `GetUser` call.
#[derive(Debug, Clone)]
pub struct CognitoDirectory {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct GetUserRequest<'a> {
    #[serde(rename = "AccessToken")]
    access_token: &'a str,
}

#[derive(Deserialize)]
struct GetUserResponse {
    #[serde(rename = "Username")]
    username: String,
}

#[derive(Deserialize)]
struct CognitoFault {
    #[serde(default, rename = "__type")]
    kind: String,
    #[serde(default)]
    message: String,
}

impl CognitoDirectory {
    pub fn new(region: &str) -> Self {
        Self::with_endpoint(format!("https://cognito-idp.{}.amazonaws.com/", region))
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl UserDirectory for CognitoDirectory {
    async fn username(&self, access_token: &str) -> Result<String, AuthError> {
        let res = self
            .http
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/x-amz-json-1.1")
            .header("X-Amz-Target", "AWSCognitoIdentityProviderService.GetUser")
            .json(&GetUserRequest { access_token })
            .send()
            .await?;

        let status = res.status();
        let body = res.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<CognitoFault>(&body)
                .map(|fault| format!("{}: {}", fault.kind, fault.message))
                .unwrap_or_else(|_| status.to_string());
            return Err(AuthError::Directory(message));
        }

        serde_json::from_slice::<GetUserResponse>(&body)
            .map(|user| user.username)
            .map_err(|e| AuthError::Directory(e.to_string()))
    }
}

/// Bearer authentication against a Cognito user pool.
///
/// Only tokens issued by `issuer` are accepted, and signing keys are only
/// ever fetched from that issuer. Requests coming from `ranges` skip authentication and run as the
/// configured service user. Resolved user names are cached in the store for
/// `expire` (zero keeps them until removed).
pub struct CognitoAuth {
    directory: Arc<dyn UserDirectory>,
    cache: Arc<dyn KeyValueStore>,
    client_id: String,
    issuer: String,
    ranges: IpRanges,
    expire: Duration,
    service_user: CognitoUser,
    jwks: Jwks,
}

impl CognitoAuth {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        cache: Arc<dyn KeyValueStore>,
        client_id: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        let issuer = issuer.into();
        Self {
            directory,
            cache,
            client_id: client_id.into(),
            jwks: Jwks::new(&issuer),
            issuer,
            ranges: IpRanges::default(),
            expire: Duration::ZERO,
            service_user: CognitoUser::default(),
        }
    }

    pub fn bypass(mut self, ranges: IpRanges, username: &str, groups: Vec<String>) -> Self {
        self.ranges = ranges;
        self.service_user = CognitoUser::new(username, groups);
        self
    }

    pub fn expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    pub fn jwks(mut self, jwks: Jwks) -> Self {
        self.jwks = jwks;
        self
    }

    /// Checks signature, expiry, issuer and client id of `token`.
    pub async fn verify(&self, token: &str) -> Result<CognitoClaims, AuthError> {
        let header = decode_header(token)?;

        if !matches!(
            header.alg,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512
        ) {
            return Err(AuthError::UnexpectedSigningMethod(header.alg));
        }

        let kid = header.kid.ok_or(AuthError::MissingKid)?;

        let mut unverified = Validation::new(header.alg);
        unverified.insecure_disable_signature_validation();
        unverified.validate_exp = false;
        unverified.validate_aud = false;
        unverified.required_spec_claims.clear();

        let claims = decode::<CognitoClaims>(token, &DecodingKey::from_secret(&[]), &unverified)?
            .claims;

        if claims.client_id != self.client_id {
            return Err(AuthError::IncorrectClientId);
        }

        // 只信任配置的签发方，避免按 token 中的 iss 去拉取密钥
        if claims.iss != self.issuer {
            return Err(AuthError::IncorrectIssuer(claims.iss));
        }

        self.jwks.fetch().await?;
        let key = self.jwks.find(&kid)?.decoding_key()?;

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);

        Ok(decode::<CognitoClaims>(token, &key, &validation)?.claims)
    }

    /// Cached user name for `token`, asking the directory on a miss.
    async fn resolve_username(&self, token: &str) -> Result<String, HttpError> {
        let key = access_token_key(token);

        let cached = self.cache.get(&key).await.map_err(|e| {
            tracing::error!("failed to read cached user: {}", e);
            HttpError::internal_server_error().with_message(e.to_string())
        })?;

        if let Some(data) = cached {
            return serde_json::from_slice::<CognitoUser>(&data)
                .map(|user| user.username)
                .map_err(|e| HttpError::internal_server_error().with_message(e.to_string()));
        }

        let username = self
            .directory
            .username(token)
            .await
            .map_err(|e| HttpError::unauthorized().with_message(e.to_string()))?;

        let data = serde_json::to_vec(&CognitoUser::new(username.as_str(), Vec::new()))
            .map_err(|e| HttpError::internal_server_error().with_message(e.to_string()))?;

        if let Err(e) = self.cache.set(&key, &data, self.expire).await {
            tracing::warn!("failed to cache user {}: {}", username, e);
        }

        Ok(username)
    }
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();

    (!token.is_empty()).then(|| token.to_string())
}

async fn run_as(user: CognitoUser, mut req: Request<Body>, next: Next) -> Response {
    req.extensions_mut().insert(user.clone());
    let mut response = next.run(req).await;
    // 供访问日志读取
    response.extensions_mut().insert(user);
    response
}

pub async fn cognito_auth(
    State(auth): State<Arc<CognitoAuth>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !auth.ranges.is_empty() && client_ip(&req).is_some_and(|ip| auth.ranges.contains(ip)) {
        return run_as(auth.service_user.clone(), req, next).await;
    }

    let Some(token) = bearer_token(&req) else {
        return HttpError::unauthorized().into_response();
    };

    let claims = match auth.verify(&token).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("rejected access token: {}", e);
            return HttpError::unauthorized().into_response();
        }
    };

    let username = match auth.resolve_username(&token).await {
        Ok(username) => username,
        Err(e) => return e.into_response(),
    };

    run_as(CognitoUser::new(username, claims.groups), req, next).await
}
