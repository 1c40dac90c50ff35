use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::HttpError, user::CognitoUser};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    #[error("missing user in request context")]
    NoUser,
    #[error("invalid policy line {line}: {reason}")]
    Policy { line: usize, reason: String },
    #[error("{0}")]
    Enforcer(String),
}

/// Decides whether a request may proceed.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, parts: &Parts) -> Result<bool, AuthzError>;
}

/// Answers `subject` may perform `action` on `object`.
pub trait Enforcer: Send + Sync {
    fn enforce(&self, subject: &str, object: &str, action: &str) -> Result<bool, AuthzError>;
}

/// Authorizes with the groups of the [`CognitoUser`] found in the request,
/// using the request path as object and the method as action. One allowed
/// group is enough.
pub struct PolicyAuthorizer<E> {
    enforcer: E,
}

impl<E: Enforcer> PolicyAuthorizer<E> {
    pub fn new(enforcer: E) -> Self {
        Self { enforcer }
    }
}

#[async_trait]
impl<E: Enforcer> Authorizer for PolicyAuthorizer<E> {
    async fn authorize(&self, parts: &Parts) -> Result<bool, AuthzError> {
        let user = parts
            .extensions
            .get::<CognitoUser>()
            .ok_or(AuthzError::NoUser)?;

        for role in user.groups() {
            if self
                .enforcer
                .enforce(role, parts.uri.path(), parts.method.as_str())?
            {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Policy {
    subject: String,
    object: String,
    action: String,
}

impl Policy {
    fn matches(&self, subject: &str, object: &str, action: &str) -> bool {
        let object_ok = match self.object.strip_suffix('*') {
            Some(prefix) => object.starts_with(prefix),
            None => self.object == object,
        };

        self.subject == subject
            && object_ok
            && (self.action == "*" || self.action.eq_ignore_ascii_case(action))
    }
}

/// In-memory policy list.
///
/// Lines look like `p, admin, /data/*, GET`: a trailing `*` on the object
/// matches any suffix and an action of `*` matches any method. Blank lines and
/// `#` comments are skipped.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: Vec<Policy>,
}

impl PolicyTable {
    pub fn from_csv(csv: &str) -> Result<Self, AuthzError> {
        let mut policies = Vec::new();

        for (idx, line) in csv.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                ["p", subject, object, action] => policies.push(Policy {
                    subject: subject.to_string(),
                    object: object.to_string(),
                    action: action.to_string(),
                }),
                _ => {
                    return Err(AuthzError::Policy {
                        line: idx + 1,
                        reason: "expected \"p, subject, object, action\"".to_string(),
                    });
                }
            }
        }

        Ok(Self { policies })
    }

    pub fn allow(mut self, subject: &str, object: &str, action: &str) -> Self {
        self.policies.push(Policy {
            subject: subject.to_string(),
            object: object.to_string(),
            action: action.to_string(),
        });
        self
    }
}

impl Enforcer for PolicyTable {
    fn enforce(&self, subject: &str, object: &str, action: &str) -> Result<bool, AuthzError> {
        Ok(self
            .policies
            .iter()
            .any(|policy| policy.matches(subject, object, action)))
    }
}

/// Middleware state wrapping any [`Authorizer`].
#[derive(Clone)]
pub struct Rbac {
    authorizer: Arc<dyn Authorizer>,
}

impl Rbac {
    pub fn new(authorizer: impl Authorizer + 'static) -> Self {
        Self {
            authorizer: Arc::new(authorizer),
        }
    }
}

pub async fn rbac(State(rbac): State<Arc<Rbac>>, req: Request<Body>, next: Next) -> Response {
    let (parts, body) = req.into_parts();

    match rbac.authorizer.authorize(&parts).await {
        Ok(true) => next.run(Request::from_parts(parts, body)).await,
        Ok(false) => HttpError::unauthorized().into_response(),
        Err(e) => {
            tracing::error!("authorization failed: {}", e);
            HttpError::internal_server_error()
                .with_message(e.to_string())
                .into_response()
        }
    }
}
