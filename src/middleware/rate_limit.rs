use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    error::HttpError,
    limiter::{EntityLimiter, RequestLimiter, VisitorLimiter},
    user::CognitoUser,
    utils::{IpRanges, client_ip},
};

/// 按客户端 IP 限流
pub struct IpLimit {
    visitors: Arc<VisitorLimiter>,
    ranges: IpRanges,
}

impl IpLimit {
    /// `burst` requests per IP, refilled at one request per second.
    pub fn new(burst: NonZeroU32) -> Self {
        Self::with_visitors(Arc::new(VisitorLimiter::new(burst)))
    }

    /// Shares an existing table, e.g. one whose cleanup task is already
    /// running.
    pub fn with_visitors(visitors: Arc<VisitorLimiter>) -> Self {
        Self {
            visitors,
            ranges: IpRanges::default(),
        }
    }

    /// Only addresses inside `ranges` are limited; others pass untouched.
    pub fn only(mut self, ranges: IpRanges) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn visitors(&self) -> &Arc<VisitorLimiter> {
        &self.visitors
    }

    fn check(&self, req: &Request<Body>) -> bool {
        let ip = client_ip(req);

        if !self.ranges.is_empty() && !ip.is_some_and(|ip| self.ranges.contains(ip)) {
            return true;
        }

        let identifier = ip.map(|ip| ip.to_string());
        self.visitors.allow(identifier.as_deref().unwrap_or("unknown"))
    }
}

pub async fn limit(
    State(limiter): State<Arc<IpLimit>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.check(&req) {
        tracing::debug!(ip = ?client_ip(&req), "ip limit exceeded");
        return HttpError::too_many_requests().into_response();
    }

    next.run(req).await
}

/// What to do when the quota store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Reject the request with 500.
    #[default]
    Closed,
    /// Log the error and let the request through.
    Open,
}

/// 按用户限流，计数保存在外部存储中
pub struct LimitPerUser {
    limiter: EntityLimiter,
    groups: Vec<String>,
    failure: FailurePolicy,
}

impl LimitPerUser {
    /// Counts requests under the entity `limit:<key>`.
    pub fn new(limiter: &RequestLimiter, key: &str) -> Self {
        Self {
            limiter: limiter.scoped(format!("limit:{}", key)),
            groups: Vec::new(),
            failure: FailurePolicy::default(),
        }
    }

    /// Only users in one of `groups` are metered.
    pub fn for_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn failure_policy(mut self, failure: FailurePolicy) -> Self {
        self.failure = failure;
        self
    }

    fn store_failure(&self, err: impl std::fmt::Display) -> Option<Response> {
        match self.failure {
            FailurePolicy::Closed => {
                tracing::error!("per-user limit store failure: {}", err);
                Some(
                    HttpError::internal_server_error()
                        .with_message(err.to_string())
                        .into_response(),
                )
            }
            FailurePolicy::Open => {
                tracing::warn!("per-user limit store failure, letting request through: {}", err);
                None
            }
        }
    }
}

pub async fn limit_per_user(
    State(limit): State<Arc<LimitPerUser>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(user) = req.extensions().get::<CognitoUser>().cloned() else {
        return HttpError::unauthorized().into_response();
    };

    if !limit.groups.is_empty() && !user.is_in_group(&limit.groups) {
        return next.run(req).await;
    }

    match limit.limiter.allow(&user.username).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(
                username = %user.username,
                entity = limit.limiter.entity(),
                "per-user limit exceeded"
            );
            return HttpError::too_many_requests().into_response();
        }
        Err(e) => {
            if let Some(response) = limit.store_failure(e) {
                return response;
            }
        }
    }

    if let Err(e) = limit.limiter.seen(&user.username).await {
        if let Some(response) = limit.store_failure(e) {
            return response;
        }
    }

    next.run(req).await
}
