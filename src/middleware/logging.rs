use axum::{body::Body, http::Request, middleware::Next, response::Response};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::{user::CognitoUser, utils::client_ip};

/// One access log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub request_time: String,
    pub ip: String,
    pub path: String,
    pub status: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub user_groups: Vec<String>,
}

impl LogEntry {
    pub fn new(
        time: DateTime<Utc>,
        ip: String,
        path: String,
        status: u16,
        user: Option<&CognitoUser>,
    ) -> Self {
        Self {
            request_time: time.to_rfc3339_opts(SecondsFormat::Secs, true),
            ip,
            path,
            status,
            username: user.map(|u| u.username.clone()).unwrap_or_default(),
            user_groups: user.map(|u| u.groups().to_vec()).unwrap_or_default(),
        }
    }
}

/// Logs every request as a JSON line; server errors are logged at error
/// level.
pub async fn request_log(req: Request<Body>, next: Next) -> Response {
    let time = Utc::now();
    let ip = client_ip(&req).map(|ip| ip.to_string()).unwrap_or_default();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let entry = LogEntry::new(
        time,
        ip,
        path,
        response.status().as_u16(),
        response.extensions().get::<CognitoUser>(),
    );

    match serde_json::to_string(&entry) {
        Ok(line) if response.status().is_server_error() => error!(target: "access", "{}", line),
        Ok(line) => info!(target: "access", "{}", line),
        Err(e) => error!("failed to encode access log entry: {}", e),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entry_includes_user_when_present() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let user = CognitoUser::new("alex", vec!["admin".into()]);
        let entry = LogEntry::new(time, "10.0.0.1".into(), "/v1/pages".into(), 200, Some(&user));

        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"request_time":"2024-05-01T12:00:00Z","ip":"10.0.0.1","path":"/v1/pages","status":200,"username":"alex","user_groups":["admin"]}"#
        );
    }

    #[test]
    fn entry_without_user() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let entry = LogEntry::new(time, String::new(), "/".into(), 404, None);

        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"request_time":"2024-05-01T12:00:00Z","ip":"","path":"/","status":404}"#
        );
    }
}
