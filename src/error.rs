use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// JSON error body returned by every middleware rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpError {
    pub status: u16,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
        }
    }

    /// Error carrying the canonical reason phrase of `status`.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or_default())
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn bad_request() -> Self {
        Self::from_status(StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::from_status(StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::from_status(StatusCode::FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::from_status(StatusCode::NOT_FOUND)
    }

    pub fn unprocessable_entity() -> Self {
        Self::from_status(StatusCode::UNPROCESSABLE_ENTITY)
    }

    pub fn too_many_requests() -> Self {
        Self::from_status(StatusCode::TOO_MANY_REQUESTS)
    }

    pub fn internal_server_error() -> Self {
        Self::from_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_messages_use_reason_phrase() {
        assert_eq!(HttpError::not_found().message, "Not Found");
        assert_eq!(HttpError::too_many_requests().status, 429);
        assert_eq!(
            HttpError::unauthorized().with_message("token expired").message,
            "token expired"
        );
    }

    #[test]
    fn serializes_status_then_message() {
        let body = serde_json::to_string(&HttpError::forbidden()).unwrap();
        assert_eq!(body, r#"{"status":403,"message":"Forbidden"}"#);
    }
}
