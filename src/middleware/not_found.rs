use crate::error::HttpError;

/// Fallback handler for unmatched routes.
pub async fn not_found() -> HttpError {
    HttpError::not_found()
}
