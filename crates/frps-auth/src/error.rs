//! Error types for the authorization service.

use crate::store::StoreError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Service error types.
///
/// Handshake rejections are not errors; see [`crate::handshake::RejectReason`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authorization record not found: {0}")]
    NotFound(String),

    #[error("Authorization record already exists: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AuthError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AuthError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AuthError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
            AuthError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_FAILURE"),
        };

        // Store internals stay in the log
        let message = match &self {
            AuthError::Store(e) => {
                error!(error = %e, "Store failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        if matches!(self, AuthError::Unauthorized) {
            return (
                status,
                [(header::WWW_AUTHENTICATE, r#"Basic realm="Restricted""#)],
                Json(body),
            )
                .into_response();
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AuthError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AuthError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AuthError::Conflict("x".into()), StatusCode::CONFLICT),
            (AuthError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AuthError::RateLimitExceeded, StatusCode::TOO_MANY_REQUESTS),
            (
                AuthError::Store(StoreError::Backend("disk full".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_unauthorized_sets_challenge() {
        let response = AuthError::Unauthorized.into_response();
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            r#"Basic realm="Restricted""#
        );
    }
}
