//! Error responses for token endpoints.
//!
//! Every failure kind maps to its own status so callers can tell "log in
//! again" apart from "retry later".

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);

        if self.is_server_error() {
            tracing::error!(
                category = %self.category(),
                error = %self,
                "Token request failed"
            );
        }

        let body = json!({
            "error": self.error_code(),
            "error_description": self.to_string(),
        });

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// HTTP status for an error.
#[must_use]
pub fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::TokenNotFound => StatusCode::NOT_FOUND,
        AuthError::TokenRevoked => StatusCode::FORBIDDEN,
        AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
        AuthError::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AuthError::TokenNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AuthError::TokenRevoked), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&AuthError::TokenExpired), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&AuthError::storage("down")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&AuthError::invalid_request("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AuthError::internal("oops")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_error_sets_retry_after() {
        let response = AuthError::storage("down").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let response = AuthError::TokenRevoked.into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
