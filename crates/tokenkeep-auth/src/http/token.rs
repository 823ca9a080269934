//! Refresh, revoke and logout-all endpoint handlers.
//!
//! # Request Format
//!
//! ```text
//! POST /auth/refresh
//! Content-Type: application/json
//!
//! {"refresh_token": "<jti>"}
//! ```
//!
//! `/auth/revoke` and `/auth/logout-all` take the same body.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::TokenState;
use crate::{AuthError, AuthResult};

/// Body accepted by all token endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshTokenRequest {
    /// The refresh token (`jti`) presented by the client.
    pub refresh_token: String,
}

/// Successful refresh response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Newly signed access token.
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Replacement refresh token.
    pub refresh_token: String,
    /// Expiry of the replacement refresh token.
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_expires_at: OffsetDateTime,
}

/// Logout-all response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutAllResponse {
    /// Number of tokens revoked.
    pub revoked: u64,
}

/// Unwraps a JSON body and rejects an empty token.
fn presented_token(body: Result<Json<RefreshTokenRequest>, JsonRejection>) -> AuthResult<String> {
    let Json(request) = body.map_err(|e| AuthError::invalid_request(e.body_text()))?;
    if request.refresh_token.is_empty() {
        return Err(AuthError::invalid_request(
            "Missing required 'refresh_token' field",
        ));
    }
    Ok(request.refresh_token)
}

/// Rotates the presented refresh token and returns a fresh token pair.
///
/// # Response
///
/// - 200 OK: new access token and replacement refresh token
/// - 400 Bad Request: malformed body
/// - 401 / 403 / 404: token expired / revoked / unknown
/// - 503 Service Unavailable: storage failure, retry later
pub async fn refresh_handler(
    State(state): State<TokenState>,
    body: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let jti = presented_token(body)?;

    let refresh = state.service.rotate_default(&jti).await?;
    let access = state.signer.sign(refresh.user_id)?;

    Ok(Json(TokenResponse {
        access_token: access.token,
        token_type: "Bearer".to_string(),
        expires_in: access.expires_in,
        refresh_token: refresh.jti,
        refresh_expires_at: refresh.expires_at,
    }))
}

/// Revokes the presented refresh token.
///
/// Idempotent: unknown and already-revoked tokens also get 204 No Content.
pub async fn revoke_handler(
    State(state): State<TokenState>,
    body: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let jti = presented_token(body)?;
    state.service.revoke(&jti).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Revokes every refresh token of the user owning the presented token.
///
/// The presented token must itself be usable, so a leaked revoked token
/// cannot be used to log a user out.
pub async fn logout_all_handler(
    State(state): State<TokenState>,
    body: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<LogoutAllResponse>, AuthError> {
    let jti = presented_token(body)?;
    let user_id = state.service.validate(&jti).await?;
    let revoked = state.service.revoke_all_for_user(user_id).await?;
    Ok(Json(LogoutAllResponse { revoked }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use serde_json::Value;
    use time::Duration;
    use tower::ServiceExt;

    use super::*;
    use crate::config::TokenConfig;
    use crate::http::token_routes;
    use crate::storage::InMemoryRefreshTokenStorage;
    use crate::token::{AccessTokenSigner, RefreshTokenService};

    fn setup() -> (Router, Arc<RefreshTokenService>, Arc<AccessTokenSigner>) {
        let config = TokenConfig::default();
        let service = Arc::new(RefreshTokenService::new(
            Arc::new(InMemoryRefreshTokenStorage::new()),
            &config,
        ));
        let signer =
            Arc::new(AccessTokenSigner::new("handler-test-secret", config.access_ttl()).unwrap());
        let router = token_routes(TokenState::new(service.clone(), signer.clone()));
        (router, service, signer)
    }

    async fn post(router: &Router, path: &str, body: &str) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(
                Request::post(path)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn body_for(jti: &str) -> String {
        serde_json::json!({ "refresh_token": jti }).to_string()
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_signs() {
        let (router, service, signer) = setup();
        let token = service.issue(7, Duration::days(1)).await.unwrap();

        let (status, body) = post(&router, "/auth/refresh", &body_for(&token.jti)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 900);

        let new_jti = body["refresh_token"].as_str().unwrap();
        assert_ne!(new_jti, token.jti);
        assert_eq!(service.validate(new_jti).await.unwrap(), 7);

        let claims = signer
            .verify(body["access_token"].as_str().unwrap())
            .unwrap();
        assert_eq!(claims.sub, "7");

        // Replaying the old token is rejected as revoked
        let (status, body) = post(&router, "/auth/refresh", &body_for(&token.jti)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "token_revoked");
    }

    #[tokio::test]
    async fn test_refresh_failure_statuses() {
        let (router, service, _) = setup();

        let (status, body) = post(&router, "/auth/refresh", &body_for("unknown")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "token_not_found");

        let expired = service.issue(1, Duration::seconds(-1)).await.unwrap();
        let (status, body) = post(&router, "/auth/refresh", &body_for(&expired.jti)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token_expired");

        let (status, body) = post(&router, "/auth/refresh", &body_for("")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");

        let (status, body) = post(&router, "/auth/refresh", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (router, service, _) = setup();
        let token = service.issue(1, Duration::days(1)).await.unwrap();

        let (status, _) = post(&router, "/auth/revoke", &body_for(&token.jti)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = post(&router, "/auth/revoke", &body_for(&token.jti)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = post(&router, "/auth/revoke", &body_for("unknown")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        assert!(matches!(
            service.validate(&token.jti).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_logout_all() {
        let (router, service, _) = setup();
        let a = service.issue(3, Duration::days(1)).await.unwrap();
        let b = service.issue(3, Duration::days(1)).await.unwrap();
        let other = service.issue(4, Duration::days(1)).await.unwrap();

        let (status, body) = post(&router, "/auth/logout-all", &body_for(&a.jti)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["revoked"], 2);

        assert!(service.validate(&b.jti).await.is_err());
        assert_eq!(service.validate(&other.jti).await.unwrap(), 4);

        // The presented token is now revoked itself
        let (status, _) = post(&router, "/auth/logout-all", &body_for(&a.jti)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
