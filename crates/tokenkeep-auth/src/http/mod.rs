//! Axum HTTP handlers for refresh token endpoints.
//!
//! # Usage
//!
//! ```ignore
//! use tokenkeep_auth::http::{TokenState, token_routes};
//!
//! let app = Router::new().merge(token_routes(TokenState::new(service, signer)));
//! ```

pub mod error;
pub mod token;

use std::sync::Arc;

use axum::{Router, routing::post};

use crate::token::{AccessTokenSigner, RefreshTokenService};

pub use token::{
    LogoutAllResponse, RefreshTokenRequest, TokenResponse, logout_all_handler, refresh_handler,
    revoke_handler,
};

/// State shared by the token endpoints.
#[derive(Clone)]
pub struct TokenState {
    /// Refresh token lifecycle service.
    pub service: Arc<RefreshTokenService>,
    /// Access token signer.
    pub signer: Arc<AccessTokenSigner>,
}

impl TokenState {
    /// Creates a new token state.
    pub fn new(service: Arc<RefreshTokenService>, signer: Arc<AccessTokenSigner>) -> Self {
        Self { service, signer }
    }
}

/// Builds the `/auth/*` router.
pub fn token_routes(state: TokenState) -> Router {
    Router::new()
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/revoke", post(revoke_handler))
        .route("/auth/logout-all", post(logout_all_handler))
        .with_state(state)
}
