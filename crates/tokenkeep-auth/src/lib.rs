//! # tokenkeep-auth
//!
//! Refresh-token lifecycle management for the Tokenkeep backend.
//!
//! This crate provides:
//! - The refresh token domain type and its lifecycle predicates
//! - A storage trait for refresh token backends, plus an in-memory backend
//! - [`RefreshTokenService`], which issues, validates, rotates and revokes tokens
//! - A short-lived access token signer
//! - Axum handlers for the refresh, revoke and logout-all endpoints
//!
//! ## Modules
//!
//! - [`config`] - Token lifetimes and store-level policies
//! - [`types`] - Refresh token domain types
//! - [`storage`] - Storage traits and the in-memory backend
//! - [`token`] - Lifecycle service and access token signing
//! - [`http`] - Axum HTTP handlers

pub mod config;
pub mod error;
pub mod http;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{
    ConfigError, MAX_ACCESS_TOKEN_LIFETIME, MAX_REFRESH_TOKEN_LIFETIME, TokenConfig,
    UserDeletionPolicy,
};
pub use error::{AuthError, ErrorCategory};
pub use http::{TokenState, token_routes};
pub use storage::{InMemoryRefreshTokenStorage, RefreshTokenStorage};
pub use token::jwt::{AccessClaims, AccessTokenSigner, SignedAccessToken};
pub use token::service::RefreshTokenService;
pub use types::{NewRefreshToken, RefreshToken, TokenStatus, UserId};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
