//! Token lifecycle and signing.
//!
//! - [`service`] - refresh token lifecycle (issue, validate, rotate, revoke, purge)
//! - [`jwt`] - short-lived access token signing

pub mod jwt;
pub mod service;

pub use jwt::{AccessClaims, AccessTokenSigner, SignedAccessToken};
pub use service::RefreshTokenService;
