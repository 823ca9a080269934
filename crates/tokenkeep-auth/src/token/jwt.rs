//! Access token signing.
//!
//! Access tokens are short-lived HS256 JWTs signed with the shared
//! `JWT_SECRET`. They carry no refresh-token state; a revoked refresh token
//! stops producing new access tokens, and existing ones simply run out.
//!
//! # Example
//!
//! ```ignore
//! let signer = AccessTokenSigner::new(&settings.jwt_secret, config.access_ttl())?;
//! let signed = signer.sign(user_id)?;
//! let claims = signer.verify(&signed.token)?;
//! ```

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::MAX_ACCESS_TOKEN_LIFETIME;
use crate::types::UserId;
use crate::{AuthError, AuthResult};

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user id as a decimal string.
    pub sub: String,
    /// Unique token id.
    pub jti: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

impl AccessClaims {
    /// Parses `sub` back into a [`UserId`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if `sub` is not an integer.
    pub fn user_id(&self) -> AuthResult<UserId> {
        self.sub
            .parse()
            .map_err(|_| AuthError::invalid_request("access token subject is not a user id"))
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct SignedAccessToken {
    /// Compact JWT.
    pub token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// HS256 signer for access tokens.
pub struct AccessTokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for AccessTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl AccessTokenSigner {
    /// Creates a signer from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the secret is empty or the TTL is not
    /// positive or exceeds [`MAX_ACCESS_TOKEN_LIFETIME`].
    pub fn new(secret: &str, ttl: Duration) -> AuthResult<Self> {
        if secret.is_empty() {
            return Err(AuthError::configuration("JWT secret must not be empty"));
        }
        if !ttl.is_positive() {
            return Err(AuthError::configuration(
                "access token lifetime must be positive",
            ));
        }
        if ttl.whole_seconds() > MAX_ACCESS_TOKEN_LIFETIME.as_secs() as i64 {
            return Err(AuthError::configuration(format!(
                "access token lifetime must be at most {} seconds",
                MAX_ACCESS_TOKEN_LIFETIME.as_secs()
            )));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    /// Signs an access token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if encoding fails.
    pub fn sign(&self, user_id: UserId) -> AuthResult<SignedAccessToken> {
        let now = OffsetDateTime::now_utc();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.unix_timestamp(),
            exp: now
                .checked_add(self.ttl)
                .ok_or_else(|| AuthError::configuration("access token expiry out of range"))?
                .unix_timestamp(),
        };
        self.encode(&claims).map(|token| SignedAccessToken {
            token,
            expires_in: self.ttl.whole_seconds(),
        })
    }

    /// Verifies signature and expiry and returns the claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenExpired` for an expired token, `InvalidRequest` for any
    /// other decoding failure.
    pub fn verify(&self, token: &str) -> AuthResult<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::invalid_request(format!("invalid access token: {e}")),
            })
    }

    fn encode(&self, claims: &AccessClaims) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("failed to sign access token: {e}")))
    }
}
