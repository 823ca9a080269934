//! Refresh token domain type.
//!
//! A refresh token is identified by its `jti`, an opaque random string handed
//! to the client. The row is mutated exactly once at most, when `revoked`
//! flips to `true`; expiry is derived from `expires_at` and never stored.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{AuthError, AuthResult};

/// Identifier of a user. Users are owned by another subsystem.
pub type UserId = i64;

/// Lifecycle state of a refresh token at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    /// Not revoked and not yet expired.
    Active,
    /// Explicitly revoked. Terminal.
    Revoked,
    /// Past `expires_at`. Terminal.
    Expired,
}

/// Refresh token stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// Store-assigned row identifier.
    pub id: i64,

    /// Owning user.
    pub user_id: UserId,

    /// Globally unique token identifier; the lookup key.
    pub jti: String,

    /// Absolute expiry instant.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Set once on revocation, never reset.
    pub revoked: bool,

    /// When this token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl RefreshToken {
    /// Returns `true` if `now` is at or past `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if this token is usable at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: OffsetDateTime) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    /// Lifecycle state at `now`. Revocation takes precedence over expiry.
    #[must_use]
    pub fn status_at(&self, now: OffsetDateTime) -> TokenStatus {
        if self.revoked {
            TokenStatus::Revoked
        } else if self.is_expired_at(now) {
            TokenStatus::Expired
        } else {
            TokenStatus::Active
        }
    }

    /// Checks that the token is usable at `now` and returns its owner.
    ///
    /// # Errors
    ///
    /// Returns `TokenRevoked` or `TokenExpired`.
    pub fn ensure_usable_at(&self, now: OffsetDateTime) -> AuthResult<UserId> {
        match self.status_at(now) {
            TokenStatus::Active => Ok(self.user_id),
            TokenStatus::Revoked => Err(AuthError::TokenRevoked),
            TokenStatus::Expired => Err(AuthError::TokenExpired),
        }
    }

    /// Generate a cryptographically secure random `jti`.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate_jti() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// A refresh token that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefreshToken {
    /// Owning user.
    pub user_id: UserId,
    /// Freshly generated identifier.
    pub jti: String,
    /// Absolute expiry instant.
    pub expires_at: OffsetDateTime,
}

impl NewRefreshToken {
    /// Creates a token for `user_id` expiring `ttl` after `now`.
    #[must_use]
    pub fn generate(user_id: UserId, now: OffsetDateTime, ttl: time::Duration) -> Self {
        Self {
            user_id,
            jti: RefreshToken::generate_jti(),
            expires_at: now.saturating_add(ttl),
        }
    }
}
