//! Arc-owning storage adapter for use behind `Arc<dyn RefreshTokenStorage>`.
//!
//! Wraps the lifetime-based [`TokenStorage`] and owns an `Arc<PgPool>`.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use tokenkeep_auth::storage::RefreshTokenStorage;
use tokenkeep_auth::types::{NewRefreshToken, RefreshToken, TokenStatus, UserId};
use tokenkeep_auth::{AuthError, AuthResult};

use crate::PgPool;
use crate::token::{Rotation, TokenStorage};

/// Arc-owning PostgreSQL refresh token storage adapter.
#[derive(Clone)]
pub struct ArcRefreshTokenStorage {
    pool: Arc<PgPool>,
}

impl ArcRefreshTokenStorage {
    /// Create a new Arc-owning refresh token storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn storage(&self) -> TokenStorage<'_> {
        TokenStorage::new(&self.pool)
    }
}

#[async_trait]
impl RefreshTokenStorage for ArcRefreshTokenStorage {
    async fn create(&self, token: &NewRefreshToken) -> AuthResult<RefreshToken> {
        Ok(self.storage().create(token).await?)
    }

    async fn find_by_jti(&self, jti: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.storage().find_by_jti(jti).await?)
    }

    async fn rotate(
        &self,
        old_jti: &str,
        replacement: &NewRefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<RefreshToken> {
        match self.storage().rotate(old_jti, replacement, now).await? {
            Rotation::Rotated(token) => Ok(token),
            Rotation::NotFound => Err(AuthError::TokenNotFound),
            Rotation::Rejected(TokenStatus::Revoked) => Err(AuthError::TokenRevoked),
            Rotation::Rejected(TokenStatus::Expired) => Err(AuthError::TokenExpired),
            Rotation::Rejected(TokenStatus::Active) => Err(AuthError::internal(
                "rotation rejected an active token",
            )),
        }
    }

    async fn revoke(&self, jti: &str) -> AuthResult<bool> {
        Ok(self.storage().revoke(jti).await?)
    }

    async fn revoke_by_user(&self, user_id: UserId) -> AuthResult<u64> {
        Ok(self.storage().revoke_all_for_user(user_id).await?)
    }

    async fn delete_by_user(&self, user_id: UserId) -> AuthResult<u64> {
        Ok(self.storage().delete_all_for_user(user_id).await?)
    }

    async fn purge_expired(&self, older_than: OffsetDateTime) -> AuthResult<u64> {
        Ok(self.storage().delete_expired(older_than).await?)
    }

    async fn list_active_by_user(
        &self,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<RefreshToken>> {
        Ok(self.storage().list_active_for_user(user_id, now).await?)
    }
}
