//! Refresh token storage trait.
//!
//! # Consistency
//!
//! - `rotate` must be atomic: the old row is revoked and the replacement
//!   inserted in one transaction, or nothing changes
//! - `revoke_by_user` must revoke all matching rows in one statement
//! - Implementations must not cache token state across calls

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::{NewRefreshToken, RefreshToken, UserId};

/// Storage trait for refresh tokens.
///
/// Lifecycle errors (`TokenNotFound`, `TokenRevoked`, `TokenExpired`) are only
/// produced by `rotate`, which has to validate under the same lock it writes
/// with. Every other failure is reported as `AuthError::Storage`.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new refresh token and returns the persisted row.
    ///
    /// # Errors
    ///
    /// Returns an error if the `jti` already exists or storage is unavailable.
    async fn create(&self, token: &NewRefreshToken) -> AuthResult<RefreshToken>;

    /// Finds a refresh token by its `jti`, regardless of status.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_jti(&self, jti: &str) -> AuthResult<Option<RefreshToken>>;

    /// Atomically replaces the token `old_jti` with `replacement`.
    ///
    /// Locks the old row, checks it is usable at `now`, marks it revoked and
    /// inserts `replacement` for the old row's user. The `user_id` carried by
    /// `replacement` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `TokenNotFound`, `TokenRevoked` or `TokenExpired` for an
    /// unusable old token, or `Storage` if the transaction fails. In every
    /// error case nothing is written.
    async fn rotate(
        &self,
        old_jti: &str,
        replacement: &NewRefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<RefreshToken>;

    /// Marks a token revoked.
    ///
    /// Returns `true` if this call flipped the flag, `false` if the token was
    /// already revoked or does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke(&self, jti: &str) -> AuthResult<bool>;

    /// Revokes every non-revoked token owned by `user_id`.
    ///
    /// Returns the number of tokens revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_by_user(&self, user_id: UserId) -> AuthResult<u64>;

    /// Deletes every token owned by `user_id`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_by_user(&self, user_id: UserId) -> AuthResult<u64>;

    /// Deletes rows whose `expires_at` is strictly before `older_than`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn purge_expired(&self, older_than: OffsetDateTime) -> AuthResult<u64>;

    /// Lists tokens of `user_id` that are usable at `now`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_active_by_user(
        &self,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<RefreshToken>>;
}
