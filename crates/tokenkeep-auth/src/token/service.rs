//! Refresh token lifecycle service.
//!
//! [`RefreshTokenService`] is the single source of truth for whether a
//! refresh token is still good and who it belongs to. Every call re-reads the
//! backing store; nothing is cached between requests.
//!
//! # Lifecycle
//!
//! ```text
//! issue ──> ACTIVE ──revoke/rotate──> REVOKED
//!             │
//!             └──── now >= expires_at ──> EXPIRED
//! ```
//!
//! Both terminal states are permanent. Rows leave the store only through
//! [`purge_expired`](RefreshTokenService::purge_expired) (by expiry, so revoked
//! rows are retained until they would have expired anyway) or
//! [`forget_user`](RefreshTokenService::forget_user).

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::config::{TokenConfig, UserDeletionPolicy};
use crate::storage::RefreshTokenStorage;
use crate::types::{NewRefreshToken, RefreshToken, UserId};
use crate::{AuthError, AuthResult};

/// Refresh token lifecycle manager.
pub struct RefreshTokenService {
    storage: Arc<dyn RefreshTokenStorage>,
    config: TokenConfig,
}

impl RefreshTokenService {
    /// Creates a service over `storage` with the given configuration.
    #[must_use]
    pub fn new(storage: Arc<dyn RefreshTokenStorage>, config: &TokenConfig) -> Self {
        Self {
            storage,
            config: config.clone(),
        }
    }

    /// Returns the configuration this service was built with.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issues a new refresh token for `user_id` valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the token cannot be persisted.
    pub async fn issue(&self, user_id: UserId, ttl: Duration) -> AuthResult<RefreshToken> {
        let new = NewRefreshToken::generate(user_id, OffsetDateTime::now_utc(), ttl);
        let token = self.storage.create(&new).await.inspect_err(|e| {
            tracing::error!(user_id, error = %e, "Failed to persist refresh token");
        })?;

        tracing::debug!(
            user_id,
            token_id = token.id,
            expires_at = %token.expires_at,
            "Refresh token issued"
        );
        Ok(token)
    }

    /// Issues a refresh token with the configured default lifetime.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the token cannot be persisted.
    pub async fn issue_default(&self, user_id: UserId) -> AuthResult<RefreshToken> {
        self.issue(user_id, self.config.refresh_ttl()).await
    }

    /// Validates `jti` and returns the owning user. Never mutates state.
    ///
    /// # Errors
    ///
    /// Returns `TokenNotFound`, `TokenRevoked`, `TokenExpired`, or `Storage`.
    pub async fn validate(&self, jti: &str) -> AuthResult<UserId> {
        let token = self
            .storage
            .find_by_jti(jti)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        token.ensure_usable_at(OffsetDateTime::now_utc())
    }

    /// Revokes `old_jti` and issues a replacement for the same user, atomically.
    ///
    /// Of several concurrent rotations of the same token, exactly one
    /// succeeds; the others see `TokenRevoked`.
    ///
    /// # Errors
    ///
    /// Returns `TokenNotFound`, `TokenRevoked`, `TokenExpired`, or `Storage`.
    /// Nothing is written on error.
    pub async fn rotate(&self, old_jti: &str, ttl: Duration) -> AuthResult<RefreshToken> {
        let now = OffsetDateTime::now_utc();
        // user_id is filled in by the backend from the locked old row
        let replacement = NewRefreshToken::generate(0, now, ttl);

        match self.storage.rotate(old_jti, &replacement, now).await {
            Ok(token) => {
                tracing::info!(
                    user_id = token.user_id,
                    token_id = token.id,
                    "Refresh token rotated"
                );
                Ok(token)
            }
            Err(e) if e.is_token_error() => {
                tracing::info!(reason = %e, "Refresh token rotation rejected");
                Err(e)
            }
            Err(e) => {
                tracing::error!(error = %e, "Refresh token rotation failed");
                Err(e)
            }
        }
    }

    /// Rotates with the configured default lifetime.
    ///
    /// # Errors
    ///
    /// See [`rotate`](Self::rotate).
    pub async fn rotate_default(&self, old_jti: &str) -> AuthResult<RefreshToken> {
        self.rotate(old_jti, self.config.refresh_ttl()).await
    }

    /// Revokes `jti`. Unknown and already-revoked tokens succeed trivially.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the update fails.
    pub async fn revoke(&self, jti: &str) -> AuthResult<()> {
        let changed = self.storage.revoke(jti).await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to revoke refresh token");
        })?;
        if changed {
            tracing::info!("Refresh token revoked");
        }
        Ok(())
    }

    /// Revokes every live token owned by `user_id` and returns the count.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the update fails.
    pub async fn revoke_all_for_user(&self, user_id: UserId) -> AuthResult<u64> {
        let count = self.storage.revoke_by_user(user_id).await.inspect_err(|e| {
            tracing::error!(user_id, error = %e, "Failed to revoke user's refresh tokens");
        })?;
        tracing::info!(user_id, count, "Revoked all refresh tokens for user");
        Ok(count)
    }

    /// Deletes rows with `expires_at < older_than` and returns the count.
    ///
    /// Only touches tokens that are already permanently invalid, so it can run
    /// alongside every other operation.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the delete fails.
    pub async fn purge_expired(&self, older_than: OffsetDateTime) -> AuthResult<u64> {
        let count = self.storage.purge_expired(older_than).await?;
        if count > 0 {
            tracing::info!(count, older_than = %older_than, "Purged expired refresh tokens");
        }
        Ok(count)
    }

    /// Lists the active tokens of `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the query fails.
    pub async fn list_active(&self, user_id: UserId) -> AuthResult<Vec<RefreshToken>> {
        self.storage
            .list_active_by_user(user_id, OffsetDateTime::now_utc())
            .await
    }

    /// Applies the configured [`UserDeletionPolicy`] to `user_id`'s tokens.
    ///
    /// Must run before the user row itself is deleted. Returns the number of
    /// rows deleted (`Cascade`) or revoked (`Revoke`).
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the operation fails.
    pub async fn forget_user(&self, user_id: UserId) -> AuthResult<u64> {
        let count = match self.config.user_deletion_policy {
            UserDeletionPolicy::Cascade => self.storage.delete_by_user(user_id).await?,
            UserDeletionPolicy::Revoke => self.storage.revoke_by_user(user_id).await?,
        };
        tracing::info!(
            user_id,
            count,
            policy = ?self.config.user_deletion_policy,
            "Applied user deletion policy to refresh tokens"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryRefreshTokenStorage;
    use std::collections::HashSet;

    fn service_with(config: TokenConfig) -> (RefreshTokenService, Arc<InMemoryRefreshTokenStorage>) {
        let storage = Arc::new(InMemoryRefreshTokenStorage::new());
        let service = RefreshTokenService::new(storage.clone(), &config);
        (service, storage)
    }

    fn service() -> RefreshTokenService {
        service_with(TokenConfig::default()).0
    }

    #[tokio::test]
    async fn test_validate_after_issue() {
        let service = service();
        let token = service.issue(1, Duration::days(30)).await.unwrap();

        assert_eq!(service.validate(&token.jti).await.unwrap(), 1);
        assert!(!token.revoked);
    }

    #[tokio::test]
    async fn test_validate_unknown_jti() {
        let service = service();
        assert!(matches!(
            service.validate("no-such-token").await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_revoke_is_permanent() {
        let service = service();
        let token = service.issue(1, Duration::days(30)).await.unwrap();

        service.revoke(&token.jti).await.unwrap();
        for _ in 0..3 {
            assert!(matches!(
                service.validate(&token.jti).await,
                Err(AuthError::TokenRevoked)
            ));
        }
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let service = service();
        let token = service.issue(1, Duration::days(30)).await.unwrap();

        service.revoke(&token.jti).await.unwrap();
        service.revoke(&token.jti).await.unwrap();
        service.revoke("never-issued").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_token_fails_validation() {
        let service = service();
        let token = service.issue(1, Duration::seconds(-1)).await.unwrap();

        assert!(matches!(
            service.validate(&token.jti).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_already_expired() {
        let service = service();
        let token = service.issue(1, Duration::ZERO).await.unwrap();

        assert!(matches!(
            service.validate(&token.jti).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_rotate_expired_token_fails_without_side_effects() {
        let (service, storage) = service_with(TokenConfig::default());
        let token = service.issue(1, Duration::seconds(-1)).await.unwrap();

        assert!(matches!(
            service.rotate(&token.jti, Duration::days(1)).await,
            Err(AuthError::TokenExpired)
        ));
        assert_eq!(storage.len().await, 1);
        assert!(!storage.find_by_jti(&token.jti).await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_rotate_unknown_token() {
        let (service, storage) = service_with(TokenConfig::default());
        assert!(matches!(
            service.rotate("missing", Duration::days(1)).await,
            Err(AuthError::TokenNotFound)
        ));
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_lifecycle_scenario() {
        let service = service();

        let a = service.issue(1, Duration::days(30)).await.unwrap();
        assert_eq!(service.validate(&a.jti).await.unwrap(), 1);

        let b = service.rotate(&a.jti, Duration::days(30)).await.unwrap();
        assert_ne!(a.jti, b.jti);
        assert!(matches!(
            service.validate(&a.jti).await,
            Err(AuthError::TokenRevoked)
        ));
        assert_eq!(service.validate(&b.jti).await.unwrap(), 1);

        service.revoke(&b.jti).await.unwrap();
        assert!(matches!(
            service.validate(&b.jti).await,
            Err(AuthError::TokenRevoked)
        ));

        let fresh = [
            service.issue(1, Duration::days(30)).await.unwrap(),
            service.issue(1, Duration::days(30)).await.unwrap(),
            service.issue(1, Duration::days(30)).await.unwrap(),
        ];
        assert_eq!(service.revoke_all_for_user(1).await.unwrap(), 3);
        for token in &fresh {
            assert!(matches!(
                service.validate(&token.jti).await,
                Err(AuthError::TokenRevoked)
            ));
        }
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_leaves_other_users_alone() {
        let service = service();
        service.issue(1, Duration::days(1)).await.unwrap();
        let other = service.issue(2, Duration::days(1)).await.unwrap();

        assert_eq!(service.revoke_all_for_user(1).await.unwrap(), 1);
        assert_eq!(service.revoke_all_for_user(1).await.unwrap(), 0);
        assert_eq!(service.validate(&other.jti).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotation_has_single_winner() {
        let service = Arc::new(service());
        let token = service.issue(1, Duration::days(30)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            let jti = token.jti.clone();
            handles.push(tokio::spawn(async move {
                service.rotate(&jti, Duration::days(30)).await
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(t) => winners.push(t),
                Err(AuthError::TokenRevoked | AuthError::TokenNotFound) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(service.list_active(1).await.unwrap(), winners);
    }

    #[tokio::test]
    async fn test_jti_uniqueness_across_many_tokens() {
        let service = service();
        let mut seen = HashSet::new();
        for i in 0..10_000 {
            let token = service.issue(i % 17, Duration::days(1)).await.unwrap();
            assert!(seen.insert(token.jti));
        }
        assert_eq!(seen.len(), 10_000);
    }

    #[tokio::test]
    async fn test_purge_expired_retention_rule() {
        let (service, storage) = service_with(TokenConfig::default());
        let expired = service.issue(1, Duration::seconds(-60)).await.unwrap();
        let expired_revoked = service.issue(1, Duration::seconds(-60)).await.unwrap();
        service.revoke(&expired_revoked.jti).await.unwrap();
        let active = service.issue(1, Duration::days(1)).await.unwrap();
        let revoked = service.issue(1, Duration::days(1)).await.unwrap();
        service.revoke(&revoked.jti).await.unwrap();

        let purged = service
            .purge_expired(OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert_eq!(purged, 2);

        assert!(storage.find_by_jti(&expired.jti).await.unwrap().is_none());
        assert!(storage.find_by_jti(&expired_revoked.jti).await.unwrap().is_none());
        assert_eq!(service.validate(&active.jti).await.unwrap(), 1);
        // Revoked but unexpired rows are retained and keep failing as revoked
        assert!(matches!(
            service.validate(&revoked.jti).await,
            Err(AuthError::TokenRevoked)
        ));

        // A purged jti is simply unknown afterwards
        assert!(matches!(
            service.validate(&expired.jti).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_issue_default_uses_configured_lifetime() {
        let service = service_with(TokenConfig::from_minutes_and_days(15, 7).unwrap()).0;
        let before = OffsetDateTime::now_utc();
        let token = service.issue_default(3).await.unwrap();

        assert!(token.expires_at >= before + Duration::days(7));
        assert!(token.expires_at <= OffsetDateTime::now_utc() + Duration::days(7));
    }

    #[tokio::test]
    async fn test_forget_user_cascade() {
        let (service, storage) = service_with(TokenConfig::default());
        service.issue(1, Duration::days(1)).await.unwrap();
        service.issue(1, Duration::days(1)).await.unwrap();
        service.issue(2, Duration::days(1)).await.unwrap();

        assert_eq!(service.forget_user(1).await.unwrap(), 2);
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_forget_user_revoke() {
        let config = TokenConfig::default().with_user_deletion_policy(UserDeletionPolicy::Revoke);
        let (service, storage) = service_with(config);
        let token = service.issue(1, Duration::days(1)).await.unwrap();

        assert_eq!(service.forget_user(1).await.unwrap(), 1);
        assert_eq!(storage.len().await, 1);
        assert!(matches!(
            service.validate(&token.jti).await,
            Err(AuthError::TokenRevoked)
        ));
    }
}
