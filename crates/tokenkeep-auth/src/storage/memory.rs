//! In-memory refresh token storage.
//!
//! All rows live behind a single async mutex, so every operation, including
//! the read-then-write in `rotate`, observes and produces a consistent state.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::storage::RefreshTokenStorage;
use crate::types::{NewRefreshToken, RefreshToken, UserId};
use crate::{AuthError, AuthResult};

#[derive(Debug, Default)]
struct Inner {
    /// Rows keyed by `jti`.
    tokens: HashMap<String, RefreshToken>,
    /// Last assigned row id.
    last_id: i64,
}

impl Inner {
    fn insert(&mut self, token: &NewRefreshToken, user_id: UserId) -> AuthResult<RefreshToken> {
        if self.tokens.contains_key(&token.jti) {
            return Err(AuthError::storage(format!(
                "refresh token jti '{}' already exists",
                token.jti
            )));
        }
        self.last_id += 1;
        let row = RefreshToken {
            id: self.last_id,
            user_id,
            jti: token.jti.clone(),
            expires_at: token.expires_at,
            revoked: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.tokens.insert(row.jti.clone(), row.clone());
        Ok(row)
    }
}

/// Process-local refresh token storage.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStorage {
    inner: Mutex<Inner>,
}

impl InMemoryRefreshTokenStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, regardless of status.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.tokens.len()
    }

    /// Returns `true` if no rows are stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.tokens.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStorage for InMemoryRefreshTokenStorage {
    async fn create(&self, token: &NewRefreshToken) -> AuthResult<RefreshToken> {
        let mut inner = self.inner.lock().await;
        inner.insert(token, token.user_id)
    }

    async fn find_by_jti(&self, jti: &str) -> AuthResult<Option<RefreshToken>> {
        let inner = self.inner.lock().await;
        Ok(inner.tokens.get(jti).cloned())
    }

    async fn rotate(
        &self,
        old_jti: &str,
        replacement: &NewRefreshToken,
        now: OffsetDateTime,
    ) -> AuthResult<RefreshToken> {
        let mut inner = self.inner.lock().await;

        let user_id = inner
            .tokens
            .get(old_jti)
            .ok_or(AuthError::TokenNotFound)?
            .ensure_usable_at(now)?;

        // Insert first: a jti collision must leave the old token untouched.
        let new_row = inner.insert(replacement, user_id)?;
        if let Some(old) = inner.tokens.get_mut(old_jti) {
            old.revoked = true;
        }
        Ok(new_row)
    }

    async fn revoke(&self, jti: &str) -> AuthResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.tokens.get_mut(jti) {
            Some(token) if !token.revoked => {
                token.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_by_user(&self, user_id: UserId) -> AuthResult<u64> {
        let mut inner = self.inner.lock().await;
        let mut count = 0;
        for token in inner.tokens.values_mut() {
            if token.user_id == user_id && !token.revoked {
                token.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_by_user(&self, user_id: UserId) -> AuthResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.tokens.len();
        inner.tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn purge_expired(&self, older_than: OffsetDateTime) -> AuthResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.tokens.len();
        inner.tokens.retain(|_, t| t.expires_at >= older_than);
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn list_active_by_user(
        &self,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<RefreshToken>> {
        let inner = self.inner.lock().await;
        let mut tokens: Vec<RefreshToken> = inner
            .tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_usable_at(now))
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(tokens)
    }
}
