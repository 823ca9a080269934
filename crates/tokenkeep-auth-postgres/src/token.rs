//! Refresh token storage.
//!
//! Rows live in the `refresh_tokens` table. Rotation runs inside a
//! transaction that row-locks the old token with `SELECT ... FOR UPDATE`, so
//! concurrent rotations of the same token serialize and only the first one
//! sees it unrevoked.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use tokenkeep_auth::types::{NewRefreshToken, RefreshToken, TokenStatus, UserId};

use crate::{PgPool, StorageError, StorageResult};

// =============================================================================
// Types
// =============================================================================

type TokenTuple = (i64, i64, String, OffsetDateTime, bool, OffsetDateTime);

fn from_tuple(row: TokenTuple) -> RefreshToken {
    RefreshToken {
        id: row.0,
        user_id: row.1,
        jti: row.2,
        expires_at: row.3,
        revoked: row.4,
        created_at: row.5,
    }
}

/// Outcome of a rotation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    /// The old token was revoked and this replacement inserted.
    Rotated(RefreshToken),
    /// No token with the given `jti` exists.
    NotFound,
    /// The old token exists but is not usable; nothing was written.
    Rejected(TokenStatus),
}

fn map_insert_error(e: sqlx_core::Error, token: &NewRefreshToken, user_id: UserId) -> StorageError {
    if let sqlx_core::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StorageError::conflict(format!(
                "RefreshToken with jti '{}' already exists",
                token.jti
            ));
        }
        if db_err.is_foreign_key_violation() {
            return StorageError::invalid_input(format!("User {user_id} does not exist"));
        }
    }
    StorageError::from(e)
}

// =============================================================================
// Token Storage
// =============================================================================

/// Refresh token storage operations.
pub struct TokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenStorage<'a> {
    /// Create a new token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new refresh token.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for a duplicate `jti`, `InvalidInput` for an unknown
    /// user, or a database error.
    pub async fn create(&self, token: &NewRefreshToken) -> StorageResult<RefreshToken> {
        let row: TokenTuple = query_as(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, jti, expires_at, revoked, created_at
            "#,
        )
        .bind(token.user_id)
        .bind(&token.jti)
        .bind(token.expires_at)
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_insert_error(e, token, token.user_id))?;

        Ok(from_tuple(row))
    }

    /// Find a token by its `jti`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_jti(&self, jti: &str) -> StorageResult<Option<RefreshToken>> {
        let row: Option<TokenTuple> = query_as(
            r#"
            SELECT id, user_id, jti, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE jti = $1
            "#,
        )
        .bind(jti)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(from_tuple))
    }

    /// Revoke `old_jti` and insert `replacement` for the same user, in one transaction.
    ///
    /// The transaction is rolled back on every path that does not reach
    /// `commit`, including an early return and a dropped future.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn rotate(
        &self,
        old_jti: &str,
        replacement: &NewRefreshToken,
        now: OffsetDateTime,
    ) -> StorageResult<Rotation> {
        let mut tx = self.pool.begin().await?;

        let old: Option<TokenTuple> = query_as(
            r#"
            SELECT id, user_id, jti, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE jti = $1
            FOR UPDATE
            "#,
        )
        .bind(old_jti)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(old) = old.map(from_tuple) else {
            return Ok(Rotation::NotFound);
        };

        let status = old.status_at(now);
        if status != TokenStatus::Active {
            return Ok(Rotation::Rejected(status));
        }

        query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
            .bind(old.id)
            .execute(&mut *tx)
            .await?;

        let row: TokenTuple = query_as(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, jti, expires_at, revoked, created_at
            "#,
        )
        .bind(old.user_id)
        .bind(&replacement.jti)
        .bind(replacement.expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, replacement, old.user_id))?;

        tx.commit().await?;

        Ok(Rotation::Rotated(from_tuple(row)))
    }

    /// Revoke a token. Returns `true` if this call flipped the flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn revoke(&self, jti: &str) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE jti = $1
              AND revoked = FALSE
            "#,
        )
        .bind(jti)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke all live tokens for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn revoke_all_for_user(&self, user_id: UserId) -> StorageResult<u64> {
        let result = query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE user_id = $1
              AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete all tokens for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete_all_for_user(&self, user_id: UserId) -> StorageResult<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete tokens whose `expires_at` is before `older_than`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete_expired(&self, older_than: OffsetDateTime) -> StorageResult<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(older_than)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// List tokens usable at `now` for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active_for_user(
        &self,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> StorageResult<Vec<RefreshToken>> {
        let rows: Vec<TokenTuple> = query_as(
            r#"
            SELECT id, user_id, jti, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE user_id = $1
              AND revoked = FALSE
              AND expires_at > $2
            ORDER BY id DESC
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(from_tuple).collect())
    }
}
