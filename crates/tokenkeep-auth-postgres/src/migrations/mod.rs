//! Embedded schema migrations.
//!
//! Migrations are compiled into the binary with `include_str!` and tracked in
//! the `_sqlx_migrations` table.
//!
//! To add a new migration:
//! 1. Create the SQL file in the crate's `migrations/` directory
//! 2. Add an entry to the `embedded_migrations!()` macro below

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use tracing::{info, instrument};

use crate::{PgPool, StorageError, StorageResult};

/// Each entry is `(version, description, sql)`, in chronological order.
macro_rules! embedded_migrations {
    () => {
        &[(
            20250601000001i64,
            "refresh_tokens",
            include_str!("../../migrations/20250601000001_refresh_tokens.sql"),
        )]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Runs all pending migrations.
///
/// # Errors
///
/// Returns `StorageError::Migration` if a migration fails to execute.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> StorageResult<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running database migrations (embedded)");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    info!("Database migrations completed successfully");
    Ok(())
}
