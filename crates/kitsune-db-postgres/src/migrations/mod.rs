//! Embedded database migrations.
//!
//! SQL files live in the crate's `migrations/` directory and are compiled into
//! the binary, so no migration files need to ship alongside it.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{PostgresError, Result};

/// Embedded migrations in chronological order: (version, description, sql).
///
/// To add a migration, create the SQL file in `migrations/` and append it here.
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    20241016000001,
    "account_events",
    include_str!("../../migrations/20241016000001_account_events.sql"),
)];

fn build_migrations() -> Vec<Migration> {
    MIGRATIONS
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

/// Applies all pending migrations.
///
/// Applied versions are tracked in `_sqlx_migrations`; running this twice is a
/// no-op the second time.
///
/// # Errors
///
/// Returns `PostgresError::Migration` if a migration fails to execute.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running embedded database migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| PostgresError::Migration(e.to_string()))?;

    info!("Database migrations completed");

    Ok(())
}
