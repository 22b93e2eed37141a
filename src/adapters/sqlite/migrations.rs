//! Schema migrations.
//!
//! The store schema evolves through an ordered set of embedded scripts.
//! Each pending script runs in its own transaction together with its
//! version bookkeeping, so a failed script leaves the store at the
//! previous version instead of half-applied. A store file written by a
//! newer build is refused outright rather than partially understood.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::domain::errors::{OrcError, OrcResult};

/// One embedded schema script.
struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "tasks, plans, phase outputs, worktree runs, initiatives",
        sql: include_str!("../../../migrations/001_initial_schema.sql"),
    },
    Migration {
        version: 2,
        description: "automation counters and execution history",
        sql: include_str!("../../../migrations/002_automation_schema.sql"),
    },
];

/// Highest schema version this build understands.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Version currently recorded in the store; zero for a fresh file.
pub async fn schema_version(pool: &SqlitePool) -> OrcResult<i64> {
    ensure_version_table(pool).await?;
    let (version,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(pool)
            .await?;
    Ok(version)
}

/// Bring the store up to this build's schema, applying pending scripts
/// in version order. Returns how many were applied; zero means the
/// store was already current.
pub async fn apply_all(pool: &SqlitePool) -> OrcResult<usize> {
    let current = schema_version(pool).await?;
    if current > latest_version() {
        return Err(OrcError::StoreError(format!(
            "store schema version {current} is newer than this build understands ({}); refusing to open",
            latest_version()
        )));
    }

    let mut applied = 0usize;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                OrcError::StoreError(format!(
                    "schema migration {} ({}) failed: {e}",
                    migration.version, migration.description
                ))
            })?;
        sqlx::query(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?, ?, ?)",
        )
        .bind(migration.version)
        .bind(migration.description)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        applied += 1;
        debug!(
            version = migration.version,
            description = migration.description,
            "Applied schema migration"
        );
    }

    Ok(applied)
}

async fn ensure_version_table(pool: &SqlitePool) -> OrcResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL DEFAULT '',
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}
