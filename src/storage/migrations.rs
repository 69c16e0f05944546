//! # Database Migration Management
//!
//! Embedded, ordered schema migrations. Each migration carries its forward
//! and rollback SQL plus a SHA-256 checksum of the forward script; an applied
//! migration whose stored checksum no longer matches the embedded source
//! blocks the whole sequence with a [`ApidexError::MigrationIntegrity`].

use crate::errors::{ApidexError, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::{error, info};

/// One embedded migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Zero-padded ordinal, e.g. "0001"
    pub version: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

impl Migration {
    /// SHA-256 of the forward SQL, hex-encoded
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.up_sql.as_bytes()))
    }
}

/// Record of an applied migration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: String,
    pub name: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
    pub checksum: String,
}

/// The full ordered migration set for this build
pub fn registry() -> Vec<Migration> {
    vec![
        Migration {
            version: "0001",
            name: "initial_schema",
            description: "Entity tables: api_metadata, endpoints, schemas, security_schemes, endpoint_categories",
            up_sql: include_str!("../../migrations/0001_initial_schema.sql"),
            down_sql: include_str!("../../migrations/0001_initial_schema.down.sql"),
        },
        Migration {
            version: "0002",
            name: "endpoints_fts",
            description: "FTS5 virtual table over endpoint searchable fields",
            up_sql: include_str!("../../migrations/0002_endpoints_fts.sql"),
            down_sql: include_str!("../../migrations/0002_endpoints_fts.down.sql"),
        },
        Migration {
            version: "0003",
            name: "search_documents",
            description: "Stored search document projection",
            up_sql: include_str!("../../migrations/0003_search_documents.sql"),
            down_sql: include_str!("../../migrations/0003_search_documents.down.sql"),
        },
    ]
}

async fn create_migration_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS database_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            checksum TEXT NOT NULL,
            rollback_sql TEXT NOT NULL
        )
    "#,
    )
    .execute(pool)
    .await
    .map_err(|e| ApidexError::database(e, "Failed to create migration tracking table"))?;
    Ok(())
}

/// List applied migrations in version order
pub async fn applied_migrations(pool: &DbPool) -> Result<Vec<MigrationRecord>> {
    create_migration_table(pool).await?;
    let rows = sqlx::query(
        "SELECT version, name, applied_at, checksum FROM database_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| ApidexError::database(e, "Failed to list applied migrations"))?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
            checksum: row.get("checksum"),
        })
        .collect())
}

/// Verify that every applied migration still matches its embedded source
pub async fn verify_checksums(pool: &DbPool) -> Result<()> {
    let registry = registry();
    for record in applied_migrations(pool).await? {
        let Some(migration) = registry.iter().find(|m| m.version == record.version) else {
            return Err(ApidexError::MigrationIntegrity {
                message: format!(
                    "applied migration {} ({}) is unknown to this build",
                    record.version, record.name
                ),
            });
        };
        if migration.checksum() != record.checksum {
            return Err(ApidexError::MigrationIntegrity {
                message: format!(
                    "checksum mismatch for migration {} ({}): the applied script differs from the source",
                    record.version, record.name
                ),
            });
        }
    }
    Ok(())
}

/// Apply a single migration inside one transaction
pub async fn apply_migration(pool: &DbPool, migration: &Migration) -> Result<()> {
    create_migration_table(pool).await?;
    let start = std::time::Instant::now();

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| ApidexError::database(e, "Failed to start migration transaction"))?;

    sqlx::raw_sql(migration.up_sql).execute(&mut *tx).await.map_err(|e| {
        error!(error = %e, migration = migration.name, "Migration failed");
        ApidexError::database(e, format!("Migration failed: {}", migration.name))
    })?;

    sqlx::query(
        "INSERT INTO database_migrations (version, name, applied_at, checksum, rollback_sql) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(migration.version)
    .bind(migration.name)
    .bind(chrono::Utc::now())
    .bind(migration.checksum())
    .bind(migration.down_sql)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApidexError::database(e, format!("Failed to record migration: {}", migration.name)))?;

    tx.commit()
        .await
        .map_err(|e| ApidexError::database(e, "Failed to commit migration transaction"))?;

    info!(
        version = migration.version,
        name = migration.name,
        execution_time_ms = start.elapsed().as_millis() as u64,
        "Migration applied"
    );
    Ok(())
}

/// Roll back an applied migration using its stored rollback SQL
pub async fn rollback_migration(pool: &DbPool, version: &str) -> Result<()> {
    create_migration_table(pool).await?;

    let row = sqlx::query("SELECT name, rollback_sql FROM database_migrations WHERE version = $1")
        .bind(version)
        .fetch_optional(pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to look up migration"))?
        .ok_or_else(|| ApidexError::not_found("Migration", version))?;

    let name: String = row.get("name");
    let rollback_sql: String = row.get("rollback_sql");

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| ApidexError::database(e, "Failed to start rollback transaction"))?;

    sqlx::raw_sql(&rollback_sql).execute(&mut *tx).await.map_err(|e| {
        error!(error = %e, migration = %name, "Rollback failed");
        ApidexError::database(e, format!("Rollback failed: {name}"))
    })?;

    sqlx::query("DELETE FROM database_migrations WHERE version = $1")
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to remove migration record"))?;

    tx.commit()
        .await
        .map_err(|e| ApidexError::database(e, "Failed to commit rollback transaction"))?;

    info!(version, name = %name, "Migration rolled back");
    Ok(())
}

/// Apply all pending migrations in version order.
///
/// With `dry_run` set, nothing executes; the pending list is returned either
/// way. Checksum drift on any applied migration fails the whole sequence.
pub async fn migrate_to_latest(pool: &DbPool, dry_run: bool) -> Result<Vec<String>> {
    create_migration_table(pool).await?;
    verify_checksums(pool).await?;

    let applied: Vec<String> =
        applied_migrations(pool).await?.into_iter().map(|r| r.version).collect();

    let pending: Vec<Migration> = registry()
        .into_iter()
        .filter(|m| !applied.contains(&m.version.to_string()))
        .collect();

    let names: Vec<String> =
        pending.iter().map(|m| format!("{} {}", m.version, m.name)).collect();

    if dry_run {
        info!(pending = names.len(), "Migration dry run");
        return Ok(names);
    }

    for migration in &pending {
        apply_migration(pool, migration).await?;
    }

    if names.is_empty() {
        info!("No pending migrations");
    } else {
        info!(count = names.len(), "Database migrations completed");
    }
    Ok(names)
}

/// Highest applied version, or None on a fresh database
pub async fn current_version(pool: &DbPool) -> Result<Option<String>> {
    Ok(applied_migrations(pool).await?.into_iter().map(|r| r.version).max())
}
