//! Database integrity validation.

use crate::errors::{ApidexError, Result};
use crate::storage::DbPool;
use serde::Serialize;
use sqlx::Row;

const REQUIRED_TABLES: &[&str] = &[
    "api_metadata",
    "endpoints",
    "schemas",
    "security_schemes",
    "endpoint_categories",
    "database_migrations",
];

/// Outcome of a full integrity pass
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub is_healthy: bool,
    /// Raw messages from `PRAGMA integrity_check` ("ok" when clean)
    pub integrity_messages: Vec<String>,
    pub foreign_key_violations: u64,
    pub missing_tables: Vec<String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// Run SQLite integrity and foreign-key checks plus a required-table scan
pub async fn validate_integrity(pool: &DbPool) -> Result<IntegrityReport> {
    let integrity_rows = sqlx::query("PRAGMA integrity_check")
        .fetch_all(pool)
        .await
        .map_err(|e| ApidexError::database(e, "integrity_check failed"))?;
    let integrity_messages: Vec<String> =
        integrity_rows.iter().map(|row| row.get::<String, _>(0)).collect();
    let integrity_ok = integrity_messages.iter().all(|m| m == "ok");

    let fk_rows = sqlx::query("PRAGMA foreign_key_check")
        .fetch_all(pool)
        .await
        .map_err(|e| ApidexError::database(e, "foreign_key_check failed"))?;
    let foreign_key_violations = fk_rows.len() as u64;

    let table_rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table'")
        .fetch_all(pool)
        .await
        .map_err(|e| ApidexError::database(e, "table scan failed"))?;
    let present: Vec<String> = table_rows.iter().map(|row| row.get::<String, _>("name")).collect();
    let missing_tables: Vec<String> = REQUIRED_TABLES
        .iter()
        .filter(|t| !present.iter().any(|p| p == *t))
        .map(|t| t.to_string())
        .collect();

    Ok(IntegrityReport {
        is_healthy: integrity_ok && foreign_key_violations == 0 && missing_tables.is_empty(),
        integrity_messages,
        foreign_key_violations,
        missing_tables,
        checked_at: chrono::Utc::now(),
    })
}
