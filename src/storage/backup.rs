//! Database backup and restore.
//!
//! Backups are plain file copies (optionally gzip-compressed) taken after a
//! WAL checkpoint, named `<db>.<timestamp>[.gz]` with an adjacent
//! `.metadata` JSON side-car. Restores are atomic from the caller's view:
//! the live file is snapshotted first and reinstated if the restored
//! database fails its health check.

use crate::config::BackupConfig;
use crate::errors::{ApidexError, Result};
use crate::storage::integrity::validate_integrity;
use crate::storage::migrations;
use crate::storage::DbPool;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::ConnectOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Side-car metadata written next to every backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub source_path: String,
    pub compressed: bool,
    pub size_bytes: u64,
    pub schema_version: Option<String>,
    pub source_healthy: bool,
}

/// One backup on disk
#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub backup_path: PathBuf,
    pub metadata_path: PathBuf,
    pub metadata: BackupMetadata,
}

/// Aggregate statistics over the backup directory
#[derive(Debug, Clone, Serialize)]
pub struct BackupStatistics {
    pub count: usize,
    pub total_size_bytes: u64,
    pub newest: Option<chrono::DateTime<chrono::Utc>>,
    pub oldest: Option<chrono::DateTime<chrono::Utc>>,
}

/// Manages backup creation, verification, restore and retention
pub struct BackupManager {
    config: BackupConfig,
    db_path: PathBuf,
}

impl BackupManager {
    pub fn new(config: BackupConfig, db_path: impl Into<PathBuf>) -> Self {
        Self { config, db_path: db_path.into() }
    }

    /// Resolve the filesystem path behind a `sqlite:` URL
    pub fn database_file_path(url: &str) -> Result<PathBuf> {
        let stripped = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .ok_or_else(|| ApidexError::validation("expected a sqlite: database URL"))?;
        let path = stripped.split('?').next().unwrap_or(stripped);
        if path.is_empty() || path == ":memory:" {
            return Err(ApidexError::validation(
                "in-memory databases cannot be backed up or restored",
            ));
        }
        Ok(PathBuf::from(path))
    }

    /// Create a verified backup of the live database
    pub async fn create_backup(&self, pool: &DbPool) -> Result<BackupInfo> {
        // Flush the WAL so the main file is complete on its own
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(pool)
            .await
            .map_err(|e| ApidexError::database(e, "WAL checkpoint failed"))?;

        let health = validate_integrity(pool).await?;
        let schema_version = migrations::current_version(pool).await?;

        tokio::fs::create_dir_all(&self.config.directory).await?;

        let timestamp = chrono::Utc::now();
        let stamp = timestamp.format("%Y%m%dT%H%M%S");
        let file_name = self
            .db_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("apidex.db");
        let suffix = if self.config.compress { ".gz" } else { "" };
        let backup_path =
            Path::new(&self.config.directory).join(format!("{file_name}.{stamp}{suffix}"));

        let source = self.db_path.clone();
        let destination = backup_path.clone();
        let compress = self.config.compress;
        tokio::task::spawn_blocking(move || copy_file(&source, &destination, compress))
            .await
            .map_err(|e| ApidexError::internal(format!("Backup task panicked: {e}")))??;

        let size_bytes = tokio::fs::metadata(&backup_path).await?.len();
        let metadata = BackupMetadata {
            created_at: timestamp,
            source_path: self.db_path.display().to_string(),
            compressed: compress,
            size_bytes,
            schema_version,
            source_healthy: health.is_healthy,
        };

        let metadata_path = backup_path.with_extension(format!(
            "{}metadata",
            backup_path.extension().and_then(|e| e.to_str()).map(|e| format!("{e}.")).unwrap_or_default()
        ));
        tokio::fs::write(&metadata_path, serde_json::to_vec_pretty(&metadata)?).await?;

        self.verify_backup(&backup_path, compress).await?;

        info!(backup = %backup_path.display(), size_bytes, compressed = compress, "Backup created");
        Ok(BackupInfo { backup_path, metadata_path, metadata })
    }

    /// Open a backup read-only and run its integrity check
    async fn verify_backup(&self, backup_path: &Path, compressed: bool) -> Result<()> {
        let verify_path = if compressed {
            let staged = backup_path.with_extension("verify.tmp");
            let source = backup_path.to_path_buf();
            let dest = staged.clone();
            tokio::task::spawn_blocking(move || decompress_file(&source, &dest))
                .await
                .map_err(|e| ApidexError::internal(format!("Verify task panicked: {e}")))??;
            staged
        } else {
            backup_path.to_path_buf()
        };

        let result = check_database_file(&verify_path).await;

        if compressed {
            let _ = tokio::fs::remove_file(&verify_path).await;
        }

        result.map_err(|e| {
            warn!(backup = %backup_path.display(), error = %e, "Backup verification failed");
            ApidexError::DataIntegrity {
                message: format!("backup verification failed: {e}"),
            }
        })
    }

    /// Restore the live database from a backup file.
    ///
    /// The caller must have closed every pool over the live file. The current
    /// file is snapshotted to a `pre_restore_<ts>` sibling first; a restored
    /// database that fails its health check is rolled back to that snapshot.
    pub async fn restore_from_backup(&self, backup_path: &Path) -> Result<PathBuf> {
        if !backup_path.exists() {
            return Err(ApidexError::FileNotFound { path: backup_path.display().to_string() });
        }

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let snapshot = self.db_path.with_file_name(format!(
            "pre_restore_{stamp}_{}",
            self.db_path.file_name().and_then(|n| n.to_str()).unwrap_or("apidex.db")
        ));

        if self.db_path.exists() {
            tokio::fs::copy(&self.db_path, &snapshot).await?;
        }
        // Stale WAL/SHM sidecars must not shadow the restored file
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{suffix}", self.db_path.display()));
            let _ = tokio::fs::remove_file(&sidecar).await;
        }

        let compressed = backup_path.extension().and_then(|e| e.to_str()) == Some("gz");
        let source = backup_path.to_path_buf();
        let dest = self.db_path.clone();
        let restore = tokio::task::spawn_blocking(move || {
            if compressed {
                decompress_file(&source, &dest)
            } else {
                std::fs::copy(&source, &dest).map(|_| ()).map_err(Into::into)
            }
        })
        .await
        .map_err(|e| ApidexError::internal(format!("Restore task panicked: {e}")))?;

        let health = match restore {
            Ok(()) => check_database_file(&self.db_path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = health {
            warn!(error = %e, "Restored database failed its health check, reverting");
            if snapshot.exists() {
                tokio::fs::copy(&snapshot, &self.db_path).await?;
            }
            return Err(ApidexError::DataIntegrity {
                message: format!("restore reverted: {e}"),
            });
        }

        info!(backup = %backup_path.display(), snapshot = %snapshot.display(), "Database restored");
        Ok(snapshot)
    }

    /// Enumerate backups in the configured directory, newest first
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let directory = Path::new(&self.config.directory);
        if !directory.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        let mut entries = tokio::fs::read_dir(directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if name.ends_with(".metadata") || name.ends_with(".verify.tmp") {
                continue;
            }
            let metadata_path = path.with_extension(format!(
                "{}metadata",
                path.extension().and_then(|e| e.to_str()).map(|e| format!("{e}.")).unwrap_or_default()
            ));
            let Ok(raw) = tokio::fs::read(&metadata_path).await else {
                continue;
            };
            let Ok(metadata) = serde_json::from_slice::<BackupMetadata>(&raw) else {
                continue;
            };
            backups.push(BackupInfo { backup_path: path, metadata_path, metadata });
        }

        backups.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
        Ok(backups)
    }

    /// Apply retention: keep the newest N, drop anything older than D days
    pub async fn cleanup_old_backups(&self) -> Result<usize> {
        let backups = self.list_backups().await?;
        let mut removed = 0;

        let cutoff = (self.config.retain_days > 0)
            .then(|| chrono::Utc::now() - chrono::Duration::days(self.config.retain_days as i64));

        for (index, backup) in backups.iter().enumerate() {
            let over_count = self.config.retain_count > 0 && index >= self.config.retain_count;
            let too_old = cutoff.map(|c| backup.metadata.created_at < c).unwrap_or(false);
            if over_count || too_old {
                tokio::fs::remove_file(&backup.backup_path).await?;
                let _ = tokio::fs::remove_file(&backup.metadata_path).await;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Old backups removed");
        }
        Ok(removed)
    }

    /// Aggregate statistics over the backup directory
    pub async fn backup_statistics(&self) -> Result<BackupStatistics> {
        let backups = self.list_backups().await?;
        Ok(BackupStatistics {
            count: backups.len(),
            total_size_bytes: backups.iter().map(|b| b.metadata.size_bytes).sum(),
            newest: backups.first().map(|b| b.metadata.created_at),
            oldest: backups.last().map(|b| b.metadata.created_at),
        })
    }
}

fn copy_file(source: &Path, destination: &Path, compress: bool) -> Result<()> {
    if compress {
        let mut input = std::fs::File::open(source)?;
        let output = std::fs::File::create(destination)?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        std::io::copy(&mut input, &mut encoder)?;
        encoder.finish()?.flush()?;
    } else {
        std::fs::copy(source, destination)?;
    }
    Ok(())
}

fn decompress_file(source: &Path, destination: &Path) -> Result<()> {
    let input = std::fs::File::open(source)?;
    let mut decoder = GzDecoder::new(input);
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer)?;
    std::fs::write(destination, buffer)?;
    Ok(())
}

/// Open a database file read-only and require a clean integrity check
async fn check_database_file(path: &Path) -> Result<()> {
    use sqlx::Row;

    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .connect()
        .await
        .map_err(|e| ApidexError::DatabaseConnection {
            context: format!("cannot open {}", path.display()),
            source: Some(e),
        })?;

    let row = sqlx::query("PRAGMA integrity_check")
        .fetch_one(&mut conn)
        .await
        .map_err(|e| ApidexError::database(e, "integrity_check failed"))?;
    let message: String = row.get(0);
    if message != "ok" {
        return Err(ApidexError::DataIntegrity {
            message: format!("integrity_check reported: {message}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::storage::create_pool;

    async fn file_backed_pool(dir: &Path) -> (DbPool, PathBuf) {
        let db_path = dir.join("test.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            auto_migrate: true,
            ..Default::default()
        };
        (create_pool(&config).await.unwrap(), db_path)
    }

    fn manager(dir: &Path, db_path: &Path, compress: bool) -> BackupManager {
        BackupManager::new(
            BackupConfig {
                directory: dir.join("backups").display().to_string(),
                compress,
                retain_count: 10,
                retain_days: 0,
            },
            db_path,
        )
    }

    #[test]
    fn test_database_file_path_parsing() {
        assert_eq!(
            BackupManager::database_file_path("sqlite://./apidex.db").unwrap(),
            PathBuf::from("./apidex.db")
        );
        assert!(BackupManager::database_file_path("sqlite::memory:").is_err());
        assert!(BackupManager::database_file_path("postgres://x").is_err());
    }

    #[tokio::test]
    async fn test_backup_create_verify_list() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, db_path) = file_backed_pool(dir.path()).await;
        let manager = manager(dir.path(), &db_path, false);

        let info = manager.create_backup(&pool).await.unwrap();
        assert!(info.backup_path.exists());
        assert!(info.metadata_path.exists());
        assert!(info.metadata.source_healthy);
        assert_eq!(info.metadata.schema_version.as_deref(), Some("0003"));

        let listed = manager.list_backups().await.unwrap();
        assert_eq!(listed.len(), 1);

        let stats = manager.backup_statistics().await.unwrap();
        assert_eq!(stats.count, 1);
        assert!(stats.total_size_bytes > 0);
    }

    #[tokio::test]
    async fn test_compressed_backup_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, db_path) = file_backed_pool(dir.path()).await;

        sqlx::query(
            "INSERT INTO api_metadata (file_path, file_hash, title, version, openapi_version) \
             VALUES ('/tmp/a.json', 'hash', 'T', '1', '3.0.0')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let manager = manager(dir.path(), &db_path, true);
        let info = manager.create_backup(&pool).await.unwrap();
        assert!(info.backup_path.to_string_lossy().ends_with(".gz"));
        pool.close().await;

        // Wipe the live database, then restore
        tokio::fs::remove_file(&db_path).await.unwrap();
        manager.restore_from_backup(&info.backup_path).await.unwrap();

        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            auto_migrate: false,
            ..Default::default()
        };
        let restored = create_pool(&config).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_metadata")
            .fetch_one(&restored)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_restore_reverts_on_corrupt_backup() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, db_path) = file_backed_pool(dir.path()).await;
        pool.close().await;

        let bogus = dir.path().join("bogus.backup");
        tokio::fs::write(&bogus, b"this is not a sqlite file").await.unwrap();

        let manager = manager(dir.path(), &db_path, false);
        let err = manager.restore_from_backup(&bogus).await.unwrap_err();
        assert!(matches!(err, ApidexError::DataIntegrity { .. }));

        // Live database reverted and still opens
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            auto_migrate: false,
            ..Default::default()
        };
        assert!(create_pool(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_retention_by_count() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, db_path) = file_backed_pool(dir.path()).await;
        let mut manager = manager(dir.path(), &db_path, false);
        manager.config.retain_count = 2;

        for _ in 0..3 {
            manager.create_backup(&pool).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        }

        let removed = manager.cleanup_old_backups().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(manager.list_backups().await.unwrap().len(), 2);
    }
}
