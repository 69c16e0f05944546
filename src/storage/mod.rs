//! # Storage Engine
//!
//! SQLite-backed persistence: WAL-mode connection pool, embedded migrations
//! with checksums and rollback, integrity validation, backup/restore and the
//! typed repository layer.

pub mod backup;
pub mod integrity;
pub mod migrations;
pub mod pool;
pub mod repositories;

pub use backup::{BackupInfo, BackupManager, BackupMetadata, BackupStatistics};
pub use integrity::{validate_integrity, IntegrityReport};
pub use migrations::{
    applied_migrations, apply_migration, current_version, migrate_to_latest, rollback_migration,
    verify_checksums, Migration, MigrationRecord,
};
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repositories::{
    CategoryGroupRow, EndpointRepository, EndpointSearchFilter, EndpointSearchPage,
    MetadataRepository, Page, ResolvedSchema, SchemaRepository, SecurityRepository,
};
