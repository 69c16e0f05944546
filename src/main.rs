//! apidex binary: ingest OpenAPI specifications and serve them over MCP.

use anyhow::Context;
use apidex::config::{self, AppConfig};
use apidex::mcp::{McpStdioServer, ServerContext};
use apidex::observability::{self, HealthChecker, PerformanceMonitor};
use apidex::pipeline::{IngestionPipeline, PipelineFactory};
use apidex::storage::{self, BackupManager};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "apidex", version, about = "OpenAPI → MCP knowledge-base server")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse, normalize and persist one or more specification files
    Ingest {
        /// Specification files (UTF-8 JSON)
        files: Vec<PathBuf>,

        /// Fail on the first recoverable error
        #[arg(long)]
        strict: bool,

        /// Skip the search-index build stage
        #[arg(long)]
        no_index: bool,
    },

    /// Serve the knowledge base over MCP stdio
    Serve,

    /// Show store counts and health
    Status,

    /// Apply pending database migrations
    Migrate {
        /// List pending migrations without executing them
        #[arg(long)]
        dry_run: bool,

        /// Roll back one applied migration by version instead
        #[arg(long)]
        rollback: Option<String>,
    },

    /// Create a database backup
    Backup {
        /// Remove backups outside the retention policy afterwards
        #[arg(long)]
        cleanup: bool,
    },

    /// Restore the database from a backup file
    Restore {
        backup_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref()).context("loading configuration")?;

    let _log_guard =
        observability::init_logging(&config.observability).context("initializing logging")?;
    observability::init_metrics(&config.observability).context("initializing metrics")?;

    match cli.command {
        Command::Ingest { files, strict, no_index } => ingest(&config, files, strict, no_index).await,
        Command::Serve => serve(&config).await,
        Command::Status => status(&config).await,
        Command::Migrate { dry_run, rollback } => migrate(&config, dry_run, rollback).await,
        Command::Backup { cleanup } => backup(&config, cleanup).await,
        Command::Restore { backup_file } => restore(&config, backup_file).await,
    }
}

async fn ingest(
    config: &AppConfig,
    files: Vec<PathBuf>,
    strict: bool,
    no_index: bool,
) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("no specification files given");
    }

    let pool = storage::create_pool(&config.database).await?;
    let pipeline = if strict {
        PipelineFactory::strict(pool, config)
    } else {
        PipelineFactory::default_pipeline(pool, config)
    }
    .with_index_build(!no_index);

    let batch = pipeline.process_batch(files).await;

    for result in &batch.results {
        if result.success {
            println!(
                "ok   {} (api_id {}, score {})",
                result.file_path,
                result.api_id.map(|id| id.to_string()).unwrap_or_default(),
                result
                    .consistency_score
                    .map(|s| format!("{s:.1}"))
                    .unwrap_or_else(|| "-".to_string()),
            );
        } else {
            println!("FAIL {}: {}", result.file_path, result.errors.join("; "));
        }
    }
    println!(
        "{}/{} files ingested in {} ms",
        batch.succeeded, batch.total_files, batch.total_duration_ms
    );

    if batch.failed > 0 {
        anyhow::bail!("{} file(s) failed", batch.failed);
    }
    Ok(())
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let pool = storage::create_pool(&config.database).await?;
    let context = Arc::new(ServerContext::new(pool, config));

    // Ranker training is best-effort; an empty index just means no boosts
    if let Err(e) = context.warm_up().await {
        tracing::warn!(error = %e, "Ranker warm-up failed");
    }

    McpStdioServer::new(context).run().await
}

async fn status(config: &AppConfig) -> anyhow::Result<()> {
    let pool = storage::create_pool(&config.database).await?;

    let metadata = storage::MetadataRepository::new(pool.clone());
    let endpoints = storage::EndpointRepository::new(pool.clone());
    let schemas = storage::SchemaRepository::new(pool.clone());
    let security = storage::SecurityRepository::new(pool.clone());

    println!("specs:            {}", metadata.count().await?);
    println!("endpoints:        {}", endpoints.count(None).await?);
    println!("schemas:          {}", schemas.count(None).await?);
    println!("security schemes: {}", security.count(None).await?);
    if let Some(latest) = metadata.get_latest().await? {
        println!("latest:           {} {} ({})", latest.title, latest.version, latest.ingested_at);
    }

    let monitor = Arc::new(PerformanceMonitor::new(config.monitoring.clone()));
    let checker = HealthChecker::new(pool, monitor);
    let report = checker.full().await?;
    println!("health:           {:?}", report.status);
    Ok(())
}

async fn migrate(
    config: &AppConfig,
    dry_run: bool,
    rollback: Option<String>,
) -> anyhow::Result<()> {
    let mut database = config.database.clone();
    database.auto_migrate = false;
    let pool = storage::create_pool(&database).await?;

    if let Some(version) = rollback {
        storage::rollback_migration(&pool, &version).await?;
        println!("rolled back {version}");
        return Ok(());
    }

    let applied = storage::migrate_to_latest(&pool, dry_run).await?;
    if dry_run {
        if applied.is_empty() {
            println!("no pending migrations");
        } else {
            for name in applied {
                println!("pending: {name}");
            }
        }
    } else {
        println!("{} migration(s) applied", applied.len());
    }
    Ok(())
}

async fn backup(config: &AppConfig, cleanup: bool) -> anyhow::Result<()> {
    let db_path = BackupManager::database_file_path(&config.database.url)?;
    let pool = storage::create_pool(&config.database).await?;
    let manager = BackupManager::new(config.backup.clone(), db_path);

    let info = manager.create_backup(&pool).await?;
    println!(
        "backup written: {} ({} bytes)",
        info.backup_path.display(),
        info.metadata.size_bytes
    );

    if cleanup {
        let removed = manager.cleanup_old_backups().await?;
        println!("{removed} old backup(s) removed");
    }
    Ok(())
}

async fn restore(config: &AppConfig, backup_file: PathBuf) -> anyhow::Result<()> {
    let db_path = BackupManager::database_file_path(&config.database.url)?;
    let manager = BackupManager::new(config.backup.clone(), db_path);

    let snapshot = manager.restore_from_backup(&backup_file).await?;
    println!("restored from {} (previous state: {})", backup_file.display(), snapshot.display());
    Ok(())
}
