//! # Ingestion Pipeline
//!
//! Orchestrates Parse → Normalize → Persist → (optional) BuildSearchIndex
//! for one specification file, with compensating rollbacks running in
//! reverse order when a downstream stage fails. Batch mode processes many
//! files with bounded concurrency; per-file failures never abort the batch.

use crate::config::{AppConfig, ParserConfig};
use crate::errors::{ApidexError, Result};
use crate::normalizer::{self, NormalizedSpec};
use crate::parser::{self, ParseMetrics, ParsedSpec, StreamParser};
use crate::search::SearchIndexManager;
use crate::storage::{
    DbPool, EndpointRepository, MetadataRepository, SchemaRepository, SecurityRepository,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome of one pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

/// Threaded through every stage of one run
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub file_path: PathBuf,
    pub file_hash: Option<String>,
    pub api_id: Option<i64>,
    pub stage_results: Vec<StageResult>,
    pub parse_metrics: Option<ParseMetrics>,
}

/// Final result for one file
#[derive(Debug, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub file_path: String,
    pub api_id: Option<i64>,
    pub stage_results: Vec<StageResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub consistency_score: Option<f64>,
    pub total_duration_ms: u64,
}

/// Batch outcome: one entry per file plus aggregate counters
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub results: Vec<ProcessingResult>,
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

/// Post-ingestion count reconciliation
#[derive(Debug, Clone, Serialize)]
pub struct IngestIntegrityReport {
    pub api_id: i64,
    pub endpoints_expected: i64,
    pub endpoints_stored: i64,
    pub schemas_expected: i64,
    pub schemas_stored: i64,
    pub security_schemes_expected: i64,
    pub security_schemes_stored: i64,
    pub is_consistent: bool,
}

/// The ingestion pipeline
pub struct IngestionPipeline {
    pool: DbPool,
    parser: StreamParser,
    strict: bool,
    max_parse_errors: usize,
    build_index: bool,
    batch_concurrency: usize,
    index_batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(pool: DbPool, parser_config: ParserConfig, index_batch_size: usize) -> Self {
        let strict = parser_config.strict;
        let max_parse_errors = parser_config.max_errors;
        Self {
            pool,
            parser: StreamParser::new(parser_config),
            strict,
            max_parse_errors,
            build_index: true,
            batch_concurrency: 3,
            index_batch_size,
        }
    }

    pub fn from_config(pool: DbPool, config: &AppConfig) -> Self {
        Self::new(pool, config.parser.clone(), config.search.index_batch_size)
    }

    pub fn with_index_build(mut self, build_index: bool) -> Self {
        self.build_index = build_index;
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    /// Run the full pipeline for one file
    pub async fn process_file(&self, path: impl AsRef<Path>) -> ProcessingResult {
        let started = Instant::now();
        let mut context = PipelineContext {
            file_path: path.as_ref().to_path_buf(),
            ..Default::default()
        };
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut consistency_score = None;

        let outcome: Result<()> = async {
            // Parse
            let parsed = self.run_parse_stage(&mut context, &mut warnings).await?;

            // Normalize
            let normalized = self.run_normalize_stage(&mut context, &parsed, &mut warnings)?;
            consistency_score = Some(normalized.consistency.score);

            // Persist
            self.run_persist_stage(&mut context, &normalized).await?;

            // BuildSearchIndex
            if self.build_index {
                self.run_index_stage(&mut context).await?;
            }
            Ok(())
        }
        .await;

        let success = match outcome {
            Ok(()) => true,
            Err(e) => {
                errors.push(e.to_string());
                self.rollback(&context).await;
                false
            }
        };

        ProcessingResult {
            success,
            file_path: context.file_path.display().to_string(),
            api_id: if success { context.api_id } else { None },
            stage_results: context.stage_results,
            errors,
            warnings,
            consistency_score,
            total_duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn run_parse_stage(
        &self,
        context: &mut PipelineContext,
        warnings: &mut Vec<String>,
    ) -> Result<ParsedSpec> {
        let started = Instant::now();
        let mut repair_warning = None;
        let result = self.parser.parse_file(&context.file_path, None).await;

        let parsed = match result {
            Ok(parsed) => parsed,
            // Syntactic faults get one automatic repair attempt outside
            // strict mode (trailing commas, stray quotes)
            Err(ApidexError::InvalidJson { message, line, column }) if !self.strict => {
                match self.parser.parse_file_with_repair(&context.file_path).await {
                    Ok(parsed) => {
                        repair_warning = Some(format!(
                            "document repaired before parsing (original error: {message})"
                        ));
                        parsed
                    }
                    Err(repair_error) => {
                        context.stage_results.push(StageResult {
                            stage: "parse".to_string(),
                            success: false,
                            errors: vec![repair_error.to_string()],
                            warnings: Vec::new(),
                            duration_ms: started.elapsed().as_millis() as u64,
                        });
                        return Err(ApidexError::InvalidJson { message, line, column });
                    }
                }
            }
            Err(e) => {
                context.stage_results.push(StageResult {
                    stage: "parse".to_string(),
                    success: false,
                    errors: vec![e.to_string()],
                    warnings: Vec::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                return Err(e);
            }
        };

        // Skeleton and spec-level validation
        let mut stage_errors = Vec::new();
        let mut stage_warnings = Vec::new();
        stage_warnings.extend(repair_warning);

        let structure_issues = parser::validate_structure(&parsed.document);
        let mut accumulator = parser::IssueAccumulator::new(self.max_parse_errors, self.strict);
        for issue in structure_issues {
            let fatal = matches!(
                parser::strategy_for(&issue.fault, self.strict),
                parser::RecoveryStrategy::FailFast
            );
            if fatal {
                stage_errors.push(issue.message.clone());
            } else {
                stage_warnings.push(issue.message.clone());
            }
            if !accumulator.record(issue) {
                break;
            }
        }

        if stage_errors.is_empty() {
            match parser::validate_spec(&parsed.document) {
                Ok(report) => {
                    stage_errors.extend(report.errors);
                    stage_warnings.extend(report.warnings);
                }
                Err(e) => stage_errors.push(e.to_string()),
            }
        }

        let success = stage_errors.is_empty();
        context.file_hash = Some(parsed.file_hash.clone());
        context.parse_metrics = Some(parsed.metrics.clone());
        context.stage_results.push(StageResult {
            stage: "parse".to_string(),
            success,
            errors: stage_errors.clone(),
            warnings: stage_warnings.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
        warnings.extend(stage_warnings);

        if !stage_errors.is_empty() {
            return Err(ApidexError::structure(
                format!("structure validation failed: {}", stage_errors.join("; ")),
                None,
                None,
            ));
        }
        Ok(parsed)
    }

    fn run_normalize_stage(
        &self,
        context: &mut PipelineContext,
        parsed: &ParsedSpec,
        warnings: &mut Vec<String>,
    ) -> Result<NormalizedSpec> {
        let started = Instant::now();
        let result = normalizer::normalize(parsed);

        match result {
            Ok(normalized) => {
                let mut stage_warnings = normalized.warnings.clone();
                stage_warnings.extend(normalized.consistency.warnings.clone());
                let mut stage_errors = normalized.errors.clone();
                if self.strict {
                    stage_errors.extend(normalized.consistency.errors.clone());
                } else {
                    // Reference errors degrade to warnings outside strict mode
                    stage_warnings.extend(normalized.consistency.errors.clone());
                }

                context.stage_results.push(StageResult {
                    stage: "normalize".to_string(),
                    success: stage_errors.is_empty(),
                    errors: stage_errors.clone(),
                    warnings: stage_warnings.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                warnings.extend(stage_warnings);

                if !stage_errors.is_empty() {
                    return Err(ApidexError::validation(format!(
                        "normalization failed: {}",
                        stage_errors.join("; ")
                    )));
                }
                Ok(normalized)
            }
            Err(e) => {
                context.stage_results.push(StageResult {
                    stage: "normalize".to_string(),
                    success: false,
                    errors: vec![e.to_string()],
                    warnings: Vec::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Err(e)
            }
        }
    }

    /// Persist the whole normalized spec in one transaction
    async fn run_persist_stage(
        &self,
        context: &mut PipelineContext,
        normalized: &NormalizedSpec,
    ) -> Result<()> {
        let started = Instant::now();

        let result: Result<i64> = async {
            let mut tx = self.pool.begin().await?;

            let api_id = MetadataRepository::insert_tx(&mut tx, &normalized.metadata).await?;
            for endpoint in &normalized.endpoints {
                EndpointRepository::insert_tx(&mut tx, api_id, endpoint).await?;
            }
            for schema in &normalized.schemas {
                SchemaRepository::insert_tx(&mut tx, api_id, schema).await?;
            }
            for scheme in &normalized.security_schemes {
                SecurityRepository::insert_tx(&mut tx, api_id, scheme).await?;
            }
            EndpointRepository::insert_categories_tx(&mut tx, api_id, &normalized.categories)
                .await?;

            tx.commit().await?;
            Ok(api_id)
        }
        .await;

        match result {
            Ok(api_id) => {
                context.api_id = Some(api_id);
                context.stage_results.push(StageResult {
                    stage: "persist".to_string(),
                    success: true,
                    errors: Vec::new(),
                    warnings: Vec::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                info!(
                    api_id,
                    endpoints = normalized.endpoints.len(),
                    schemas = normalized.schemas.len(),
                    "Specification persisted"
                );
                Ok(())
            }
            Err(e) => {
                context.stage_results.push(StageResult {
                    stage: "persist".to_string(),
                    success: false,
                    errors: vec![e.to_string()],
                    warnings: Vec::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Err(e)
            }
        }
    }

    async fn run_index_stage(&self, context: &mut PipelineContext) -> Result<()> {
        let started = Instant::now();
        let manager = SearchIndexManager::new(self.pool.clone(), self.index_batch_size);
        let result = manager.create_from_store().await;

        match result {
            Ok(indexed) => {
                context.stage_results.push(StageResult {
                    stage: "build_search_index".to_string(),
                    success: true,
                    errors: Vec::new(),
                    warnings: Vec::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                info!(indexed, "Search index built");
                Ok(())
            }
            Err(e) => {
                context.stage_results.push(StageResult {
                    stage: "build_search_index".to_string(),
                    success: false,
                    errors: vec![e.to_string()],
                    warnings: Vec::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Err(e)
            }
        }
    }

    /// Compensate completed stages in reverse order
    async fn rollback(&self, context: &PipelineContext) {
        let completed: Vec<&str> = context
            .stage_results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.stage.as_str())
            .collect();

        for stage in completed.iter().rev() {
            match *stage {
                "build_search_index" => {
                    let manager =
                        SearchIndexManager::new(self.pool.clone(), self.index_batch_size);
                    if let Err(e) = manager.create_from_store().await {
                        warn!(error = %e, "Index rollback rebuild failed");
                    }
                }
                "persist" => {
                    if let Some(api_id) = context.api_id {
                        let repo = MetadataRepository::new(self.pool.clone());
                        match repo.delete_by_id(api_id).await {
                            Ok(_) => info!(api_id, "Persist stage rolled back"),
                            Err(e) => {
                                error!(api_id, error = %e, "Persist rollback failed")
                            }
                        }
                    }
                }
                // Parse and normalize hold no external state
                _ => {}
            }
        }
    }

    /// Process many files with bounded concurrency
    pub async fn process_batch(&self, paths: Vec<PathBuf>) -> BatchResult {
        let started = Instant::now();
        let total_files = paths.len();

        let results: Vec<ProcessingResult> = stream::iter(paths)
            .map(|path| async move { self.process_file(path).await })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.success).count();
        BatchResult {
            failed: total_files - succeeded,
            succeeded,
            total_files,
            results,
            total_duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Reconcile stored counts against the metadata row written at ingest
    pub async fn validate_integrity(&self, api_id: i64) -> Result<IngestIntegrityReport> {
        let metadata = MetadataRepository::new(self.pool.clone()).get_by_id_or_raise(api_id).await?;
        let endpoints_stored = EndpointRepository::new(self.pool.clone()).count(Some(api_id)).await?;
        let schemas_stored = SchemaRepository::new(self.pool.clone()).count(Some(api_id)).await?;
        let security_stored = SecurityRepository::new(self.pool.clone()).count(Some(api_id)).await?;

        Ok(IngestIntegrityReport {
            api_id,
            endpoints_expected: metadata.endpoint_count,
            endpoints_stored,
            schemas_expected: metadata.schema_count,
            schemas_stored,
            security_schemes_expected: metadata.security_scheme_count,
            security_schemes_stored: security_stored,
            is_consistent: metadata.endpoint_count == endpoints_stored
                && metadata.schema_count == schemas_stored
                && metadata.security_scheme_count == security_stored,
        })
    }
}

/// Preset pipeline shapes
pub struct PipelineFactory;

impl PipelineFactory {
    /// Balanced defaults
    pub fn default_pipeline(pool: DbPool, config: &AppConfig) -> IngestionPipeline {
        IngestionPipeline::from_config(pool, config)
    }

    /// Larger batches, more file-level concurrency
    pub fn high_performance(pool: DbPool, config: &AppConfig) -> IngestionPipeline {
        let mut parser_config = config.parser.clone();
        parser_config.chunk_size_bytes = parser_config.chunk_size_bytes.max(256 * 1024);
        IngestionPipeline::new(pool, parser_config, config.search.index_batch_size.max(2000))
            .with_batch_concurrency(num_cpus::get().max(4))
    }

    /// Fail-fast on any recoverable error
    pub fn strict(pool: DbPool, config: &AppConfig) -> IngestionPipeline {
        let mut parser_config = config.parser.clone();
        parser_config.strict = true;
        IngestionPipeline::new(pool, parser_config, config.search.index_batch_size)
    }
}
