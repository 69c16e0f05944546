//! Server context.
//!
//! One value threaded through every handler carrying the repositories, the
//! search engine, the per-method resilience singletons and the monitoring
//! surfaces. No module-level globals.

use crate::config::AppConfig;
use crate::errors::Result;
use crate::mcp::resilience::MethodResilience;
use crate::observability::{MetricsRecorder, PerformanceMonitor};
use crate::search::SearchEngine;
use crate::storage::{
    DbPool, EndpointRepository, MetadataRepository, SchemaRepository, SecurityRepository,
};
use std::collections::HashMap;
use std::sync::Arc;

/// The four MCP tool methods
pub const TOOL_METHODS: &[&str] =
    &["searchEndpoints", "getSchema", "getExample", "getEndpointCategories"];

/// Shared state for the MCP method runtime
pub struct ServerContext {
    pub pool: DbPool,
    pub endpoints: EndpointRepository,
    pub schemas: SchemaRepository,
    pub security: SecurityRepository,
    pub metadata: MetadataRepository,
    pub search: SearchEngine,
    pub monitor: Arc<PerformanceMonitor>,
    pub recorder: MetricsRecorder,
    resilience: HashMap<&'static str, MethodResilience>,
}

impl ServerContext {
    pub fn new(pool: DbPool, config: &AppConfig) -> Self {
        let resilience = TOOL_METHODS
            .iter()
            .map(|method| (*method, MethodResilience::new(method, &config.mcp)))
            .collect();

        Self {
            endpoints: EndpointRepository::new(pool.clone()),
            schemas: SchemaRepository::new(pool.clone()),
            security: SecurityRepository::new(pool.clone()),
            metadata: MetadataRepository::new(pool.clone()),
            search: SearchEngine::new(pool.clone(), config.search.clone()),
            monitor: Arc::new(PerformanceMonitor::new(config.monitoring.clone())),
            recorder: MetricsRecorder::new(),
            resilience,
            pool,
        }
    }

    /// Per-method resilience singleton
    pub fn resilience_for(&self, method: &str) -> Option<&MethodResilience> {
        self.resilience.get(method)
    }

    /// Rebuild the search index if it drifted from the store, then train
    /// the relevance ranker over it
    pub async fn warm_up(&self) -> Result<()> {
        let validation = self.search.index_manager().validate_integrity().await?;
        if !validation.is_consistent {
            tracing::warn!(
                indexed = validation.indexed_documents,
                stored = validation.stored_endpoints,
                "Search index drifted from store, rebuilding"
            );
            self.search.index_manager().create_from_store().await?;
        }

        let trained_over = self.search.train().await?;
        tracing::info!(documents = trained_over, "Relevance ranker trained");
        Ok(())
    }
}
