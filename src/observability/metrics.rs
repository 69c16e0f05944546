//! # Metrics Collection
//!
//! Prometheus metrics for the engine. The recorder is a thin façade over the
//! `metrics` macros; the exporter is optional and bound only when a port is
//! configured.

use crate::config::ObservabilityConfig;
use crate::errors::{ApidexError, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Install the Prometheus exporter when a metrics port is configured
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }

    let address: SocketAddr = ([127, 0, 0, 1], config.metrics_port).into();
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .map_err(|e| {
            ApidexError::config_with_source("Failed to install Prometheus exporter", Box::new(e))
        })?;

    describe_metrics();
    info!(%address, "Prometheus exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("mcp_requests_total", "MCP tool invocations");
    describe_counter!("mcp_errors_total", "MCP tool invocations that returned an error");
    describe_histogram!("mcp_request_duration_seconds", "MCP tool latency");
    describe_counter!("ingest_files_total", "Specification files processed");
    describe_counter!("ingest_endpoints_total", "Endpoints persisted");
    describe_histogram!("ingest_duration_seconds", "Full pipeline latency per file");
    describe_counter!("db_queries_total", "Database operations");
    describe_histogram!("db_query_duration_seconds", "Database operation latency");
    describe_gauge!("db_pool_connections_active", "Active pool connections");
    describe_gauge!("search_index_documents", "Documents in the search index");
    describe_gauge!("system_uptime_seconds", "Process uptime");
    describe_gauge!("memory_usage_bytes", "Resident memory");
}

/// Metrics recorder façade used across the crate
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record one MCP tool invocation
    pub fn record_mcp_request(&self, method: &str, duration_seconds: f64, success: bool) {
        let labels = [("method", method.to_string())];
        counter!("mcp_requests_total", &labels).increment(1);
        histogram!("mcp_request_duration_seconds", &labels).record(duration_seconds);
        if !success {
            counter!("mcp_errors_total", &labels).increment(1);
        }
    }

    /// Record one ingested specification
    pub fn record_ingestion(&self, endpoints: u64, duration_seconds: f64, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!("ingest_files_total", &[("status", status.to_string())]).increment(1);
        counter!("ingest_endpoints_total").increment(endpoints);
        histogram!("ingest_duration_seconds").record(duration_seconds);
    }

    /// Record database activity with execution timing
    pub fn record_db_query(&self, operation: &str, duration_seconds: f64, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels =
            [("operation", operation.to_string()), ("status", status.to_string())];
        counter!("db_queries_total", &labels).increment(1);
        histogram!("db_query_duration_seconds", &[("operation", operation.to_string())])
            .record(duration_seconds);
    }

    /// Update database pool gauges
    pub fn update_pool(&self, active: u32) {
        gauge!("db_pool_connections_active").set(active as f64);
    }

    /// Update search index size gauge
    pub fn update_index_documents(&self, documents: u64) {
        gauge!("search_index_documents").set(documents as f64);
    }

    /// Update process gauges
    pub fn update_system(&self, uptime_seconds: f64, memory_bytes: u64) {
        gauge!("system_uptime_seconds").set(uptime_seconds);
        gauge!("memory_usage_bytes").set(memory_bytes as f64);
    }
}
