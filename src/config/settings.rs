//! # Configuration Settings
//!
//! Defines the configuration structure for the apidex engine.

use crate::errors::{ApidexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Stream parser configuration
    #[validate(nested)]
    pub parser: ParserConfig,

    /// Search subsystem configuration
    #[validate(nested)]
    pub search: SearchConfig,

    /// MCP method runtime configuration
    #[validate(nested)]
    pub mcp: McpConfig,

    /// Performance monitoring configuration
    #[validate(nested)]
    pub monitoring: MonitoringConfig,

    /// Backup configuration
    #[validate(nested)]
    pub backup: BackupConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(ApidexError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(ApidexError::validation("Database URL must start with 'sqlite:'"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ApidexError::validation(
                "min_connections cannot be greater than max_connections",
            ));
        }

        if self.parser.chunk_size_bytes as u64 > self.parser.max_file_size_bytes {
            return Err(ApidexError::validation(
                "Parser chunk size cannot exceed the maximum file size",
            ));
        }

        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL (sqlite: scheme)
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 64, message = "max_connections must be between 1 and 64"))]
    pub max_connections: u32,

    /// Minimum number of idle connections to maintain
    pub min_connections: u32,

    /// Connection acquisition timeout in seconds
    #[validate(range(min = 1, max = 300))]
    pub connect_timeout_seconds: u64,

    /// SQLite busy timeout in milliseconds
    #[validate(range(min = 100, max = 60_000))]
    pub busy_timeout_ms: u64,

    /// Run pending migrations on startup
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./apidex.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_seconds: 30,
            busy_timeout_ms: 5000,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get SQLite busy timeout as Duration
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Stream parser configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ParserConfig {
    /// Maximum accepted specification file size in bytes
    #[validate(range(min = 1024))]
    pub max_file_size_bytes: u64,

    /// Read chunk size in bytes
    #[validate(range(min = 1024))]
    pub chunk_size_bytes: usize,

    /// Emit a progress event at least every this many bytes
    #[validate(range(min = 4096))]
    pub progress_interval_bytes: u64,

    /// Resident-memory ceiling for a single parse, in bytes. 0 disables the guard.
    pub memory_ceiling_bytes: u64,

    /// Abort after this many recoverable parse errors
    #[validate(range(min = 1, max = 10_000))]
    pub max_errors: usize,

    /// Fail on the first recoverable error instead of accumulating
    pub strict: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 10 * 1024 * 1024,
            chunk_size_bytes: 64 * 1024,
            progress_interval_bytes: 1024 * 1024,
            memory_ceiling_bytes: 0,
            max_errors: 100,
            strict: false,
        }
    }
}

/// Search subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchConfig {
    /// Batch size when draining the endpoint repository into the index
    #[validate(range(min = 1, max = 10_000))]
    pub index_batch_size: usize,

    /// Maximum results considered before pagination
    #[validate(range(min = 1, max = 10_000))]
    pub max_search_results: usize,

    /// Additional synonym entries merged over the built-in map
    #[serde(default)]
    pub extra_synonyms: HashMap<String, Vec<String>>,

    /// Per-field relevance weights; unknown fields are ignored
    #[serde(default)]
    pub field_weights: HashMap<String, f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_batch_size: 500,
            max_search_results: 1000,
            extra_synonyms: HashMap::new(),
            field_weights: HashMap::new(),
        }
    }
}

/// MCP method runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct McpConfig {
    /// Per-request timeout in milliseconds, by method name; `default_timeout_ms`
    /// applies when a method has no entry.
    #[serde(default)]
    pub method_timeouts_ms: HashMap<String, u64>,

    /// Fallback per-request timeout in milliseconds
    #[validate(range(min = 10, max = 600_000))]
    pub default_timeout_ms: u64,

    /// Maximum concurrent in-flight requests per method
    #[validate(range(min = 1, max = 1024))]
    pub max_concurrent_requests: usize,

    /// Permit acquisition deadline in milliseconds
    #[validate(range(min = 1, max = 60_000))]
    pub acquire_timeout_ms: u64,

    /// Retry attempts for transient failures
    #[validate(range(min = 0, max = 10))]
    pub retry_attempts: u32,

    /// Base backoff delay between retries, in milliseconds
    #[validate(range(min = 1, max = 10_000))]
    pub retry_base_delay_ms: u64,

    /// Consecutive failures before the circuit opens
    #[validate(range(min = 1, max = 100))]
    pub breaker_failure_threshold: u32,

    /// Consecutive successes in half-open state before the circuit closes
    #[validate(range(min = 1, max = 100))]
    pub breaker_success_threshold: u32,

    /// Time the circuit stays open before probing, in milliseconds
    #[validate(range(min = 100, max = 600_000))]
    pub breaker_recovery_timeout_ms: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            method_timeouts_ms: HashMap::new(),
            default_timeout_ms: 5000,
            max_concurrent_requests: 32,
            acquire_timeout_ms: 2000,
            retry_attempts: 3,
            retry_base_delay_ms: 50,
            breaker_failure_threshold: 5,
            breaker_success_threshold: 2,
            breaker_recovery_timeout_ms: 10_000,
        }
    }
}

impl McpConfig {
    /// Per-request timeout for the named method
    pub fn timeout_for(&self, method: &str) -> Duration {
        Duration::from_millis(
            self.method_timeouts_ms.get(method).copied().unwrap_or(self.default_timeout_ms),
        )
    }
}

/// Performance monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MonitoringConfig {
    /// Maximum P95 latency per method, in milliseconds
    #[serde(default = "MonitoringConfig::default_p95_thresholds")]
    pub p95_thresholds_ms: HashMap<String, u64>,

    /// Maximum tolerated error rate before alerting (0..1)
    pub max_error_rate: f64,

    /// Response-time window size for P95 estimation
    #[validate(range(min = 10, max = 10_000))]
    pub p95_window_size: usize,

    /// Alert ring-buffer capacity
    #[validate(range(min = 16, max = 65_536))]
    pub alert_capacity: usize,
}

impl MonitoringConfig {
    fn default_p95_thresholds() -> HashMap<String, u64> {
        HashMap::from([
            ("searchEndpoints".to_string(), 200),
            ("getSchema".to_string(), 500),
            ("getExample".to_string(), 2000),
            ("getEndpointCategories".to_string(), 100),
        ])
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            p95_thresholds_ms: Self::default_p95_thresholds(),
            max_error_rate: 0.05,
            p95_window_size: 100,
            alert_capacity: 256,
        }
    }
}

/// Backup configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackupConfig {
    /// Directory backups are written to
    #[validate(length(min = 1))]
    pub directory: String,

    /// Gzip-compress backup archives
    pub compress: bool,

    /// Keep at most this many backups (0 keeps everything)
    pub retain_count: usize,

    /// Delete backups older than this many days (0 keeps everything)
    pub retain_days: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self { directory: "./backups".to_string(), compress: true, retain_count: 10, retain_days: 30 }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log filter directive (tracing env-filter syntax)
    #[validate(length(min = 1))]
    pub log_level: String,

    /// Emit logs as JSON
    pub json_logs: bool,

    /// Optional log file path; stderr when unset
    pub log_file: Option<String>,

    /// Expose Prometheus metrics on this port; 0 disables the exporter
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logs: false, log_file: None, metrics_port: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_database_scheme_rejected() {
        let mut config = AppConfig::default();
        config.database.url = "postgresql://localhost/apidex".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_greater_than_max_connections_rejected() {
        let mut config = AppConfig::default();
        config.database.min_connections = 20;
        config.database.max_connections = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_larger_than_file_limit_rejected() {
        let mut config = AppConfig::default();
        config.parser.max_file_size_bytes = 4096;
        config.parser.chunk_size_bytes = 8192;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_method_timeout_lookup() {
        let mut config = McpConfig::default();
        config.method_timeouts_ms.insert("getSchema".to_string(), 500);
        assert_eq!(config.timeout_for("getSchema"), Duration::from_millis(500));
        assert_eq!(config.timeout_for("searchEndpoints"), Duration::from_millis(5000));
    }

    #[test]
    fn test_default_p95_thresholds() {
        let config = MonitoringConfig::default();
        assert_eq!(config.p95_thresholds_ms.get("searchEndpoints"), Some(&200));
        assert_eq!(config.p95_thresholds_ms.get("getEndpointCategories"), Some(&100));
    }
}
