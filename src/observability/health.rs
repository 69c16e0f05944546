//! # Health Checking
//!
//! Component health checks composed into one aggregate status. Basic health
//! answers immediately without touching the database; the full check probes
//! connectivity, storage integrity, the search path and the performance
//! thresholds.

use crate::errors::Result;
use crate::observability::monitor::PerformanceMonitor;
use crate::storage::{self, DbPool};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Health status for a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded { message: String },
    Unhealthy { message: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded { .. })
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub component: String,
    #[serde(flatten)]
    pub status: HealthStatus,
    pub last_check: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ComponentHealth {
    fn new(component: &str, status: HealthStatus) -> Self {
        Self {
            component: component.to_string(),
            status,
            last_check: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }

    fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Aggregate health report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: f64,
}

/// Runs component checks against live resources
pub struct HealthChecker {
    pool: DbPool,
    monitor: Arc<PerformanceMonitor>,
}

impl HealthChecker {
    pub fn new(pool: DbPool, monitor: Arc<PerformanceMonitor>) -> Self {
        Self { pool, monitor }
    }

    /// Liveness only: no I/O, answers immediately
    pub fn basic(&self) -> HealthReport {
        let uptime = self.monitor.system_snapshot().uptime_seconds;
        HealthReport {
            status: HealthStatus::Healthy,
            components: vec![ComponentHealth::new("process", HealthStatus::Healthy)],
            checked_at: chrono::Utc::now(),
            uptime_seconds: uptime,
        }
    }

    /// Database connectivity plus an integrity summary
    pub async fn check_database(&self) -> ComponentHealth {
        if let Err(e) = sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            return ComponentHealth::new(
                "database",
                HealthStatus::Unhealthy { message: format!("ping failed: {e}") },
            );
        }

        match storage::validate_integrity(&self.pool).await {
            Ok(report) if report.is_healthy => {
                ComponentHealth::new("database", HealthStatus::Healthy)
                    .with_metadata("integrity", "ok")
            }
            Ok(report) => ComponentHealth::new(
                "database",
                HealthStatus::Degraded {
                    message: format!(
                        "integrity issues: {} fk violations, missing tables: {:?}",
                        report.foreign_key_violations, report.missing_tables
                    ),
                },
            ),
            Err(e) => ComponentHealth::new(
                "database",
                HealthStatus::Unhealthy { message: format!("integrity check failed: {e}") },
            ),
        }
    }

    /// Synthetic query down the search path
    pub async fn check_search(&self) -> ComponentHealth {
        let result = sqlx::query("SELECT COUNT(*) FROM endpoints_fts")
            .fetch_one(&self.pool)
            .await;
        match result {
            Ok(_) => ComponentHealth::new("search", HealthStatus::Healthy),
            Err(e) => ComponentHealth::new(
                "search",
                HealthStatus::Degraded { message: format!("search index unavailable: {e}") },
            ),
        }
    }

    /// Evaluate recorded latencies against the configured thresholds
    pub fn check_performance(&self) -> ComponentHealth {
        let violations = self.monitor.threshold_violations();
        if violations.is_empty() {
            ComponentHealth::new("performance", HealthStatus::Healthy)
        } else {
            let detail: Vec<String> = violations
                .iter()
                .map(|(method, p95, limit)| format!("{method} p95 {p95:.0}ms > {limit}ms"))
                .collect();
            ComponentHealth::new(
                "performance",
                HealthStatus::Degraded { message: detail.join("; ") },
            )
        }
    }

    /// Full composite health
    pub async fn full(&self) -> Result<HealthReport> {
        let components = vec![
            self.check_database().await,
            self.check_search().await,
            self.check_performance(),
        ];

        let status = if components.iter().any(|c| !c.status.is_operational()) {
            HealthStatus::Unhealthy { message: "one or more components are down".to_string() }
        } else if components.iter().any(|c| !c.status.is_healthy()) {
            HealthStatus::Degraded { message: "one or more components are degraded".to_string() }
        } else {
            HealthStatus::Healthy
        };

        Ok(HealthReport {
            status,
            components,
            checked_at: chrono::Utc::now(),
            uptime_seconds: self.monitor.system_snapshot().uptime_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, MonitoringConfig};
    use crate::storage::create_pool;
    use std::time::Duration;

    async fn checker(auto_migrate: bool) -> HealthChecker {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            auto_migrate,
            ..Default::default()
        };
        let pool = create_pool(&config).await.unwrap();
        HealthChecker::new(pool, Arc::new(PerformanceMonitor::new(MonitoringConfig::default())))
    }

    #[tokio::test]
    async fn test_basic_health_is_immediate() {
        let checker = checker(false).await;
        let report = checker.basic();
        assert!(report.status.is_healthy());
    }

    #[tokio::test]
    async fn test_full_health_on_migrated_database() {
        let checker = checker(true).await;
        let report = checker.full().await.unwrap();
        assert!(report.status.is_healthy(), "{report:?}");
        assert_eq!(report.components.len(), 3);
    }

    #[tokio::test]
    async fn test_unmigrated_database_degrades() {
        let checker = checker(false).await;
        let report = checker.full().await.unwrap();
        assert!(!report.status.is_healthy());
        assert!(report.status.is_operational());
    }

    #[tokio::test]
    async fn test_performance_degrades_on_violation() {
        let mut config = MonitoringConfig::default();
        config.p95_thresholds_ms.insert("searchEndpoints".to_string(), 1);
        let monitor = Arc::new(PerformanceMonitor::new(config));
        monitor.record_request("searchEndpoints", Duration::from_millis(100), None);

        let db_config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            auto_migrate: true,
            ..Default::default()
        };
        let pool = create_pool(&db_config).await.unwrap();
        let checker = HealthChecker::new(pool, monitor);

        let component = checker.check_performance();
        assert!(matches!(component.status, HealthStatus::Degraded { .. }));
    }
}
