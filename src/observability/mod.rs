//! # Observability
//!
//! Logging initialization, Prometheus metrics, per-method performance
//! monitoring with thresholds and alerts, and composite health checks.

pub mod health;
pub mod logging;
pub mod metrics;
pub mod monitor;

pub use health::{ComponentHealth, HealthChecker, HealthReport, HealthStatus};
pub use logging::init_logging;
pub use metrics::{init_metrics, MetricsRecorder};
pub use monitor::{Alert, AlertSeverity, MethodSnapshot, PerformanceMonitor, SystemSnapshot};
