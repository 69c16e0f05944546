//! Per-method performance monitoring.
//!
//! Tracks request counts, error histograms and a bounded response-time
//! window per MCP method, derives P95/average/error-rate figures, and raises
//! alerts into a bounded ring buffer when configured thresholds are crossed.

use crate::config::MonitoringConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{ProcessesToUpdate, System};
use tracing::warn;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// One raised alert
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub alert_type: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Raw per-method counters
#[derive(Debug, Default)]
struct MethodState {
    total_requests: u64,
    total_errors: u64,
    total_response_time_ms: f64,
    /// Most recent response times, bounded by the configured window
    recent_ms: VecDeque<f64>,
    /// Request arrival times inside the last minute
    recent_arrivals: VecDeque<Instant>,
    error_types: BTreeMap<String, u64>,
}

/// Derived view of one method's metrics
#[derive(Debug, Clone, Serialize)]
pub struct MethodSnapshot {
    pub method: String,
    pub total_requests: u64,
    pub total_errors: u64,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub requests_per_minute: f64,
    pub error_rate: f64,
    pub error_types: BTreeMap<String, u64>,
}

/// Sampled process/system figures
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub concurrent_connections: usize,
    pub database_pool_utilization: f64,
    pub memory_usage_mb: f64,
    pub cpu_utilization: f64,
    pub uptime_seconds: f64,
}

/// Aggregates per-method metrics, thresholds and alerts
pub struct PerformanceMonitor {
    config: MonitoringConfig,
    methods: DashMap<String, Mutex<MethodState>>,
    alerts: Mutex<VecDeque<Alert>>,
    concurrent: AtomicUsize,
    pool_utilization: Mutex<f64>,
    started: Instant,
    system: Mutex<System>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            config,
            methods: DashMap::new(),
            alerts: Mutex::new(VecDeque::new()),
            concurrent: AtomicUsize::new(0),
            pool_utilization: Mutex::new(0.0),
            started: Instant::now(),
            system: Mutex::new(System::new()),
        }
    }

    /// Record one request outcome; raises threshold alerts as a side effect
    pub fn record_request(&self, method: &str, duration: Duration, error_code: Option<&str>) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let entry = self.methods.entry(method.to_string()).or_default();
        let mut state = match entry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        state.total_requests += 1;
        state.total_response_time_ms += duration_ms;
        state.recent_ms.push_back(duration_ms);
        while state.recent_ms.len() > self.config.p95_window_size {
            state.recent_ms.pop_front();
        }
        let now = Instant::now();
        state.recent_arrivals.push_back(now);
        while state
            .recent_arrivals
            .front()
            .is_some_and(|t| now.duration_since(*t) > Duration::from_secs(60))
        {
            state.recent_arrivals.pop_front();
        }
        if let Some(code) = error_code {
            state.total_errors += 1;
            *state.error_types.entry(code.to_string()).or_default() += 1;
        }

        let p95 = percentile_95(&state.recent_ms);
        let error_rate = state.total_errors as f64 / state.total_requests as f64;
        let sample_count = state.total_requests;
        drop(state);
        drop(entry);

        if let Some(&threshold_ms) = self.config.p95_thresholds_ms.get(method) {
            if p95 > threshold_ms as f64 {
                self.raise(Alert {
                    alert_type: "p95_exceeded".to_string(),
                    message: format!(
                        "{method} P95 {p95:.1}ms exceeds threshold {threshold_ms}ms"
                    ),
                    severity: AlertSeverity::Warning,
                    timestamp: chrono::Utc::now(),
                    method: Some(method.to_string()),
                });
            }
        }

        // A lone failing request is not a rate signal
        if sample_count >= 5 && error_rate > self.config.max_error_rate {
            self.raise(Alert {
                alert_type: "error_rate_exceeded".to_string(),
                message: format!(
                    "{method} error rate {error_rate:.3} exceeds {:.3}",
                    self.config.max_error_rate
                ),
                severity: AlertSeverity::Critical,
                timestamp: chrono::Utc::now(),
                method: Some(method.to_string()),
            });
        }
    }

    fn raise(&self, alert: Alert) {
        warn!(
            alert_type = %alert.alert_type,
            method = alert.method.as_deref().unwrap_or("-"),
            "{}",
            alert.message
        );
        let mut alerts = match self.alerts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        alerts.push_back(alert);
        while alerts.len() > self.config.alert_capacity {
            alerts.pop_front();
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        match self.alerts.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Derived metrics for one method
    pub fn snapshot(&self, method: &str) -> Option<MethodSnapshot> {
        let entry = self.methods.get(method)?;
        let state = match entry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(MethodSnapshot {
            method: method.to_string(),
            total_requests: state.total_requests,
            total_errors: state.total_errors,
            avg_response_time_ms: if state.total_requests == 0 {
                0.0
            } else {
                state.total_response_time_ms / state.total_requests as f64
            },
            p95_response_time_ms: percentile_95(&state.recent_ms),
            requests_per_minute: state.recent_arrivals.len() as f64,
            error_rate: if state.total_requests == 0 {
                0.0
            } else {
                state.total_errors as f64 / state.total_requests as f64
            },
            error_types: state.error_types.clone(),
        })
    }

    pub fn all_snapshots(&self) -> Vec<MethodSnapshot> {
        self.methods
            .iter()
            .filter_map(|entry| self.snapshot(entry.key()))
            .collect()
    }

    /// Threshold evaluation for the health check: (method, p95, threshold)
    pub fn threshold_violations(&self) -> Vec<(String, f64, u64)> {
        self.all_snapshots()
            .into_iter()
            .filter_map(|snapshot| {
                let threshold = *self.config.p95_thresholds_ms.get(&snapshot.method)?;
                (snapshot.p95_response_time_ms > threshold as f64)
                    .then_some((snapshot.method, snapshot.p95_response_time_ms, threshold))
            })
            .collect()
    }

    pub fn connection_opened(&self) {
        self.concurrent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.concurrent.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set_pool_utilization(&self, utilization: f64) {
        if let Ok(mut guard) = self.pool_utilization.lock() {
            *guard = utilization;
        }
    }

    /// Sample system figures. Touches /proc via sysinfo; cheap but not free.
    pub fn system_snapshot(&self) -> SystemSnapshot {
        let (memory_mb, cpu) = {
            let mut system = match self.system.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match sysinfo::get_current_pid() {
                Ok(pid) => {
                    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                    system
                        .process(pid)
                        .map(|p| (p.memory() as f64 / (1024.0 * 1024.0), p.cpu_usage() as f64))
                        .unwrap_or((0.0, 0.0))
                }
                Err(_) => (0.0, 0.0),
            }
        };

        SystemSnapshot {
            concurrent_connections: self.concurrent.load(Ordering::Relaxed),
            database_pool_utilization: self.pool_utilization.lock().map(|g| *g).unwrap_or(0.0),
            memory_usage_mb: memory_mb,
            cpu_utilization: cpu,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
        }
    }
}

fn percentile_95(window: &VecDeque<f64>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(MonitoringConfig::default())
    }

    #[test]
    fn test_averages_and_error_rate() {
        let monitor = monitor();
        monitor.record_request("searchEndpoints", Duration::from_millis(100), None);
        monitor.record_request("searchEndpoints", Duration::from_millis(200), None);
        monitor.record_request("searchEndpoints", Duration::from_millis(150), Some("Timeout"));

        let snapshot = monitor.snapshot("searchEndpoints").unwrap();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.total_errors, 1);
        assert!((snapshot.avg_response_time_ms - 150.0).abs() < 1.0);
        assert!((snapshot.error_rate - 1.0 / 3.0).abs() < 0.001);
        assert_eq!(snapshot.error_types.get("Timeout"), Some(&1));
        assert!(snapshot.requests_per_minute >= 3.0);
    }

    #[test]
    fn test_p95_estimation() {
        let monitor = monitor();
        // 19 fast requests and one slow one
        for _ in 0..19 {
            monitor.record_request("getSchema", Duration::from_millis(100), None);
        }
        monitor.record_request("getSchema", Duration::from_millis(1500), None);

        let snapshot = monitor.snapshot("getSchema").unwrap();
        assert!(
            (1400.0..=1600.0).contains(&snapshot.p95_response_time_ms),
            "p95 was {}",
            snapshot.p95_response_time_ms
        );
    }

    #[test]
    fn test_window_is_bounded() {
        let config = MonitoringConfig { p95_window_size: 10, ..Default::default() };
        let monitor = PerformanceMonitor::new(config);
        for i in 0..50 {
            monitor.record_request("getExample", Duration::from_millis(i), None);
        }
        let state = monitor.methods.get("getExample").unwrap();
        assert_eq!(state.lock().unwrap().recent_ms.len(), 10);
    }

    #[test]
    fn test_p95_threshold_alert() {
        let mut config = MonitoringConfig::default();
        config.p95_thresholds_ms.insert("searchEndpoints".to_string(), 100);
        let monitor = PerformanceMonitor::new(config);

        monitor.record_request("searchEndpoints", Duration::from_millis(250), None);
        let alerts = monitor.alerts();
        assert!(alerts.iter().any(|a| a.alert_type == "p95_exceeded"));
        assert!(!monitor.threshold_violations().is_empty());
    }

    #[test]
    fn test_error_rate_alert_needs_samples() {
        let config = MonitoringConfig { max_error_rate: 0.2, ..Default::default() };
        let monitor = PerformanceMonitor::new(config);

        monitor.record_request("getSchema", Duration::from_millis(10), Some("Internal"));
        assert!(
            !monitor.alerts().iter().any(|a| a.alert_type == "error_rate_exceeded"),
            "one failing request must not trip the rate alert"
        );

        for _ in 0..4 {
            monitor.record_request("getSchema", Duration::from_millis(10), Some("Internal"));
        }
        assert!(monitor.alerts().iter().any(|a| a.alert_type == "error_rate_exceeded"));
    }

    #[test]
    fn test_alert_ring_is_bounded() {
        let config = MonitoringConfig {
            alert_capacity: 16,
            max_error_rate: 0.0,
            ..Default::default()
        };
        let monitor = PerformanceMonitor::new(config);
        for _ in 0..100 {
            monitor.record_request("getExample", Duration::from_millis(1), Some("boom"));
        }
        assert!(monitor.alerts().len() <= 16);
    }

    #[test]
    fn test_connection_gauge() {
        let monitor = monitor();
        monitor.connection_opened();
        monitor.connection_opened();
        monitor.connection_closed();
        let snapshot = monitor.system_snapshot();
        assert_eq!(snapshot.concurrent_connections, 1);
        assert!(snapshot.uptime_seconds >= 0.0);
    }
}
