//! # Logging Infrastructure
//!
//! tracing-subscriber initialization: env-filter directives from config,
//! optional JSON output, optional non-blocking file sink.

use crate::config::ObservabilityConfig;
use crate::errors::{ApidexError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber. The returned guard must be held for the
/// process lifetime when a log file is configured.
pub fn init_logging(config: &ObservabilityConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| ApidexError::config_with_source("Invalid log filter", Box::new(e)))?;

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    ApidexError::config_with_source(
                        format!("Cannot open log file {path}"),
                        Box::new(e),
                    )
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            if config.json_logs {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_writer(writer))
                    .try_init()
                    .ok();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .try_init()
                    .ok();
            }
            Ok(Some(guard))
        }
        None => {
            // MCP stdio owns stdout; logs must go to stderr
            if config.json_logs {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .try_init()
                    .ok();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .try_init()
                    .ok();
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_defaults() {
        let config = ObservabilityConfig::default();
        // First init wins; repeated calls in the test binary are tolerated
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_init_with_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apidex.log");
        let config = ObservabilityConfig {
            log_file: Some(path.display().to_string()),
            ..Default::default()
        };
        let guard = init_logging(&config).unwrap();
        assert!(guard.is_some());
        assert!(path.exists());
    }
}
