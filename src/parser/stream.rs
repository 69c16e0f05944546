//! Streaming specification parser.
//!
//! Decodes multi-megabyte OpenAPI documents through a chunked reader so the
//! resident footprint stays a constant factor over the file size. Property
//! order is preserved end to end (serde_json `preserve_order`), the raw bytes
//! are hashed for change detection, and extension keys are tallied for the
//! parse metrics report.

use crate::config::ParserConfig;
use crate::errors::{ApidexError, Result};
use crate::parser::progress::{ProgressEvent, ProgressReporter};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info};

/// Aggregate metrics from one parse
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ParseMetrics {
    pub endpoints_found: usize,
    pub schemas_found: usize,
    pub security_schemes_found: usize,
    pub extensions_found: usize,
    pub file_size: u64,
    pub parse_duration_ms: u64,
    pub memory_peak_bytes: u64,
}

/// A successfully decoded specification document
#[derive(Debug, Clone)]
pub struct ParsedSpec {
    pub document: Value,
    pub file_path: PathBuf,
    /// SHA-256 over the raw file bytes, hex-encoded
    pub file_hash: String,
    pub metrics: ParseMetrics,
}

/// Reader wrapper that counts bytes, feeds the hash, reports progress, and
/// polls the memory guard at every progress checkpoint.
struct TrackingReader<R> {
    inner: R,
    hasher: Sha256,
    bytes_read: Arc<AtomicU64>,
    reporter: Option<Arc<ProgressReporter>>,
    memory_guard: Option<MemoryGuard>,
    guard_failure: Option<ApidexError>,
}

impl<R: Read> Read for TrackingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
            let total = self.bytes_read.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
            if let Some(reporter) = &self.reporter {
                reporter.advance(total);
            }
            if let Some(guard) = &mut self.memory_guard {
                if let Err(e) = guard.check() {
                    // Surface through a short-circuit read error; the caller
                    // recovers the typed error from `guard_failure`.
                    self.guard_failure = Some(e);
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "memory ceiling exceeded",
                    ));
                }
            }
        }
        Ok(n)
    }
}

/// Samples resident memory of this process and trips past a ceiling
struct MemoryGuard {
    system: System,
    pid: sysinfo::Pid,
    ceiling_bytes: u64,
    peak_bytes: u64,
}

impl MemoryGuard {
    fn new(ceiling_bytes: u64) -> Option<Self> {
        let pid = sysinfo::get_current_pid().ok()?;
        Some(Self { system: System::new(), pid, ceiling_bytes, peak_bytes: 0 })
    }

    fn check(&mut self) -> Result<()> {
        self.system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let used = self.system.process(self.pid).map(|p| p.memory()).unwrap_or(0);
        self.peak_bytes = self.peak_bytes.max(used);
        if self.ceiling_bytes > 0 && used > self.ceiling_bytes {
            return Err(ApidexError::MemoryLimitExceeded {
                used_bytes: used,
                limit_bytes: self.ceiling_bytes,
            });
        }
        Ok(())
    }
}

/// Incremental specification parser
#[derive(Debug, Clone)]
pub struct StreamParser {
    config: ParserConfig,
}

impl StreamParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse the file at `path`, optionally reporting progress to `observer`.
    ///
    /// Decoding runs on the blocking thread pool; the returned document keeps
    /// the source's property insertion order.
    pub async fn parse_file(
        &self,
        path: impl AsRef<Path>,
        observer: Option<Box<dyn Fn(ProgressEvent) + Send + Sync>>,
    ) -> Result<ParsedSpec> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await.map_err(|_| ApidexError::FileNotFound {
            path: path.display().to_string(),
        })?;

        if !metadata.is_file() {
            return Err(ApidexError::FileNotFound { path: path.display().to_string() });
        }

        let file_size = metadata.len();
        if file_size > self.config.max_file_size_bytes {
            return Err(ApidexError::FileTooLarge {
                size: file_size,
                limit: self.config.max_file_size_bytes,
            });
        }

        let config = self.config.clone();
        let start = Instant::now();
        let decode_path = path.clone();
        let (document, file_hash, memory_peak) = tokio::task::spawn_blocking(move || {
            Self::decode_blocking(&decode_path, &config, file_size, observer)
        })
        .await
        .map_err(|e| ApidexError::internal(format!("Parse task panicked: {e}")))??;

        let mut metrics = ParseMetrics {
            file_size,
            parse_duration_ms: start.elapsed().as_millis() as u64,
            memory_peak_bytes: memory_peak,
            ..Default::default()
        };
        Self::collect_counts(&document, &mut metrics);

        info!(
            file_size,
            duration_ms = metrics.parse_duration_ms,
            endpoints = metrics.endpoints_found,
            schemas = metrics.schemas_found,
            extensions = metrics.extensions_found,
            "Parsed specification file"
        );

        Ok(ParsedSpec { file_path: path, document, file_hash, metrics })
    }

    fn decode_blocking(
        path: &Path,
        config: &ParserConfig,
        file_size: u64,
        observer: Option<Box<dyn Fn(ProgressEvent) + Send + Sync>>,
    ) -> Result<(Value, String, u64)> {
        let file = std::fs::File::open(path).map_err(|_| ApidexError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let reporter = observer.map(|obs| {
            Arc::new(ProgressReporter::new(config.progress_interval_bytes, file_size, move |e| {
                obs(e)
            }))
        });

        let bytes_read = Arc::new(AtomicU64::new(0));
        let mut tracking = TrackingReader {
            inner: BufReader::with_capacity(config.chunk_size_bytes, file),
            hasher: Sha256::new(),
            bytes_read: Arc::clone(&bytes_read),
            reporter: reporter.clone(),
            memory_guard: if config.memory_ceiling_bytes > 0 {
                MemoryGuard::new(config.memory_ceiling_bytes)
            } else {
                None
            },
            guard_failure: None,
        };

        let decoded: std::result::Result<Value, serde_json::Error> =
            serde_json::from_reader(&mut tracking);

        if let Some(guard_err) = tracking.guard_failure.take() {
            return Err(guard_err);
        }

        let document = decoded.map_err(|e| {
            debug!(error = %e, "JSON decode failed");
            ApidexError::invalid_json(e.to_string(), Some(e.line() as u64), Some(e.column() as u64))
        })?;

        if !document.is_object() {
            return Err(ApidexError::structure(
                "Specification root must be a JSON object",
                Some("$".to_string()),
                Some("Wrap the document in an object with 'openapi' and 'paths' keys".to_string()),
            ));
        }

        let total = bytes_read.load(Ordering::Relaxed);
        if let Some(reporter) = &reporter {
            reporter.finish(total);
        }

        let hash = hex::encode(tracking.hasher.finalize());
        let peak = tracking.memory_guard.map(|g| g.peak_bytes).unwrap_or(0);
        Ok((document, hash, peak))
    }

    fn collect_counts(document: &Value, metrics: &mut ParseMetrics) {
        if let Some(paths) = document.get("paths").and_then(|p| p.as_object()) {
            metrics.endpoints_found = paths
                .values()
                .filter_map(|item| item.as_object())
                .map(|item| {
                    item.keys()
                        .filter(|k| k.to_ascii_uppercase().parse::<crate::domain::HttpMethod>().is_ok())
                        .count()
                })
                .sum();
        }

        let schemas = document
            .get("components")
            .and_then(|c| c.get("schemas"))
            .or_else(|| document.get("definitions"));
        if let Some(map) = schemas.and_then(|s| s.as_object()) {
            metrics.schemas_found = map.len();
        }

        let security = document
            .get("components")
            .and_then(|c| c.get("securitySchemes"))
            .or_else(|| document.get("securityDefinitions"));
        if let Some(map) = security.and_then(|s| s.as_object()) {
            metrics.security_schemes_found = map.len();
        }

        metrics.extensions_found = count_extensions(document);
    }
}

impl StreamParser {
    /// One automatic repair attempt for a file that failed plain decoding.
    ///
    /// Applies the trailing-comma and quote-escaping heuristics to the raw
    /// text and re-parses once. The content hash stays that of the original
    /// bytes, so re-ingesting the same broken file is still detectable.
    pub async fn parse_file_with_repair(&self, path: impl AsRef<Path>) -> Result<ParsedSpec> {
        use crate::parser::recovery::{repair_trailing_commas, repair_unescaped_quotes};

        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await.map_err(|_| ApidexError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let file_size = metadata.len();
        if file_size > self.config.max_file_size_bytes {
            return Err(ApidexError::FileTooLarge {
                size: file_size,
                limit: self.config.max_file_size_bytes,
            });
        }

        let start = Instant::now();
        let raw = tokio::fs::read(&path).await?;
        let file_hash = hex::encode(Sha256::digest(&raw));
        let text = String::from_utf8(raw)
            .map_err(|e| ApidexError::invalid_json(format!("not UTF-8: {e}"), None, None))?;

        let repaired = repair_unescaped_quotes(&repair_trailing_commas(&text));
        let document: Value = serde_json::from_str(&repaired).map_err(|e| {
            ApidexError::invalid_json(
                format!("unrecoverable after repair: {e}"),
                Some(e.line() as u64),
                Some(e.column() as u64),
            )
        })?;

        if !document.is_object() {
            return Err(ApidexError::structure(
                "Specification root must be a JSON object",
                Some("$".to_string()),
                None,
            ));
        }

        let mut metrics = ParseMetrics {
            file_size,
            parse_duration_ms: start.elapsed().as_millis() as u64,
            ..Default::default()
        };
        Self::collect_counts(&document, &mut metrics);

        info!(file_size, "Parsed specification after automatic repair");
        Ok(ParsedSpec { document, file_path: path, file_hash, metrics })
    }
}

/// Recursively count keys beginning with `x-`
fn count_extensions(value: &Value) -> usize {
    match value {
        Value::Object(map) => {
            let own = map.keys().filter(|k| k.starts_with("x-")).count();
            own + map.values().map(count_extensions).sum::<usize>()
        }
        Value::Array(items) => items.iter().map(count_extensions).sum(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_spec(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn minimal_spec() -> String {
        serde_json::json!({
            "openapi": "3.0.0",
            "info": {"title": "Test", "version": "1.0.0"},
            "x-vendor": {"x-inner": true},
            "paths": {
                "/users": {
                    "get": {"summary": "List users", "responses": {"200": {"description": "ok"}}},
                    "post": {"summary": "Create user", "responses": {"201": {"description": "created"}}}
                }
            },
            "components": {
                "schemas": {"User": {"type": "object"}},
                "securitySchemes": {"bearer": {"type": "http", "scheme": "bearer"}}
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_parse_minimal_spec() {
        let file = write_spec(&minimal_spec());
        let parser = StreamParser::new(ParserConfig::default());
        let parsed = parser.parse_file(file.path(), None).await.unwrap();

        assert_eq!(parsed.metrics.endpoints_found, 2);
        assert_eq!(parsed.metrics.schemas_found, 1);
        assert_eq!(parsed.metrics.security_schemes_found, 1);
        assert_eq!(parsed.metrics.extensions_found, 2);
        assert_eq!(parsed.file_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_missing_file_is_typed() {
        let parser = StreamParser::new(ParserConfig::default());
        let err = parser.parse_file("/no/such/spec.json", None).await.unwrap_err();
        assert!(matches!(err, ApidexError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_file_too_large_rejected() {
        let file = write_spec(&minimal_spec());
        let config = ParserConfig { max_file_size_bytes: 16, chunk_size_bytes: 8, ..Default::default() };
        let parser = StreamParser::new(config);
        let err = parser.parse_file(file.path(), None).await.unwrap_err();
        assert!(matches!(err, ApidexError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_reports_location() {
        let file = write_spec("{\"openapi\": \"3.0.0\",\n  broken}");
        let parser = StreamParser::new(ParserConfig::default());
        let err = parser.parse_file(file.path(), None).await.unwrap_err();
        match err {
            ApidexError::InvalidJson { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("expected InvalidJson, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_object_root_rejected() {
        let file = write_spec("[1, 2, 3]");
        let parser = StreamParser::new(ParserConfig::default());
        let err = parser.parse_file(file.path(), None).await.unwrap_err();
        assert!(matches!(err, ApidexError::StructureValidation { .. }));
    }

    #[tokio::test]
    async fn test_preserves_property_order() {
        let file = write_spec(
            r#"{"openapi":"3.0.0","info":{"title":"T","version":"1"},"paths":{},
               "components":{"schemas":{"Zebra":{},"Alpha":{},"Mango":{}}}}"#,
        );
        let parser = StreamParser::new(ParserConfig::default());
        let parsed = parser.parse_file(file.path(), None).await.unwrap();
        let names: Vec<&String> = parsed.document["components"]["schemas"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(names, ["Zebra", "Alpha", "Mango"]);
    }

    #[tokio::test]
    async fn test_same_bytes_same_hash() {
        let spec = minimal_spec();
        let a = write_spec(&spec);
        let b = write_spec(&spec);
        let parser = StreamParser::new(ParserConfig::default());
        let pa = parser.parse_file(a.path(), None).await.unwrap();
        let pb = parser.parse_file(b.path(), None).await.unwrap();
        assert_eq!(pa.file_hash, pb.file_hash);
    }
}
