//! Version detection and version-specific specification validation.

use crate::errors::{ApidexError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

static V30_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^3\.0\.\d+$").expect("3.0.x pattern"));

/// Supported specification dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    /// Swagger 2.0
    V2,
    /// OpenAPI 3.0.x
    V30,
    /// OpenAPI 3.1.0
    V31,
}

impl SpecVersion {
    pub fn is_openapi3(&self) -> bool {
        matches!(self, SpecVersion::V30 | SpecVersion::V31)
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecVersion::V2 => write!(f, "swagger-2.0"),
            SpecVersion::V30 => write!(f, "openapi-3.0"),
            SpecVersion::V31 => write!(f, "openapi-3.1"),
        }
    }
}

/// Outcome of spec-level validation
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub version: SpecVersion,
    /// The literal version string from the document
    pub version_string: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Detect the declared specification version
pub fn detect_version(document: &Value) -> Result<(SpecVersion, String)> {
    if let Some(openapi) = document.get("openapi").and_then(|v| v.as_str()) {
        if V30_PATTERN.is_match(openapi) {
            return Ok((SpecVersion::V30, openapi.to_string()));
        }
        if openapi == "3.1.0" {
            return Ok((SpecVersion::V31, openapi.to_string()));
        }
        return Err(ApidexError::UnsupportedVersion { version: openapi.to_string() });
    }
    if let Some(swagger) = document.get("swagger").and_then(|v| v.as_str()) {
        if swagger == "2.0" {
            return Ok((SpecVersion::V2, swagger.to_string()));
        }
        return Err(ApidexError::UnsupportedVersion { version: swagger.to_string() });
    }
    Err(ApidexError::UnsupportedVersion { version: "<missing>".to_string() })
}

/// Run version-specific validation over a structurally sound document
pub fn validate_spec(document: &Value) -> Result<ValidationReport> {
    let (version, version_string) = detect_version(document)?;
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let info = document.get("info");
    if info.and_then(|i| i.get("description")).and_then(|d| d.as_str()).map_or(true, str::is_empty)
    {
        warnings.push("info.description is missing or empty".to_string());
    }

    match document.get("paths").and_then(|p| p.as_object()) {
        Some(paths) if paths.is_empty() => {
            warnings.push("'paths' is empty; the specification declares no endpoints".to_string())
        }
        None => errors.push("'paths' must be an object".to_string()),
        _ => {}
    }

    if version.is_openapi3() && document.get("servers").is_none() {
        warnings.push("no 'servers' declared; examples will fall back to a placeholder base URL".to_string());
    }

    if version == SpecVersion::V2 && document.get("host").is_none() {
        warnings.push("no 'host' declared".to_string());
    }

    // Security schemes defined but never referenced
    let defined = defined_scheme_names(document, version);
    if !defined.is_empty() {
        let used = referenced_scheme_names(document);
        for name in defined.difference(&used) {
            warnings.push(format!("security scheme '{name}' is defined but never used"));
        }
    }

    // 3.1 allows type arrays and 'null'; 3.0 does not
    if version == SpecVersion::V30 {
        if let Some(schemas) = document
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(|s| s.as_object())
        {
            for (name, schema) in schemas {
                if schema.get("type").map(|t| t.is_array()).unwrap_or(false) {
                    errors.push(format!(
                        "schema '{name}' uses a type array, which requires OpenAPI 3.1"
                    ));
                }
            }
        }
    }

    Ok(ValidationReport { version, version_string, errors, warnings })
}

fn defined_scheme_names(document: &Value, version: SpecVersion) -> BTreeSet<String> {
    let schemes = if version == SpecVersion::V2 {
        document.get("securityDefinitions")
    } else {
        document.get("components").and_then(|c| c.get("securitySchemes"))
    };
    schemes
        .and_then(|s| s.as_object())
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

fn referenced_scheme_names(document: &Value) -> BTreeSet<String> {
    let mut used = BTreeSet::new();
    collect_security_refs(document.get("security"), &mut used);

    if let Some(paths) = document.get("paths").and_then(|p| p.as_object()) {
        for item in paths.values() {
            if let Some(ops) = item.as_object() {
                for op in ops.values() {
                    collect_security_refs(op.get("security"), &mut used);
                }
            }
        }
    }
    used
}

fn collect_security_refs(security: Option<&Value>, out: &mut BTreeSet<String>) {
    if let Some(list) = security.and_then(|s| s.as_array()) {
        for alternative in list {
            if let Some(map) = alternative.as_object() {
                out.extend(map.keys().cloned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_30() -> Value {
        json!({
            "openapi": "3.0.2",
            "info": {"title": "T", "version": "1", "description": "An API"},
            "servers": [{"url": "https://api.example.com"}],
            "paths": {"/a": {"get": {"responses": {"200": {"description": "ok"}}}}}
        })
    }

    #[test]
    fn test_detect_versions() {
        assert_eq!(detect_version(&json!({"openapi": "3.0.0"})).unwrap().0, SpecVersion::V30);
        assert_eq!(detect_version(&json!({"openapi": "3.0.17"})).unwrap().0, SpecVersion::V30);
        assert_eq!(detect_version(&json!({"openapi": "3.1.0"})).unwrap().0, SpecVersion::V31);
        assert_eq!(detect_version(&json!({"swagger": "2.0"})).unwrap().0, SpecVersion::V2);
    }

    #[test]
    fn test_unsupported_versions_rejected() {
        for doc in [json!({"openapi": "4.0.0"}), json!({"swagger": "1.2"}), json!({})] {
            assert!(matches!(
                detect_version(&doc).unwrap_err(),
                ApidexError::UnsupportedVersion { .. }
            ));
        }
    }

    #[test]
    fn test_clean_spec_has_no_findings() {
        let report = validate_spec(&base_30()).unwrap();
        assert!(report.is_ok());
        assert!(report.warnings.is_empty(), "unexpected: {:?}", report.warnings);
    }

    #[test]
    fn test_missing_description_and_servers_warn() {
        let mut doc = base_30();
        doc["info"].as_object_mut().unwrap().remove("description");
        doc.as_object_mut().unwrap().remove("servers");
        let report = validate_spec(&doc).unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("info.description")));
        assert!(report.warnings.iter().any(|w| w.contains("servers")));
    }

    #[test]
    fn test_empty_paths_warns() {
        let mut doc = base_30();
        doc["paths"] = json!({});
        let report = validate_spec(&doc).unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("paths")));
    }

    #[test]
    fn test_unused_security_scheme_warns() {
        let mut doc = base_30();
        doc["components"] = json!({
            "securitySchemes": {
                "used": {"type": "http", "scheme": "bearer"},
                "orphan": {"type": "apiKey", "name": "X-Key", "in": "header"}
            }
        });
        doc["paths"]["/a"]["get"]["security"] = json!([{"used": []}]);
        let report = validate_spec(&doc).unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("'orphan'")));
        assert!(!report.warnings.iter().any(|w| w.contains("'used'")));
    }

    #[test]
    fn test_type_array_is_error_on_30_only() {
        let mut doc = base_30();
        doc["components"] = json!({"schemas": {"Flexible": {"type": ["string", "null"]}}});
        let report = validate_spec(&doc).unwrap();
        assert!(!report.is_ok());

        doc["openapi"] = json!("3.1.0");
        let report = validate_spec(&doc).unwrap();
        assert!(report.is_ok());
    }
}
