//! Vendor extension (`x-*`) handling.
//!
//! Extensions are extracted wherever they appear, classified by key prefix,
//! and well-known vendor shapes (API gateway integrations, documentation
//! samples) are canonicalized. Human-readable strings inside extensions feed
//! the searchable-text projection.

use indexmap::IndexMap;
use serde_json::Value;

/// Prefix-based extension classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionCategory {
    Documentation,
    Vendor,
    Language,
    Behavior,
    Security,
    Pagination,
    Custom,
}

impl ExtensionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionCategory::Documentation => "documentation",
            ExtensionCategory::Vendor => "vendor",
            ExtensionCategory::Language => "language",
            ExtensionCategory::Behavior => "behavior",
            ExtensionCategory::Security => "security",
            ExtensionCategory::Pagination => "pagination",
            ExtensionCategory::Custom => "custom",
        }
    }
}

const DOCUMENTATION_PREFIXES: &[&str] =
    &["x-code-samples", "x-codeSamples", "x-examples", "x-summary", "x-description", "x-redoc-", "x-swagger-", "x-displayName", "x-tagGroups"];
const VENDOR_PREFIXES: &[&str] =
    &["x-amazon-", "x-aws-", "x-azure-", "x-google-", "x-microsoft-"];
const LANGUAGE_PREFIXES: &[&str] =
    &["x-go-", "x-java-", "x-python-", "x-javascript-", "x-csharp-"];
const BEHAVIOR_PREFIXES: &[&str] = &["x-nullable", "x-omitempty", "x-internal", "x-deprecated"];
const SECURITY_PREFIXES: &[&str] = &["x-auth-", "x-security-", "x-rate-limit", "x-throttling-"];
const PAGINATION_PREFIXES: &[&str] = &["x-pagination-", "x-limit-", "x-offset-", "x-cursor-"];

/// How two extension maps are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Override values take precedence wholesale
    Override,
    /// Objects merge recursively; everything else overrides
    DeepMerge,
    /// Lists concatenate, objects merge, scalars override
    CombineLists,
}

/// Extract every `x-*` key from an object, preserving order
pub fn extract_extensions(value: &Value) -> IndexMap<String, Value> {
    let mut extensions = IndexMap::new();
    if let Some(map) = value.as_object() {
        for (key, val) in map {
            if key.starts_with("x-") {
                extensions.insert(key.clone(), val.clone());
            }
        }
    }
    extensions
}

/// Classify an extension key by its prefix
pub fn classify_extension(key: &str) -> ExtensionCategory {
    let matches = |prefixes: &[&str]| prefixes.iter().any(|p| key.starts_with(p));
    if matches(DOCUMENTATION_PREFIXES) {
        ExtensionCategory::Documentation
    } else if matches(VENDOR_PREFIXES) {
        ExtensionCategory::Vendor
    } else if matches(LANGUAGE_PREFIXES) {
        ExtensionCategory::Language
    } else if matches(BEHAVIOR_PREFIXES) {
        ExtensionCategory::Behavior
    } else if matches(SECURITY_PREFIXES) {
        ExtensionCategory::Security
    } else if matches(PAGINATION_PREFIXES) {
        ExtensionCategory::Pagination
    } else {
        ExtensionCategory::Custom
    }
}

/// Group extensions by category
pub fn categorize_extensions(
    extensions: &IndexMap<String, Value>,
) -> IndexMap<ExtensionCategory, IndexMap<String, Value>> {
    let mut grouped: IndexMap<ExtensionCategory, IndexMap<String, Value>> = IndexMap::new();
    for (key, value) in extensions {
        grouped
            .entry(classify_extension(key))
            .or_default()
            .insert(key.clone(), value.clone());
    }
    grouped
}

/// Canonicalize well-known vendor extensions.
///
/// AWS API Gateway integrations keep only their routing-relevant fields;
/// Google backends are reduced to address/protocol; documentation samples
/// get a stable `{lang, source, label}` shape.
pub fn normalize_vendor_extension(key: &str, value: &Value) -> Value {
    if key == "x-amazon-apigateway-integration" {
        if let Some(map) = value.as_object() {
            let mut canonical = serde_json::Map::new();
            for field in ["type", "uri", "httpMethod", "passthroughBehavior", "timeoutInMillis"] {
                if let Some(v) = map.get(field) {
                    canonical.insert(field.to_string(), v.clone());
                }
            }
            return Value::Object(canonical);
        }
    }

    if key == "x-google-backend" {
        if let Some(map) = value.as_object() {
            let mut canonical = serde_json::Map::new();
            for field in ["address", "protocol", "deadline"] {
                if let Some(v) = map.get(field) {
                    canonical.insert(field.to_string(), v.clone());
                }
            }
            return Value::Object(canonical);
        }
    }

    if key == "x-code-samples" || key == "x-codeSamples" {
        if let Some(samples) = value.as_array() {
            let normalized: Vec<Value> = samples
                .iter()
                .filter_map(|s| s.as_object())
                .map(|sample| {
                    let lang = sample.get("lang").and_then(|l| l.as_str()).unwrap_or("shell");
                    serde_json::json!({
                        "lang": lang,
                        "source": sample.get("source").and_then(|s| s.as_str()).unwrap_or(""),
                        "label": sample
                            .get("label")
                            .and_then(|l| l.as_str())
                            .unwrap_or(lang),
                    })
                })
                .collect();
            return Value::Array(normalized);
        }
    }

    value.clone()
}

/// Merge two extension maps according to `strategy`
pub fn merge_extensions(
    base: &IndexMap<String, Value>,
    overlay: &IndexMap<String, Value>,
    strategy: MergeStrategy,
) -> IndexMap<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        match strategy {
            MergeStrategy::Override => {
                merged.insert(key.clone(), value.clone());
            }
            MergeStrategy::DeepMerge => {
                let combined = match (merged.get(key), value) {
                    (Some(Value::Object(a)), Value::Object(b)) => deep_merge_objects(a, b),
                    _ => value.clone(),
                };
                merged.insert(key.clone(), combined);
            }
            MergeStrategy::CombineLists => {
                let combined = match (merged.get(key), value) {
                    (Some(Value::Array(a)), Value::Array(b)) => {
                        let mut list = a.clone();
                        list.extend(b.iter().cloned());
                        Value::Array(list)
                    }
                    (Some(Value::Object(a)), Value::Object(b)) => deep_merge_objects(a, b),
                    _ => value.clone(),
                };
                merged.insert(key.clone(), combined);
            }
        }
    }
    merged
}

fn deep_merge_objects(
    base: &serde_json::Map<String, Value>,
    overlay: &serde_json::Map<String, Value>,
) -> Value {
    let mut merged = base.clone();
    for (key, value) in overlay {
        match (merged.get(key), value) {
            (Some(Value::Object(a)), Value::Object(b)) => {
                let nested = deep_merge_objects(a, b);
                merged.insert(key.clone(), nested);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(merged)
}

/// Collect human-readable strings from extension values for the search index
pub fn searchable_text(extensions: &IndexMap<String, Value>) -> String {
    let mut fragments = Vec::new();
    for (key, value) in extensions {
        // Machine identifiers (URIs, ARNs) stay out of the index
        if classify_extension(key) == ExtensionCategory::Vendor {
            continue;
        }
        collect_strings(value, &mut fragments);
    }
    fragments.join(" ")
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            // Keep prose; skip URLs and short tokens
            if trimmed.len() > 3 && !trimmed.starts_with("http") && trimmed.contains(' ') {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
