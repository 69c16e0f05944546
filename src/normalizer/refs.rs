//! `$ref` string handling.
//!
//! Reference strings are normalized to bare component names. External
//! references (anything with a document part before the fragment) are never
//! fetched: the original string is preserved and surfaced as unresolved.

use serde_json::Value;
use std::collections::BTreeSet;

const SCHEMA_PREFIXES: &[&str] = &[
    "#/components/schemas/",
    "#/definitions/",
    "components/schemas/",
    "definitions/",
];

/// Outcome of normalizing one reference string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// In-document schema component, by bare name
    Schema(String),
    /// Reference we will not resolve (external document, or an unknown
    /// in-document section); the original string is preserved verbatim
    Unresolved(String),
}

/// Normalize a `$ref` string to a bare schema component name.
///
/// Accepts the canonical document forms plus the fragment-less spellings
/// clients tend to send (`components/schemas/X`, bare `X`).
pub fn normalize_schema_ref(reference: &str) -> RefTarget {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return RefTarget::Unresolved(reference.to_string());
    }

    // External document: "other.json#/components/schemas/X", URLs, etc.
    if let Some(hash) = trimmed.find('#') {
        if hash > 0 {
            return RefTarget::Unresolved(reference.to_string());
        }
    }

    for prefix in SCHEMA_PREFIXES {
        if let Some(name) = trimmed.strip_prefix(prefix) {
            if !name.is_empty() && !name.contains('/') {
                return RefTarget::Schema(name.to_string());
            }
            return RefTarget::Unresolved(reference.to_string());
        }
    }

    // Other in-document sections (parameters, responses, ...) stay opaque
    if trimmed.starts_with("#/") {
        return RefTarget::Unresolved(reference.to_string());
    }

    // Bare name
    if !trimmed.contains('/') && !trimmed.contains('#') {
        return RefTarget::Schema(trimmed.to_string());
    }

    RefTarget::Unresolved(reference.to_string())
}

/// Recursively collect every schema `$ref` reachable in `value`.
///
/// Resolvable targets land in `resolved`; everything else is preserved in
/// `unresolved` for warning emission.
pub fn collect_schema_refs(
    value: &Value,
    resolved: &mut BTreeSet<String>,
    unresolved: &mut Vec<String>,
) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(|r| r.as_str()) {
                match normalize_schema_ref(reference) {
                    RefTarget::Schema(name) => {
                        resolved.insert(name);
                    }
                    RefTarget::Unresolved(original) => unresolved.push(original),
                }
            }
            for child in map.values() {
                collect_schema_refs(child, resolved, unresolved);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_schema_refs(item, resolved, unresolved);
            }
        }
        _ => {}
    }
}
