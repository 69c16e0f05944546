//! OpenAPI skeleton enforcement.
//!
//! Runs after raw decode: the document must carry a version marker, an
//! `info` block with title and version, and a `paths` object whose keys are
//! rooted. Violations come back as issues with suggestions; the caller
//! decides whether they are fatal.

use crate::domain::HttpMethod;
use crate::parser::recovery::{ParseFault, ParseIssue};
use serde_json::Value;

const COMPONENT_SECTIONS: &[&str] = &[
    "schemas",
    "responses",
    "parameters",
    "examples",
    "requestBodies",
    "headers",
    "securitySchemes",
    "links",
    "callbacks",
];

/// Validate the document skeleton, returning every violation found
pub fn validate_structure(document: &Value) -> Vec<ParseIssue> {
    let mut issues = Vec::new();

    let Some(root) = document.as_object() else {
        issues.push(
            ParseIssue::new(ParseFault::InvalidRootType, "Specification root must be an object")
                .at_path("$")
                .with_suggestion("The top level of an OpenAPI document is a JSON object"),
        );
        return issues;
    };

    if !root.contains_key("openapi") && !root.contains_key("swagger") {
        issues.push(
            ParseIssue::new(
                ParseFault::MissingField("openapi".to_string()),
                "Missing version field: expected 'openapi' or 'swagger'",
            )
            .at_path("$")
            .with_suggestion("Add \"openapi\": \"3.0.0\" or \"swagger\": \"2.0\""),
        );
    }

    match root.get("info") {
        None => issues.push(
            ParseIssue::new(ParseFault::MissingField("info".to_string()), "Missing 'info' object")
                .at_path("$.info")
                .with_suggestion("Add an info object with 'title' and 'version'"),
        ),
        Some(info) if !info.is_object() => issues.push(wrong_type("$.info", "object", info)),
        Some(info) => {
            for field in ["title", "version"] {
                match info.get(field) {
                    None => issues.push(
                        ParseIssue::new(
                            ParseFault::MissingField(format!("info.{field}")),
                            format!("Missing required field 'info.{field}'"),
                        )
                        .at_path(format!("$.info.{field}")),
                    ),
                    Some(v) if !v.is_string() => {
                        issues.push(wrong_type(&format!("$.info.{field}"), "string", v))
                    }
                    _ => {}
                }
            }
        }
    }

    match root.get("paths") {
        None => issues.push(
            ParseIssue::new(ParseFault::MissingField("paths".to_string()), "Missing 'paths' object")
                .at_path("$.paths")
                .with_suggestion("Add a paths object, even if empty"),
        ),
        Some(paths) if !paths.is_object() => issues.push(wrong_type("$.paths", "object", paths)),
        Some(paths) => {
            for (path, item) in paths.as_object().into_iter().flatten() {
                if !path.starts_with('/') {
                    issues.push(
                        ParseIssue::new(
                            ParseFault::InvalidPathName(path.clone()),
                            format!("Path '{path}' does not start with '/'"),
                        )
                        .at_path(format!("$.paths.{path}"))
                        .with_suggestion(format!("Rename to '/{path}'")),
                    );
                }
                validate_path_item(path, item, &mut issues);
            }
        }
    }

    if let Some(components) = root.get("components") {
        match components.as_object() {
            None => issues.push(wrong_type("$.components", "object", components)),
            Some(map) => {
                for section in COMPONENT_SECTIONS {
                    if let Some(value) = map.get(*section) {
                        if !value.is_object() {
                            issues.push(wrong_type(
                                &format!("$.components.{section}"),
                                "object",
                                value,
                            ));
                        }
                    }
                }
            }
        }
    }

    issues
}

fn validate_path_item(path: &str, item: &Value, issues: &mut Vec<ParseIssue>) {
    let Some(map) = item.as_object() else {
        issues.push(wrong_type(&format!("$.paths.{path}"), "object", item));
        return;
    };

    for (key, operation) in map {
        // Path items also legally carry 'parameters', 'servers', '$ref',
        // 'summary', 'description' and extensions alongside methods.
        let is_method = key.to_ascii_uppercase().parse::<HttpMethod>().is_ok();
        let is_known_sibling = matches!(
            key.as_str(),
            "parameters" | "servers" | "$ref" | "summary" | "description"
        ) || key.starts_with("x-");

        if is_method && !operation.is_object() {
            issues.push(
                ParseIssue::new(
                    ParseFault::WrongType {
                        path: format!("$.paths.{path}.{key}"),
                        expected: "object".to_string(),
                        actual: json_type_name(operation).to_string(),
                    },
                    format!("Operation '{key}' on '{path}' must be an object"),
                )
                .at_path(format!("$.paths.{path}.{key}")),
            );
        } else if !is_method && !is_known_sibling {
            issues.push(
                ParseIssue::new(
                    ParseFault::InvalidMethod(key.clone()),
                    format!("Unknown operation key '{key}' on '{path}'"),
                )
                .at_path(format!("$.paths.{path}.{key}"))
                .with_suggestion("Use one of: get, post, put, delete, patch, head, options, trace"),
            );
        }
    }
}

fn wrong_type(path: &str, expected: &str, actual: &Value) -> ParseIssue {
    ParseIssue::new(
        ParseFault::WrongType {
            path: path.to_string(),
            expected: expected.to_string(),
            actual: json_type_name(actual).to_string(),
        },
        format!("Expected {expected} at {path}, found {}", json_type_name(actual)),
    )
    .at_path(path)
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
