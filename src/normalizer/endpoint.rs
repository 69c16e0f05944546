//! Endpoint normalization.
//!
//! Walks `paths` and produces one [`Endpoint`] per (path, method). Path-level
//! parameters merge under operation-level ones (same name + location wins at
//! the operation), global security applies when an operation omits its own,
//! and every `$ref` reachable through parameters, request bodies and
//! responses lands in `schema_dependencies` as a bare component name.

use crate::domain::{
    Endpoint, HttpMethod, Parameter, ParameterConstraints, ParameterLocation, RequestBody,
    ResponseSpec,
};
use crate::normalizer::categorization::{CategorizationEngine, CategoryCatalog};
use crate::normalizer::extensions;
use crate::normalizer::refs::collect_schema_refs;
use crate::normalizer::security::parse_security_requirements;
use crate::parser::SpecVersion;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Result of normalizing the paths section
#[derive(Debug, Default)]
pub struct NormalizedEndpoints {
    pub endpoints: Vec<Endpoint>,
    pub warnings: Vec<String>,
}

/// Normalize every operation in the document, tagging categories through
/// `engine` and recording them in `catalog`.
pub fn normalize_endpoints(
    document: &Value,
    version: SpecVersion,
    engine: &CategorizationEngine,
    catalog: &CategoryCatalog,
) -> NormalizedEndpoints {
    let mut result = NormalizedEndpoints::default();

    let Some(paths) = document.get("paths").and_then(|p| p.as_object()) else {
        return result;
    };

    let global_security = parse_security_requirements(document.get("security"));

    for (path, item) in paths {
        let Some(item_map) = item.as_object() else {
            result.warnings.push(format!("path '{path}' is not an object; skipped"));
            continue;
        };

        let path_level_params: Vec<Parameter> = item_map
            .get("parameters")
            .and_then(|p| p.as_array())
            .map(|params| {
                params
                    .iter()
                    .filter_map(|p| parse_parameter(p, version, path, &mut result.warnings))
                    .collect()
            })
            .unwrap_or_default();

        for (key, operation) in item_map {
            let Ok(method) = key.to_ascii_uppercase().parse::<HttpMethod>() else {
                continue;
            };
            let Some(op) = operation.as_object() else {
                result.warnings.push(format!("operation {key} on '{path}' is not an object; skipped"));
                continue;
            };

            let mut endpoint = build_endpoint(
                path,
                method,
                op,
                &path_level_params,
                &global_security,
                version,
                &mut result.warnings,
            );

            let info = engine.categorize_endpoint(&endpoint.tags, path);
            endpoint.category = Some(info.category.clone());
            endpoint.category_group = info.category_group.clone();
            catalog.add(&info, method);

            debug!(path = %endpoint.path, method = %endpoint.method, category = ?endpoint.category, "Normalized endpoint");
            result.endpoints.push(endpoint);
        }
    }

    result
}

fn build_endpoint(
    path: &str,
    method: HttpMethod,
    op: &serde_json::Map<String, Value>,
    path_level_params: &[Parameter],
    global_security: &[Vec<crate::domain::SecurityRequirement>],
    version: SpecVersion,
    warnings: &mut Vec<String>,
) -> Endpoint {
    let mut endpoint = Endpoint::new(path, method);
    endpoint.operation_id = op.get("operationId").and_then(|v| v.as_str()).map(String::from);
    endpoint.summary = op.get("summary").and_then(|v| v.as_str()).map(String::from);
    endpoint.description = op.get("description").and_then(|v| v.as_str()).map(String::from);
    endpoint.deprecated = op.get("deprecated").and_then(|v| v.as_bool()).unwrap_or(false);
    endpoint.tags = op
        .get("tags")
        .and_then(|t| t.as_array())
        .map(|tags| tags.iter().filter_map(|t| t.as_str().map(String::from)).collect())
        .unwrap_or_default();
    endpoint.extensions = extensions::extract_extensions(&Value::Object(op.clone()));

    // Operation parameters override path-level ones with the same (name, in)
    let mut merged: IndexMap<(String, ParameterLocation), Parameter> = path_level_params
        .iter()
        .map(|p| ((p.name.clone(), p.location), p.clone()))
        .collect();
    if let Some(params) = op.get("parameters").and_then(|p| p.as_array()) {
        for raw in params {
            if let Some(param) = parse_parameter(raw, version, path, warnings) {
                merged.insert((param.name.clone(), param.location), param);
            }
        }
    }
    endpoint.parameters = merged.into_values().collect();

    endpoint.request_body = parse_request_body(op, version);

    if let Some(responses) = op.get("responses").and_then(|r| r.as_object()) {
        for (status, raw) in responses {
            endpoint.responses.insert(status.clone(), parse_response(raw));
        }
    }

    let own_security = parse_security_requirements(op.get("security"));
    endpoint.security = if op.contains_key("security") {
        // An explicit empty array opts out of the global default
        own_security
    } else {
        global_security.to_vec()
    };
    endpoint.security_dependencies = endpoint
        .security
        .iter()
        .flatten()
        .map(|requirement| requirement.scheme.clone())
        .collect();

    endpoint.schema_dependencies = collect_endpoint_refs(op, warnings, path, method);
    endpoint.searchable_text = build_searchable_text(&endpoint);
    endpoint
}

fn parse_parameter(
    raw: &Value,
    version: SpecVersion,
    path: &str,
    warnings: &mut Vec<String>,
) -> Option<Parameter> {
    let map = raw.as_object()?;

    if let Some(reference) = map.get("$ref").and_then(|r| r.as_str()) {
        // Parameter components are not dereferenced; keep the pointer
        let mut param = Parameter::new(reference, ParameterLocation::Query);
        param.reference = Some(reference.to_string());
        warnings.push(format!("path '{path}': parameter reference '{reference}' preserved unresolved"));
        return Some(param);
    }

    let name = map.get("name").and_then(|n| n.as_str())?.to_string();
    let location = map
        .get("in")
        .and_then(|l| l.as_str())
        .and_then(|l| l.parse::<ParameterLocation>().ok())?;

    let mut param = Parameter::new(name, location);
    param.description = map.get("description").and_then(|d| d.as_str()).map(String::from);
    param.deprecated = map.get("deprecated").and_then(|d| d.as_bool()).unwrap_or(false);
    param.required = map.get("required").and_then(|r| r.as_bool()).unwrap_or(false)
        || location == ParameterLocation::Path;
    param.extensions = extensions::extract_extensions(raw);

    // OpenAPI 3.x nests type information under 'schema'; Swagger 2.0 inlines it
    let type_source: &serde_json::Map<String, Value> = if version == SpecVersion::V2 {
        map
    } else {
        map.get("schema").and_then(|s| s.as_object()).unwrap_or(map)
    };

    param.schema_type = type_source.get("type").and_then(|t| t.as_str()).map(String::from);
    param.format = type_source.get("format").and_then(|f| f.as_str()).map(String::from);
    param.enum_values = type_source
        .get("enum")
        .and_then(|e| e.as_array())
        .cloned()
        .unwrap_or_default();
    param.default = type_source.get("default").cloned();
    param.example = map.get("example").or_else(|| type_source.get("example")).cloned();
    param.items = type_source.get("items").cloned();
    param.additional_properties = type_source.get("additionalProperties").cloned();
    param.constraints = ParameterConstraints {
        minimum: type_source.get("minimum").and_then(|v| v.as_f64()),
        maximum: type_source.get("maximum").and_then(|v| v.as_f64()),
        min_length: type_source.get("minLength").and_then(|v| v.as_u64()),
        max_length: type_source.get("maxLength").and_then(|v| v.as_u64()),
        pattern: type_source.get("pattern").and_then(|v| v.as_str()).map(String::from),
    };
    if let Some(schema) = map.get("schema") {
        if let Some(reference) = schema.get("$ref").and_then(|r| r.as_str()) {
            param.reference = Some(reference.to_string());
        }
    }

    Some(param)
}

fn parse_request_body(
    op: &serde_json::Map<String, Value>,
    version: SpecVersion,
) -> Option<RequestBody> {
    if version == SpecVersion::V2 {
        // Swagger 2.0 models the body as a parameter with in=body, which the
        // location parser rejects; scan the raw list instead
        let raw_params = op.get("parameters").and_then(|p| p.as_array())?;
        let body = raw_params
            .iter()
            .find(|p| p.get("in").and_then(|l| l.as_str()) == Some("body"))?;
        let mut content = IndexMap::new();
        if let Some(schema) = body.get("schema") {
            content.insert("application/json".to_string(), schema.clone());
        }
        return Some(RequestBody {
            description: body.get("description").and_then(|d| d.as_str()).map(String::from),
            required: body.get("required").and_then(|r| r.as_bool()).unwrap_or(false),
            content,
            example: None,
        });
    }

    let raw = op.get("requestBody")?;
    let map = raw.as_object()?;
    let mut content = IndexMap::new();
    let mut example = None;
    if let Some(media_types) = map.get("content").and_then(|c| c.as_object()) {
        for (media_type, media) in media_types {
            if let Some(schema) = media.get("schema") {
                content.insert(media_type.clone(), schema.clone());
            }
            if example.is_none() {
                example = media.get("example").cloned().or_else(|| {
                    media
                        .get("examples")
                        .and_then(|e| e.as_object())
                        .and_then(|e| e.values().next())
                        .and_then(|e| e.get("value"))
                        .cloned()
                });
            }
        }
    }

    Some(RequestBody {
        description: map.get("description").and_then(|d| d.as_str()).map(String::from),
        required: map.get("required").and_then(|r| r.as_bool()).unwrap_or(false),
        content,
        example,
    })
}

fn parse_response(raw: &Value) -> ResponseSpec {
    let mut response = ResponseSpec {
        description: raw.get("description").and_then(|d| d.as_str()).map(String::from),
        ..Default::default()
    };

    if let Some(content) = raw.get("content").and_then(|c| c.as_object()) {
        for (media_type, media) in content {
            if let Some(schema) = media.get("schema") {
                response.content.insert(media_type.clone(), schema.clone());
            }
        }
    } else if let Some(schema) = raw.get("schema") {
        // Swagger 2.0 puts the schema directly on the response
        response.content.insert("application/json".to_string(), schema.clone());
    }

    let mut unresolved = Vec::new();
    collect_schema_refs(raw, &mut response.schema_refs, &mut unresolved);
    response
}

fn collect_endpoint_refs(
    op: &serde_json::Map<String, Value>,
    warnings: &mut Vec<String>,
    path: &str,
    method: HttpMethod,
) -> BTreeSet<String> {
    let mut resolved = BTreeSet::new();
    let mut unresolved = Vec::new();
    for section in ["parameters", "requestBody", "responses"] {
        if let Some(value) = op.get(section) {
            collect_schema_refs(value, &mut resolved, &mut unresolved);
        }
    }
    for reference in unresolved {
        warnings.push(format!(
            "{method} {path}: unresolvable reference '{reference}' preserved"
        ));
    }
    resolved
}

fn build_searchable_text(endpoint: &Endpoint) -> String {
    let mut parts: Vec<String> = vec![endpoint.path.clone(), endpoint.method.to_string()];
    parts.extend(endpoint.operation_id.iter().cloned());
    parts.extend(endpoint.summary.iter().cloned());
    parts.extend(endpoint.description.iter().cloned());
    parts.extend(endpoint.tags.iter().cloned());
    parts.extend(endpoint.parameters.iter().map(|p| p.name.clone()));
    let extension_text = extensions::searchable_text(&endpoint.extensions);
    if !extension_text.is_empty() {
        parts.push(extension_text);
    }
    parts.join(" ")
}
