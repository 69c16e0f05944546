//! `getSchema` tool.

use crate::errors::{ApidexError, Result};
use crate::mcp::context::ServerContext;
use crate::mcp::tools::parse_params;
use crate::normalizer::{normalize_schema_ref, RefTarget};
use crate::search::edit_distance;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GetSchemaParams {
    #[validate(length(min = 1, max = 255, message = "componentName must be 1-255 characters"))]
    pub component_name: String,

    #[serde(default = "default_true")]
    pub resolve_dependencies: bool,

    #[validate(range(min = 1, max = 10, message = "maxDepth must be between 1 and 10"))]
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,

    #[serde(default = "default_true")]
    pub include_examples: bool,

    #[serde(default = "default_true")]
    pub include_extensions: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> i64 {
    3
}

/// JSON schema for tools/list
pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "componentName": {"type": "string", "minLength": 1, "maxLength": 255},
            "resolveDependencies": {"type": "boolean", "default": true},
            "maxDepth": {"type": "integer", "minimum": 1, "maximum": 10, "default": 3},
            "includeExamples": {"type": "boolean", "default": true},
            "includeExtensions": {"type": "boolean", "default": true}
        },
        "required": ["componentName"]
    })
}

pub async fn run(context: &ServerContext, args: Value) -> Result<Value> {
    let params: GetSchemaParams = parse_params(args)?;
    params.validate().map_err(ApidexError::from)?;

    let normalized_name = match normalize_schema_ref(params.component_name.trim()) {
        RefTarget::Schema(name) => name,
        RefTarget::Unresolved(original) => {
            return Err(ApidexError::validation_param(
                format!("'{original}' is not a resolvable component reference"),
                "componentName",
                vec![
                    "Use a bare component name such as 'User'".to_string(),
                    "Or a canonical pointer such as '#/components/schemas/User'".to_string(),
                ],
            ));
        }
    };

    let resolved = if params.resolve_dependencies {
        context.schemas.get_schema_with_dependencies(&normalized_name, params.max_depth).await
    } else {
        context
            .schemas
            .get_by_name(&normalized_name)
            .await?
            .map(|root| crate::storage::ResolvedSchema {
                root,
                dependencies: Vec::new(),
                unresolved: Vec::new(),
                circular_references: Vec::new(),
                resolution_depth: 0,
                max_depth_reached: false,
            })
            .ok_or_else(|| ApidexError::not_found("Schema", normalized_name.clone()))
    };

    let resolved = match resolved {
        Ok(resolved) => resolved,
        Err(ApidexError::ResourceNotFound { resource_type, identifier, .. }) => {
            let suggestions = name_suggestions(context, &identifier).await;
            return Err(ApidexError::not_found_with_suggestions(
                resource_type,
                identifier,
                suggestions,
            ));
        }
        Err(other) => return Err(other),
    };

    let render = |component: &crate::domain::SchemaComponent| {
        let mut definition = component.raw.clone();
        if !params.include_examples {
            strip_keys(&mut definition, &|key| key == "example" || key == "examples");
        }
        if !params.include_extensions {
            strip_keys(&mut definition, &|key| key.starts_with("x-"));
        }
        json!({
            "name": component.name,
            "type": component.schema_type.map(|t| t.as_str()),
            "description": component.description,
            "definition": definition,
            "deprecated": component.deprecated,
            "circular": component.circular,
            "reference_count": component.reference_count
        })
    };

    let dependencies: Vec<Value> = resolved.dependencies.iter().map(&render).collect();

    Ok(json!({
        "schema": render(&resolved.root),
        "dependencies": dependencies,
        "metadata": {
            "component_name": params.component_name,
            "normalized_name": normalized_name,
            "resolution_depth": resolved.resolution_depth,
            "total_dependencies": dependencies.len(),
            "circular_references": resolved.circular_references,
            "max_depth_reached": resolved.max_depth_reached,
            "unresolved": resolved.unresolved,
            "resolution_settings": {
                "resolve_dependencies": params.resolve_dependencies,
                "max_depth": params.max_depth,
                "include_examples": params.include_examples,
                "include_extensions": params.include_extensions
            }
        }
    }))
}

async fn name_suggestions(context: &ServerContext, wanted: &str) -> Vec<String> {
    let Ok(names) = context.schemas.list_names().await else {
        return Vec::new();
    };
    let wanted_lower = wanted.to_lowercase();
    let mut scored: Vec<(usize, String)> = names
        .into_iter()
        .filter_map(|name| {
            let distance = edit_distance(&wanted_lower, &name.to_lowercase());
            (distance <= 3).then_some((distance, name))
        })
        .collect();
    scored.sort();
    scored.into_iter().take(5).map(|(_, name)| format!("Did you mean '{name}'?")).collect()
}

fn strip_keys(value: &mut Value, predicate: &dyn Fn(&str) -> bool) {
    match value {
        Value::Object(map) => {
            let doomed: Vec<String> =
                map.keys().filter(|k| predicate(k)).cloned().collect();
            for key in doomed {
                map.remove(&key);
            }
            for child in map.values_mut() {
                strip_keys(child, predicate);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_keys(item, predicate);
            }
        }
        _ => {}
    }
}
