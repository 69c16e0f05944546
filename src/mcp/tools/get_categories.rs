//! `getEndpointCategories` tool.

use crate::errors::{ApidexError, Result};
use crate::mcp::context::ServerContext;
use crate::mcp::tools::{optional_filter, parse_params};
use crate::normalizer::CatalogSort;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GetCategoriesParams {
    #[validate(length(max = 255, message = "categoryGroup must be at most 255 characters"))]
    #[serde(default)]
    pub category_group: Option<String>,

    #[serde(default)]
    pub include_empty: bool,

    #[serde(default = "default_sort")]
    pub sort_by: String,
}

fn default_sort() -> String {
    "name".to_string()
}

/// JSON schema for tools/list
pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "categoryGroup": {"type": "string", "maxLength": 255},
            "includeEmpty": {"type": "boolean", "default": false},
            "sortBy": {"type": "string", "enum": ["name", "endpointCount", "group"], "default": "name"}
        }
    })
}

pub async fn run(context: &ServerContext, args: Value) -> Result<Value> {
    let params: GetCategoriesParams = parse_params(args)?;
    params.validate().map_err(ApidexError::from)?;

    let sort_by = match params.sort_by.as_str() {
        "name" => CatalogSort::Name,
        "endpointCount" => CatalogSort::EndpointCount,
        "group" => CatalogSort::Group,
        other => {
            return Err(ApidexError::validation_param(
                format!("'{other}' is not a valid sort order"),
                "sortBy",
                vec!["Use one of: name, endpointCount, group".to_string()],
            ));
        }
    };

    let group_filter = optional_filter(params.category_group.as_deref());

    let categories = context
        .endpoints
        .get_categories(None, group_filter.as_deref(), params.include_empty, sort_by)
        .await?;
    let groups = context.endpoints.get_category_groups(None).await?;
    let api = context.metadata.get_latest().await?;

    let total_endpoints: i64 = categories.iter().map(|c| c.endpoint_count).sum();

    let category_rows: Vec<Value> = categories
        .iter()
        .map(|entry| {
            json!({
                "name": entry.category_name,
                "displayName": entry.display_name,
                "description": entry.description,
                "group": entry.category_group,
                "endpointCount": entry.endpoint_count,
                "httpMethods": entry.http_methods
            })
        })
        .collect();

    let group_rows: Vec<Value> = groups
        .iter()
        .map(|group| {
            json!({
                "name": group.name,
                "categoryCount": group.category_count,
                "totalEndpoints": group.total_endpoints
            })
        })
        .collect();

    Ok(json!({
        "categories": category_rows,
        "groups": group_rows,
        "metadata": {
            "totalCategories": categories.len(),
            "totalEndpoints": total_endpoints,
            "totalGroups": groups.len(),
            "apiTitle": api.as_ref().map(|a| a.title.clone()),
            "apiVersion": api.as_ref().map(|a| a.version.clone())
        }
    }))
}
