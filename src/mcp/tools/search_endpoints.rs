//! `searchEndpoints` tool.

use crate::domain::HttpMethod;
use crate::errors::{ApidexError, Result};
use crate::mcp::context::ServerContext;
use crate::mcp::tools::{optional_filter, parse_params};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchEndpointsParams {
    #[validate(length(min = 1, max = 500, message = "keywords must be 1-500 characters"))]
    pub keywords: String,

    #[serde(default)]
    pub http_methods: Option<Vec<String>>,

    #[validate(length(max = 255, message = "category must be at most 255 characters"))]
    #[serde(default)]
    pub category: Option<String>,

    #[validate(length(max = 255, message = "categoryGroup must be at most 255 characters"))]
    #[serde(default)]
    pub category_group: Option<String>,

    #[validate(range(min = 1, message = "page must be at least 1"))]
    #[serde(default = "default_page")]
    pub page: i64,

    #[validate(range(min = 1, max = 50, message = "perPage must be between 1 and 50"))]
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

/// JSON schema for tools/list
pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "keywords": {"type": "string", "minLength": 1, "maxLength": 500},
            "httpMethods": {
                "type": "array",
                "items": {"type": "string", "enum": ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"]},
                "uniqueItems": true
            },
            "category": {"type": "string", "maxLength": 255},
            "categoryGroup": {"type": "string", "maxLength": 255},
            "page": {"type": "integer", "minimum": 1, "default": 1},
            "perPage": {"type": "integer", "minimum": 1, "maximum": 50, "default": 20}
        },
        "required": ["keywords"]
    })
}

pub async fn run(context: &ServerContext, args: Value) -> Result<Value> {
    let params: SearchEndpointsParams = parse_params(args)?;
    params.validate().map_err(|e| annotate_validation(e.into()))?;

    if params.keywords.trim().is_empty() {
        return Err(ApidexError::validation_param(
            "keywords must not be blank",
            "keywords",
            vec![
                "Provide one or more search terms".to_string(),
                "Try a resource name such as 'users' or 'orders'".to_string(),
            ],
        ));
    }

    let methods = parse_methods(params.http_methods.as_deref())?;
    let category = optional_filter(params.category.as_deref());
    let category_group = optional_filter(params.category_group.as_deref());

    let started = Instant::now();
    let outcome = context
        .search
        .search(
            &params.keywords,
            &methods,
            category.as_deref(),
            category_group.as_deref(),
            params.page,
            params.per_page,
        )
        .await?;
    let search_time_ms = started.elapsed().as_millis() as u64;

    let total = outcome.total;
    let total_pages = (total + params.per_page - 1) / params.per_page;

    Ok(json!({
        "results": outcome.hits,
        "pagination": {
            "total": total,
            "page": params.page,
            "per_page": params.per_page,
            "total_pages": total_pages,
            "has_more": params.page < total_pages,
            "has_previous": params.page > 1 && total > 0
        },
        "search_metadata": {
            "keywords": params.keywords,
            "http_methods_filter": methods.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
            "category_filter": category,
            "category_group_filter": category_group,
            "result_count": outcome.hits.len(),
            "search_time_ms": search_time_ms,
            "suggestions": outcome.suggestions
        }
    }))
}

fn parse_methods(methods: Option<&[String]>) -> Result<Vec<HttpMethod>> {
    let Some(methods) = methods else {
        return Ok(Vec::new());
    };
    let mut parsed = Vec::new();
    for raw in methods {
        let method: HttpMethod = raw.parse().map_err(|_| {
            ApidexError::validation_param(
                format!("'{raw}' is not a valid HTTP method"),
                "httpMethods",
                vec!["Use one of: GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS".to_string()],
            )
        })?;
        if method == HttpMethod::Trace {
            return Err(ApidexError::validation_param(
                "TRACE is not searchable",
                "httpMethods",
                vec!["Use one of: GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS".to_string()],
            ));
        }
        if !parsed.contains(&method) {
            parsed.push(method);
        }
    }
    Ok(parsed)
}

fn annotate_validation(error: ApidexError) -> ApidexError {
    match error {
        ApidexError::Validation { message, parameter, mut suggestions } => {
            if suggestions.is_empty() {
                suggestions.push("Check the parameter bounds in the tool description".to_string());
            }
            ApidexError::Validation { message, parameter, suggestions }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<SearchEndpointsParams> {
        let params: SearchEndpointsParams = parse_params(value)?;
        params.validate().map_err(ApidexError::from)?;
        Ok(params)
    }

    #[test]
    fn test_defaults_applied() {
        let params = parse(json!({"keywords": "users"})).unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 20);
        assert!(params.http_methods.is_none());
    }

    #[test]
    fn test_keyword_length_bounds() {
        assert!(parse(json!({"keywords": ""})).is_err());
        assert!(parse(json!({"keywords": "a"})).is_ok());
        assert!(parse(json!({"keywords": "a".repeat(500)})).is_ok());
        assert!(parse(json!({"keywords": "a".repeat(501)})).is_err());
    }

    #[test]
    fn test_per_page_bounds() {
        assert!(parse(json!({"keywords": "k", "perPage": 0})).is_err());
        assert!(parse(json!({"keywords": "k", "perPage": 1})).is_ok());
        assert!(parse(json!({"keywords": "k", "perPage": 50})).is_ok());
        assert!(parse(json!({"keywords": "k", "perPage": 51})).is_err());
    }

    #[test]
    fn test_page_lower_bound() {
        assert!(parse(json!({"keywords": "k", "page": 0})).is_err());
        assert!(parse(json!({"keywords": "k", "page": 1})).is_ok());
    }

    #[test]
    fn test_method_parsing() {
        let methods =
            parse_methods(Some(&["get".to_string(), "POST".to_string(), "GET".to_string()]))
                .unwrap();
        assert_eq!(methods, vec![HttpMethod::Get, HttpMethod::Post]);

        let err = parse_methods(Some(&["FETCH".to_string()])).unwrap_err();
        match err {
            ApidexError::Validation { parameter, suggestions, .. } => {
                assert_eq!(parameter.as_deref(), Some("httpMethods"));
                assert!(!suggestions.is_empty());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(parse(json!({"keywords": "k", "bogus": true})).is_err());
    }
}
