//! `getExample` tool.

use crate::domain::{Endpoint, HttpMethod};
use crate::errors::{ApidexError, Result};
use crate::examplegen::{self, ExampleFormat};
use crate::mcp::context::ServerContext;
use crate::mcp::tools::parse_params;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GetExampleParams {
    #[validate(length(min = 1, message = "endpoint must not be empty"))]
    pub endpoint: String,

    #[serde(default)]
    pub method: Option<String>,

    pub format: String,

    #[serde(default = "default_true")]
    pub include_auth: bool,

    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_true() -> bool {
    true
}

/// JSON schema for tools/list
pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "endpoint": {"type": "string", "minLength": 1},
            "method": {"type": "string", "enum": ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"]},
            "format": {"type": "string", "enum": ["curl", "http-client", "script"]},
            "includeAuth": {"type": "boolean", "default": true},
            "baseUrl": {"type": "string"}
        },
        "required": ["endpoint", "format"]
    })
}

pub async fn run(context: &ServerContext, args: Value) -> Result<Value> {
    let params: GetExampleParams = parse_params(args)?;
    params.validate().map_err(ApidexError::from)?;

    let format = ExampleFormat::from_str(&params.format).map_err(|_| {
        ApidexError::validation_param(
            format!("'{}' is not a supported format", params.format),
            "format",
            vec![format!("Use one of: {}", ExampleFormat::all_names().join(", "))],
        )
    })?;

    let endpoint = locate_endpoint(context, &params).await?;

    // First security alternative drives the auth material
    let scheme_name = endpoint
        .security
        .first()
        .and_then(|alternative| alternative.first())
        .map(|requirement| requirement.scheme.clone());
    let scheme = match &scheme_name {
        Some(name) => context.security.get_by_name(name).await?,
        None => None,
    };

    let code = examplegen::generate(
        &endpoint,
        format,
        params.base_url.as_deref(),
        params.include_auth,
        scheme.as_ref(),
    )?;

    Ok(json!({
        "endpoint_id": endpoint.id,
        "endpoint_path": endpoint.path,
        "method": endpoint.method.as_str(),
        "format": format.as_str(),
        "code": code,
        "summary": endpoint.summary,
        "description": endpoint.description,
        "metadata": {
            "includeAuth": params.include_auth,
            "baseUrl": params.base_url.as_deref().unwrap_or(examplegen::DEFAULT_BASE_URL),
            "generation_timestamp": chrono::Utc::now().to_rfc3339(),
            "syntax_validated": true
        }
    }))
}

async fn locate_endpoint(context: &ServerContext, params: &GetExampleParams) -> Result<Endpoint> {
    if params.endpoint.starts_with('/') {
        let Some(method_raw) = params.method.as_deref() else {
            return Err(ApidexError::validation_param(
                "method is required when endpoint is a path",
                "method",
                vec!["Pass method=\"GET\" (or another verb) alongside the path".to_string()],
            ));
        };
        let method: HttpMethod = method_raw.parse().map_err(|_| {
            ApidexError::validation_param(
                format!("'{method_raw}' is not a valid HTTP method"),
                "method",
                vec!["Use one of: GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS".to_string()],
            )
        })?;

        return context
            .endpoints
            .get_by_path_method(&params.endpoint, method)
            .await?
            .ok_or_else(|| {
                ApidexError::not_found_with_suggestions(
                    "Endpoint",
                    format!("{method} {}", params.endpoint),
                    vec!["Search for it first with searchEndpoints".to_string()],
                )
            });
    }

    // Not a path: a numeric store id or an operationId
    if let Ok(id) = params.endpoint.parse::<i64>() {
        if let Some(endpoint) = context.endpoints.get_by_id(id).await? {
            return Ok(endpoint);
        }
    }
    context
        .endpoints
        .get_by_operation_id(&params.endpoint)
        .await?
        .ok_or_else(|| {
            ApidexError::not_found_with_suggestions(
                "Endpoint",
                params.endpoint.clone(),
                vec![
                    "Pass a path starting with '/' plus a method".to_string(),
                    "Or an endpoint id returned by searchEndpoints".to_string(),
                ],
            )
        })
}
