//! # MCP Tools
//!
//! The four tool implementations plus the shared dispatch path: parameter
//! validation → circuit breaker → permit pool → timeout → retry → run →
//! record, with latency and error codes flowing into the monitor.

pub mod get_categories;
pub mod get_example;
pub mod get_schema;
pub mod search_endpoints;

use crate::errors::{ApidexError, Result};
use crate::mcp::context::ServerContext;
use crate::mcp::protocol::Tool;
use serde_json::Value;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Tool definitions for `tools/list`
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "searchEndpoints".to_string(),
            description: "Search API endpoints by keyword with optional HTTP method, category \
                          and category-group filters. Filters combine with AND semantics."
                .to_string(),
            input_schema: search_endpoints::input_schema(),
        },
        Tool {
            name: "getSchema".to_string(),
            description: "Fetch a schema component by name with bounded transitive dependency \
                          resolution and cycle annotations."
                .to_string(),
            input_schema: get_schema::input_schema(),
        },
        Tool {
            name: "getExample".to_string(),
            description: "Generate a ready-to-run request example (curl, http-client or script) \
                          for an endpoint, with placeholder and auth substitution."
                .to_string(),
            input_schema: get_example::input_schema(),
        },
        Tool {
            name: "getEndpointCategories".to_string(),
            description: "Browse the category catalog with per-category endpoint counts and \
                          group aggregation."
                .to_string(),
            input_schema: get_categories::input_schema(),
        },
    ]
}

/// Dispatch one tool call through the resilience pipeline
pub async fn dispatch(context: &ServerContext, name: &str, args: Value) -> Result<Value> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let resilience = context
        .resilience_for(name)
        .ok_or_else(|| ApidexError::not_found("Tool", name))?;

    let result = resilience
        .execute(|| {
            let args = args.clone();
            async move {
                match name {
                    "searchEndpoints" => search_endpoints::run(context, args).await,
                    "getSchema" => get_schema::run(context, args).await,
                    "getExample" => get_example::run(context, args).await,
                    "getEndpointCategories" => get_categories::run(context, args).await,
                    other => Err(ApidexError::not_found("Tool", other)),
                }
            }
        })
        .await;

    let duration = started.elapsed();
    match &result {
        Ok(_) => {
            context.monitor.record_request(name, duration, None);
            context.recorder.record_mcp_request(name, duration.as_secs_f64(), true);
            info!(
                request_id = %request_id,
                method = name,
                duration_ms = duration.as_millis() as u64,
                "Tool call completed"
            );
        }
        Err(e) => {
            let code = e.code().as_str();
            context.monitor.record_request(name, duration, Some(code));
            context.recorder.record_mcp_request(name, duration.as_secs_f64(), false);
            warn!(
                request_id = %request_id,
                method = name,
                error_code = code,
                duration_ms = duration.as_millis() as u64,
                "Tool call failed: {e}"
            );
        }
    }

    result
}

/// Deserialize tool arguments into a typed parameter struct
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| {
        ApidexError::validation_param(
            format!("Invalid parameters: {e}"),
            "arguments",
            vec!["Check the tool's input schema via tools/list".to_string()],
        )
    })
}

/// Trim an optional filter; whitespace-only becomes None
pub(crate) fn optional_filter(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_tools_defined() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            ["searchEndpoints", "getSchema", "getExample", "getEndpointCategories"]
        );
        for tool in &tools {
            assert!(tool.input_schema.get("type").is_some());
        }
    }

    #[test]
    fn test_optional_filter_trims() {
        assert_eq!(optional_filter(Some("  statistics ")), Some("statistics".to_string()));
        assert_eq!(optional_filter(Some("   ")), None);
        assert_eq!(optional_filter(None), None);
    }
}
