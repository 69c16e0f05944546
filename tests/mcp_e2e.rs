//! End-to-end tests: ingest the marketplace fixture, then drive the MCP
//! handler the way a client would.

mod support;

use apidex::config::{AppConfig, DatabaseConfig};
use apidex::mcp::protocol::{JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use apidex::mcp::{McpHandler, ServerContext};
use apidex::pipeline::IngestionPipeline;
use apidex::storage::create_pool;
use serde_json::{json, Value};
use std::sync::Arc;

struct Harness {
    handler: McpHandler,
    _spec_file: tempfile::NamedTempFile,
}

impl Harness {
    async fn call(&self, tool: &str, arguments: Value) -> JsonRpcResponse {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(JsonRpcId::Number(1)),
            method: "tools/call".to_string(),
            params: json!({"name": tool, "arguments": arguments}),
        };
        self.handler.handle_request(request).await.expect("response")
    }

    /// Unwrap the JSON payload from a successful tool call
    async fn call_ok(&self, tool: &str, arguments: Value) -> Value {
        let response = self.call(tool, arguments).await;
        assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
        let result = response.result.expect("result");
        let text = result["content"][0]["text"].as_str().expect("text block");
        serde_json::from_str(text).expect("payload parses")
    }
}

async fn harness() -> Harness {
    let database = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        auto_migrate: true,
        ..Default::default()
    };
    let pool = create_pool(&database).await.expect("pool");
    let config = AppConfig { database, ..Default::default() };

    let spec_file = support::fixture_file();
    let pipeline = IngestionPipeline::from_config(pool.clone(), &config);
    let result = pipeline.process_file(spec_file.path()).await;
    assert!(result.success, "fixture ingestion failed: {:?}", result.errors);

    let context = Arc::new(ServerContext::new(pool, &config));
    context.warm_up().await.expect("ranker warm-up");
    let handler = McpHandler::new(context);

    // Initialize the MCP session
    let init = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(JsonRpcId::Number(0)),
        method: "initialize".to_string(),
        params: json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "e2e", "version": "1.0"}
        }),
    };
    let response = handler.handle_request(init).await.expect("init response");
    assert!(response.error.is_none());

    Harness { handler, _spec_file: spec_file }
}

#[tokio::test]
async fn basic_search_finds_user_endpoints() {
    let harness = harness().await;
    let payload = harness.call_ok("searchEndpoints", json!({"keywords": "users"})).await;

    assert!(payload["pagination"]["total"].as_i64().unwrap() >= 3);
    let first_path = payload["results"][0]["path"].as_str().unwrap();
    assert!(first_path.contains("users"), "first result was {first_path}");
    assert!(payload["search_metadata"]["category_filter"].is_null());
    assert_eq!(payload["search_metadata"]["keywords"], "users");
}

#[tokio::test]
async fn three_way_and_semantics() {
    let harness = harness().await;
    let payload = harness
        .call_ok(
            "searchEndpoints",
            json!({"keywords": "list", "category": "statistics", "httpMethods": ["POST"]}),
        )
        .await;

    let results = payload["results"].as_array().unwrap();
    assert!(!results.is_empty(), "expected at least one statistics POST matching 'list'");
    for result in results {
        assert_eq!(result["method"], "POST");
        assert_eq!(result["category"], "statistics");
    }
}

#[tokio::test]
async fn category_lookup_is_case_insensitive() {
    let harness = harness().await;
    let mut totals = Vec::new();
    for spelling in ["statistics", "STATISTICS", "StAtIsTiCs"] {
        let payload = harness
            .call_ok("searchEndpoints", json!({"keywords": "statistics", "category": spelling}))
            .await;
        totals.push(payload["pagination"]["total"].as_i64().unwrap());
    }
    assert_eq!(totals[0], totals[1]);
    assert_eq!(totals[1], totals[2]);
    assert!(totals[0] > 0);
}

#[tokio::test]
async fn schema_resolution_reports_cycle() {
    let harness = harness().await;
    let payload = harness
        .call_ok(
            "getSchema",
            json!({"componentName": "User", "resolveDependencies": true, "maxDepth": 3}),
        )
        .await;

    assert_eq!(payload["schema"]["name"], "User");
    let cycles = payload["metadata"]["circular_references"].as_array().unwrap();
    assert!(
        cycles.iter().any(|c| c == "User" || c == "Post"),
        "expected the User/Post cycle, got {cycles:?}"
    );
    let deps = payload["dependencies"].as_array().unwrap();
    assert!(deps.iter().any(|d| d["name"] == "Post"));
}

#[tokio::test]
async fn schema_accepts_pointer_forms() {
    let harness = harness().await;
    for spelling in ["User", "#/components/schemas/User", "components/schemas/User"] {
        let payload = harness.call_ok("getSchema", json!({"componentName": spelling})).await;
        assert_eq!(payload["metadata"]["normalized_name"], "User", "{spelling}");
    }
}

#[tokio::test]
async fn unknown_schema_is_not_found_with_suggestions() {
    let harness = harness().await;
    let response = harness.call("getSchema", json!({"componentName": "Usr"})).await;
    let error = response.error.expect("error");
    assert_eq!(error.code, -32001);
    let data = error.data.unwrap();
    assert_eq!(data["resource_type"], "Schema");
    assert!(data["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s.as_str().unwrap().contains("User")));
}

#[tokio::test]
async fn category_catalog_ordered_by_endpoint_count() {
    let harness = harness().await;
    let payload =
        harness.call_ok("getEndpointCategories", json!({"sortBy": "endpointCount"})).await;

    let categories = payload["categories"].as_array().unwrap();
    let names_and_counts: Vec<(String, i64)> = categories
        .iter()
        .map(|c| (c["name"].as_str().unwrap().to_string(), c["endpointCount"].as_i64().unwrap()))
        .collect();

    assert_eq!(
        names_and_counts,
        vec![
            ("statistics".to_string(), 13),
            ("search_promo".to_string(), 9),
            ("ad".to_string(), 5),
            ("product".to_string(), 5),
            ("campaign".to_string(), 4),
            ("vendor".to_string(), 4),
        ]
    );

    assert_eq!(payload["metadata"]["totalEndpoints"], 40);
    assert_eq!(payload["metadata"]["totalCategories"], 6);
    assert_eq!(payload["metadata"]["apiTitle"], "Marketplace Performance API");

    let groups = payload["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["name"], "API Methods");
    assert_eq!(groups[0]["totalEndpoints"], 40);
}

#[tokio::test]
async fn empty_keywords_is_a_validation_error() {
    let harness = harness().await;
    let response = harness.call("searchEndpoints", json!({"keywords": ""})).await;
    let error = response.error.expect("error");
    assert_eq!(error.code, -32602);
    let data = error.data.unwrap();
    assert_eq!(data["parameter"], "keywords");
    assert!(!data["suggestions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn parameter_boundaries() {
    let harness = harness().await;

    for (arguments, ok) in [
        (json!({"keywords": "a"}), true),
        (json!({"keywords": "a".repeat(500)}), true),
        (json!({"keywords": "a".repeat(501)}), false),
        (json!({"keywords": "k", "perPage": 0}), false),
        (json!({"keywords": "k", "perPage": 1}), true),
        (json!({"keywords": "k", "perPage": 50}), true),
        (json!({"keywords": "k", "perPage": 51}), false),
        (json!({"keywords": "k", "page": 0}), false),
    ] {
        let response = harness.call("searchEndpoints", arguments.clone()).await;
        assert_eq!(response.error.is_none(), ok, "case {arguments}");
    }

    for (depth, ok) in [(0, false), (1, true), (10, true), (11, false)] {
        let response =
            harness.call("getSchema", json!({"componentName": "User", "maxDepth": depth})).await;
        assert_eq!(response.error.is_none(), ok, "maxDepth {depth}");
    }
}

#[tokio::test]
async fn curl_example_for_user_endpoint() {
    let harness = harness().await;
    let payload = harness
        .call_ok(
            "getExample",
            json!({
                "endpoint": "/api/v1/users/{id}",
                "method": "GET",
                "format": "curl",
                "includeAuth": true,
                "baseUrl": "https://api.example.com"
            }),
        )
        .await;

    let code = payload["code"].as_str().unwrap();
    assert!(code.contains("curl -X GET"));
    assert!(code.contains("https://api.example.com/api/v1/users/12345"));
    assert!(code.contains("Authorization:"));
    assert!(code.contains("Accept: application/json"));
    assert_eq!(payload["metadata"]["includeAuth"], true);
    assert_eq!(payload["method"], "GET");
}

#[tokio::test]
async fn example_formats_and_lookup_modes() {
    let harness = harness().await;

    // By operationId, all three formats
    for format in ["curl", "http-client", "script"] {
        let payload = harness
            .call_ok("getExample", json!({"endpoint": "getUser", "format": format}))
            .await;
        assert_eq!(payload["format"], format);
        assert!(!payload["code"].as_str().unwrap().is_empty());
    }

    // A path without a method is a validation error
    let response = harness
        .call("getExample", json!({"endpoint": "/api/v1/users/{id}", "format": "curl"}))
        .await;
    let error = response.error.expect("error");
    assert_eq!(error.code, -32602);
    assert_eq!(error.data.unwrap()["parameter"], "method");

    // Unknown endpoint is not-found
    let response =
        harness.call("getExample", json!({"endpoint": "nonexistent", "format": "curl"})).await;
    assert_eq!(response.error.expect("error").code, -32001);

    // POST example carries a synthesized body
    let payload = harness
        .call_ok(
            "getExample",
            json!({"endpoint": "/api/client/statistics/list", "method": "POST", "format": "curl"}),
        )
        .await;
    let code = payload["code"].as_str().unwrap();
    assert!(code.contains("-d '"), "POST example should carry a body:\n{code}");
}

#[tokio::test]
async fn pagination_walks_the_full_result_set() {
    let harness = harness().await;
    let first = harness
        .call_ok("searchEndpoints", json!({"keywords": "statistics", "perPage": 5, "page": 1}))
        .await;
    let total = first["pagination"]["total"].as_i64().unwrap();
    assert!(total >= 10);
    assert_eq!(first["pagination"]["has_previous"], false);
    assert_eq!(first["pagination"]["has_more"], true);

    let mut seen = std::collections::HashSet::new();
    let total_pages = first["pagination"]["total_pages"].as_i64().unwrap();
    for page in 1..=total_pages {
        let payload = harness
            .call_ok(
                "searchEndpoints",
                json!({"keywords": "statistics", "perPage": 5, "page": page}),
            )
            .await;
        for result in payload["results"].as_array().unwrap() {
            assert!(
                seen.insert(result["endpoint_id"].as_i64().unwrap()),
                "duplicate result across pages"
            );
        }
    }
    assert_eq!(seen.len() as i64, total);
}
