//! Shared fixture: a 40-endpoint specification across six categories, with a
//! schema reference cycle and a global bearer scheme.

use serde_json::{json, Value};

fn operation(tag: &str, operation_id: &str, summary: &str, method: &str) -> Value {
    let mut op = json!({
        "tags": [tag],
        "operationId": operation_id,
        "summary": summary,
        "description": format!("{summary} for the demo marketplace"),
        "responses": {
            "200": {
                "description": "Successful response",
                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiResponse"}}}
            },
            "400": {"description": "Bad request"}
        }
    });
    if method == "post" {
        op["requestBody"] = json!({
            "required": true,
            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ListRequest"}}}
        });
        op["responses"]["201"] = json!({"description": "Created"});
    }
    op
}

/// Build the full fixture document
pub fn fixture_spec() -> Value {
    let mut paths = serde_json::Map::new();

    // statistics: 4 GET (three on /api/v1/users*) + 9 POST = 13
    let stats_get: [(&str, &str, &str); 4] = [
        ("/api/v1/users", "listUsers", "List users"),
        ("/api/v1/users/{id}", "getUser", "Get a single user"),
        ("/api/v1/users/{id}/activity", "getUserActivity", "Get user activity statistics"),
        ("/api/client/statistics/report", "getStatisticsReport", "Get a statistics report"),
    ];
    for (path, operation_id, summary) in stats_get {
        let mut item = serde_json::Map::new();
        let mut op = operation("Statistics", operation_id, summary, "get");
        if path.contains("{id}") {
            op["parameters"] = json!([
                {"name": "id", "in": "path", "required": true,
                 "schema": {"type": "integer", "format": "int64"}}
            ]);
        }
        item.insert("get".to_string(), op);
        paths.insert(path.to_string(), Value::Object(item));
    }
    let stats_post = [
        "list", "video/list", "attribution/list", "generate", "phrases/list", "daily/list",
        "media/list", "campaign/list", "expense/list",
    ];
    for suffix in stats_post {
        let path = format!("/api/client/statistics/{suffix}");
        let operation_id = format!("statistics_{}", suffix.replace('/', "_"));
        let summary = if suffix == "generate" {
            "Generate statistics".to_string()
        } else {
            format!("List statistics {}", suffix.trim_end_matches("/list").replace('/', " "))
        };
        let mut item = serde_json::Map::new();
        item.insert("post".to_string(), operation("Statistics", &operation_id, &summary, "post"));
        paths.insert(path, Value::Object(item));
    }

    // search_promo: 9
    for (index, suffix) in
        ["bids", "bids/set", "keywords", "keywords/set", "products", "products/set", "report",
         "settings", "settings/set"]
        .iter()
        .enumerate()
    {
        let method = if suffix.ends_with("set") { "post" } else { "get" };
        let path = format!("/api/client/search_promo/{suffix}");
        let operation_id = format!("searchPromo{index}");
        let summary = format!("Search promotion {}", suffix.replace('/', " "));
        let mut item = serde_json::Map::new();
        item.insert(method.to_string(), operation("Search-Promo", &operation_id, &summary, method));
        paths.insert(path, Value::Object(item));
    }

    // ad: 5, product: 5, campaign: 4, vendor: 4
    let groups: [(&str, &str, usize); 4] =
        [("Ad", "ad", 5), ("Product", "product", 5), ("Campaign", "campaign", 4), ("Vendor", "vendor", 4)];
    for (tag, segment, count) in groups {
        for index in 0..count {
            let method = if index % 2 == 0 { "get" } else { "post" };
            let path = format!("/api/client/{segment}/op{index}");
            let operation_id = format!("{segment}Op{index}");
            let summary = format!("{tag} operation {index}");
            let mut item = serde_json::Map::new();
            item.insert(method.to_string(), operation(tag, &operation_id, &summary, method));
            paths.insert(path, Value::Object(item));
        }
    }

    json!({
        "openapi": "3.0.0",
        "info": {
            "title": "Marketplace Performance API",
            "version": "2.0.0",
            "description": "Demo marketplace advertising API"
        },
        "servers": [{"url": "https://api.marketplace.example"}],
        "security": [{"bearerAuth": []}],
        "tags": [
            {"name": "Statistics", "description": "Statistics and reporting"},
            {"name": "Search-Promo", "description": "Search promotion management"},
            {"name": "Ad", "description": "Ad management"},
            {"name": "Product", "description": "Product operations"},
            {"name": "Campaign", "description": "Campaign management"},
            {"name": "Vendor", "description": "Vendor operations"}
        ],
        "x-tagGroups": [
            {"name": "API Methods",
             "tags": ["Statistics", "Search-Promo", "Ad", "Product", "Campaign", "Vendor"]}
        ],
        "paths": paths,
        "components": {
            "schemas": {
                "ApiResponse": {
                    "type": "object",
                    "properties": {
                        "result": {"type": "string"},
                        "user": {"$ref": "#/components/schemas/User"}
                    }
                },
                "ListRequest": {
                    "type": "object",
                    "properties": {
                        "page": {"type": "integer", "example": 1},
                        "page_size": {"type": "integer", "example": 20}
                    }
                },
                "User": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer", "format": "int64"},
                        "name": {"type": "string"},
                        "posts": {"type": "array", "items": {"$ref": "#/components/schemas/Post"}}
                    },
                    "required": ["id"]
                },
                "Post": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer"},
                        "author": {"$ref": "#/components/schemas/User"}
                    }
                }
            },
            "securitySchemes": {
                "bearerAuth": {"type": "http", "scheme": "bearer", "bearerFormat": "JWT"}
            }
        }
    })
}

/// Write the fixture to a temp file
pub fn fixture_file() -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::with_suffix(".json").expect("temp file");
    file.write_all(fixture_spec().to_string().as_bytes()).expect("write fixture");
    file
}
