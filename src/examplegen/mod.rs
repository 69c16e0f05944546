//! # Example Generation
//!
//! Produces ready-to-run request samples for an endpoint: a cURL command, a
//! promise-based HTTP-client function, or a synchronous script. Path
//! placeholders are substituted with type-appropriate sentinels and, when
//! requested, an authorization header or query parameter matching the
//! endpoint's first security requirement is injected.

mod curl;
mod http_client;
mod script;

pub use curl::generate_curl;
pub use http_client::generate_http_client;
pub use script::generate_script;

use crate::domain::{Endpoint, ParameterLocation, SecurityScheme, SecuritySchemeType};
use crate::errors::{ApidexError, Result};
use serde_json::Value;
use std::str::FromStr;

/// Default base URL when the spec declares no servers
pub const DEFAULT_BASE_URL: &str = "https://api.example.com";

/// Canonical sentinel values
pub const SENTINEL_INTEGER: &str = "12345";
pub const SENTINEL_STRING: &str = "example";
pub const SENTINEL_UUID: &str = "123e4567-e89b-12d3-a456-426614174000";

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExampleFormat {
    #[serde(rename = "curl")]
    Curl,
    #[serde(rename = "http-client")]
    HttpClient,
    #[serde(rename = "script")]
    Script,
}

impl ExampleFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExampleFormat::Curl => "curl",
            ExampleFormat::HttpClient => "http-client",
            ExampleFormat::Script => "script",
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &["curl", "http-client", "script"]
    }
}

impl FromStr for ExampleFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "curl" => Ok(ExampleFormat::Curl),
            "http-client" => Ok(ExampleFormat::HttpClient),
            "script" => Ok(ExampleFormat::Script),
            other => Err(format!("unsupported format: {other}")),
        }
    }
}

/// Authorization material resolved for injection
#[derive(Debug, Clone, PartialEq)]
pub enum AuthMaterial {
    /// `Authorization: <value>` header
    Header { name: String, value: String },
    /// `?name=value` query parameter
    Query { name: String, value: String },
    /// Client-certificate hint, no credential material
    ClientCertificate,
    None,
}

/// Everything a generator needs for one endpoint
#[derive(Debug, Clone)]
pub struct ExampleRequest {
    pub url: String,
    pub method: String,
    pub auth: AuthMaterial,
    pub body: Option<Value>,
}

/// Build the request model shared by all generators
pub fn build_request(
    endpoint: &Endpoint,
    base_url: Option<&str>,
    include_auth: bool,
    scheme: Option<&SecurityScheme>,
) -> Result<ExampleRequest> {
    let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
    let path = substitute_placeholders(endpoint);
    let mut url = format!("{base}{path}");

    let auth = if include_auth { resolve_auth(scheme) } else { AuthMaterial::None };
    if let AuthMaterial::Query { name, value } = &auth {
        let separator = if url.contains('?') { '&' } else { '?' };
        url.push_str(&format!("{separator}{name}={value}"));
    }

    let body = if endpoint.method.is_write() { synthesize_body(endpoint) } else { None };

    Ok(ExampleRequest { url, method: endpoint.method.to_string(), auth, body })
}

/// Run the generator for `format`
pub fn generate(
    endpoint: &Endpoint,
    format: ExampleFormat,
    base_url: Option<&str>,
    include_auth: bool,
    scheme: Option<&SecurityScheme>,
) -> Result<String> {
    let request = build_request(endpoint, base_url, include_auth, scheme)?;
    let code = match format {
        ExampleFormat::Curl => generate_curl(&request),
        ExampleFormat::HttpClient => generate_http_client(&request, endpoint),
        ExampleFormat::Script => generate_script(&request, endpoint),
    };
    if code.trim().is_empty() {
        return Err(ApidexError::CodeGeneration {
            message: format!("empty output for format {}", format.as_str()),
        });
    }
    Ok(code)
}

/// Replace `{name}` placeholders with sentinels matching the declared type
pub fn substitute_placeholders(endpoint: &Endpoint) -> String {
    let mut path = endpoint.path.clone();
    for name in endpoint.path_placeholders() {
        let sentinel = endpoint
            .parameters
            .iter()
            .find(|p| p.location == ParameterLocation::Path && p.name == name)
            .map(sentinel_for)
            .unwrap_or_else(|| SENTINEL_INTEGER.to_string());
        path = path.replace(&format!("{{{name}}}"), &sentinel);
    }
    path
}

fn sentinel_for(parameter: &crate::domain::Parameter) -> String {
    if let Some(example) = &parameter.example {
        return match example {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    match (parameter.schema_type.as_deref(), parameter.format.as_deref()) {
        (_, Some("uuid")) => SENTINEL_UUID.to_string(),
        (Some("integer"), _) | (Some("number"), _) => SENTINEL_INTEGER.to_string(),
        (Some("boolean"), _) => "true".to_string(),
        _ => {
            // Common id-like names read better as numbers
            if parameter.name == "id" || parameter.name.ends_with("_id") {
                SENTINEL_INTEGER.to_string()
            } else {
                SENTINEL_STRING.to_string()
            }
        }
    }
}

fn resolve_auth(scheme: Option<&SecurityScheme>) -> AuthMaterial {
    let Some(scheme) = scheme else {
        // No resolvable scheme: a bearer header is the least surprising default
        return AuthMaterial::Header {
            name: "Authorization".to_string(),
            value: "Bearer YOUR_TOKEN_HERE".to_string(),
        };
    };

    match scheme.scheme_type {
        SecuritySchemeType::Http => {
            let value = match scheme.http_scheme.as_deref() {
                Some("basic") => "Basic YOUR_CREDENTIALS_HERE".to_string(),
                _ => "Bearer YOUR_TOKEN_HERE".to_string(),
            };
            AuthMaterial::Header { name: "Authorization".to_string(), value }
        }
        SecuritySchemeType::ApiKey => {
            let name = scheme.api_key_name.clone().unwrap_or_else(|| "X-Api-Key".to_string());
            match scheme.api_key_location {
                Some(ParameterLocation::Query) => {
                    AuthMaterial::Query { name, value: "YOUR_API_KEY_HERE".to_string() }
                }
                _ => AuthMaterial::Header { name, value: "YOUR_API_KEY_HERE".to_string() },
            }
        }
        SecuritySchemeType::Oauth2 | SecuritySchemeType::OpenIdConnect => AuthMaterial::Header {
            name: "Authorization".to_string(),
            value: "Bearer YOUR_ACCESS_TOKEN_HERE".to_string(),
        },
        SecuritySchemeType::MutualTls => AuthMaterial::ClientCertificate,
    }
}

/// Build a request body from examples or, failing that, the schema shape
pub fn synthesize_body(endpoint: &Endpoint) -> Option<Value> {
    let body = endpoint.request_body.as_ref()?;
    if let Some(example) = &body.example {
        return Some(example.clone());
    }

    let schema = body
        .content
        .get("application/json")
        .or_else(|| body.content.values().next())?;
    Some(value_from_schema(schema, 0))
}

fn value_from_schema(schema: &Value, depth: usize) -> Value {
    if depth > 3 {
        return Value::Null;
    }
    if schema.get("$ref").is_some() {
        return serde_json::json!({"id": 12345});
    }
    if let Some(example) = schema.get("example") {
        return example.clone();
    }
    if let Some(default) = schema.get("default") {
        return default.clone();
    }
    if let Some(first) = schema.get("enum").and_then(|e| e.as_array()).and_then(|e| e.first()) {
        return first.clone();
    }

    match schema.get("type").and_then(|t| t.as_str()) {
        Some("object") | None => {
            let mut object = serde_json::Map::new();
            if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
                for (name, property) in properties {
                    object.insert(name.clone(), value_from_schema(property, depth + 1));
                }
            }
            Value::Object(object)
        }
        Some("array") => {
            let item = schema
                .get("items")
                .map(|items| value_from_schema(items, depth + 1))
                .unwrap_or(Value::Null);
            Value::Array(vec![item])
        }
        Some("integer") | Some("number") => serde_json::json!(12345),
        Some("boolean") => serde_json::json!(true),
        Some("string") => match schema.get("format").and_then(|f| f.as_str()) {
            Some("uuid") => Value::String(SENTINEL_UUID.to_string()),
            Some("date-time") => Value::String("2024-01-15T09:30:00Z".to_string()),
            Some("email") => Value::String("user@example.com".to_string()),
            _ => Value::String(SENTINEL_STRING.to_string()),
        },
        _ => Value::Null,
    }
}
