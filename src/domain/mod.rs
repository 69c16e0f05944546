//! # Domain Model
//!
//! Value-like entity records owned by the store. Repositories hand out
//! read-only snapshots of these types; all mutation goes through explicit
//! write operations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// HTTP methods accepted on an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }

    pub fn all() -> &'static [HttpMethod] {
        &[
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Delete,
            HttpMethod::Patch,
            HttpMethod::Head,
            HttpMethod::Options,
            HttpMethod::Trace,
        ]
    }

    /// Whether request bodies are conventional for this method
    pub fn is_write(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    /// Classify the operation for search indexing
    pub fn operation_type(&self, path: &str) -> OperationType {
        match self {
            HttpMethod::Get => {
                if path.trim_end_matches('/').ends_with('}') {
                    OperationType::Read
                } else {
                    OperationType::List
                }
            }
            HttpMethod::Post => OperationType::Create,
            HttpMethod::Put | HttpMethod::Patch => OperationType::Update,
            HttpMethod::Delete => OperationType::Delete,
            _ => OperationType::Other,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "TRACE" => Ok(HttpMethod::Trace),
            other => Err(format!("unknown HTTP method: {other}")),
        }
    }
}

/// Coarse operation classification used by the search index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Read,
    List,
    Create,
    Update,
    Delete,
    Other,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Read => "read",
            OperationType::List => "list",
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Other => "other",
        }
    }
}

/// Where a parameter is carried on the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Query => "query",
            ParameterLocation::Path => "path",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }
}

impl FromStr for ParameterLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(ParameterLocation::Query),
            "path" => Ok(ParameterLocation::Path),
            "header" => Ok(ParameterLocation::Header),
            "cookie" => Ok(ParameterLocation::Cookie),
            other => Err(format!("unknown parameter location: {other}")),
        }
    }
}

/// Numeric and string constraints on a parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl ParameterConstraints {
    pub fn is_empty(&self) -> bool {
        self.minimum.is_none()
            && self.maximum.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
    }
}

/// A request parameter attached to an endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "ParameterConstraints::is_empty")]
    pub constraints: ParameterConstraints,
    /// Unresolved `$ref` target, preserved verbatim when resolution failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Item schema for array parameters, preserved as raw JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extensions: IndexMap<String, serde_json::Value>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, location: ParameterLocation) -> Self {
        Self {
            name: name.into(),
            location,
            required: location == ParameterLocation::Path,
            description: None,
            schema_type: None,
            format: None,
            enum_values: Vec::new(),
            default: None,
            example: None,
            deprecated: false,
            constraints: ParameterConstraints::default(),
            reference: None,
            items: None,
            additional_properties: None,
            extensions: IndexMap::new(),
        }
    }
}

/// Request body description: media type → schema reference or inline schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Media type → raw schema (inline or `{"$ref": ...}`)
    #[serde(default)]
    pub content: IndexMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
}

/// A declared response for one status code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Media type → raw schema
    #[serde(default)]
    pub content: IndexMap<String, serde_json::Value>,
    /// Bare schema component names referenced by this response
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub schema_refs: BTreeSet<String>,
}

/// One security alternative: a scheme plus the scopes it is exercised with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRequirement {
    pub scheme: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// One (path, method) operation with its full description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Store-assigned id; `None` until persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub api_id: i64,
    pub path: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Status code → response, in declaration order
    #[serde(default)]
    pub responses: IndexMap<String, ResponseSpec>,
    /// Alternatives (outer OR) of requirement sets (inner AND)
    #[serde(default)]
    pub security: Vec<Vec<SecurityRequirement>>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extensions: IndexMap<String, serde_json::Value>,
    /// Schema component names reachable from this endpoint
    #[serde(default)]
    pub schema_dependencies: BTreeSet<String>,
    /// Security scheme names referenced by this endpoint
    #[serde(default)]
    pub security_dependencies: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_group: Option<String>,
    /// Denormalized human-readable text feeding the search index
    #[serde(default)]
    pub searchable_text: String,
}

impl Endpoint {
    pub fn new(path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            id: None,
            api_id: 0,
            path: path.into(),
            method,
            operation_id: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            parameters: Vec::new(),
            request_body: None,
            responses: IndexMap::new(),
            security: Vec::new(),
            deprecated: false,
            extensions: IndexMap::new(),
            schema_dependencies: BTreeSet::new(),
            security_dependencies: BTreeSet::new(),
            category: None,
            category_group: None,
            searchable_text: String::new(),
        }
    }

    /// Placeholder names appearing in the path template, in order
    pub fn path_placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start + 1..].find('}') else { break };
            names.push(rest[start + 1..start + 1 + len].to_string());
            rest = &rest[start + 1 + len + 1..];
        }
        names
    }

    /// Path parameters declared on this endpoint
    pub fn path_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.location == ParameterLocation::Path)
    }
}

/// JSON-schema primitive type names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Null => "null",
        }
    }
}

impl FromStr for SchemaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object" => Ok(SchemaType::Object),
            "array" => Ok(SchemaType::Array),
            "string" => Ok(SchemaType::String),
            "number" => Ok(SchemaType::Number),
            "integer" => Ok(SchemaType::Integer),
            "boolean" => Ok(SchemaType::Boolean),
            "null" => Ok(SchemaType::Null),
            other => Err(format!("unknown schema type: {other}")),
        }
    }
}

/// Composition mode of a composite schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompositionMode {
    AllOf,
    OneOf,
    AnyOf,
}

impl CompositionMode {
    pub fn key(&self) -> &'static str {
        match self {
            CompositionMode::AllOf => "allOf",
            CompositionMode::OneOf => "oneOf",
            CompositionMode::AnyOf => "anyOf",
        }
    }
}

/// Structural classification of a schema fragment.
///
/// `$ref` targets are carried as bare component names; cycles become
/// self-referential edges in the name-keyed component table, never
/// self-referential ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SchemaNode {
    Primitive {
        #[serde(rename = "type")]
        schema_type: SchemaType,
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Object {
        #[serde(default)]
        properties: IndexMap<String, SchemaNode>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
    },
    Array {
        items: Box<SchemaNode>,
    },
    Composite {
        mode: CompositionMode,
        parts: Vec<SchemaNode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        discriminator: Option<String>,
    },
    Reference {
        /// Bare component name, or the original string when unresolvable
        target: String,
        #[serde(default)]
        resolved: bool,
    },
    /// Fragment we could not classify; raw value preserved for fidelity
    Opaque,
}

/// A named schema component from `components.schemas` / `definitions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaComponent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub api_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Structural classification of the definition
    pub node: SchemaNode,
    /// Raw definition exactly as parsed, property order preserved
    pub raw: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extensions: IndexMap<String, serde_json::Value>,
    /// Direct `$ref` targets of this schema
    #[serde(default)]
    pub schema_dependencies: BTreeSet<String>,
    /// Marked when this schema participates in a reference cycle
    #[serde(default)]
    pub circular: bool,
    #[serde(default)]
    pub reference_count: i64,
    #[serde(default)]
    pub searchable_text: String,
}

/// Security scheme type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecuritySchemeType {
    ApiKey,
    Http,
    Oauth2,
    OpenIdConnect,
    MutualTls,
}

impl SecuritySchemeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecuritySchemeType::ApiKey => "apiKey",
            SecuritySchemeType::Http => "http",
            SecuritySchemeType::Oauth2 => "oauth2",
            SecuritySchemeType::OpenIdConnect => "openIdConnect",
            SecuritySchemeType::MutualTls => "mutualTLS",
        }
    }
}

impl FromStr for SecuritySchemeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apiKey" => Ok(SecuritySchemeType::ApiKey),
            "http" | "basic" => Ok(SecuritySchemeType::Http),
            "oauth2" => Ok(SecuritySchemeType::Oauth2),
            "openIdConnect" => Ok(SecuritySchemeType::OpenIdConnect),
            "mutualTLS" => Ok(SecuritySchemeType::MutualTls),
            other => Err(format!("unknown security scheme type: {other}")),
        }
    }
}

/// A named security scheme from `components.securitySchemes` / `securityDefinitions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityScheme {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub api_id: i64,
    pub name: String,
    pub scheme_type: SecuritySchemeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_location: Option<ParameterLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_format: Option<String>,
    /// Flow name → {authorizationUrl?, tokenUrl?, refreshUrl?, scopes}
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth2_flows: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openid_connect_url: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extensions: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub reference_count: i64,
}

impl SecurityScheme {
    pub fn new(name: impl Into<String>, scheme_type: SecuritySchemeType) -> Self {
        Self {
            id: None,
            api_id: 0,
            name: name.into(),
            scheme_type,
            description: None,
            api_key_name: None,
            api_key_location: None,
            http_scheme: None,
            bearer_format: None,
            oauth2_flows: None,
            openid_connect_url: None,
            extensions: IndexMap::new(),
            reference_count: 0,
        }
    }

    /// Scope names declared across all flows of an oauth2 scheme
    pub fn declared_scopes(&self) -> BTreeSet<String> {
        let mut scopes = BTreeSet::new();
        if let Some(flows) = self.oauth2_flows.as_ref().and_then(|v| v.as_object()) {
            for flow in flows.values() {
                if let Some(map) = flow.get("scopes").and_then(|s| s.as_object()) {
                    scopes.extend(map.keys().cloned());
                }
            }
        }
        scopes
    }
}

/// One ingested specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub file_path: String,
    /// SHA-256 of the raw file bytes
    pub file_hash: String,
    pub title: String,
    pub version: String,
    pub openapi_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub endpoint_count: i64,
    #[serde(default)]
    pub schema_count: i64,
    #[serde(default)]
    pub security_scheme_count: i64,
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

/// Resolved category for one endpoint, before catalog aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryInfo {
    /// Normalized name (lowercase, `_`-separated, unicode preserved)
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_group: Option<String>,
}

/// One row of the aggregated category catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCatalogEntry {
    pub category_name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_group: Option<String>,
    pub endpoint_count: i64,
    pub http_methods: BTreeSet<String>,
}
