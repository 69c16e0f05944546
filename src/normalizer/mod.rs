//! # Normalization
//!
//! Transforms a parsed specification document into stable entity shapes:
//! endpoints, schema components, security schemes and the category catalog.
//! Reference resolution, cycle marking, categorization and cross-entity
//! consistency validation all happen here, before anything touches the store.

pub mod categorization;
pub mod consistency;
pub mod endpoint;
pub mod extensions;
pub mod refs;
pub mod schema;
pub mod security;

pub use categorization::{
    category_to_tag_form, normalize_category_name, CatalogSort, CategorizationEngine,
    CategoryCatalog,
};
pub use consistency::{consistency_score, validate_consistency, ConsistencyReport};
pub use refs::{normalize_schema_ref, RefTarget};

use crate::domain::{ApiMetadata, CategoryCatalogEntry, Endpoint, SchemaComponent, SecurityScheme};
use crate::errors::Result;
use crate::parser::{detect_version, ParsedSpec};
use std::collections::BTreeMap;
use tracing::info;

/// Everything the persist stage needs, in one value
#[derive(Debug)]
pub struct NormalizedSpec {
    pub metadata: ApiMetadata,
    pub endpoints: Vec<Endpoint>,
    pub schemas: Vec<SchemaComponent>,
    pub security_schemes: Vec<SecurityScheme>,
    pub categories: Vec<CategoryCatalogEntry>,
    /// Schema reference cycles, each a closed name path
    pub cycles: Vec<Vec<String>>,
    pub consistency: ConsistencyReport,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Normalize a parsed document into persistable entities
pub fn normalize(parsed: &ParsedSpec) -> Result<NormalizedSpec> {
    let document = &parsed.document;
    let (version, version_string) = detect_version(document)?;

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let schema_result = schema::normalize_schemas(document, version);
    warnings.extend(schema_result.warnings);

    let security_result = security::normalize_security_schemes(document, version);
    errors.extend(security_result.errors);
    warnings.extend(security_result.warnings);

    let engine = CategorizationEngine::from_document(document);
    let catalog = CategoryCatalog::new();
    let endpoint_result = endpoint::normalize_endpoints(document, version, &engine, &catalog);
    warnings.extend(endpoint_result.warnings);

    let mut schemas = schema_result.schemas;
    let mut security_schemes = security_result.schemes;
    let endpoints = endpoint_result.endpoints;

    apply_reference_counts(&endpoints, &mut schemas, &mut security_schemes);

    // Scope validation needs the typed schemes in hand
    let scheme_index: BTreeMap<String, &SecurityScheme> =
        security_schemes.iter().map(|s| (s.name.clone(), s)).collect();
    for endpoint in &endpoints {
        let label = format!("{} {}", endpoint.method, endpoint.path);
        warnings.extend(security::validate_requirements(&label, &endpoint.security, &scheme_index));
    }

    let consistency = validate_consistency(&endpoints, &schemas, &security_schemes);

    let info = document.get("info");
    let metadata = ApiMetadata {
        id: None,
        file_path: parsed.file_path.display().to_string(),
        file_hash: parsed.file_hash.clone(),
        title: info
            .and_then(|i| i.get("title"))
            .and_then(|t| t.as_str())
            .unwrap_or("Untitled API")
            .to_string(),
        version: info
            .and_then(|i| i.get("version"))
            .and_then(|v| v.as_str())
            .unwrap_or("0.0.0")
            .to_string(),
        openapi_version: version_string,
        description: info
            .and_then(|i| i.get("description"))
            .and_then(|d| d.as_str())
            .map(String::from),
        endpoint_count: endpoints.len() as i64,
        schema_count: schemas.len() as i64,
        security_scheme_count: security_schemes.len() as i64,
        ingested_at: chrono::Utc::now(),
    };

    info!(
        title = %metadata.title,
        endpoints = endpoints.len(),
        schemas = schemas.len(),
        security_schemes = security_schemes.len(),
        categories = catalog.len(),
        consistency_score = consistency.score,
        "Normalized specification"
    );

    Ok(NormalizedSpec {
        metadata,
        endpoints,
        schemas,
        security_schemes,
        categories: catalog.into_entries(),
        cycles: schema_result.cycles,
        consistency,
        errors,
        warnings,
    })
}

fn apply_reference_counts(
    endpoints: &[Endpoint],
    schemas: &mut [SchemaComponent],
    security_schemes: &mut [SecurityScheme],
) {
    let mut schema_refs: BTreeMap<&str, i64> = BTreeMap::new();
    for endpoint in endpoints {
        for name in &endpoint.schema_dependencies {
            *schema_refs.entry(name.as_str()).or_default() += 1;
        }
    }
    // Schema-to-schema references count too
    let schema_deps: Vec<(String, Vec<String>)> = schemas
        .iter()
        .map(|s| (s.name.clone(), s.schema_dependencies.iter().cloned().collect()))
        .collect();
    for (owner, deps) in &schema_deps {
        for dep in deps {
            if dep != owner {
                *schema_refs.entry(dep.as_str()).or_default() += 1;
            }
        }
    }
    for schema in schemas.iter_mut() {
        schema.reference_count = schema_refs.get(schema.name.as_str()).copied().unwrap_or(0);
    }

    let mut scheme_refs: BTreeMap<&str, i64> = BTreeMap::new();
    for endpoint in endpoints {
        for name in &endpoint.security_dependencies {
            *scheme_refs.entry(name.as_str()).or_default() += 1;
        }
    }
    for scheme in security_schemes.iter_mut() {
        scheme.reference_count = scheme_refs.get(scheme.name.as_str()).copied().unwrap_or(0);
    }
}
