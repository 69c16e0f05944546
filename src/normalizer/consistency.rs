//! Cross-entity consistency validation.
//!
//! Runs after normalization over the full entity set: reference closure,
//! path-parameter synchronization, schema usage, naming conventions, HTTP
//! method patterns and response-code coverage. Produces separate error and
//! warning lists plus a single consistency score.

use crate::domain::{Endpoint, HttpMethod, ParameterLocation, SchemaComponent, SecurityScheme};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const PRIMITIVE_NAMES: &[&str] =
    &["string", "number", "integer", "boolean", "array", "object", "null"];

/// A schema coupled to more than this many other schemas draws a warning
const COUPLING_LIMIT: usize = 5;

/// Distinct naming conventions tolerated before the mix draws a warning
const NAMING_MIX_LIMIT: usize = 2;

static SNAKE_CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(_[a-z0-9]+)+$").unwrap());
static CAMEL_CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*([A-Z][a-z0-9]*)+$").unwrap());
static PASCAL_CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z][a-z0-9]*){2,}$").unwrap());
static KEBAB_CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)+$").unwrap());
static UPPER_CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]*(_[A-Z0-9]+)*$").unwrap());

/// Consistency findings plus the derived score
#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// 0..=100; see [`consistency_score`]
    pub score: f64,
}

/// Validate cross-entity invariants over a normalized entity set
pub fn validate_consistency(
    endpoints: &[Endpoint],
    schemas: &[SchemaComponent],
    security_schemes: &[SecurityScheme],
) -> ConsistencyReport {
    let mut report = ConsistencyReport::default();

    let schema_names: BTreeSet<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
    let scheme_names: BTreeSet<&str> = security_schemes.iter().map(|s| s.name.as_str()).collect();

    check_references(endpoints, schemas, &schema_names, &scheme_names, &mut report);
    check_path_parameters(endpoints, &mut report);
    check_schema_usage(endpoints, schemas, &mut report);
    check_naming(endpoints, schemas, &mut report);
    check_method_patterns(endpoints, &mut report);
    check_response_codes(endpoints, &mut report);

    report.score =
        consistency_score(report.errors.len(), report.warnings.len(), endpoints.len(), schemas.len());
    report
}

/// `100 - (2*errors + 0.5*warnings) / (2*(endpoints+schemas)) * 100`, clamped
pub fn consistency_score(errors: usize, warnings: usize, endpoints: usize, schemas: usize) -> f64 {
    let population = endpoints + schemas;
    if population == 0 {
        return if errors + warnings == 0 { 100.0 } else { 0.0 };
    }
    let penalty = (2.0 * errors as f64 + 0.5 * warnings as f64) / (2.0 * population as f64) * 100.0;
    (100.0 - penalty).clamp(0.0, 100.0)
}

fn check_references(
    endpoints: &[Endpoint],
    schemas: &[SchemaComponent],
    schema_names: &BTreeSet<&str>,
    scheme_names: &BTreeSet<&str>,
    report: &mut ConsistencyReport,
) {
    for endpoint in endpoints {
        let label = format!("{} {}", endpoint.method, endpoint.path);
        for dependency in &endpoint.schema_dependencies {
            if !schema_names.contains(dependency.as_str()) {
                report
                    .errors
                    .push(format!("{label}: references undefined schema '{dependency}'"));
            }
        }
        for scheme in &endpoint.security_dependencies {
            if !scheme_names.contains(scheme.as_str()) {
                report
                    .errors
                    .push(format!("{label}: references undefined security scheme '{scheme}'"));
            }
        }
    }

    for schema in schemas {
        for dependency in &schema.schema_dependencies {
            if !schema_names.contains(dependency.as_str()) {
                report.errors.push(format!(
                    "schema '{}': references undefined schema '{dependency}'",
                    schema.name
                ));
            }
        }
    }
}

fn check_path_parameters(endpoints: &[Endpoint], report: &mut ConsistencyReport) {
    // Group by path template; placeholders must match path parameters across methods
    let mut by_path: BTreeMap<&str, Vec<&Endpoint>> = BTreeMap::new();
    for endpoint in endpoints {
        by_path.entry(endpoint.path.as_str()).or_default().push(endpoint);
    }

    for (path, group) in by_path {
        let placeholders: BTreeSet<String> = group[0].path_placeholders().into_iter().collect();

        let mut declared: BTreeSet<String> = BTreeSet::new();
        // (name → (type, format)) per method, to spot conflicts
        let mut typings: HashMap<String, BTreeSet<(Option<String>, Option<String>)>> =
            HashMap::new();

        for endpoint in &group {
            for param in endpoint.path_parameters() {
                declared.insert(param.name.clone());
                typings
                    .entry(param.name.clone())
                    .or_default()
                    .insert((param.schema_type.clone(), param.format.clone()));
                if !param.required {
                    report.errors.push(format!(
                        "{} {path}: path parameter '{}' must be required",
                        endpoint.method, param.name
                    ));
                }
            }
        }

        for missing in placeholders.difference(&declared) {
            report
                .errors
                .push(format!("{path}: placeholder '{{{missing}}}' has no path parameter"));
        }
        for orphan in declared.difference(&placeholders) {
            report
                .errors
                .push(format!("{path}: path parameter '{orphan}' has no placeholder"));
        }
        for (name, variants) in typings {
            if variants.len() > 1 {
                report.warnings.push(format!(
                    "{path}: path parameter '{name}' has conflicting types across methods"
                ));
            }
        }
    }
}

fn check_schema_usage(
    endpoints: &[Endpoint],
    schemas: &[SchemaComponent],
    report: &mut ConsistencyReport,
) {
    let mut used: HashSet<&str> = HashSet::new();
    for endpoint in endpoints {
        used.extend(endpoint.schema_dependencies.iter().map(String::as_str));
    }
    for schema in schemas {
        used.extend(schema.schema_dependencies.iter().map(String::as_str));
    }

    for schema in schemas {
        if !used.contains(schema.name.as_str()) {
            report.warnings.push(format!("schema '{}' is never referenced", schema.name));
        }
        if PRIMITIVE_NAMES.contains(&schema.name.to_ascii_lowercase().as_str()) {
            report.warnings.push(format!(
                "schema '{}' shadows a primitive type name",
                schema.name
            ));
        }
        if schema.schema_dependencies.len() > COUPLING_LIMIT {
            report.warnings.push(format!(
                "schema '{}' is overly coupled ({} dependencies)",
                schema.name,
                schema.schema_dependencies.len()
            ));
        }
    }
}

fn naming_convention(identifier: &str) -> Option<&'static str> {
    if SNAKE_CASE.is_match(identifier) {
        Some("snake_case")
    } else if CAMEL_CASE.is_match(identifier) {
        Some("camelCase")
    } else if PASCAL_CASE.is_match(identifier) {
        Some("PascalCase")
    } else if KEBAB_CASE.is_match(identifier) {
        Some("kebab-case")
    } else if UPPER_CASE.is_match(identifier) {
        Some("UPPER_CASE")
    } else {
        None
    }
}

fn check_naming(endpoints: &[Endpoint], schemas: &[SchemaComponent], report: &mut ConsistencyReport) {
    let mut parameter_conventions: BTreeSet<&'static str> = BTreeSet::new();
    for endpoint in endpoints {
        for param in &endpoint.parameters {
            parameter_conventions.extend(naming_convention(&param.name));
        }
    }
    if parameter_conventions.len() > NAMING_MIX_LIMIT {
        report.warnings.push(format!(
            "parameter names mix {} naming conventions: {}",
            parameter_conventions.len(),
            parameter_conventions.iter().copied().collect::<Vec<_>>().join(", ")
        ));
    }

    let mut schema_conventions: BTreeSet<&'static str> = BTreeSet::new();
    for schema in schemas {
        schema_conventions.extend(naming_convention(&schema.name));
    }
    if schema_conventions.len() > NAMING_MIX_LIMIT {
        report.warnings.push(format!(
            "schema names mix {} naming conventions: {}",
            schema_conventions.len(),
            schema_conventions.iter().copied().collect::<Vec<_>>().join(", ")
        ));
    }
}

fn check_method_patterns(endpoints: &[Endpoint], report: &mut ConsistencyReport) {
    let mut methods_by_path: BTreeMap<&str, BTreeSet<HttpMethod>> = BTreeMap::new();
    for endpoint in endpoints {
        methods_by_path.entry(endpoint.path.as_str()).or_default().insert(endpoint.method);
    }

    for (path, methods) in methods_by_path {
        let has_get = methods.contains(&HttpMethod::Get);
        if methods.contains(&HttpMethod::Post) && !has_get && !path.contains('{') {
            report
                .warnings
                .push(format!("{path}: collection accepts POST but offers no GET"));
        }
        if methods.contains(&HttpMethod::Delete) && !has_get {
            report.warnings.push(format!("{path}: accepts DELETE but offers no GET"));
        }
    }
}

fn check_response_codes(endpoints: &[Endpoint], report: &mut ConsistencyReport) {
    for endpoint in endpoints {
        let label = format!("{} {}", endpoint.method, endpoint.path);
        let has = |code: &str| endpoint.responses.contains_key(code);

        let expected_ok = match endpoint.method {
            HttpMethod::Get => has("200"),
            HttpMethod::Post => has("201") || has("200"),
            HttpMethod::Put => has("200") || has("204"),
            HttpMethod::Delete => has("204") || has("200"),
            _ => true,
        };
        if !expected_ok && !endpoint.responses.is_empty() {
            report.warnings.push(format!(
                "{label}: missing the conventional success status for {}",
                endpoint.method
            ));
        }

        let has_error_response = endpoint
            .responses
            .keys()
            .any(|code| code.starts_with('4') || code.starts_with('5') || code == "default");
        if !has_error_response {
            report.warnings.push(format!("{label}: declares no 4xx or 5xx response"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Parameter, SchemaNode};

    fn endpoint(path: &str, method: HttpMethod) -> Endpoint {
        let mut e = Endpoint::new(path, method);
        e.responses.insert("200".to_string(), Default::default());
        e.responses.insert("400".to_string(), Default::default());
        e
    }

    fn schema(name: &str) -> SchemaComponent {
        SchemaComponent {
            id: None,
            api_id: 0,
            name: name.to_string(),
            title: None,
            schema_type: None,
            format: None,
            description: None,
            node: SchemaNode::Opaque,
            raw: serde_json::json!({}),
            example: None,
            deprecated: false,
            extensions: Default::default(),
            schema_dependencies: Default::default(),
            circular: false,
            reference_count: 0,
            searchable_text: String::new(),
        }
    }

    #[test]
    fn test_missing_schema_reference_is_error() {
        let mut e = endpoint("/a", HttpMethod::Get);
        e.schema_dependencies.insert("Ghost".to_string());
        let report = validate_consistency(&[e], &[], &[]);
        assert!(report.errors.iter().any(|m| m.contains("Ghost")));
    }

    #[test]
    fn test_placeholder_without_parameter_is_error() {
        let e = endpoint("/users/{id}", HttpMethod::Get);
        let report = validate_consistency(&[e], &[], &[]);
        assert!(report.errors.iter().any(|m| m.contains("placeholder '{id}'")));
    }

    #[test]
    fn test_synced_path_parameters_pass() {
        let mut e = endpoint("/users/{id}", HttpMethod::Get);
        e.parameters.push(Parameter::new("id", ParameterLocation::Path));
        let report = validate_consistency(&[e], &[], &[]);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
    }

    #[test]
    fn test_cross_method_type_conflict_warns() {
        let mut get = endpoint("/users/{id}", HttpMethod::Get);
        let mut id = Parameter::new("id", ParameterLocation::Path);
        id.schema_type = Some("integer".to_string());
        get.parameters.push(id);

        let mut delete = endpoint("/users/{id}", HttpMethod::Delete);
        delete.responses.insert("204".to_string(), Default::default());
        let mut id = Parameter::new("id", ParameterLocation::Path);
        id.schema_type = Some("string".to_string());
        delete.parameters.push(id);

        let report = validate_consistency(&[get, delete], &[], &[]);
        assert!(report.warnings.iter().any(|m| m.contains("conflicting types")));
    }

    #[test]
    fn test_unused_and_primitive_named_schemas_warn() {
        let mut used = endpoint("/a", HttpMethod::Get);
        used.schema_dependencies.insert("Used".to_string());
        let report = validate_consistency(&[used], &[schema("Used"), schema("Orphan"), schema("String")], &[]);
        assert!(report.warnings.iter().any(|m| m.contains("'Orphan' is never referenced")));
        assert!(report.warnings.iter().any(|m| m.contains("shadows a primitive")));
        assert!(!report.warnings.iter().any(|m| m.contains("'Used' is never")));
    }

    #[test]
    fn test_overly_coupled_schema_warns() {
        let mut coupled = schema("Hub");
        for i in 0..6 {
            coupled.schema_dependencies.insert(format!("Dep{i}"));
        }
        let mut deps: Vec<SchemaComponent> = (0..6).map(|i| schema(&format!("Dep{i}"))).collect();
        // Reference every Dep so unused warnings do not drown the signal
        let mut e = endpoint("/a", HttpMethod::Get);
        e.schema_dependencies.insert("Hub".to_string());
        for i in 0..6 {
            e.schema_dependencies.insert(format!("Dep{i}"));
        }
        deps.push(coupled);
        let report = validate_consistency(&[e], &deps, &[]);
        assert!(report.warnings.iter().any(|m| m.contains("overly coupled")));
    }

    #[test]
    fn test_naming_mix_warns() {
        let mut e = endpoint("/a", HttpMethod::Get);
        for name in ["user_id", "pageSize", "X-Trace-Header-Id", "SORT_ORDER"] {
            e.parameters.push(Parameter::new(name, ParameterLocation::Query));
        }
        let report = validate_consistency(&[e], &[], &[]);
        assert!(report.warnings.iter().any(|m| m.contains("naming conventions")));
    }

    #[test]
    fn test_method_pattern_warnings() {
        let post_only = endpoint("/things", HttpMethod::Post);
        let report = validate_consistency(&[post_only], &[], &[]);
        assert!(report.warnings.iter().any(|m| m.contains("no GET")));
    }

    #[test]
    fn test_response_code_conventions() {
        let mut bad_get = Endpoint::new("/a", HttpMethod::Get);
        bad_get.responses.insert("204".to_string(), Default::default());
        let report = validate_consistency(&[bad_get], &[], &[]);
        assert!(report.warnings.iter().any(|m| m.contains("conventional success status")));
        assert!(report.warnings.iter().any(|m| m.contains("no 4xx or 5xx")));
    }

    #[test]
    fn test_score_formula() {
        assert_eq!(consistency_score(0, 0, 10, 10), 100.0);
        // 2*1 + 0.5*2 = 3; 3 / (2*20) * 100 = 7.5
        assert!((consistency_score(1, 2, 10, 10) - 92.5).abs() < f64::EPSILON);
        assert_eq!(consistency_score(100, 0, 1, 0), 0.0);
        assert_eq!(consistency_score(0, 0, 0, 0), 100.0);
    }
}
