//! Security scheme normalization.
//!
//! Maps `components.securitySchemes` (or Swagger 2.0 `securityDefinitions`)
//! into typed [`SecurityScheme`] records, validating the type-specific
//! required fields. Swagger 2.0 single-flow oauth2 definitions are lifted
//! into the 3.x `flows` shape so downstream consumers see one format.

use crate::domain::{ParameterLocation, SecurityRequirement, SecurityScheme, SecuritySchemeType};
use crate::normalizer::extensions;
use crate::parser::SpecVersion;
use serde_json::Value;
use std::collections::BTreeMap;

const KNOWN_FLOWS: &[&str] = &["authorizationCode", "implicit", "password", "clientCredentials"];

/// Result of normalizing the security section
#[derive(Debug, Default)]
pub struct NormalizedSecurity {
    pub schemes: Vec<SecurityScheme>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Normalize every declared security scheme
pub fn normalize_security_schemes(document: &Value, version: SpecVersion) -> NormalizedSecurity {
    let section = if version == SpecVersion::V2 {
        document.get("securityDefinitions")
    } else {
        document.get("components").and_then(|c| c.get("securitySchemes"))
    };

    let mut result = NormalizedSecurity::default();
    let Some(map) = section.and_then(|s| s.as_object()) else {
        return result;
    };

    for (name, raw) in map {
        match normalize_scheme(name, raw, version) {
            Ok(scheme) => result.schemes.push(scheme),
            Err(message) => result.errors.push(message),
        }
    }

    result
}

fn normalize_scheme(name: &str, raw: &Value, version: SpecVersion) -> Result<SecurityScheme, String> {
    let declared = raw
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| format!("security scheme '{name}': missing 'type'"))?;

    let scheme_type = declared
        .parse::<SecuritySchemeType>()
        .map_err(|_| format!("security scheme '{name}': unknown type '{declared}'"))?;

    let mut scheme = SecurityScheme::new(name, scheme_type);
    scheme.description = raw.get("description").and_then(|d| d.as_str()).map(String::from);
    scheme.extensions = extensions::extract_extensions(raw);

    match scheme_type {
        SecuritySchemeType::ApiKey => {
            scheme.api_key_name = raw.get("name").and_then(|n| n.as_str()).map(String::from);
            scheme.api_key_location = raw
                .get("in")
                .and_then(|l| l.as_str())
                .and_then(|l| l.parse::<ParameterLocation>().ok());
            if scheme.api_key_name.is_none() || scheme.api_key_location.is_none() {
                return Err(format!("security scheme '{name}': apiKey requires 'name' and 'in'"));
            }
        }
        SecuritySchemeType::Http => {
            // Swagger 2.0 spells this as type "basic" with no scheme field
            scheme.http_scheme = raw
                .get("scheme")
                .and_then(|s| s.as_str())
                .map(String::from)
                .or_else(|| (declared == "basic").then(|| "basic".to_string()));
            scheme.bearer_format =
                raw.get("bearerFormat").and_then(|f| f.as_str()).map(String::from);
            if scheme.http_scheme.is_none() {
                return Err(format!("security scheme '{name}': http requires 'scheme'"));
            }
        }
        SecuritySchemeType::Oauth2 => {
            let flows = if version == SpecVersion::V2 {
                lift_v2_flow(raw)
            } else {
                raw.get("flows").cloned()
            };
            let valid = flows
                .as_ref()
                .and_then(|f| f.as_object())
                .map(|f| f.keys().any(|k| KNOWN_FLOWS.contains(&k.as_str())))
                .unwrap_or(false);
            if !valid {
                return Err(format!(
                    "security scheme '{name}': oauth2 requires a 'flows' object with at least one known flow"
                ));
            }
            scheme.oauth2_flows = flows;
        }
        SecuritySchemeType::OpenIdConnect => {
            scheme.openid_connect_url =
                raw.get("openIdConnectUrl").and_then(|u| u.as_str()).map(String::from);
            if scheme.openid_connect_url.is_none() {
                return Err(format!(
                    "security scheme '{name}': openIdConnect requires 'openIdConnectUrl'"
                ));
            }
        }
        SecuritySchemeType::MutualTls => {}
    }

    Ok(scheme)
}

/// Swagger 2.0 declares one flow inline: `flow` + URLs + `scopes`
fn lift_v2_flow(raw: &Value) -> Option<Value> {
    let flow = raw.get("flow").and_then(|f| f.as_str())?;
    let flow_name = match flow {
        "accessCode" => "authorizationCode",
        "application" => "clientCredentials",
        other => other,
    };
    let mut body = serde_json::Map::new();
    for (from, to) in
        [("authorizationUrl", "authorizationUrl"), ("tokenUrl", "tokenUrl")]
    {
        if let Some(url) = raw.get(from) {
            body.insert(to.to_string(), url.clone());
        }
    }
    body.insert(
        "scopes".to_string(),
        raw.get("scopes").cloned().unwrap_or_else(|| Value::Object(Default::default())),
    );
    Some(serde_json::json!({ flow_name: body }))
}

/// Parse a `security` array into requirement alternatives
pub fn parse_security_requirements(security: Option<&Value>) -> Vec<Vec<SecurityRequirement>> {
    let Some(list) = security.and_then(|s| s.as_array()) else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|alternative| alternative.as_object())
        .map(|map| {
            map.iter()
                .map(|(scheme, scopes)| SecurityRequirement {
                    scheme: scheme.clone(),
                    scopes: scopes
                        .as_array()
                        .map(|s| s.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                        .unwrap_or_default(),
                })
                .collect()
        })
        .collect()
}

/// Check that every requirement names a defined scheme and, for oauth2, only
/// declared scopes. Returns warnings keyed by the offending endpoint label.
pub fn validate_requirements(
    label: &str,
    requirements: &[Vec<SecurityRequirement>],
    schemes: &BTreeMap<String, &SecurityScheme>,
) -> Vec<String> {
    let mut warnings = Vec::new();
    for alternative in requirements {
        for requirement in alternative {
            match schemes.get(requirement.scheme.as_str()) {
                None => warnings.push(format!(
                    "{label}: security requirement references undefined scheme '{}'",
                    requirement.scheme
                )),
                Some(scheme) if scheme.scheme_type == SecuritySchemeType::Oauth2 => {
                    let declared = scheme.declared_scopes();
                    for scope in &requirement.scopes {
                        if !declared.contains(scope) {
                            warnings.push(format!(
                                "{label}: scope '{scope}' is not declared by scheme '{}'",
                                requirement.scheme
                            ));
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }
    warnings
}
