//! Synchronous scripting example generation.

use crate::domain::Endpoint;
use crate::examplegen::{AuthMaterial, ExampleRequest};

/// Render an idiomatic synchronous script with exception handling and a
/// raise on non-success status.
pub fn generate_script(request: &ExampleRequest, endpoint: &Endpoint) -> String {
    let mut lines = vec!["import requests".to_string(), String::new()];

    let mut headers = vec!["    \"Accept\": \"application/json\",".to_string()];
    match &request.auth {
        AuthMaterial::Header { name, value } => {
            headers.push(format!("    \"{name}\": \"{value}\","));
        }
        AuthMaterial::ClientCertificate => {
            headers.push("    # mutual TLS: pass cert=(\"client.pem\", \"client-key.pem\") to the request".to_string());
        }
        AuthMaterial::Query { .. } | AuthMaterial::None => {}
    }

    lines.push(format!("url = \"{}\"", request.url));
    lines.push("headers = {".to_string());
    lines.extend(headers);
    lines.push("}".to_string());

    if let Some(body) = &request.body {
        let rendered = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
        lines.push(format!("payload = {rendered}"));
    }
    lines.push(String::new());

    let call = match (&request.body, endpoint.method.as_str()) {
        (Some(_), method) => format!(
            "    response = requests.request(\"{method}\", url, headers=headers, json=payload, timeout=30)"
        ),
        (None, method) => {
            format!("    response = requests.request(\"{method}\", url, headers=headers, timeout=30)")
        }
    };

    lines.push("try:".to_string());
    lines.push(call);
    lines.push("    response.raise_for_status()".to_string());
    lines.push("    data = response.json()".to_string());
    lines.push("    print(data)".to_string());
    lines.push("except requests.exceptions.RequestException as error:".to_string());
    lines.push("    print(f\"Request failed: {error}\")".to_string());
    lines.push("    raise".to_string());

    lines.join("\n")
}
