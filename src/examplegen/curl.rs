//! cURL example generation.

use crate::examplegen::{AuthMaterial, ExampleRequest};

/// Render a line-continued cURL command
pub fn generate_curl(request: &ExampleRequest) -> String {
    let mut lines = vec![format!("curl -X {} \\", request.method)];
    lines.push(format!("  '{}' \\", request.url));
    lines.push("  -H 'Accept: application/json' \\".to_string());

    match &request.auth {
        AuthMaterial::Header { name, value } => {
            lines.push(format!("  -H '{name}: {value}' \\"));
        }
        AuthMaterial::ClientCertificate => {
            lines.push("  # mutual TLS: supply your client certificate".to_string());
            lines.push("  --cert client.pem --key client-key.pem \\".to_string());
        }
        AuthMaterial::Query { .. } | AuthMaterial::None => {}
    }

    if let Some(body) = &request.body {
        lines.push("  -H 'Content-Type: application/json' \\".to_string());
        let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
        lines.push(format!("  -d '{pretty}'"));
    } else {
        // Drop the trailing continuation from the last line
        if let Some(last) = lines.last_mut() {
            if let Some(stripped) = last.strip_suffix(" \\") {
                *last = stripped.to_string();
            }
        }
    }

    lines.join("\n")
}
