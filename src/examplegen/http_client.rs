//! Promise-based HTTP-client example generation.

use crate::domain::Endpoint;
use crate::examplegen::{AuthMaterial, ExampleRequest};

/// Render an async function using a fetch-style client with try/catch,
/// status check and JSON parse.
pub fn generate_http_client(request: &ExampleRequest, endpoint: &Endpoint) -> String {
    let function_name = endpoint
        .operation_id
        .clone()
        .unwrap_or_else(|| "callEndpoint".to_string());

    let mut headers = vec!["      'Accept': 'application/json'".to_string()];
    match &request.auth {
        AuthMaterial::Header { name, value } => {
            if value.starts_with("Bearer ") {
                headers.push(format!("      '{name}': `Bearer ${{token}}`"));
            } else {
                headers.push(format!("      '{name}': '{value}'"));
            }
        }
        AuthMaterial::ClientCertificate => {
            headers.push("      // mutual TLS: configure client certificates on the agent".to_string());
        }
        AuthMaterial::Query { .. } | AuthMaterial::None => {}
    }
    if request.body.is_some() {
        headers.push("      'Content-Type': 'application/json'".to_string());
    }

    let mut options = vec![
        format!("      method: '{}',", request.method),
        "      headers: {".to_string(),
        headers.join(",\n"),
    ];
    match &request.body {
        Some(body) => {
            options.push("      },".to_string());
            options.push(format!(
                "      body: JSON.stringify({})",
                serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string())
            ));
        }
        None => options.push("      }".to_string()),
    }

    let token_line = match &request.auth {
        AuthMaterial::Header { value, .. } if value.starts_with("Bearer ") => {
            "  const token = 'YOUR_TOKEN_HERE';"
        }
        _ => "",
    };

    let mut lines = vec![format!("async function {function_name}() {{")];
    if !token_line.is_empty() {
        lines.push(token_line.to_string());
    }
    lines.push("  try {".to_string());
    lines.push(format!("    const response = await fetch('{}', {{", request.url));
    lines.extend(options);
    lines.push("    });".to_string());
    lines.push(String::new());
    lines.push("    if (!response.ok) {".to_string());
    lines.push("      throw new Error(`HTTP ${response.status}: ${response.statusText}`);".to_string());
    lines.push("    }".to_string());
    lines.push(String::new());
    lines.push("    const data = await response.json();".to_string());
    lines.push("    return data;".to_string());
    lines.push("  } catch (error) {".to_string());
    lines.push("    console.error('Request failed:', error);".to_string());
    lines.push("    throw error;".to_string());
    lines.push("  }".to_string());
    lines.push("}".to_string());

    lines.join("\n")
}
