//! Error-data sanitization.
//!
//! Every `data` payload attached to an MCP error passes through here:
//! known-sensitive keys are removed at any depth and long string values are
//! truncated so internal detail never leaks wholesale to clients.

use serde_json::Value;

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "auth_header",
    "cookie",
    "connection_string",
    "connection_url",
    "database_url",
    "dsn",
    "credentials",
    "private_key",
];

const MAX_STRING_LENGTH: usize = 500;

/// Strip sensitive keys and truncate long strings, recursively
pub fn sanitize_error_data(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !is_sensitive_key(key))
                .map(|(key, val)| (key.clone(), sanitize_error_data(val)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_error_data).collect()),
        Value::String(s) if s.len() > MAX_STRING_LENGTH => {
            let mut end = MAX_STRING_LENGTH;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            Value::String(format!("{}… [truncated]", &s[..end]))
        }
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|sensitive| lowered.contains(sensitive))
}
