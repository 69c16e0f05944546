//! MCP Error Types
//!
//! Maps the engine's error taxonomy onto JSON-RPC error objects. Every
//! `data` payload passes through the sanitizer before it leaves the server.

use crate::errors::{ApidexError, ErrorCode};
use crate::mcp::protocol::{error_codes, JsonRpcError};
use crate::mcp::sanitize::sanitize_error_data;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Unsupported protocol version '{client}'")]
    UnsupportedProtocolVersion { client: String },

    #[error("Not initialized")]
    NotInitialized,

    /// Engine error carried through with its stable code
    #[error(transparent)]
    Engine(#[from] ApidexError),
}

impl McpError {
    /// Convert to JSON-RPC error code
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::ParseError(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_)
            | McpError::NotInitialized
            | McpError::UnsupportedProtocolVersion { .. } => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) | McpError::ToolNotFound(_) => {
                error_codes::METHOD_NOT_FOUND
            }
            McpError::Engine(e) => match e.code() {
                ErrorCode::ValidationError => error_codes::INVALID_PARAMS,
                ErrorCode::ResourceNotFound => error_codes::RESOURCE_NOT_FOUND,
                ErrorCode::SchemaResolution => error_codes::SCHEMA_RESOLUTION,
                ErrorCode::CodeGeneration => error_codes::CODE_GENERATION,
                ErrorCode::CircuitOpen => error_codes::CIRCUIT_OPEN,
                ErrorCode::ResourceExhausted => error_codes::RESOURCE_EXHAUSTED,
                ErrorCode::Timeout => error_codes::TIMEOUT,
                ErrorCode::UnsupportedVersion
                | ErrorCode::InvalidJson
                | ErrorCode::FileTooLarge
                | ErrorCode::FileNotFound
                | ErrorCode::MemoryLimitExceeded
                | ErrorCode::StructureValidation => error_codes::INVALID_PARAMS,
                _ => error_codes::INTERNAL_ERROR,
            },
        }
    }

    /// Structured, sanitized data payload for the client
    fn error_data(&self) -> Option<serde_json::Value> {
        let raw = match self {
            McpError::UnsupportedProtocolVersion { client } => {
                serde_json::json!({"clientVersion": client, "supported": [crate::mcp::protocol::PROTOCOL_VERSION]})
            }
            McpError::Engine(e) => {
                let mut data = serde_json::json!({"code": e.code().as_str()});
                match e {
                    ApidexError::Validation { parameter, suggestions, .. } => {
                        if let Some(parameter) = parameter {
                            data["parameter"] = serde_json::json!(parameter);
                        }
                        data["suggestions"] = serde_json::json!(suggestions);
                    }
                    ApidexError::ResourceNotFound { resource_type, identifier, suggestions } => {
                        data["resource_type"] = serde_json::json!(resource_type);
                        data["identifier"] = serde_json::json!(identifier);
                        data["suggestions"] = serde_json::json!(suggestions);
                    }
                    ApidexError::SchemaResolution { circular_references, .. } => {
                        data["circular_references"] = serde_json::json!(circular_references);
                    }
                    ApidexError::CircuitOpen { retry_after_ms, .. } => {
                        data["retry_after_ms"] = serde_json::json!(retry_after_ms);
                    }
                    ApidexError::Timeout { operation, duration_ms } => {
                        data["operation"] = serde_json::json!(operation);
                        data["duration_ms"] = serde_json::json!(duration_ms);
                    }
                    _ => {}
                }
                data
            }
            _ => return None,
        };
        Some(sanitize_error_data(&raw))
    }

    /// Convert to JsonRpcError
    pub fn to_json_rpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.error_code(),
            message: self.to_string(),
            data: self.error_data(),
        }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(error: McpError) -> Self {
        error.to_json_rpc_error()
    }
}
