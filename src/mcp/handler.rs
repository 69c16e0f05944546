//! MCP request handler.
//!
//! Routes JSON-RPC requests: `initialize`, `tools/list`, `tools/call` and
//! `ping`. Notifications produce no response. Tool calls are answered with
//! content blocks; engine failures become JSON-RPC errors with sanitized
//! data payloads.

use crate::mcp::context::ServerContext;
use crate::mcp::error::McpError;
use crate::mcp::protocol::{
    Capabilities, InitializeRequest, InitializeResponse, JsonRpcRequest, JsonRpcResponse,
    ServerInfo, Tool, ToolCallRequest, ToolCallResult, ToolCapabilities, ToolsListResult,
    PROTOCOL_VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct McpHandler {
    context: Arc<ServerContext>,
    initialized: AtomicBool,
}

impl McpHandler {
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self { context, initialized: AtomicBool::new(false) }
    }

    /// Handle one request. Returns `None` for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        let is_notification = id.is_none();

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => {
                debug!("Client reported initialized");
                return None;
            }
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        if is_notification {
            return None;
        }

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::failure(id, error.to_json_rpc_error()),
        })
    }

    fn handle_initialize(&self, params: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let request: InitializeRequest = serde_json::from_value(params)
            .map_err(|e| McpError::InvalidRequest(format!("invalid initialize params: {e}")))?;

        // Accept the client's declared version as long as it is dated; the
        // tool surface here is version-stable
        if request.protocol_version.is_empty() {
            return Err(McpError::UnsupportedProtocolVersion {
                client: request.protocol_version,
            });
        }

        info!(
            client = %request.client_info.name,
            client_version = %request.client_info.version,
            "MCP client initialized"
        );
        self.initialized.store(true, Ordering::SeqCst);

        let response = InitializeResponse {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: Some(ToolCapabilities { list_changed: Some(false) }),
            },
            server_info: ServerInfo {
                name: crate::APP_NAME.to_string(),
                version: crate::VERSION.to_string(),
            },
        };
        serde_json::to_value(response)
            .map_err(|e| McpError::Engine(crate::errors::ApidexError::from(e)))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, McpError> {
        self.require_initialized()?;
        let tools: Vec<Tool> = crate::mcp::tools::tool_definitions();
        serde_json::to_value(ToolsListResult { tools })
            .map_err(|e| McpError::Engine(crate::errors::ApidexError::from(e)))
    }

    async fn handle_tools_call(
        &self,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        self.require_initialized()?;
        let call: ToolCallRequest = serde_json::from_value(params)
            .map_err(|e| McpError::InvalidRequest(format!("invalid tools/call params: {e}")))?;

        let args = call.arguments.unwrap_or_else(|| serde_json::json!({}));
        let outcome = crate::mcp::tools::dispatch(&self.context, &call.name, args).await?;

        serde_json::to_value(ToolCallResult::json(&outcome))
            .map_err(|e| McpError::Engine(crate::errors::ApidexError::from(e)))
    }

    fn require_initialized(&self) -> Result<(), McpError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(McpError::NotInitialized)
        }
    }
}
