//! MCP Stdio Server
//!
//! Implements the stdio transport for MCP: reads line-delimited JSON-RPC
//! messages from stdin and writes responses to stdout. Exits cleanly on EOF.

use crate::mcp::context::ServerContext;
use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::{error_codes, JsonRpcError, JsonRpcResponse};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

pub struct McpStdioServer {
    handler: McpHandler,
    context: Arc<ServerContext>,
}

impl McpStdioServer {
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self { handler: McpHandler::new(Arc::clone(&context)), context }
    }

    /// Run the stdio server until EOF
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Starting MCP stdio server");
        self.context.monitor.connection_opened();

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            debug!(bytes = line.len(), "Received input line");

            let request = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Failed to parse JSON-RPC request");
                    let error_response = JsonRpcResponse::failure(
                        None,
                        JsonRpcError {
                            code: error_codes::PARSE_ERROR,
                            message: format!("Parse error: {e}"),
                            data: None,
                        },
                    );
                    self.write_response(&mut stdout, &error_response).await?;
                    continue;
                }
            };

            if let Some(response) = self.handler.handle_request(request).await {
                self.write_response(&mut stdout, &response).await?;
            }
        }

        self.context.monitor.connection_closed();
        info!("MCP stdio server shutting down (EOF received)");
        Ok(())
    }

    async fn write_response(
        &self,
        stdout: &mut tokio::io::Stdout,
        response: &JsonRpcResponse,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string(response)?;
        debug!(bytes = json.len(), "Writing response");

        stdout.write_all(json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DatabaseConfig};
    use crate::storage::create_pool;

    #[tokio::test]
    async fn test_server_creation() {
        let db = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            auto_migrate: true,
            ..Default::default()
        };
        let pool = create_pool(&db).await.unwrap();
        let config = AppConfig { database: db, ..Default::default() };
        let context = Arc::new(ServerContext::new(pool, &config));
        let _server = McpStdioServer::new(context);
    }
}
