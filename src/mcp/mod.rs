//! # MCP Method Runtime
//!
//! The Model Context Protocol surface: JSON-RPC 2.0 over stdio, four tools
//! (`searchEndpoints`, `getSchema`, `getExample`, `getEndpointCategories`),
//! and the resilience pipeline every call passes through — validation,
//! circuit breaker, bounded concurrency, timeout, retry, telemetry.

pub mod context;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod resilience;
pub mod sanitize;
pub mod server;
pub mod tools;

pub use context::{ServerContext, TOOL_METHODS};
pub use error::McpError;
pub use handler::McpHandler;
pub use resilience::{BreakerState, CircuitBreaker, MethodResilience};
pub use sanitize::sanitize_error_data;
pub use server::McpStdioServer;
