//! # apidex
//!
//! apidex converts OpenAPI/Swagger specifications into a queryable knowledge
//! base served over the Model Context Protocol. A streaming parser reads the
//! document, normalizers produce stable entity shapes, a SQLite store with
//! FTS5 persists them, and an MCP stdio server answers structured tool calls
//! for search, schema resolution, category browsing and example generation.
//!
//! ## Architecture
//!
//! ```text
//! spec file → parser → normalizer → pipeline → storage (SQLite + FTS5)
//!                                                   ↓
//! MCP client ←→ stdio JSON-RPC ←→ tools ←→ search / repositories
//!                                    ↓
//!                            observability stack
//! ```

pub mod config;
pub mod domain;
pub mod errors;
pub mod examplegen;
pub mod mcp;
pub mod normalizer;
pub mod observability;
pub mod parser;
pub mod pipeline;
pub mod search;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{ApidexError, ErrorCode, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
