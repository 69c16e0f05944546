//! # Repositories
//!
//! Typed data access over the entity tables. Every repository hands out
//! read-only snapshots; writes run inside transactions that roll back on any
//! error. The shared CRUD vocabulary (ids, paging, existence) lives here,
//! entity-specific queries live on the concrete repositories.

mod endpoint;
mod metadata;
mod schema;
mod security;

pub use endpoint::{CategoryGroupRow, EndpointRepository, EndpointSearchFilter, EndpointSearchPage};
pub use metadata::MetadataRepository;
pub use schema::{ResolvedSchema, SchemaRepository};
pub use security::SecurityRepository;

use serde::Serialize;

/// One page of repository results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
    pub has_more: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    /// Assemble a page from a slice of items plus the overall total
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let per_page = per_page.max(1);
        let total_pages = (total + per_page - 1) / per_page;
        Self {
            has_more: page < total_pages,
            has_previous: page > 1 && total > 0,
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }

    /// Offset of the first row of `page`
    pub fn offset(page: i64, per_page: i64) -> i64 {
        (page.max(1) - 1) * per_page.max(1)
    }
}

/// Decode a JSON TEXT column, tolerating legacy NULL/empty values
pub(crate) fn decode_json_column<T: serde::de::DeserializeOwned + Default>(raw: Option<String>) -> T {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}
