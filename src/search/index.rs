//! Search index management.
//!
//! Projects endpoints into flat searchable documents and keeps two mirrors in
//! step: the `search_documents` table (full stored projection, used for
//! ranking and retrieval) and the `endpoints_fts` FTS5 table (tokenized view,
//! used for MATCH). The index is eventually consistent with the store; drift
//! is repaired by a full rebuild.

use crate::domain::{Endpoint, ParameterLocation};
use crate::errors::{ApidexError, Result};
use crate::storage::{DbPool, EndpointRepository};
use serde::Serialize;
use sqlx::Row;
use tracing::{info, instrument};

/// Flat, denormalized projection of one endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchDocument {
    pub endpoint_id: i64,
    pub endpoint_path: String,
    pub http_method: String,
    pub operation_summary: Option<String>,
    pub operation_description: Option<String>,
    pub operation_id: Option<String>,
    pub path_segments: String,
    pub resource_name: Option<String>,
    pub operation_type: String,
    pub required_parameters: String,
    pub optional_parameters: String,
    pub path_parameters: String,
    pub query_parameters: String,
    pub header_parameters: String,
    pub request_content_types: String,
    pub response_status_codes: String,
    pub response_schemas: String,
    pub response_content_types: String,
    pub security_requirements: String,
    pub security_scopes: String,
    pub security_schemes: String,
    pub tags: String,
    pub deprecated: bool,
    pub has_examples: bool,
    pub has_request_body: bool,
    pub external_docs: Option<String>,
    pub keywords: String,
    pub searchable_text: String,
}

/// Outcome of an index integrity validation
#[derive(Debug, Clone, Serialize)]
pub struct IndexValidation {
    pub indexed_documents: i64,
    pub stored_endpoints: i64,
    pub documents_missing_required_fields: i64,
    pub is_consistent: bool,
}

/// Builds and maintains the endpoint search index
#[derive(Debug, Clone)]
pub struct SearchIndexManager {
    pool: DbPool,
    repository: EndpointRepository,
    batch_size: usize,
}

impl SearchIndexManager {
    pub fn new(pool: DbPool, batch_size: usize) -> Self {
        let repository = EndpointRepository::new(pool.clone());
        Self { pool, repository, batch_size: batch_size.max(1) }
    }

    /// Project one endpoint into its searchable document
    pub fn build_document(endpoint: &Endpoint) -> SearchDocument {
        let id = endpoint.id.unwrap_or_default();
        let segments: Vec<&str> = endpoint
            .path
            .split('/')
            .filter(|s| !s.is_empty() && !s.starts_with('{'))
            .collect();
        let resource_name = segments.last().map(|s| s.to_string());

        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut path_params = Vec::new();
        let mut query_params = Vec::new();
        let mut header_params = Vec::new();
        for param in &endpoint.parameters {
            if param.required {
                required.push(param.name.clone());
            } else {
                optional.push(param.name.clone());
            }
            match param.location {
                ParameterLocation::Path => path_params.push(param.name.clone()),
                ParameterLocation::Query => query_params.push(param.name.clone()),
                ParameterLocation::Header => header_params.push(param.name.clone()),
                ParameterLocation::Cookie => {}
            }
        }

        let request_content_types = endpoint
            .request_body
            .as_ref()
            .map(|body| body.content.keys().cloned().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();

        let mut status_codes = Vec::new();
        let mut response_schemas = Vec::new();
        let mut response_content_types = Vec::new();
        for (status, response) in &endpoint.responses {
            status_codes.push(status.clone());
            response_schemas.extend(response.schema_refs.iter().cloned());
            response_content_types.extend(response.content.keys().cloned());
        }
        response_schemas.dedup();
        response_content_types.dedup();

        let security_schemes: Vec<String> =
            endpoint.security_dependencies.iter().cloned().collect();
        let security_scopes: Vec<String> = endpoint
            .security
            .iter()
            .flatten()
            .flat_map(|requirement| requirement.scopes.iter().cloned())
            .collect();

        let has_examples = endpoint.request_body.as_ref().map(|b| b.example.is_some()).unwrap_or(false)
            || endpoint.parameters.iter().any(|p| p.example.is_some());

        let mut keywords = Vec::new();
        if let Some(operation_id) = &endpoint.operation_id {
            keywords.extend(split_identifier(operation_id));
        }
        for segment in &segments {
            keywords.extend(split_identifier(segment));
        }
        keywords.sort();
        keywords.dedup();

        SearchDocument {
            endpoint_id: id,
            endpoint_path: endpoint.path.clone(),
            http_method: endpoint.method.to_string(),
            operation_summary: endpoint.summary.clone(),
            operation_description: endpoint.description.clone(),
            operation_id: endpoint.operation_id.clone(),
            path_segments: segments.join(" "),
            resource_name,
            operation_type: endpoint.method.operation_type(&endpoint.path).as_str().to_string(),
            required_parameters: required.join(" "),
            optional_parameters: optional.join(" "),
            path_parameters: path_params.join(" "),
            query_parameters: query_params.join(" "),
            header_parameters: header_params.join(" "),
            request_content_types,
            response_status_codes: status_codes.join(" "),
            response_schemas: response_schemas.join(" "),
            response_content_types: response_content_types.join(" "),
            security_requirements: security_schemes.join(" "),
            security_scopes: security_scopes.join(" "),
            security_schemes: security_schemes.join(" "),
            tags: endpoint.tags.join(" "),
            deprecated: endpoint.deprecated,
            has_examples,
            has_request_body: endpoint.request_body.is_some(),
            external_docs: endpoint
                .extensions
                .get("externalDocs")
                .or_else(|| endpoint.extensions.get("x-external-docs"))
                .and_then(|v| v.get("url"))
                .and_then(|v| v.as_str())
                .map(String::from),
            keywords: keywords.join(" "),
            searchable_text: endpoint.searchable_text.clone(),
        }
    }

    /// Rebuild the whole index from the store
    #[instrument(skip(self), name = "index_rebuild")]
    pub async fn create_from_store(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM search_documents").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM endpoints_fts").execute(&mut *tx).await?;
        tx.commit().await?;

        let mut indexed: u64 = 0;
        let mut after_id = 0i64;
        loop {
            let batch = self.repository.list_batch(after_id, self.batch_size as i64).await?;
            if batch.is_empty() {
                break;
            }
            after_id = batch.last().and_then(|e| e.id).unwrap_or(after_id);

            let mut tx = self.pool.begin().await?;
            for endpoint in &batch {
                let document = Self::build_document(endpoint);
                insert_document_tx(&mut tx, &document).await?;
                indexed += 1;
            }
            tx.commit().await?;
        }

        info!(indexed, "Search index rebuilt from store");
        Ok(indexed)
    }

    /// Bring one endpoint's document in line with the store. Idempotent: a
    /// missing endpoint removes the document, a present one replaces it.
    pub async fn update_document(&self, endpoint_id: i64) -> Result<()> {
        match self.repository.get_by_id(endpoint_id).await? {
            Some(endpoint) => {
                let document = Self::build_document(&endpoint);
                let mut tx = self.pool.begin().await?;
                delete_document_tx(&mut tx, endpoint_id).await?;
                insert_document_tx(&mut tx, &document).await?;
                tx.commit().await?;
            }
            None => self.remove_document(endpoint_id).await?,
        }
        Ok(())
    }

    /// Remove one document by endpoint id
    pub async fn remove_document(&self, endpoint_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_document_tx(&mut tx, endpoint_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Compare index and store, and check required document fields
    pub async fn validate_integrity(&self) -> Result<IndexValidation> {
        let indexed: i64 = sqlx::query("SELECT COUNT(*) AS n FROM search_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "index count failed"))?
            .get("n");

        let stored = self.repository.count(None).await?;

        let broken: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM search_documents \
             WHERE endpoint_id IS NULL OR endpoint_path IS NULL OR endpoint_path = ''",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "index field check failed"))?
        .get("n");

        Ok(IndexValidation {
            indexed_documents: indexed,
            stored_endpoints: stored,
            documents_missing_required_fields: broken,
            is_consistent: indexed == stored && broken == 0,
        })
    }

    /// Load every stored document, for ranker training
    pub async fn all_documents(&self) -> Result<Vec<SearchDocument>> {
        let rows = sqlx::query("SELECT * FROM search_documents ORDER BY endpoint_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "document scan failed"))?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Load stored documents for a set of endpoint ids
    pub async fn documents_for(&self, endpoint_ids: &[i64]) -> Result<Vec<SearchDocument>> {
        if endpoint_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; endpoint_ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM search_documents WHERE endpoint_id IN ({placeholders}) ORDER BY endpoint_id"
        );
        let mut query = sqlx::query(&sql);
        for id in endpoint_ids {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "document fetch failed"))?;
        Ok(rows.iter().map(row_to_document).collect())
    }
}

/// Split camelCase / snake_case / kebab-case identifiers into lowercase words
pub fn split_identifier(identifier: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in identifier.chars() {
        if c == '_' || c == '-' || c == '.' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty()
            && current.chars().last().is_some_and(|p| p.is_lowercase())
        {
            words.push(std::mem::take(&mut current));
            current.push(c.to_ascii_lowercase());
        } else {
            current.push(c.to_ascii_lowercase());
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words.retain(|w| w.len() > 1);
    words
}

async fn insert_document_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    document: &SearchDocument,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO search_documents \
         (endpoint_id, endpoint_path, http_method, operation_summary, operation_description, \
          operation_id, path_segments, resource_name, operation_type, required_parameters, \
          optional_parameters, path_parameters, query_parameters, header_parameters, \
          request_content_types, response_status_codes, response_schemas, \
          response_content_types, security_requirements, security_scopes, security_schemes, \
          tags, deprecated, has_examples, has_request_body, external_docs, keywords, \
          searchable_text) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(document.endpoint_id)
    .bind(&document.endpoint_path)
    .bind(&document.http_method)
    .bind(&document.operation_summary)
    .bind(&document.operation_description)
    .bind(&document.operation_id)
    .bind(&document.path_segments)
    .bind(&document.resource_name)
    .bind(&document.operation_type)
    .bind(&document.required_parameters)
    .bind(&document.optional_parameters)
    .bind(&document.path_parameters)
    .bind(&document.query_parameters)
    .bind(&document.header_parameters)
    .bind(&document.request_content_types)
    .bind(&document.response_status_codes)
    .bind(&document.response_schemas)
    .bind(&document.response_content_types)
    .bind(&document.security_requirements)
    .bind(&document.security_scopes)
    .bind(&document.security_schemes)
    .bind(&document.tags)
    .bind(document.deprecated as i64)
    .bind(document.has_examples as i64)
    .bind(document.has_request_body as i64)
    .bind(&document.external_docs)
    .bind(&document.keywords)
    .bind(&document.searchable_text)
    .execute(&mut **tx)
    .await
    .map_err(|e| ApidexError::database(e, "Failed to insert search document"))?;

    let parameter_names = format!(
        "{} {} {}",
        document.required_parameters, document.optional_parameters, document.header_parameters
    );
    sqlx::query(
        "INSERT INTO endpoints_fts \
         (rowid, path, method, operation_id, summary, description, tags, parameter_names, \
          keywords, searchable_text) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(document.endpoint_id)
    .bind(&document.endpoint_path)
    .bind(&document.http_method)
    .bind(document.operation_id.clone().unwrap_or_default())
    .bind(document.operation_summary.clone().unwrap_or_default())
    .bind(document.operation_description.clone().unwrap_or_default())
    .bind(&document.tags)
    .bind(parameter_names)
    .bind(&document.keywords)
    .bind(&document.searchable_text)
    .execute(&mut **tx)
    .await
    .map_err(|e| ApidexError::database(e, "Failed to insert FTS row"))?;

    Ok(())
}

async fn delete_document_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    endpoint_id: i64,
) -> Result<()> {
    sqlx::query("DELETE FROM search_documents WHERE endpoint_id = ?")
        .bind(endpoint_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to delete search document"))?;
    sqlx::query("DELETE FROM endpoints_fts WHERE rowid = ?")
        .bind(endpoint_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to delete FTS row"))?;
    Ok(())
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> SearchDocument {
    SearchDocument {
        endpoint_id: row.get("endpoint_id"),
        endpoint_path: row.get("endpoint_path"),
        http_method: row.get("http_method"),
        operation_summary: row.get("operation_summary"),
        operation_description: row.get("operation_description"),
        operation_id: row.get("operation_id"),
        path_segments: row.get("path_segments"),
        resource_name: row.get("resource_name"),
        operation_type: row.get("operation_type"),
        required_parameters: row.get("required_parameters"),
        optional_parameters: row.get("optional_parameters"),
        path_parameters: row.get("path_parameters"),
        query_parameters: row.get("query_parameters"),
        header_parameters: row.get("header_parameters"),
        request_content_types: row.get("request_content_types"),
        response_status_codes: row.get("response_status_codes"),
        response_schemas: row.get("response_schemas"),
        response_content_types: row.get("response_content_types"),
        security_requirements: row.get("security_requirements"),
        security_scopes: row.get("security_scopes"),
        security_schemes: row.get("security_schemes"),
        tags: row.get("tags"),
        deprecated: row.get::<i64, _>("deprecated") != 0,
        has_examples: row.get::<i64, _>("has_examples") != 0,
        has_request_body: row.get::<i64, _>("has_request_body") != 0,
        external_docs: row.get("external_docs"),
        keywords: row.get("keywords"),
        searchable_text: row.get("searchable_text"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::domain::{HttpMethod, Parameter};
    use crate::storage::{create_pool, EndpointRepository};

    async fn seeded_pool(endpoint_count: usize) -> DbPool {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            auto_migrate: true,
            ..Default::default()
        };
        let pool = create_pool(&config).await.unwrap();
        sqlx::query(
            "INSERT INTO api_metadata (file_path, file_hash, title, version, openapi_version) \
             VALUES ('/tmp/f.json', 'h', 'Fixture', '1', '3.0.0')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let mut tx = pool.begin().await.unwrap();
        for i in 0..endpoint_count {
            let mut endpoint = Endpoint::new(format!("/api/v1/things/{i}"), HttpMethod::Get);
            endpoint.operation_id = Some(format!("getThing{i}"));
            endpoint.summary = Some(format!("Fetch thing {i}"));
            endpoint.searchable_text = format!("thing {i}");
            EndpointRepository::insert_tx(&mut tx, 1, &endpoint).await.unwrap();
        }
        tx.commit().await.unwrap();
        pool
    }

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("getUserById"), vec!["get", "user", "by", "id"]);
        assert_eq!(split_identifier("search_promo"), vec!["search", "promo"]);
        assert_eq!(split_identifier("Search-Promo"), vec!["search", "promo"]);
        assert_eq!(split_identifier("v1"), vec!["v1"]);
    }

    #[test]
    fn test_build_document_projection() {
        let mut endpoint = Endpoint::new("/api/v1/users/{id}", HttpMethod::Get);
        endpoint.id = Some(7);
        endpoint.operation_id = Some("getUserById".to_string());
        endpoint.summary = Some("Get one user".to_string());
        endpoint.tags = vec!["Users".to_string()];
        endpoint.parameters.push(Parameter::new("id", ParameterLocation::Path));
        let mut page = Parameter::new("page", ParameterLocation::Query);
        page.required = false;
        endpoint.parameters.push(page);
        endpoint.responses.insert("200".to_string(), Default::default());

        let document = SearchIndexManager::build_document(&endpoint);
        assert_eq!(document.endpoint_id, 7);
        assert_eq!(document.operation_type, "read");
        assert_eq!(document.resource_name.as_deref(), Some("users"));
        assert_eq!(document.required_parameters, "id");
        assert_eq!(document.optional_parameters, "page");
        assert_eq!(document.path_parameters, "id");
        assert_eq!(document.query_parameters, "page");
        assert!(document.keywords.contains("user"));
        assert_eq!(document.response_status_codes, "200");
    }

    #[tokio::test]
    async fn test_create_from_store_and_validate() {
        let pool = seeded_pool(12).await;
        let manager = SearchIndexManager::new(pool.clone(), 5);

        let indexed = manager.create_from_store().await.unwrap();
        assert_eq!(indexed, 12);

        let validation = manager.validate_integrity().await.unwrap();
        assert!(validation.is_consistent, "{validation:?}");
        assert_eq!(validation.indexed_documents, 12);

        // Rebuild is idempotent
        let again = manager.create_from_store().await.unwrap();
        assert_eq!(again, 12);
        assert!(manager.validate_integrity().await.unwrap().is_consistent);
    }

    #[tokio::test]
    async fn test_update_document_idempotent() {
        let pool = seeded_pool(3).await;
        let manager = SearchIndexManager::new(pool.clone(), 10);
        manager.create_from_store().await.unwrap();

        manager.update_document(1).await.unwrap();
        manager.update_document(1).await.unwrap();
        assert!(manager.validate_integrity().await.unwrap().is_consistent);

        // Updating a deleted endpoint removes its document
        sqlx::query("DELETE FROM endpoints WHERE id = 2").execute(&pool).await.unwrap();
        manager.update_document(2).await.unwrap();
        let validation = manager.validate_integrity().await.unwrap();
        assert_eq!(validation.indexed_documents, 2);
        assert!(validation.is_consistent);
    }

    #[tokio::test]
    async fn test_remove_document_and_drift_detection() {
        let pool = seeded_pool(3).await;
        let manager = SearchIndexManager::new(pool.clone(), 10);
        manager.create_from_store().await.unwrap();

        manager.remove_document(3).await.unwrap();
        let validation = manager.validate_integrity().await.unwrap();
        assert!(!validation.is_consistent);
        assert_eq!(validation.indexed_documents, 2);
        assert_eq!(validation.stored_endpoints, 3);
    }

    #[tokio::test]
    async fn test_documents_for_subset() {
        let pool = seeded_pool(5).await;
        let manager = SearchIndexManager::new(pool.clone(), 10);
        manager.create_from_store().await.unwrap();

        let docs = manager.documents_for(&[2, 4]).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].endpoint_id, 2);
        assert!(manager.documents_for(&[]).await.unwrap().is_empty());
    }
}
