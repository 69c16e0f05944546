//! Repository for endpoint rows, including full-text search and the
//! category catalog queries.

use crate::domain::{CategoryCatalogEntry, Endpoint, HttpMethod};
use crate::errors::{ApidexError, Result};
use crate::normalizer::{category_to_tag_form, normalize_category_name, CatalogSort};
use crate::storage::repositories::decode_json_column;
use crate::storage::DbPool;
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use tracing::instrument;

/// Data access for `endpoints` and `endpoint_categories`
#[derive(Debug, Clone)]
pub struct EndpointRepository {
    pool: DbPool,
}

/// Filters for [`EndpointRepository::search`]
#[derive(Debug, Clone, Default)]
pub struct EndpointSearchFilter {
    /// FTS5 MATCH expression; `None` disables the full-text condition
    pub fts_query: Option<String>,
    pub methods: Vec<HttpMethod>,
    /// Category name in any casing; normalized before matching
    pub category: Option<String>,
    pub category_group: Option<String>,
    pub api_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

/// One search result window plus the overall hit count
#[derive(Debug, Clone)]
pub struct EndpointSearchPage {
    pub endpoints: Vec<Endpoint>,
    pub total: i64,
}

/// Aggregated category group row
#[derive(Debug, Clone, serde::Serialize)]
pub struct CategoryGroupRow {
    pub name: String,
    pub category_count: i64,
    pub total_endpoints: i64,
}

const COLUMNS: &str = "id, api_id, path, method, operation_id, summary, description, tags, \
                       parameters, request_body, responses, security, deprecated, extensions, \
                       schema_dependencies, security_dependencies, category, category_group, \
                       searchable_text";

fn row_to_endpoint(row: &sqlx::sqlite::SqliteRow) -> Endpoint {
    Endpoint {
        id: Some(row.get("id")),
        api_id: row.get("api_id"),
        path: row.get("path"),
        method: HttpMethod::from_str(row.get::<String, _>("method").as_str())
            .unwrap_or(HttpMethod::Get),
        operation_id: row.get("operation_id"),
        summary: row.get("summary"),
        description: row.get("description"),
        tags: decode_json_column(row.get("tags")),
        parameters: decode_json_column(row.get("parameters")),
        request_body: row
            .get::<Option<String>, _>("request_body")
            .and_then(|raw| serde_json::from_str(&raw).ok()),
        responses: decode_json_column(row.get("responses")),
        security: decode_json_column(row.get("security")),
        deprecated: row.get::<i64, _>("deprecated") != 0,
        extensions: decode_json_column(row.get("extensions")),
        schema_dependencies: decode_json_column(row.get("schema_dependencies")),
        security_dependencies: decode_json_column(row.get("security_dependencies")),
        category: row.get("category"),
        category_group: row.get("category_group"),
        searchable_text: row.get("searchable_text"),
    }
}

impl EndpointRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert one endpoint within an ingestion transaction
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Sqlite>,
        api_id: i64,
        endpoint: &Endpoint,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO endpoints \
             (api_id, path, method, operation_id, summary, description, tags, parameters, \
              request_body, responses, security, deprecated, extensions, schema_dependencies, \
              security_dependencies, category, category_group, searchable_text) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(api_id)
        .bind(&endpoint.path)
        .bind(endpoint.method.as_str())
        .bind(&endpoint.operation_id)
        .bind(&endpoint.summary)
        .bind(&endpoint.description)
        .bind(serde_json::to_string(&endpoint.tags)?)
        .bind(serde_json::to_string(&endpoint.parameters)?)
        .bind(match &endpoint.request_body {
            Some(body) => Some(serde_json::to_string(body)?),
            None => None,
        })
        .bind(serde_json::to_string(&endpoint.responses)?)
        .bind(serde_json::to_string(&endpoint.security)?)
        .bind(endpoint.deprecated as i64)
        .bind(serde_json::to_string(&endpoint.extensions)?)
        .bind(serde_json::to_string(&endpoint.schema_dependencies)?)
        .bind(serde_json::to_string(&endpoint.security_dependencies)?)
        .bind(&endpoint.category)
        .bind(&endpoint.category_group)
        .bind(&endpoint.searchable_text)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            ApidexError::database(
                e,
                format!("Failed to insert endpoint {} {}", endpoint.method, endpoint.path),
            )
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Insert the catalog rows gathered during normalization
    pub async fn insert_categories_tx(
        tx: &mut Transaction<'_, Sqlite>,
        api_id: i64,
        categories: &[CategoryCatalogEntry],
    ) -> Result<()> {
        for entry in categories {
            sqlx::query(
                "INSERT INTO endpoint_categories \
                 (api_id, category_name, display_name, description, category_group, \
                  endpoint_count, http_methods) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(api_id, category_name) DO UPDATE SET \
                   endpoint_count = excluded.endpoint_count, \
                   http_methods = excluded.http_methods",
            )
            .bind(api_id)
            .bind(&entry.category_name)
            .bind(&entry.display_name)
            .bind(&entry.description)
            .bind(&entry.category_group)
            .bind(entry.endpoint_count)
            .bind(serde_json::to_string(&entry.http_methods)?)
            .execute(&mut **tx)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to insert category row"))?;
        }
        Ok(())
    }

    #[instrument(skip(self, endpoint), fields(path = %endpoint.path), name = "db_create_endpoint")]
    pub async fn create(&self, api_id: i64, endpoint: &Endpoint) -> Result<Endpoint> {
        let mut tx = self.pool.begin().await?;
        let id = Self::insert_tx(&mut tx, api_id, endpoint).await?;
        tx.commit().await?;
        self.get_by_id_or_raise(id).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Endpoint>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM endpoints WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to fetch endpoint"))?;
        Ok(row.as_ref().map(row_to_endpoint))
    }

    pub async fn get_by_id_or_raise(&self, id: i64) -> Result<Endpoint> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ApidexError::not_found("Endpoint", id.to_string()))
    }

    /// Look up by (path, method), newest spec first
    pub async fn get_by_path_method(
        &self,
        path: &str,
        method: HttpMethod,
    ) -> Result<Option<Endpoint>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM endpoints WHERE path = ? AND method = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(path)
        .bind(method.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to fetch endpoint by path"))?;
        Ok(row.as_ref().map(row_to_endpoint))
    }

    /// Look up by operationId, newest spec first
    pub async fn get_by_operation_id(&self, operation_id: &str) -> Result<Option<Endpoint>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM endpoints WHERE operation_id = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(operation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to fetch endpoint by operationId"))?;
        Ok(row.as_ref().map(row_to_endpoint))
    }

    /// Batch drain in id order, for index building
    pub async fn list_batch(&self, after_id: i64, limit: i64) -> Result<Vec<Endpoint>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM endpoints WHERE id > ? ORDER BY id LIMIT ?"
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to list endpoints"))?;
        Ok(rows.iter().map(row_to_endpoint).collect())
    }

    pub async fn count(&self, api_id: Option<i64>) -> Result<i64> {
        let row = match api_id {
            Some(api_id) => {
                sqlx::query("SELECT COUNT(*) AS n FROM endpoints WHERE api_id = ?")
                    .bind(api_id)
                    .fetch_one(&self.pool)
                    .await
            }
            None => sqlx::query("SELECT COUNT(*) AS n FROM endpoints").fetch_one(&self.pool).await,
        }
        .map_err(|e| ApidexError::database(e, "Failed to count endpoints"))?;
        Ok(row.get("n"))
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to delete endpoint"))?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a batch within one transaction, returning assigned ids
    pub async fn create_many(&self, api_id: i64, endpoints: &[Endpoint]) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            ids.push(Self::insert_tx(&mut tx, api_id, endpoint).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Replace a stored endpoint wholesale by id
    pub async fn update_by_id(&self, id: i64, endpoint: &Endpoint) -> Result<Endpoint> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE endpoints SET path = ?, method = ?, operation_id = ?, summary = ?, \
             description = ?, tags = ?, parameters = ?, request_body = ?, responses = ?, \
             security = ?, deprecated = ?, extensions = ?, schema_dependencies = ?, \
             security_dependencies = ?, category = ?, category_group = ?, searchable_text = ? \
             WHERE id = ?",
        )
        .bind(&endpoint.path)
        .bind(endpoint.method.as_str())
        .bind(&endpoint.operation_id)
        .bind(&endpoint.summary)
        .bind(&endpoint.description)
        .bind(serde_json::to_string(&endpoint.tags)?)
        .bind(serde_json::to_string(&endpoint.parameters)?)
        .bind(match &endpoint.request_body {
            Some(body) => Some(serde_json::to_string(body)?),
            None => None,
        })
        .bind(serde_json::to_string(&endpoint.responses)?)
        .bind(serde_json::to_string(&endpoint.security)?)
        .bind(endpoint.deprecated as i64)
        .bind(serde_json::to_string(&endpoint.extensions)?)
        .bind(serde_json::to_string(&endpoint.schema_dependencies)?)
        .bind(serde_json::to_string(&endpoint.security_dependencies)?)
        .bind(&endpoint.category)
        .bind(&endpoint.category_group)
        .bind(&endpoint.searchable_text)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to update endpoint"))?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(ApidexError::not_found("Endpoint", id.to_string()));
        }
        self.get_by_id_or_raise(id).await
    }

    pub async fn exists(&self, id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM endpoints WHERE id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to check endpoint existence"))?;
        Ok(row.is_some())
    }

    /// One page of endpoints in id order
    pub async fn get_page(&self, page: i64, per_page: i64) -> Result<crate::storage::Page<Endpoint>> {
        let total = self.count(None).await?;
        let offset = crate::storage::Page::<Endpoint>::offset(page, per_page);
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM endpoints ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to page endpoints"))?;
        Ok(crate::storage::Page::new(
            rows.iter().map(row_to_endpoint).collect(),
            total,
            page.max(1),
            per_page,
        ))
    }

    /// Combined full-text and filter search with AND semantics.
    ///
    /// Rows come back in stable id order; the relevance ranker re-scores
    /// the candidate window upstream.
    #[instrument(skip(self, filter), name = "db_search_endpoints")]
    pub async fn search(&self, filter: &EndpointSearchFilter) -> Result<EndpointSearchPage> {
        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(fts) = filter.fts_query.as_deref().filter(|q| !q.is_empty()) {
            conditions.push(
                "e.id IN (SELECT rowid FROM endpoints_fts WHERE endpoints_fts MATCH ?)".to_string(),
            );
            binds.push(fts.to_string());
        }

        if !filter.methods.is_empty() {
            let placeholders = vec!["?"; filter.methods.len()].join(", ");
            conditions.push(format!("e.method IN ({placeholders})"));
            binds.extend(filter.methods.iter().map(|m| m.as_str().to_string()));
        }

        if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
            let normalized = normalize_category_name(category);
            let tag_form = category_to_tag_form(&normalized);
            conditions.push("(LOWER(e.category) = ? OR e.tags LIKE ?)".to_string());
            binds.push(normalized);
            binds.push(format!("%\"{tag_form}\"%"));
        }

        if let Some(group) = filter.category_group.as_deref().filter(|g| !g.is_empty()) {
            conditions.push("LOWER(e.category_group) = LOWER(?)".to_string());
            binds.push(group.to_string());
        }

        if let Some(api_id) = filter.api_id {
            conditions.push("e.api_id = ?".to_string());
            binds.push(api_id.to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS n FROM endpoints e {where_clause}");
        let mut count_query = sqlx::query(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Endpoint search count failed"))?
            .get("n");

        // Stable id order; the relevance ranker re-scores matches upstream
        let order = "ORDER BY e.id";

        let select_sql = format!(
            "SELECT {} FROM endpoints e {where_clause} {order} LIMIT ? OFFSET ?",
            COLUMNS
                .split(", ")
                .map(|c| format!("e.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut select_query = sqlx::query(&select_sql);
        for bind in &binds {
            select_query = select_query.bind(bind);
        }
        select_query = select_query.bind(filter.limit.max(0)).bind(filter.offset.max(0));

        let rows = select_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Endpoint search failed"))?;

        Ok(EndpointSearchPage { endpoints: rows.iter().map(row_to_endpoint).collect(), total })
    }

    /// Catalog rows, optionally scoped to one spec or one group
    pub async fn get_categories(
        &self,
        api_id: Option<i64>,
        category_group: Option<&str>,
        include_empty: bool,
        sort_by: CatalogSort,
    ) -> Result<Vec<CategoryCatalogEntry>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(api_id) = api_id {
            conditions.push("api_id = ?".to_string());
            binds.push(api_id.to_string());
        }
        if let Some(group) = category_group {
            conditions.push("LOWER(category_group) = LOWER(?)".to_string());
            binds.push(group.to_string());
        }
        if !include_empty {
            conditions.push("endpoint_count > 0".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let order = match sort_by {
            CatalogSort::Name => "ORDER BY category_name",
            CatalogSort::EndpointCount => "ORDER BY endpoint_count DESC, category_name",
            CatalogSort::Group => "ORDER BY category_group, category_name",
        };

        let sql = format!(
            "SELECT category_name, display_name, description, category_group, endpoint_count, \
             http_methods FROM endpoint_categories {where_clause} {order}"
        );
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(map_categories_error)?;

        Ok(rows
            .iter()
            .map(|row| CategoryCatalogEntry {
                category_name: row.get("category_name"),
                display_name: row.get("display_name"),
                description: row.get("description"),
                category_group: row.get("category_group"),
                endpoint_count: row.get("endpoint_count"),
                http_methods: decode_json_column(row.get("http_methods")),
            })
            .collect())
    }

    /// Aggregate categories by group
    pub async fn get_category_groups(&self, api_id: Option<i64>) -> Result<Vec<CategoryGroupRow>> {
        let sql = format!(
            "SELECT COALESCE(category_group, 'Ungrouped') AS group_name, \
             COUNT(*) AS category_count, SUM(endpoint_count) AS total_endpoints \
             FROM endpoint_categories {} GROUP BY group_name ORDER BY total_endpoints DESC",
            if api_id.is_some() { "WHERE api_id = ?" } else { "" }
        );
        let mut query = sqlx::query(&sql);
        if let Some(api_id) = api_id {
            query = query.bind(api_id);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(map_categories_error)?;

        Ok(rows
            .iter()
            .map(|row| CategoryGroupRow {
                name: row.get("group_name"),
                category_count: row.get("category_count"),
                total_endpoints: row.get::<Option<i64>, _>("total_endpoints").unwrap_or(0),
            })
            .collect())
    }
}

fn map_categories_error(e: sqlx::Error) -> ApidexError {
    let message = e.to_string();
    if message.contains("no such table") && message.contains("endpoint_categories") {
        ApidexError::DatabaseConnection {
            context: "categories table is missing; run `apidex migrate` to update the database"
                .to_string(),
            source: Some(e),
        }
    } else {
        ApidexError::database(e, "Category query failed")
    }
}
