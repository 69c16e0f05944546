//! Repository for ingested-specification metadata.

use crate::domain::ApiMetadata;
use crate::errors::{ApidexError, Result};
use crate::storage::DbPool;
use sqlx::{Row, Sqlite, Transaction};
use tracing::instrument;

/// Data access for `api_metadata` rows
#[derive(Debug, Clone)]
pub struct MetadataRepository {
    pool: DbPool,
}

fn row_to_metadata(row: &sqlx::sqlite::SqliteRow) -> ApiMetadata {
    ApiMetadata {
        id: Some(row.get("id")),
        file_path: row.get("file_path"),
        file_hash: row.get("file_hash"),
        title: row.get("title"),
        version: row.get("version"),
        openapi_version: row.get("openapi_version"),
        description: row.get("description"),
        endpoint_count: row.get("endpoint_count"),
        schema_count: row.get("schema_count"),
        security_scheme_count: row.get("security_scheme_count"),
        ingested_at: row.get("ingested_at"),
    }
}

const COLUMNS: &str = "id, file_path, file_hash, title, version, openapi_version, description, \
                       endpoint_count, schema_count, security_scheme_count, ingested_at";

impl MetadataRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert within an ingestion transaction, returning the assigned id
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Sqlite>,
        metadata: &ApiMetadata,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO api_metadata \
             (file_path, file_hash, title, version, openapi_version, description, \
              endpoint_count, schema_count, security_scheme_count, ingested_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&metadata.file_path)
        .bind(&metadata.file_hash)
        .bind(&metadata.title)
        .bind(&metadata.version)
        .bind(&metadata.openapi_version)
        .bind(&metadata.description)
        .bind(metadata.endpoint_count)
        .bind(metadata.schema_count)
        .bind(metadata.security_scheme_count)
        .bind(metadata.ingested_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to insert api_metadata"))?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self), name = "db_create_api_metadata")]
    pub async fn create(&self, metadata: &ApiMetadata) -> Result<ApiMetadata> {
        let mut tx = self.pool.begin().await?;
        let id = Self::insert_tx(&mut tx, metadata).await?;
        tx.commit().await?;
        self.get_by_id_or_raise(id).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<ApiMetadata>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM api_metadata WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to fetch api_metadata"))?;
        Ok(row.as_ref().map(row_to_metadata))
    }

    pub async fn get_by_id_or_raise(&self, id: i64) -> Result<ApiMetadata> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ApidexError::not_found("APIMetadata", id.to_string()))
    }

    /// Most recently ingested specification, if any
    pub async fn get_latest(&self) -> Result<Option<ApiMetadata>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM api_metadata ORDER BY ingested_at DESC, id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to fetch latest api_metadata"))?;
        Ok(row.as_ref().map(row_to_metadata))
    }

    /// Look up a previous ingestion of the same content
    pub async fn find_by_hash(&self, file_hash: &str) -> Result<Option<ApiMetadata>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM api_metadata WHERE file_hash = $1 ORDER BY id DESC LIMIT 1"
        ))
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to fetch api_metadata by hash"))?;
        Ok(row.as_ref().map(row_to_metadata))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ApiMetadata>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM api_metadata ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to list api_metadata"))?;
        Ok(rows.iter().map(row_to_metadata).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM api_metadata")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to count api_metadata"))?;
        Ok(row.get("n"))
    }

    /// Delete a specification and, through cascades, all of its children
    #[instrument(skip(self), name = "db_delete_api_metadata")]
    pub async fn delete_by_id(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM api_metadata WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to delete api_metadata"))?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::storage::create_pool;

    async fn repo() -> MetadataRepository {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            auto_migrate: true,
            ..Default::default()
        };
        MetadataRepository::new(create_pool(&config).await.unwrap())
    }

    fn sample(hash: &str) -> ApiMetadata {
        ApiMetadata {
            id: None,
            file_path: "/tmp/spec.json".to_string(),
            file_hash: hash.to_string(),
            title: "Sample".to_string(),
            version: "1.0".to_string(),
            openapi_version: "3.0.0".to_string(),
            description: Some("demo".to_string()),
            endpoint_count: 2,
            schema_count: 1,
            security_scheme_count: 0,
            ingested_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let repo = repo().await;
        let created = repo.create(&sample("h1")).await.unwrap();
        assert!(created.id.is_some());
        assert_eq!(created.title, "Sample");

        let fetched = repo.get_by_id_or_raise(created.id.unwrap()).await.unwrap();
        assert_eq!(fetched.file_hash, "h1");
        assert_eq!(fetched.endpoint_count, 2);
    }

    #[tokio::test]
    async fn test_not_found_is_typed() {
        let repo = repo().await;
        let err = repo.get_by_id_or_raise(999).await.unwrap_err();
        assert!(matches!(err, ApidexError::ResourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_latest_and_hash_lookup() {
        let repo = repo().await;
        repo.create(&sample("first")).await.unwrap();
        repo.create(&sample("second")).await.unwrap();

        let latest = repo.get_latest().await.unwrap().unwrap();
        assert_eq!(latest.file_hash, "second");

        assert!(repo.find_by_hash("first").await.unwrap().is_some());
        assert!(repo.find_by_hash("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = repo().await;
        let created = repo.create(&sample("h")).await.unwrap();
        assert!(repo.delete_by_id(created.id.unwrap()).await.unwrap());
        assert!(!repo.delete_by_id(created.id.unwrap()).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
