//! Repository for security schemes.

use crate::domain::{ParameterLocation, SecurityScheme, SecuritySchemeType};
use crate::errors::{ApidexError, Result};
use crate::storage::repositories::decode_json_column;
use crate::storage::DbPool;
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;

/// Data access for `security_schemes`
#[derive(Debug, Clone)]
pub struct SecurityRepository {
    pool: DbPool,
}

const COLUMNS: &str = "id, api_id, name, scheme_type, description, api_key_name, \
                       api_key_location, http_scheme, bearer_format, oauth2_flows, \
                       openid_connect_url, extensions, reference_count";

fn row_to_scheme(row: &sqlx::sqlite::SqliteRow) -> SecurityScheme {
    SecurityScheme {
        id: Some(row.get("id")),
        api_id: row.get("api_id"),
        name: row.get("name"),
        scheme_type: SecuritySchemeType::from_str(row.get::<String, _>("scheme_type").as_str())
            .unwrap_or(SecuritySchemeType::ApiKey),
        description: row.get("description"),
        api_key_name: row.get("api_key_name"),
        api_key_location: row
            .get::<Option<String>, _>("api_key_location")
            .and_then(|l| ParameterLocation::from_str(&l).ok()),
        http_scheme: row.get("http_scheme"),
        bearer_format: row.get("bearer_format"),
        oauth2_flows: row
            .get::<Option<String>, _>("oauth2_flows")
            .and_then(|s| serde_json::from_str(&s).ok()),
        openid_connect_url: row.get("openid_connect_url"),
        extensions: decode_json_column(row.get("extensions")),
        reference_count: row.get("reference_count"),
    }
}

impl SecurityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert one scheme within an ingestion transaction
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Sqlite>,
        api_id: i64,
        scheme: &SecurityScheme,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO security_schemes \
             (api_id, name, scheme_type, description, api_key_name, api_key_location, \
              http_scheme, bearer_format, oauth2_flows, openid_connect_url, extensions, \
              reference_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(api_id)
        .bind(&scheme.name)
        .bind(scheme.scheme_type.as_str())
        .bind(&scheme.description)
        .bind(&scheme.api_key_name)
        .bind(scheme.api_key_location.map(|l| l.as_str()))
        .bind(&scheme.http_scheme)
        .bind(&scheme.bearer_format)
        .bind(match &scheme.oauth2_flows {
            Some(flows) => Some(serde_json::to_string(flows)?),
            None => None,
        })
        .bind(&scheme.openid_connect_url)
        .bind(serde_json::to_string(&scheme.extensions)?)
        .bind(scheme.reference_count)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            ApidexError::database(e, format!("Failed to insert security scheme '{}'", scheme.name))
        })?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SecurityScheme>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM security_schemes WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to fetch security scheme"))?;
        Ok(row.as_ref().map(row_to_scheme))
    }

    /// Look up a scheme by name, newest spec first
    pub async fn get_by_name(&self, name: &str) -> Result<Option<SecurityScheme>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM security_schemes WHERE name = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to fetch security scheme by name"))?;
        Ok(row.as_ref().map(row_to_scheme))
    }

    pub async fn list(&self) -> Result<Vec<SecurityScheme>> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM security_schemes ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to list security schemes"))?;
        Ok(rows.iter().map(row_to_scheme).collect())
    }

    /// Schemes of one type across all specs
    pub async fn find_by_type(&self, scheme_type: SecuritySchemeType) -> Result<Vec<SecurityScheme>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM security_schemes WHERE scheme_type = ? ORDER BY id"
        ))
        .bind(scheme_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to fetch security schemes by type"))?;
        Ok(rows.iter().map(row_to_scheme).collect())
    }

    /// Defined-but-unreferenced schemes
    pub async fn find_unused(&self) -> Result<Vec<SecurityScheme>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM security_schemes WHERE reference_count = 0 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to fetch unused security schemes"))?;
        Ok(rows.iter().map(row_to_scheme).collect())
    }

    pub async fn count(&self, api_id: Option<i64>) -> Result<i64> {
        let row = match api_id {
            Some(api_id) => {
                sqlx::query("SELECT COUNT(*) AS n FROM security_schemes WHERE api_id = ?")
                    .bind(api_id)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS n FROM security_schemes")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| ApidexError::database(e, "Failed to count security schemes"))?;
        Ok(row.get("n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::storage::create_pool;
    use serde_json::json;

    async fn repo_with_schemes() -> SecurityRepository {
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

        let mut bearer = SecurityScheme::new("bearerAuth", SecuritySchemeType::Http);
        bearer.http_scheme = Some("bearer".to_string());
        bearer.bearer_format = Some("JWT".to_string());
        bearer.reference_count = 4;

        let mut oauth = SecurityScheme::new("oauth", SecuritySchemeType::Oauth2);
        oauth.oauth2_flows = Some(json!({
            "clientCredentials": {"tokenUrl": "https://example.com/token", "scopes": {"read": "r"}}
        }));

        let repo = SecurityRepository::new(pool.clone());
        let mut tx = pool.begin().await.unwrap();
        SecurityRepository::insert_tx(&mut tx, 1, &bearer).await.unwrap();
        SecurityRepository::insert_tx(&mut tx, 1, &oauth).await.unwrap();
        tx.commit().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_round_trip() {
        let repo = repo_with_schemes().await;
        let bearer = repo.get_by_name("bearerAuth").await.unwrap().unwrap();
        assert_eq!(bearer.scheme_type, SecuritySchemeType::Http);
        assert_eq!(bearer.http_scheme.as_deref(), Some("bearer"));
        assert_eq!(bearer.bearer_format.as_deref(), Some("JWT"));

        let oauth = repo.get_by_name("oauth").await.unwrap().unwrap();
        assert_eq!(oauth.declared_scopes().len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_type_and_unused() {
        let repo = repo_with_schemes().await;
        let oauth_schemes = repo.find_by_type(SecuritySchemeType::Oauth2).await.unwrap();
        assert_eq!(oauth_schemes.len(), 1);

        let unused = repo.find_unused().await.unwrap();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].name, "oauth");
    }

    #[tokio::test]
    async fn test_count() {
        let repo = repo_with_schemes().await;
        assert_eq!(repo.count(None).await.unwrap(), 2);
        assert_eq!(repo.count(Some(1)).await.unwrap(), 2);
        assert_eq!(repo.count(Some(2)).await.unwrap(), 0);
    }
}
