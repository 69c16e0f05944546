//! Repository for schema components, including bounded dependency traversal.

use crate::domain::{SchemaComponent, SchemaType};
use crate::errors::{ApidexError, Result};
use crate::storage::repositories::decode_json_column;
use crate::storage::DbPool;
use sqlx::{Row, Sqlite, Transaction};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::str::FromStr;
use tracing::instrument;

/// Data access for `schemas`
#[derive(Debug, Clone)]
pub struct SchemaRepository {
    pool: DbPool,
}

/// Outcome of a bounded transitive dependency resolution
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub root: SchemaComponent,
    /// Transitive dependencies in breadth-first discovery order
    pub dependencies: Vec<SchemaComponent>,
    /// Names whose rows could not be found
    pub unresolved: Vec<String>,
    /// Names that participate in a reference cycle along the traversal
    pub circular_references: Vec<String>,
    /// Deepest level actually visited (root = 0)
    pub resolution_depth: i64,
    /// Whether traversal stopped early at the depth bound
    pub max_depth_reached: bool,
}

const COLUMNS: &str = "id, api_id, name, title, schema_type, format, description, definition, \
                       example, deprecated, extensions, schema_dependencies, circular, \
                       reference_count, searchable_text";

fn row_to_schema(row: &sqlx::sqlite::SqliteRow) -> SchemaComponent {
    let raw: serde_json::Value = row
        .get::<Option<String>, _>("definition")
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null);
    let node = crate::normalizer::schema::classify_node(&raw);

    SchemaComponent {
        id: Some(row.get("id")),
        api_id: row.get("api_id"),
        name: row.get("name"),
        title: row.get("title"),
        schema_type: row
            .get::<Option<String>, _>("schema_type")
            .and_then(|t| SchemaType::from_str(&t).ok()),
        format: row.get("format"),
        description: row.get("description"),
        node,
        raw,
        example: row
            .get::<Option<String>, _>("example")
            .and_then(|s| serde_json::from_str(&s).ok()),
        deprecated: row.get::<i64, _>("deprecated") != 0,
        extensions: decode_json_column(row.get("extensions")),
        schema_dependencies: decode_json_column(row.get("schema_dependencies")),
        circular: row.get::<i64, _>("circular") != 0,
        reference_count: row.get("reference_count"),
        searchable_text: row.get("searchable_text"),
    }
}

impl SchemaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert one schema within an ingestion transaction
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Sqlite>,
        api_id: i64,
        schema: &SchemaComponent,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO schemas \
             (api_id, name, title, schema_type, format, description, definition, example, \
              deprecated, extensions, schema_dependencies, circular, reference_count, \
              searchable_text) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(api_id)
        .bind(&schema.name)
        .bind(&schema.title)
        .bind(schema.schema_type.map(|t| t.as_str()))
        .bind(&schema.format)
        .bind(&schema.description)
        .bind(serde_json::to_string(&schema.raw)?)
        .bind(match &schema.example {
            Some(example) => Some(serde_json::to_string(example)?),
            None => None,
        })
        .bind(schema.deprecated as i64)
        .bind(serde_json::to_string(&schema.extensions)?)
        .bind(serde_json::to_string(&schema.schema_dependencies)?)
        .bind(schema.circular as i64)
        .bind(schema.reference_count)
        .bind(&schema.searchable_text)
        .execute(&mut **tx)
        .await
        .map_err(|e| ApidexError::database(e, format!("Failed to insert schema '{}'", schema.name)))?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SchemaComponent>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM schemas WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to fetch schema"))?;
        Ok(row.as_ref().map(row_to_schema))
    }

    pub async fn get_by_id_or_raise(&self, id: i64) -> Result<SchemaComponent> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ApidexError::not_found("Schema", id.to_string()))
    }

    /// Look up a schema by bare component name, newest spec first
    pub async fn get_by_name(&self, name: &str) -> Result<Option<SchemaComponent>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM schemas WHERE name = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to fetch schema by name"))?;
        Ok(row.as_ref().map(row_to_schema))
    }

    /// All schema names, for suggestion generation
    pub async fn list_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT name FROM schemas ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to list schema names"))?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<SchemaComponent>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM schemas ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to list schemas"))?;
        Ok(rows.iter().map(row_to_schema).collect())
    }

    pub async fn count(&self, api_id: Option<i64>) -> Result<i64> {
        let row = match api_id {
            Some(api_id) => {
                sqlx::query("SELECT COUNT(*) AS n FROM schemas WHERE api_id = ?")
                    .bind(api_id)
                    .fetch_one(&self.pool)
                    .await
            }
            None => sqlx::query("SELECT COUNT(*) AS n FROM schemas").fetch_one(&self.pool).await,
        }
        .map_err(|e| ApidexError::database(e, "Failed to count schemas"))?;
        Ok(row.get("n"))
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM schemas WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to delete schema"))?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM schemas WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApidexError::database(e, "Failed to check schema existence"))?;
        Ok(row.is_some())
    }

    /// One page of schemas in id order
    pub async fn get_page(
        &self,
        page: i64,
        per_page: i64,
    ) -> Result<crate::storage::Page<SchemaComponent>> {
        let total = self.count(None).await?;
        let offset = crate::storage::Page::<SchemaComponent>::offset(page, per_page);
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM schemas ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ApidexError::database(e, "Failed to page schemas"))?;
        Ok(crate::storage::Page::new(
            rows.iter().map(row_to_schema).collect(),
            total,
            page.max(1),
            per_page,
        ))
    }

    /// Bounded breadth-first dependency resolution from a named root.
    ///
    /// Visits each component once (request-scoped cache), stops at
    /// `max_depth` levels below the root, and reports the names where the
    /// traversal closed a cycle rather than recursing into them again.
    #[instrument(skip(self), name = "db_resolve_schema")]
    pub async fn get_schema_with_dependencies(
        &self,
        name: &str,
        max_depth: i64,
    ) -> Result<ResolvedSchema> {
        let root = self
            .get_by_name(name)
            .await?
            .ok_or_else(|| ApidexError::not_found("Schema", name))?;

        let mut cache: HashMap<String, SchemaComponent> = HashMap::new();
        cache.insert(root.name.clone(), root.clone());

        let mut visited: BTreeSet<String> = BTreeSet::from([root.name.clone()]);
        let mut dependencies: Vec<SchemaComponent> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();
        let mut circular: BTreeSet<String> = BTreeSet::new();
        let mut deepest = 0i64;
        let mut max_depth_reached = false;

        let mut queue: VecDeque<(String, i64)> = root
            .schema_dependencies
            .iter()
            .map(|dep| (dep.clone(), 1))
            .collect();

        while let Some((dep_name, depth)) = queue.pop_front() {
            if depth > max_depth {
                max_depth_reached = true;
                continue;
            }
            if visited.contains(&dep_name) {
                // A previously visited name reached again is a closed cycle
                circular.insert(dep_name);
                continue;
            }
            visited.insert(dep_name.clone());

            let component = match cache.get(&dep_name) {
                Some(found) => Some(found.clone()),
                None => {
                    let fetched = self.get_by_name(&dep_name).await?;
                    if let Some(found) = &fetched {
                        cache.insert(dep_name.clone(), found.clone());
                    }
                    fetched
                }
            };

            match component {
                Some(found) => {
                    deepest = deepest.max(depth);
                    for next in &found.schema_dependencies {
                        if visited.contains(next) {
                            circular.insert(next.clone());
                        } else {
                            queue.push_back((next.clone(), depth + 1));
                        }
                    }
                    dependencies.push(found);
                }
                None => unresolved.push(dep_name),
            }
        }

        Ok(ResolvedSchema {
            root,
            dependencies,
            unresolved,
            circular_references: circular.into_iter().collect(),
            resolution_depth: deepest,
            max_depth_reached,
        })
    }
}
