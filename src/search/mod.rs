//! # Search
//!
//! Full-text retrieval over the endpoint index plus the relevance pipeline:
//! query preprocessing, FTS5 candidate fetch, BM25 re-ranking, in-memory
//! field filtering, and suggestion generation when results run thin.

pub mod index;
pub mod query;
pub mod relevance;

pub use index::{IndexValidation, SearchDocument, SearchIndexManager};
pub use query::{
    edit_distance, ProcessedQuery, QueryProcessor, QuerySuggestion, QueryType, QUERY_FIELDS,
};
pub use relevance::{RelevanceRanker, RelevanceScore};

use crate::config::SearchConfig;
use crate::domain::HttpMethod;
use crate::errors::Result;
use crate::storage::{DbPool, EndpointRepository, EndpointSearchFilter};
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// One ranked search hit
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub endpoint_id: i64,
    pub path: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub deprecated: bool,
    pub score: f64,
}

/// A full search response window
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub total: i64,
    pub suggestions: Vec<QuerySuggestion>,
    pub processed: ProcessedQuery,
}

/// Search façade combining processor, repository, index and ranker
pub struct SearchEngine {
    repository: EndpointRepository,
    index: SearchIndexManager,
    processor: QueryProcessor,
    ranker: RwLock<RelevanceRanker>,
    vocabulary: RwLock<HashSet<String>>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(pool: DbPool, config: SearchConfig) -> Self {
        let repository = EndpointRepository::new(pool.clone());
        let index = SearchIndexManager::new(pool, config.index_batch_size);
        let processor = QueryProcessor::new(config.extra_synonyms.clone());
        let ranker = RwLock::new(RelevanceRanker::new(&config.field_weights));
        Self {
            repository,
            index,
            processor,
            ranker,
            vocabulary: RwLock::new(HashSet::new()),
            config,
        }
    }

    pub fn index_manager(&self) -> &SearchIndexManager {
        &self.index
    }

    /// Train the ranker and vocabulary from the current index contents
    pub async fn train(&self) -> Result<usize> {
        let documents = self.index.all_documents().await?;

        let mut vocabulary = HashSet::new();
        for document in &documents {
            vocabulary.extend(document.keywords.split_whitespace().map(str::to_lowercase));
            vocabulary.extend(document.path_segments.split_whitespace().map(str::to_lowercase));
            vocabulary.extend(document.tags.split_whitespace().map(str::to_lowercase));
        }

        let mut ranker = self.ranker.write().await;
        ranker.train(&documents);
        *self.vocabulary.write().await = vocabulary;
        Ok(documents.len())
    }

    /// Execute a search with AND-combined filters
    #[instrument(skip(self), name = "search_execute")]
    pub async fn search(
        &self,
        keywords: &str,
        methods: &[HttpMethod],
        category: Option<&str>,
        category_group: Option<&str>,
        page: i64,
        per_page: i64,
    ) -> Result<SearchOutcome> {
        let mut processed = self
            .processor
            .process(keywords)
            .map_err(|m| crate::errors::ApidexError::validation_param(m, "keywords", vec![
                "Provide one or more search terms".to_string(),
            ]))?;

        let fts_query = self.processor.build_fts_query(&processed);

        // Fetch a wide candidate window; ranking and field filters run here
        let candidates = self
            .repository
            .search(&EndpointSearchFilter {
                fts_query,
                methods: methods.to_vec(),
                category: category.map(String::from),
                category_group: category_group.map(String::from),
                api_id: None,
                limit: self.config.max_search_results as i64,
                offset: 0,
            })
            .await?;

        let ids: Vec<i64> = candidates.endpoints.iter().filter_map(|e| e.id).collect();
        let mut documents = self.index.documents_for(&ids).await?;

        // The index is eventually consistent; endpoints not yet indexed are
        // still searchable through their stored projection
        if documents.len() < ids.len() {
            let indexed: HashSet<i64> = documents.iter().map(|d| d.endpoint_id).collect();
            for endpoint in &candidates.endpoints {
                if endpoint.id.is_some_and(|id| !indexed.contains(&id)) {
                    documents.push(SearchIndexManager::build_document(endpoint));
                }
            }
        }

        let documents: Vec<SearchDocument> = documents
            .into_iter()
            .filter(|d| apply_field_filters(&processed, d))
            .collect();

        let ranker = self.ranker.read().await;
        let ranked = ranker.rank(&processed.enhanced_terms, documents);
        drop(ranker);

        let total = ranked.len() as i64;
        let offset = ((page.max(1) - 1) * per_page) as usize;
        let hits: Vec<SearchHit> = ranked
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .map(|(document, score)| SearchHit {
                endpoint_id: document.endpoint_id,
                path: document.endpoint_path,
                method: document.http_method,
                operation_id: document.operation_id,
                summary: document.operation_summary,
                description: document.operation_description,
                category: None,
                deprecated: document.deprecated,
                score: score.total_score,
            })
            .collect();

        // Hits carry the endpoint category for display; fill from candidates
        let mut hits = hits;
        for hit in &mut hits {
            if let Some(endpoint) =
                candidates.endpoints.iter().find(|e| e.id == Some(hit.endpoint_id))
            {
                hit.category = endpoint.category.clone();
            }
        }

        let vocabulary = self.vocabulary.read().await;
        processed.suggestions = self.processor.suggest(&processed, &vocabulary, total as usize);
        let suggestions = processed.suggestions.clone();

        debug!(total, returned = hits.len(), "Search complete");
        Ok(SearchOutcome { hits, total, suggestions, processed })
    }

    /// Explain one document's score for a query
    pub async fn explain(&self, keywords: &str, endpoint_id: i64) -> Result<Option<RelevanceScore>> {
        let processed = self
            .processor
            .process(keywords)
            .map_err(|m| crate::errors::ApidexError::validation(m))?;
        let documents = self.index.documents_for(&[endpoint_id]).await?;
        let Some(document) = documents.first() else {
            return Ok(None);
        };
        let ranker = self.ranker.read().await;
        Ok(Some(ranker.explain(&processed.enhanced_terms, document)))
    }
}

/// Apply `<field>:<value>` clauses against a document
fn apply_field_filters(processed: &ProcessedQuery, document: &SearchDocument) -> bool {
    for (field, value) in &processed.field_filters {
        let value_lower = value.to_lowercase();
        let matched = match field.as_str() {
            "path" => document.endpoint_path.to_lowercase().contains(&value_lower),
            "method" => document.http_method.eq_ignore_ascii_case(value),
            "param" => [
                &document.required_parameters,
                &document.optional_parameters,
                &document.path_parameters,
                &document.query_parameters,
                &document.header_parameters,
            ]
            .iter()
            .any(|params| params.to_lowercase().split_whitespace().any(|p| p == value_lower)),
            "status" => document
                .response_status_codes
                .split_whitespace()
                .any(|code| code == value),
            "response" => {
                document.response_content_types.to_lowercase().contains(&value_lower)
                    || document.response_schemas.to_lowercase().contains(&value_lower)
            }
            "type" => document.operation_type.eq_ignore_ascii_case(value),
            "auth" => {
                document.security_schemes.to_lowercase().contains(&value_lower)
                    || document.security_scopes.to_lowercase().contains(&value_lower)
            }
            _ => true,
        };
        if !matched {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::domain::Endpoint;
    use crate::storage::create_pool;

    async fn engine_with_fixture() -> SearchEngine {
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

        let fixtures = [
            ("/api/v1/users", HttpMethod::Get, "listUsers", "List users", "statistics"),
            ("/api/v1/users/{id}", HttpMethod::Get, "getUser", "Get a user", "statistics"),
            ("/api/v1/users", HttpMethod::Post, "createUser", "Create user", "statistics"),
            ("/api/v1/orders", HttpMethod::Get, "listOrders", "List orders", "orders"),
        ];
        let mut tx = pool.begin().await.unwrap();
        for (path, method, op, summary, category) in fixtures {
            let mut endpoint = Endpoint::new(path, method);
            endpoint.operation_id = Some(op.to_string());
            endpoint.summary = Some(summary.to_string());
            endpoint.category = Some(category.to_string());
            endpoint.searchable_text = format!("{path} {op} {summary}");
            crate::storage::EndpointRepository::insert_tx(&mut tx, 1, &endpoint).await.unwrap();
        }
        tx.commit().await.unwrap();

        let engine = SearchEngine::new(pool, SearchConfig::default());
        engine.index_manager().create_from_store().await.unwrap();
        engine.train().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_basic_search_finds_users() {
        let engine = engine_with_fixture().await;
        let outcome = engine.search("users", &[], None, None, 1, 20).await.unwrap();
        assert!(outcome.total >= 3, "expected the three user endpoints, got {}", outcome.total);
        assert!(outcome.hits[0].path.contains("users"));
        // Scores are normalized and descending
        for pair in outcome.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_three_way_and_semantics() {
        let engine = engine_with_fixture().await;
        let outcome = engine
            .search("user", &[HttpMethod::Post], Some("statistics"), None, 1, 20)
            .await
            .unwrap();
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.hits[0].method, "POST");
        assert_eq!(outcome.hits[0].category.as_deref(), Some("statistics"));
    }

    #[tokio::test]
    async fn test_category_filter_case_insensitive() {
        let engine = engine_with_fixture().await;
        for spelling in ["statistics", "STATISTICS", "StAtIsTiCs"] {
            let outcome = engine.search("users", &[], Some(spelling), None, 1, 20).await.unwrap();
            assert_eq!(outcome.total, 3, "{spelling}");
        }
    }

    #[tokio::test]
    async fn test_field_filter_method() {
        let engine = engine_with_fixture().await;
        let outcome = engine.search("method:GET users", &[], None, None, 1, 20).await.unwrap();
        assert!(outcome.total >= 2);
        assert!(outcome.hits.iter().all(|h| h.method == "GET"));
    }

    #[tokio::test]
    async fn test_pagination_window() {
        let engine = engine_with_fixture().await;
        let page1 = engine.search("users", &[], None, None, 1, 2).await.unwrap();
        let page2 = engine.search("users", &[], None, None, 2, 2).await.unwrap();
        assert_eq!(page1.hits.len(), 2);
        assert!(page1.total >= 3);
        let ids1: Vec<i64> = page1.hits.iter().map(|h| h.endpoint_id).collect();
        for hit in &page2.hits {
            assert!(!ids1.contains(&hit.endpoint_id));
        }
    }

    #[tokio::test]
    async fn test_no_results_yields_suggestions() {
        let engine = engine_with_fixture().await;
        let outcome = engine.search("userz", &[], None, None, 1, 20).await.unwrap();
        assert_eq!(outcome.total, 0);
        assert!(!outcome.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_empty_keywords_rejected() {
        let engine = engine_with_fixture().await;
        let err = engine.search("  ", &[], None, None, 1, 20).await.unwrap_err();
        assert!(matches!(err, crate::errors::ApidexError::Validation { .. }));
    }
}
