//! Search-quality scenarios over the marketplace fixture: synonym recall,
//! boolean and field-scoped queries, exclusions, ranking sanity and
//! suggestion behavior.

mod support;

use apidex::config::{AppConfig, DatabaseConfig, SearchConfig};
use apidex::domain::HttpMethod;
use apidex::pipeline::IngestionPipeline;
use apidex::search::SearchEngine;
use apidex::storage::create_pool;

async fn engine() -> SearchEngine {
    let database = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        auto_migrate: true,
        ..Default::default()
    };
    let pool = create_pool(&database).await.expect("pool");
    let config = AppConfig { database, ..Default::default() };

    let file = support::fixture_file();
    let pipeline = IngestionPipeline::from_config(pool.clone(), &config);
    let result = pipeline.process_file(file.path()).await;
    assert!(result.success, "{:?}", result.errors);

    let engine = SearchEngine::new(pool, SearchConfig::default());
    engine.train().await.expect("train");
    engine
}

#[tokio::test]
async fn plural_and_singular_forms_match() {
    let engine = engine().await;
    let plural = engine.search("users", &[], None, None, 1, 50).await.unwrap();
    let singular = engine.search("user", &[], None, None, 1, 50).await.unwrap();
    assert!(plural.total > 0);
    assert!(singular.total > 0);
    // Stemming folds both onto the same base term
    assert_eq!(plural.total, singular.total);
}

#[tokio::test]
async fn exclusion_removes_matches() {
    let engine = engine().await;
    let all = engine.search("statistics", &[], None, None, 1, 50).await.unwrap();
    let without_video = engine.search("statistics NOT video", &[], None, None, 1, 50).await.unwrap();
    assert!(without_video.total < all.total);
    assert!(without_video
        .hits
        .iter()
        .all(|hit| !hit.path.contains("video")));
}

#[tokio::test]
async fn method_field_filter_applies() {
    let engine = engine().await;
    let outcome = engine.search("method:POST statistics", &[], None, None, 1, 50).await.unwrap();
    assert!(outcome.total > 0);
    assert!(outcome.hits.iter().all(|hit| hit.method == "POST"));
}

#[tokio::test]
async fn path_field_filter_applies() {
    let engine = engine().await;
    let outcome = engine
        .search("path:/api/client/search_promo promotion", &[], None, None, 1, 50)
        .await
        .unwrap();
    assert!(outcome.total > 0);
    assert!(outcome.hits.iter().all(|hit| hit.path.starts_with("/api/client/search_promo")));
}

#[tokio::test]
async fn status_field_filter_applies() {
    let engine = engine().await;
    // Every POST in the fixture declares 201; GETs do not
    let outcome = engine.search("status:201 statistics", &[], None, None, 1, 50).await.unwrap();
    assert!(outcome.total > 0);
    assert!(outcome.hits.iter().all(|hit| hit.method == "POST"));
}

#[tokio::test]
async fn method_filter_and_field_filter_agree() {
    let engine = engine().await;
    let via_param =
        engine.search("statistics", &[HttpMethod::Post], None, None, 1, 50).await.unwrap();
    let via_field = engine.search("method:POST statistics", &[], None, None, 1, 50).await.unwrap();
    assert_eq!(via_param.total, via_field.total);
}

#[tokio::test]
async fn path_match_outranks_description_match() {
    let engine = engine().await;
    let outcome = engine.search("search_promo", &[], None, None, 1, 50).await.unwrap();
    assert!(outcome.total > 0);
    let first = &outcome.hits[0];
    assert!(
        first.path.contains("search_promo"),
        "top hit should match on path, was {}",
        first.path
    );
}

#[tokio::test]
async fn scores_monotonically_decrease() {
    let engine = engine().await;
    let outcome = engine.search("list statistics", &[], None, None, 1, 50).await.unwrap();
    for pair in outcome.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for hit in &outcome.hits {
        assert!(hit.score > 0.0 && hit.score < 1.0, "score out of (0,1): {}", hit.score);
    }
}

#[tokio::test]
async fn typo_produces_fix_suggestion() {
    let engine = engine().await;
    let outcome = engine.search("statistcs", &[], None, None, 1, 50).await.unwrap();
    assert_eq!(outcome.total, 0);
    assert!(
        outcome
            .suggestions
            .iter()
            .any(|s| s.kind == "typo_fix" && s.suggestion.contains("statistics")),
        "expected a typo fix, got {:?}",
        outcome.suggestions
    );
    assert!(outcome.suggestions.len() <= 5);
}

#[tokio::test]
async fn nonexistent_category_yields_empty_not_error() {
    let engine = engine().await;
    let outcome = engine.search("users", &[], Some("warehouse"), None, 1, 50).await.unwrap();
    assert_eq!(outcome.total, 0);
    assert!(outcome.hits.is_empty());
}

#[tokio::test]
async fn auth_synonyms_expand() {
    let engine = engine().await;
    let processed = engine
        .search("auth", &[], None, None, 1, 10)
        .await
        .unwrap()
        .processed;
    assert!(processed.enhanced_terms.iter().any(|t| t == "authentication"));
    assert!(processed.enhanced_terms.iter().any(|t| t == "authorization"));
}
