//! Relevance ranking.
//!
//! Per-field BM25 scoring trained on the indexed corpus, combined with
//! weighted field sums, multiplicative boosts and penalties, and a final
//! sigmoid squashing the total into (0, 1). `explain` exposes the full
//! calculation trace for one document.

use crate::search::index::SearchDocument;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Fields scored by the ranker, with their default weights
const DEFAULT_FIELD_WEIGHTS: &[(&str, f64)] = &[
    ("endpoint_path", 3.0),
    ("operation_id", 2.5),
    ("operation_summary", 2.0),
    ("tags", 1.5),
    ("operation_description", 1.0),
    ("parameters", 0.8),
    ("searchable_text", 0.5),
];

/// Score breakdown for one document
#[derive(Debug, Clone, Serialize)]
pub struct RelevanceScore {
    /// Sigmoid-normalized total in (0, 1)
    pub total_score: f64,
    pub field_scores: BTreeMap<String, f64>,
    pub boost_factors: BTreeMap<String, f64>,
    pub penalty_factors: BTreeMap<String, f64>,
    /// Human-readable calculation trace; populated by [`RelevanceRanker::explain`]
    pub trace: Vec<String>,
}

/// Per-field BM25 statistics gathered at train time
#[derive(Debug, Default)]
struct FieldModel {
    /// term → number of documents containing it
    document_frequency: HashMap<String, usize>,
    document_count: usize,
    average_length: f64,
}

impl FieldModel {
    fn idf(&self, term: &str) -> f64 {
        let df = self.document_frequency.get(term).copied().unwrap_or(0) as f64;
        let n = self.document_count as f64;
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }
}

/// BM25-based ranker with boosts and penalties
#[derive(Debug, Default)]
pub struct RelevanceRanker {
    models: HashMap<&'static str, FieldModel>,
    field_weights: HashMap<String, f64>,
}

impl RelevanceRanker {
    pub fn new(field_weight_overrides: &HashMap<String, f64>) -> Self {
        let mut field_weights: HashMap<String, f64> = DEFAULT_FIELD_WEIGHTS
            .iter()
            .map(|(field, weight)| (field.to_string(), *weight))
            .collect();
        for (field, weight) in field_weight_overrides {
            if field_weights.contains_key(field) {
                field_weights.insert(field.clone(), *weight);
            }
        }
        Self { models: HashMap::new(), field_weights }
    }

    /// Train per-field models over the indexed corpus
    pub fn train(&mut self, corpus: &[SearchDocument]) {
        self.models.clear();
        for (field, _) in DEFAULT_FIELD_WEIGHTS {
            let mut model = FieldModel::default();
            let mut total_length = 0usize;
            for document in corpus {
                let tokens = tokenize(&field_text(document, field));
                if tokens.is_empty() {
                    continue;
                }
                model.document_count += 1;
                total_length += tokens.len();
                let mut seen: Vec<&String> = Vec::new();
                for token in &tokens {
                    if !seen.contains(&token) {
                        seen.push(token);
                        *model.document_frequency.entry(token.clone()).or_default() += 1;
                    }
                }
            }
            if model.document_count > 0 {
                model.average_length = total_length as f64 / model.document_count as f64;
                self.models.insert(field, model);
            }
        }
    }

    pub fn is_trained(&self) -> bool {
        !self.models.is_empty()
    }

    /// Score one document against the query terms
    pub fn score(&self, query_terms: &[String], document: &SearchDocument) -> RelevanceScore {
        self.score_inner(query_terms, document, false)
    }

    /// Score with a full calculation trace
    pub fn explain(&self, query_terms: &[String], document: &SearchDocument) -> RelevanceScore {
        self.score_inner(query_terms, document, true)
    }

    /// Rank documents best-first, returning each with its score
    pub fn rank(
        &self,
        query_terms: &[String],
        documents: Vec<SearchDocument>,
    ) -> Vec<(SearchDocument, RelevanceScore)> {
        let mut scored: Vec<(SearchDocument, RelevanceScore)> = documents
            .into_iter()
            .map(|document| {
                let score = self.score(query_terms, &document);
                (document, score)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.total_score
                .partial_cmp(&a.1.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.endpoint_id.cmp(&b.0.endpoint_id))
        });
        scored
    }

    fn score_inner(
        &self,
        query_terms: &[String],
        document: &SearchDocument,
        tracing: bool,
    ) -> RelevanceScore {
        let mut field_scores = BTreeMap::new();
        let mut trace = Vec::new();
        let mut raw_total = 0.0;

        for (field, _) in DEFAULT_FIELD_WEIGHTS {
            let weight = self.field_weights.get(*field).copied().unwrap_or(1.0);
            let tokens = tokenize(&field_text(document, field));
            if tokens.is_empty() {
                continue;
            }

            let field_score: f64 = query_terms
                .iter()
                .map(|term| self.bm25_term(field, term, &tokens))
                .sum();

            if field_score > 0.0 {
                field_scores.insert(field.to_string(), field_score);
                raw_total += weight * field_score;
                if tracing {
                    trace.push(format!(
                        "{field}: bm25={field_score:.4} weight={weight:.2} contribution={:.4}",
                        weight * field_score
                    ));
                }
            }
        }

        let (boosts, penalties) = document_adjustments(document);
        let mut adjusted = raw_total;
        for (name, factor) in boosts.iter().chain(penalties.iter()) {
            adjusted *= factor;
            if tracing {
                trace.push(format!("{name}: x{factor:.2}"));
            }
        }

        let total_score = sigmoid(adjusted);
        if tracing {
            trace.push(format!("raw={raw_total:.4} adjusted={adjusted:.4} sigmoid={total_score:.4}"));
        }

        RelevanceScore {
            total_score,
            field_scores,
            boost_factors: boosts,
            penalty_factors: penalties,
            trace,
        }
    }

    fn bm25_term(&self, field: &str, term: &str, tokens: &[String]) -> f64 {
        let tf = tokens.iter().filter(|t| t.as_str() == term).count() as f64;
        if tf == 0.0 {
            return 0.0;
        }
        match self.models.get(field) {
            Some(model) => {
                let idf = model.idf(term);
                let length_norm = 1.0 - B + B * (tokens.len() as f64 / model.average_length.max(1.0));
                idf * (tf * (K1 + 1.0)) / (tf + K1 * length_norm)
            }
            // Untrained field: plain saturated term frequency
            None => (tf * (K1 + 1.0)) / (tf + K1),
        }
    }
}

fn field_text(document: &SearchDocument, field: &str) -> String {
    match field {
        "endpoint_path" => document.endpoint_path.clone(),
        "operation_id" => document.operation_id.clone().unwrap_or_default(),
        "operation_summary" => document.operation_summary.clone().unwrap_or_default(),
        "operation_description" => document.operation_description.clone().unwrap_or_default(),
        "tags" => document.tags.clone(),
        "parameters" => format!(
            "{} {} {}",
            document.required_parameters, document.optional_parameters, document.query_parameters
        ),
        "searchable_text" => format!("{} {}", document.keywords, document.searchable_text),
        _ => String::new(),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .flat_map(|t| {
            // Underscore-joined identifiers match both whole and split
            let lower = t.to_lowercase();
            let mut parts: Vec<String> = if lower.contains('_') {
                lower.split('_').filter(|p| !p.is_empty()).map(String::from).collect()
            } else {
                Vec::new()
            };
            parts.push(lower);
            parts
        })
        .collect()
}

fn document_adjustments(document: &SearchDocument) -> (BTreeMap<String, f64>, BTreeMap<String, f64>) {
    let mut boosts = BTreeMap::new();
    let mut penalties = BTreeMap::new();

    let segment_count = document.endpoint_path.split('/').filter(|s| !s.is_empty()).count();
    if segment_count <= 3 {
        boosts.insert("short_path".to_string(), 1.2);
    } else if segment_count > 5 {
        penalties.insert("long_path".to_string(), 0.9);
    }

    let documented = document.operation_summary.as_deref().is_some_and(|s| !s.is_empty())
        && document.operation_description.as_deref().is_some_and(|s| !s.is_empty());
    if documented {
        boosts.insert("well_documented".to_string(), 1.15);
    } else if document.operation_summary.as_deref().map_or(true, str::is_empty)
        && document.operation_description.as_deref().map_or(true, str::is_empty)
    {
        penalties.insert("undocumented".to_string(), 0.85);
    }

    if !document.required_parameters.is_empty() || !document.optional_parameters.is_empty() {
        boosts.insert("has_parameters".to_string(), 1.1);
    }

    match document.http_method.as_str() {
        "GET" | "POST" => {
            boosts.insert("common_method".to_string(), 1.05);
        }
        "PATCH" | "HEAD" | "OPTIONS" => {
            penalties.insert("uncommon_method".to_string(), 0.9);
        }
        _ => {}
    }

    if document.deprecated {
        penalties.insert("deprecated".to_string(), 0.5);
    }

    (boosts, penalties)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: i64, path: &str, summary: &str, description: &str) -> SearchDocument {
        SearchDocument {
            endpoint_id: id,
            endpoint_path: path.to_string(),
            http_method: "GET".to_string(),
            operation_summary: Some(summary.to_string()),
            operation_description: Some(description.to_string()),
            operation_id: Some(format!("op{id}")),
            searchable_text: format!("{path} {summary} {description}"),
            ..Default::default()
        }
    }

    fn corpus() -> Vec<SearchDocument> {
        vec![
            document(1, "/api/users", "List users", "Get all users from the system"),
            document(2, "/api/users/{id}", "Get user", "Get a specific user by ID"),
            document(3, "/api/posts", "List posts", "Retrieve all blog posts"),
        ]
    }

    #[test]
    fn test_training_covers_populated_fields() {
        let mut ranker = RelevanceRanker::new(&HashMap::new());
        assert!(!ranker.is_trained());
        ranker.train(&corpus());
        assert!(ranker.is_trained());
    }

    #[test]
    fn test_scores_normalized_and_relevant_wins() {
        let mut ranker = RelevanceRanker::new(&HashMap::new());
        let corpus = corpus();
        ranker.train(&corpus);

        let query = vec!["users".to_string()];
        let user_score = ranker.score(&query, &corpus[0]);
        let post_score = ranker.score(&query, &corpus[2]);

        assert!(user_score.total_score > 0.0 && user_score.total_score < 1.0);
        assert!(user_score.total_score > post_score.total_score);
        assert!(user_score.field_scores.contains_key("endpoint_path"));
    }

    #[test]
    fn test_deprecated_penalty_applies() {
        let mut ranker = RelevanceRanker::new(&HashMap::new());
        let mut corpus = corpus();
        ranker.train(&corpus);

        let clean = ranker.score(&["users".to_string()], &corpus[0]);
        corpus[0].deprecated = true;
        let deprecated = ranker.score(&["users".to_string()], &corpus[0]);

        assert!(deprecated.total_score < clean.total_score);
        assert!(deprecated.penalty_factors.contains_key("deprecated"));
    }

    #[test]
    fn test_boosts_reported() {
        let mut ranker = RelevanceRanker::new(&HashMap::new());
        let corpus = corpus();
        ranker.train(&corpus);
        let score = ranker.score(&["users".to_string()], &corpus[0]);
        assert!(score.boost_factors.contains_key("short_path"));
        assert!(score.boost_factors.contains_key("well_documented"));
        assert!(score.boost_factors.contains_key("common_method"));
    }

    #[test]
    fn test_rank_orders_best_first() {
        let mut ranker = RelevanceRanker::new(&HashMap::new());
        let corpus = corpus();
        ranker.train(&corpus);

        let ranked = ranker.rank(&["user".to_string(), "users".to_string()], corpus);
        assert_eq!(ranked.len(), 3);
        assert!(ranked[0].1.total_score >= ranked[1].1.total_score);
        assert!(ranked[0].0.endpoint_path.contains("users"));
    }

    #[test]
    fn test_explain_carries_trace() {
        let mut ranker = RelevanceRanker::new(&HashMap::new());
        let corpus = corpus();
        ranker.train(&corpus);

        let explained = ranker.explain(&["users".to_string()], &corpus[0]);
        assert!(!explained.trace.is_empty());
        assert!(explained.trace.iter().any(|line| line.contains("sigmoid")));

        let plain = ranker.score(&["users".to_string()], &corpus[0]);
        assert!(plain.trace.is_empty());
        assert!((plain.total_score - explained.total_score).abs() < 1e-9);
    }

    #[test]
    fn test_field_weight_overrides() {
        let overrides = HashMap::from([("endpoint_path".to_string(), 10.0)]);
        let mut heavy = RelevanceRanker::new(&overrides);
        let mut normal = RelevanceRanker::new(&HashMap::new());
        let corpus = corpus();
        heavy.train(&corpus);
        normal.train(&corpus);

        let query = vec!["users".to_string()];
        assert!(
            heavy.score(&query, &corpus[0]).total_score
                >= normal.score(&query, &corpus[0]).total_score
        );
    }

    #[test]
    fn test_untrained_ranker_still_scores() {
        let ranker = RelevanceRanker::new(&HashMap::new());
        let score = ranker.score(&["users".to_string()], &corpus()[0]);
        assert!(score.total_score > 0.0);
    }
}
