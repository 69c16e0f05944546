//! Query preprocessing.
//!
//! Turns a raw search string into a [`ProcessedQuery`]: normalized and
//! stemmed terms, field-scoped clauses, boolean operators, synonym
//! expansion, fuzzy candidates and (when results are thin) suggestions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Fields accepted in `<field>:<value>` clauses
pub const QUERY_FIELDS: &[&str] = &["path", "method", "param", "status", "response", "type", "auth"];

/// Terms too generic to search on. Domain-relevant words (api, auth, the
/// HTTP verbs) deliberately stay searchable.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "the", "a", "an", "of", "for", "to", "in", "on", "with", "is", "are", "was", "be",
        "this", "that", "it", "as", "at", "by", "from", "all", "my", "me", "how", "do", "i",
    ])
});

static SYNONYMS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        ("auth", &["authentication", "authorization", "login"][..]),
        ("authentication", &["auth", "authorization", "login"][..]),
        ("authorization", &["auth", "authentication"][..]),
        ("login", &["auth", "authentication", "signin"][..]),
        ("user", &["users", "user_id", "account"][..]),
        ("users", &["user", "user_id"][..]),
        ("create", &["add", "new", "post", "insert"][..]),
        ("delete", &["remove", "del"][..]),
        ("update", &["edit", "modify", "patch"][..]),
        ("get", &["fetch", "retrieve", "read"][..]),
        ("list", &["all", "index", "enumerate"][..]),
        ("search", &["find", "query", "lookup"][..]),
        ("error", &["errors", "fault", "failure"][..]),
        ("token", &["tokens", "credential"][..]),
    ])
});

static FIELD_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(path|method|param|status|response|type|auth):("([^"]*)"|(\S+))"#)
        .expect("field clause pattern")
});

/// Classification of a processed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Simple,
    Boolean,
    FieldSpecific,
    NaturalLanguage,
}

/// One proposed alternative query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySuggestion {
    pub suggestion: String,
    /// typo_fix | broader | refinement | template
    pub kind: &'static str,
    /// Estimated utility in 0..=1, higher first
    pub score: f64,
}

/// A fully preprocessed query
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedQuery {
    pub original: String,
    pub normalized_terms: Vec<String>,
    pub field_filters: BTreeMap<String, String>,
    /// operator ("and" | "or" | "not") → operand terms
    pub boolean_operators: BTreeMap<String, Vec<String>>,
    pub fuzzy_terms: Vec<String>,
    pub excluded_terms: Vec<String>,
    pub query_type: QueryType,
    /// normalized terms plus synonym expansion, deduplicated
    pub enhanced_terms: Vec<String>,
    pub suggestions: Vec<QuerySuggestion>,
}

/// Stateless query preprocessor with a config-extended synonym table
#[derive(Debug, Clone, Default)]
pub struct QueryProcessor {
    extra_synonyms: HashMap<String, Vec<String>>,
}

impl QueryProcessor {
    pub fn new(extra_synonyms: HashMap<String, Vec<String>>) -> Self {
        Self { extra_synonyms }
    }

    /// Process a raw query string. Empty or whitespace-only input is invalid.
    pub fn process(&self, query: &str) -> Result<ProcessedQuery, String> {
        if query.trim().is_empty() {
            return Err("Query cannot be empty".to_string());
        }

        let original = query.to_string();

        // Field clauses come out first, before punctuation stripping
        let mut field_filters = BTreeMap::new();
        let remainder = FIELD_CLAUSE
            .replace_all(query, |caps: &regex::Captures<'_>| {
                let field = caps[1].to_ascii_lowercase();
                let value = caps.get(3).or_else(|| caps.get(4)).map(|m| m.as_str()).unwrap_or("");
                field_filters.insert(field, value.to_string());
                String::new()
            })
            .into_owned();

        // Boolean operators next, on the raw remainder tokens
        let mut boolean_operators: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut excluded_terms = Vec::new();
        let raw_tokens: Vec<&str> = remainder.split_whitespace().collect();
        let mut content_tokens: Vec<String> = Vec::new();
        let mut index = 0;
        while index < raw_tokens.len() {
            let token = raw_tokens[index];
            match token.to_ascii_uppercase().as_str() {
                "AND" | "OR" => {
                    let op = token.to_ascii_lowercase();
                    let left = content_tokens.last().cloned();
                    let right = raw_tokens.get(index + 1).map(|t| normalize_token(t));
                    let operands = boolean_operators.entry(op).or_default();
                    if let Some(left) = left {
                        if !operands.contains(&left) {
                            operands.push(left);
                        }
                    }
                    if let Some(Some(right)) = right {
                        if !operands.contains(&right) {
                            operands.push(right);
                        }
                    }
                }
                "NOT" => {
                    if let Some(next) = raw_tokens.get(index + 1) {
                        if let Some(normalized) = normalize_token(next) {
                            boolean_operators
                                .entry("not".to_string())
                                .or_default()
                                .push(normalized.clone());
                            excluded_terms.push(normalized);
                        }
                        index += 2;
                        continue;
                    }
                }
                _ => {
                    if let Some(normalized) = normalize_token(token) {
                        content_tokens.push(normalized);
                    }
                }
            }
            index += 1;
        }

        // Stop-word removal and stemming
        let normalized_terms: Vec<String> = content_tokens
            .iter()
            .filter(|t| !STOP_WORDS.contains(t.as_str()))
            .map(|t| stem(t))
            .filter(|t| !t.is_empty())
            .collect();

        // Synonym expansion over the normalized set
        let mut enhanced: Vec<String> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for term in &normalized_terms {
            if seen.insert(term.clone()) {
                enhanced.push(term.clone());
            }
            for synonym in self.synonyms_for(term) {
                if seen.insert(synonym.clone()) {
                    enhanced.push(synonym);
                }
            }
        }

        let fuzzy_terms: Vec<String> =
            normalized_terms.iter().filter(|t| t.len() > 3).cloned().collect();

        let query_type = if !field_filters.is_empty() {
            QueryType::FieldSpecific
        } else if !boolean_operators.is_empty() {
            QueryType::Boolean
        } else if normalized_terms.len() >= 4 {
            QueryType::NaturalLanguage
        } else {
            QueryType::Simple
        };

        Ok(ProcessedQuery {
            original,
            normalized_terms,
            field_filters,
            boolean_operators,
            fuzzy_terms,
            excluded_terms,
            query_type,
            enhanced_terms: enhanced,
            suggestions: Vec::new(),
        })
    }

    fn synonyms_for(&self, term: &str) -> Vec<String> {
        let mut out: Vec<String> = SYNONYMS
            .get(term)
            .map(|list| list.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        if let Some(extra) = self.extra_synonyms.get(term) {
            out.extend(extra.iter().cloned());
        }
        out
    }

    /// Build an FTS5 MATCH expression from a processed query.
    ///
    /// Each original term becomes an OR-group with its synonyms; groups are
    /// ANDed; excluded terms are appended with NOT. Returns `None` when no
    /// positive terms survive preprocessing.
    pub fn build_fts_query(&self, processed: &ProcessedQuery) -> Option<String> {
        let groups: Vec<String> = processed
            .normalized_terms
            .iter()
            .map(|term| {
                let mut variants = vec![term.clone()];
                variants.extend(self.synonyms_for(term));
                // Prefix match on the stemmed term picks up plural/verb forms
                let quoted: Vec<String> = variants
                    .iter()
                    .map(|v| format!("\"{}\"", v.replace('"', "")))
                    .chain(std::iter::once(format!("\"{}\"*", term.replace('"', ""))))
                    .collect();
                format!("({})", quoted.join(" OR "))
            })
            .collect();

        if groups.is_empty() {
            return None;
        }

        let mut expression = groups.join(" AND ");
        for excluded in &processed.excluded_terms {
            expression.push_str(&format!(" NOT \"{}\"", excluded.replace('"', "")));
        }
        Some(expression)
    }

    /// Propose up to five alternative queries when results are thin
    pub fn suggest(
        &self,
        processed: &ProcessedQuery,
        vocabulary: &HashSet<String>,
        result_count: usize,
    ) -> Vec<QuerySuggestion> {
        if result_count > 3 {
            return Vec::new();
        }

        let mut suggestions: Vec<QuerySuggestion> = Vec::new();

        // Typo fixes against the index vocabulary
        for term in &processed.fuzzy_terms {
            if vocabulary.contains(term) {
                continue;
            }
            let mut best: Option<(usize, &String)> = None;
            for word in vocabulary {
                let distance = edit_distance(term, word);
                if distance > 0 && distance <= 2 {
                    if best.map_or(true, |(d, _)| distance < d) {
                        best = Some((distance, word));
                    }
                }
            }
            if let Some((distance, replacement)) = best {
                suggestions.push(QuerySuggestion {
                    suggestion: processed.original.replace(term.as_str(), replacement),
                    kind: "typo_fix",
                    score: 0.9 - 0.2 * (distance as f64 - 1.0),
                });
            }
        }

        // Broader query: drop the most specific (longest) term
        if processed.normalized_terms.len() > 1 {
            if let Some(longest) =
                processed.normalized_terms.iter().max_by_key(|t| t.len()).cloned()
            {
                let broader: Vec<String> = processed
                    .normalized_terms
                    .iter()
                    .filter(|t| **t != longest)
                    .cloned()
                    .collect();
                suggestions.push(QuerySuggestion {
                    suggestion: broader.join(" "),
                    kind: "broader",
                    score: 0.6,
                });
            }
        }

        // Refinement: scope the first term to a field
        if processed.field_filters.is_empty() {
            if let Some(first) = processed.normalized_terms.first() {
                suggestions.push(QuerySuggestion {
                    suggestion: format!("path:{first}"),
                    kind: "refinement",
                    score: 0.5,
                });
            }
        }

        // API-pattern templates
        if let Some(first) = processed.normalized_terms.first() {
            suggestions.push(QuerySuggestion {
                suggestion: format!("method:POST path:{first}"),
                kind: "template",
                score: 0.3,
            });
            suggestions.push(QuerySuggestion {
                suggestion: format!("method:GET {first}"),
                kind: "template",
                score: 0.25,
            });
        }

        suggestions.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        suggestions.truncate(5);
        suggestions
    }
}

/// Lowercase and strip punctuation, preserving `:`, `/`, `-`, `_` and `*`
fn normalize_token(token: &str) -> Option<String> {
    let cleaned: String = token
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ':' | '/' | '-' | '_' | '*' | '{' | '}'))
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Light suffix stemming for terms longer than four characters
fn stem(term: &str) -> String {
    if term.len() <= 4 || term.contains('/') || term.contains(':') {
        return term.to_string();
    }
    for suffix in ["ing", "ed"] {
        if let Some(stripped) = term.strip_suffix(suffix) {
            if stripped.len() >= 3 {
                return stripped.to_string();
            }
        }
    }
    if let Some(stripped) = term.strip_suffix('s') {
        if !stripped.ends_with('s') && stripped.len() >= 3 {
            return stripped.to_string();
        }
    }
    term.to_string()
}

/// Classic two-row Levenshtein distance
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> QueryProcessor {
        QueryProcessor::default()
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(processor().process("").is_err());
        assert!(processor().process("   ").is_err());
    }

    #[test]
    fn test_simple_query() {
        let processed = processor().process("user authentication").unwrap();
        assert_eq!(processed.query_type, QueryType::Simple);
        assert_eq!(processed.normalized_terms.len(), 2);
        assert!(processed.normalized_terms.contains(&"user".to_string()));
    }

    #[test]
    fn test_stemming_and_stop_words() {
        let processed = processor().process("the creating of endpoints").unwrap();
        assert!(processed.normalized_terms.contains(&"creat".to_string()));
        assert!(processed.normalized_terms.contains(&"endpoint".to_string()));
        assert!(!processed.normalized_terms.iter().any(|t| t == "the" || t == "of"));
    }

    #[test]
    fn test_domain_tokens_survive() {
        let processed = processor().process("api auth get post").unwrap();
        for term in ["api", "auth", "get", "post"] {
            assert!(
                processed.normalized_terms.contains(&term.to_string()),
                "{term} should survive"
            );
        }
    }

    #[test]
    fn test_boolean_parsing() {
        let processed = processor().process("user AND authentication").unwrap();
        assert_eq!(processed.query_type, QueryType::Boolean);
        assert_eq!(processed.boolean_operators["and"].len(), 2);

        let processed = processor().process("authentication NOT oauth").unwrap();
        assert_eq!(processed.query_type, QueryType::Boolean);
        assert_eq!(processed.excluded_terms, vec!["oauth".to_string()]);
        assert!(processed.boolean_operators["not"].contains(&"oauth".to_string()));
    }

    #[test]
    fn test_case_insensitive_boolean() {
        for query in ["user AND auth", "user and auth", "user And auth"] {
            let processed = processor().process(query).unwrap();
            assert_eq!(processed.query_type, QueryType::Boolean, "{query}");
        }
    }

    #[test]
    fn test_field_filters() {
        let processed = processor().process("path:/users method:POST auth:bearer create user").unwrap();
        assert_eq!(processed.query_type, QueryType::FieldSpecific);
        assert_eq!(processed.field_filters["path"], "/users");
        assert_eq!(processed.field_filters["method"], "POST");
        assert_eq!(processed.field_filters["auth"], "bearer");
        assert!(processed.normalized_terms.contains(&"create".to_string()));
    }

    #[test]
    fn test_quoted_field_value() {
        let processed = processor().process(r#"response:"application/json" type:object"#).unwrap();
        assert_eq!(processed.field_filters["response"], "application/json");
        assert_eq!(processed.field_filters["type"], "object");
    }

    #[test]
    fn test_synonym_expansion() {
        let processed = processor().process("auth user").unwrap();
        assert!(processed.enhanced_terms.len() > processed.normalized_terms.len());
        assert!(processed.enhanced_terms.iter().any(|t| t == "authentication"));
        // No duplicates
        let unique: BTreeSet<&String> = processed.enhanced_terms.iter().collect();
        assert_eq!(unique.len(), processed.enhanced_terms.len());
    }

    #[test]
    fn test_extra_synonyms_merge() {
        let extra = HashMap::from([(
            "campaign".to_string(),
            vec!["promo".to_string(), "advert".to_string()],
        )]);
        let processed = QueryProcessor::new(extra).process("campaign").unwrap();
        assert!(processed.enhanced_terms.contains(&"promo".to_string()));
    }

    #[test]
    fn test_fuzzy_terms_exclude_short() {
        let processed = processor().process("get put authentication parameter").unwrap();
        assert!(processed.fuzzy_terms.iter().all(|t| t.len() > 3));
        assert!(!processed.fuzzy_terms.contains(&"get".to_string()));
    }

    #[test]
    fn test_natural_language_classification() {
        let processed = processor().process("find endpoints returning user profile data").unwrap();
        assert_eq!(processed.query_type, QueryType::NaturalLanguage);
    }

    #[test]
    fn test_fts_query_shape() {
        let p = processor();
        let processed = p.process("user NOT oauth").unwrap();
        let fts = p.build_fts_query(&processed).unwrap();
        assert!(fts.contains("\"user\""));
        assert!(fts.contains("OR \"users\""));
        assert!(fts.ends_with("NOT \"oauth\""));

        let empty = p.process("the of").unwrap();
        assert!(p.build_fts_query(&empty).is_none());
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("user", "user"), 0);
        assert_eq!(edit_distance("user", "users"), 1);
        assert_eq!(edit_distance("statistic", "statistics"), 1);
        assert_eq!(edit_distance("abc", "xyz"), 3);
    }

    #[test]
    fn test_suggestions_typo_and_cap() {
        let p = processor();
        let processed = p.process("statistcs report").unwrap();
        let vocabulary: HashSet<String> =
            ["statistics", "report", "campaign"].iter().map(|s| s.to_string()).collect();

        let suggestions = p.suggest(&processed, &vocabulary, 0);
        assert!(!suggestions.is_empty());
        assert!(suggestions.len() <= 5);
        assert_eq!(suggestions[0].kind, "typo_fix");
        assert!(suggestions[0].suggestion.contains("statistics"));
        // Sorted by estimated utility
        for pair in suggestions.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_no_suggestions_when_results_plenty() {
        let p = processor();
        let processed = p.process("users").unwrap();
        assert!(p.suggest(&processed, &HashSet::new(), 10).is_empty());
    }
}
