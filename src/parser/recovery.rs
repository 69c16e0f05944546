//! Parse-fault classification and recovery.
//!
//! Raw decode failures and structural violations are folded into a closed
//! fault taxonomy; each class maps to an advisory recovery strategy the
//! pipeline may honor or override depending on its strict/non-strict policy.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Closed taxonomy of parse and structure faults
#[derive(Debug, Clone, PartialEq)]
pub enum ParseFault {
    TrailingComma,
    MissingDelimiter,
    UnterminatedString,
    PropertyNameMissing,
    ExtraData,
    InvalidRootType,
    MissingField(String),
    WrongType { path: String, expected: String, actual: String },
    InvalidPathName(String),
    InvalidMethod(String),
    Other,
}

impl ParseFault {
    /// Classify a serde_json decode error by its rendered message.
    ///
    /// serde_json does not expose error variants for these cases, so the
    /// mapping keys off the stable phrasing of its messages.
    pub fn classify_decode(error: &serde_json::Error) -> Self {
        let message = error.to_string();
        if message.contains("trailing comma") {
            ParseFault::TrailingComma
        } else if message.contains("trailing characters") {
            ParseFault::ExtraData
        } else if message.contains("EOF while parsing a string")
            || message.contains("unterminated string")
            || message.contains("control character")
        {
            ParseFault::UnterminatedString
        } else if message.contains("key must be a string") {
            ParseFault::PropertyNameMissing
        } else if message.contains("expected `,`")
            || message.contains("expected `:`")
            || message.contains("EOF while parsing")
        {
            ParseFault::MissingDelimiter
        } else {
            ParseFault::Other
        }
    }
}

/// What the caller should do about a fault. Advisory only.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    /// Abort immediately (strict mode default)
    FailFast,
    /// Drop the offending subtree and continue
    SkipSection,
    /// Substitute a default value
    UseDefault(Value),
    /// Attempt one automatic repair, then re-parse
    Retry,
    /// Accept what parsed so far
    PartialParse,
}

/// A recoverable error observed during parsing or structure validation
#[derive(Debug, Clone, PartialEq)]
pub struct ParseIssue {
    pub fault: ParseFault,
    pub message: String,
    pub path: Option<String>,
    pub line: Option<u64>,
    pub column: Option<u64>,
    pub suggestion: Option<String>,
}

impl ParseIssue {
    pub fn new(fault: ParseFault, message: impl Into<String>) -> Self {
        Self { fault, message: message.into(), path: None, line: None, column: None, suggestion: None }
    }

    pub fn at_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_location(mut self, line: u64, column: u64) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

/// Pick the advisory strategy for a fault class
pub fn strategy_for(fault: &ParseFault, strict: bool) -> RecoveryStrategy {
    if strict {
        return RecoveryStrategy::FailFast;
    }
    match fault {
        ParseFault::TrailingComma | ParseFault::UnterminatedString => RecoveryStrategy::Retry,
        ParseFault::ExtraData => RecoveryStrategy::PartialParse,
        ParseFault::MissingDelimiter | ParseFault::PropertyNameMissing => RecoveryStrategy::FailFast,
        ParseFault::InvalidRootType => RecoveryStrategy::FailFast,
        ParseFault::MissingField(_) => RecoveryStrategy::UseDefault(Value::Null),
        ParseFault::WrongType { .. } => RecoveryStrategy::SkipSection,
        ParseFault::InvalidPathName(_) | ParseFault::InvalidMethod(_) => RecoveryStrategy::SkipSection,
        ParseFault::Other => RecoveryStrategy::FailFast,
    }
}

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma pattern"));

/// Remove trailing commas before closing braces/brackets.
///
/// Only touches commas outside string literals; string contents are masked
/// before the regex pass and restored afterwards.
pub fn repair_trailing_commas(input: &str) -> String {
    let (masked, literals) = mask_strings(input);
    let repaired = TRAILING_COMMA.replace_all(&masked, "$1").into_owned();
    unmask_strings(&repaired, &literals)
}

/// Escape bare interior quotes in obviously-broken string values.
///
/// Heuristic only: a quote followed by a non-delimiter, non-whitespace
/// character inside a value is treated as literal and escaped.
pub fn repair_unescaped_quotes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        let c = b as char;
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => {
                out.push(c);
                escaped = true;
            }
            '"' => {
                if in_string {
                    // Closing quote only if what follows can legally follow a string
                    let next = bytes[i + 1..]
                        .iter()
                        .map(|&b| b as char)
                        .find(|c| !c.is_whitespace());
                    match next {
                        Some(',') | Some('}') | Some(']') | Some(':') | None => {
                            in_string = false;
                            out.push('"');
                        }
                        _ => out.push_str("\\\""),
                    }
                } else {
                    in_string = true;
                    out.push('"');
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn mask_strings(input: &str) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(input.len());
    let mut literals = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '"' {
            masked.push(c);
            continue;
        }
        let mut literal = String::from('"');
        let mut escaped = false;
        for c in chars.by_ref() {
            literal.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                break;
            }
        }
        masked.push_str(&format!("\u{1}{}\u{1}", literals.len()));
        literals.push(literal);
    }
    (masked, literals)
}

fn unmask_strings(masked: &str, literals: &[String]) -> String {
    let mut out = String::with_capacity(masked.len());
    let mut rest = masked;
    while let Some(start) = rest.find('\u{1}') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('\u{1}').unwrap_or(after.len());
        if let Ok(idx) = after[..end].parse::<usize>() {
            if let Some(lit) = literals.get(idx) {
                out.push_str(lit);
            }
        }
        rest = &after[(end + 1).min(after.len())..];
    }
    out.push_str(rest);
    out
}

/// Collects recoverable issues up to a bound; aborts past it
#[derive(Debug)]
pub struct IssueAccumulator {
    issues: Vec<ParseIssue>,
    max_issues: usize,
    strict: bool,
}

impl IssueAccumulator {
    pub fn new(max_issues: usize, strict: bool) -> Self {
        Self { issues: Vec::new(), max_issues, strict }
    }

    /// Record an issue. Returns `false` when parsing must abort.
    pub fn record(&mut self, issue: ParseIssue) -> bool {
        self.issues.push(issue);
        if self.strict {
            return false;
        }
        self.issues.len() < self.max_issues
    }

    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ParseIssue> {
        self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_trailing_characters() {
        let err = serde_json::from_str::<Value>("{} extra").unwrap_err();
        assert_eq!(ParseFault::classify_decode(&err), ParseFault::ExtraData);
    }

    #[test]
    fn test_classify_missing_delimiter() {
        let err = serde_json::from_str::<Value>("{\"a\" 1}").unwrap_err();
        assert_eq!(ParseFault::classify_decode(&err), ParseFault::MissingDelimiter);
    }

    #[test]
    fn test_repair_trailing_commas() {
        let broken = r#"{"a": [1, 2, 3,], "b": {"c": 1,},}"#;
        let repaired = repair_trailing_commas(broken);
        let value: Value = serde_json::from_str(&repaired).expect("repaired JSON parses");
        assert_eq!(value["a"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_repair_leaves_string_contents_alone() {
        let input = r#"{"msg": "tuples like (1,) stay,]"}"#;
        let repaired = repair_trailing_commas(input);
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["msg"], "tuples like (1,) stay,]");
    }

    #[test]
    fn test_repair_unescaped_quotes() {
        let broken = r#"{"title": "The "Best" API"}"#;
        let repaired = repair_unescaped_quotes(broken);
        let value: Value = serde_json::from_str(&repaired).expect("repaired JSON parses");
        assert_eq!(value["title"], r#"The "Best" API"#);
    }

    #[test]
    fn test_strict_mode_always_fails_fast() {
        for fault in [
            ParseFault::TrailingComma,
            ParseFault::ExtraData,
            ParseFault::MissingField("info".to_string()),
        ] {
            assert_eq!(strategy_for(&fault, true), RecoveryStrategy::FailFast);
        }
    }

    #[test]
    fn test_lenient_strategies() {
        assert_eq!(strategy_for(&ParseFault::TrailingComma, false), RecoveryStrategy::Retry);
        assert_eq!(strategy_for(&ParseFault::ExtraData, false), RecoveryStrategy::PartialParse);
        assert_eq!(
            strategy_for(&ParseFault::InvalidMethod("FETCH".to_string()), false),
            RecoveryStrategy::SkipSection
        );
    }

    #[test]
    fn test_accumulator_bounds() {
        let mut acc = IssueAccumulator::new(2, false);
        assert!(acc.record(ParseIssue::new(ParseFault::TrailingComma, "one")));
        assert!(!acc.record(ParseIssue::new(ParseFault::TrailingComma, "two")));
        assert_eq!(acc.issues().len(), 2);
    }

    #[test]
    fn test_accumulator_strict_aborts_immediately() {
        let mut acc = IssueAccumulator::new(100, true);
        assert!(!acc.record(ParseIssue::new(ParseFault::ExtraData, "any")));
    }
}
