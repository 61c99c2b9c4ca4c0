//! Review verdict parsing.
//!
//! Reviewers are asked for a JSON verdict but often wrap it in prose or
//! return prose only. [`ReviewVerdict::parse`] reads the embedded JSON when
//! there is one and otherwise falls back to a keyword heuristic. Parsing
//! never fails.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

const ISSUE_KEYWORDS: [&str; 3] = ["critical", "bug", "issue"];

fn json_span() -> &'static Regex {
    static SPAN: OnceLock<Regex> = OnceLock::new();
    SPAN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"))
}

/// Which path decided the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// An embedded JSON object was parsed.
    Structured,
    /// The keyword heuristic was used.
    Heuristic,
}

/// The outcome of a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// Whether the reviewer reported issues worth a refine iteration.
    pub issues_found: bool,
    /// How the verdict was obtained.
    pub source: VerdictSource,
    /// Critical issues listed in a structured verdict.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_issues: Vec<String>,
    /// Suggestions listed in a structured verdict.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// The reviewer's own quality score, if given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

impl ReviewVerdict {
    /// Parses a review artifact.
    ///
    /// The span from the first `{` to the last `}` is tried as JSON; a
    /// missing `issues_found` field means no issues. If there is no span or
    /// it is not valid JSON, issues are found when the text mentions
    /// `critical`, `bug` or `issue` in any case.
    #[must_use]
    pub fn parse(output: &str) -> Self {
        if let Some(span) = json_span().find(output) {
            match serde_json::from_str::<Value>(span.as_str()) {
                Ok(Value::Object(map)) => {
                    return Self {
                        issues_found: map.get("issues_found").is_some_and(truthy),
                        source: VerdictSource::Structured,
                        critical_issues: string_list(map.get("critical_issues")),
                        suggestions: string_list(map.get("suggestions")),
                        quality_score: map.get("code_quality_score").and_then(Value::as_f64),
                    };
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Review verdict is not valid JSON, using keywords"),
            }
        }
        Self::heuristic(output)
    }

    fn heuristic(output: &str) -> Self {
        let lower = output.to_lowercase();
        Self {
            issues_found: ISSUE_KEYWORDS.iter().any(|k| lower.contains(k)),
            source: VerdictSource::Heuristic,
            critical_issues: Vec::new(),
            suggestions: Vec::new(),
            quality_score: None,
        }
    }

    /// Returns the verdict as a JSON value for the run context.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_verdict() {
        let output = r#"Here is my review:
{"issues_found": true, "critical_issues": ["eval() usage"], "suggestions": ["validate input"], "code_quality_score": 6}
Thanks."#;
        let verdict = ReviewVerdict::parse(output);

        assert!(verdict.issues_found);
        assert_eq!(verdict.source, VerdictSource::Structured);
        assert_eq!(verdict.critical_issues, vec!["eval() usage"]);
        assert_eq!(verdict.suggestions, vec!["validate input"]);
        assert_eq!(verdict.quality_score, Some(6.0));
    }

    #[test]
    fn test_structured_verdict_overrides_keywords() {
        let verdict = ReviewVerdict::parse(r#"{"issues_found": false, "notes": "no critical bug"}"#);
        assert!(!verdict.issues_found);
        assert_eq!(verdict.source, VerdictSource::Structured);
    }

    #[test]
    fn test_missing_field_means_no_issues() {
        let verdict = ReviewVerdict::parse(r#"{"code_quality_score": 9}"#);
        assert!(!verdict.issues_found);
        assert_eq!(verdict.source, VerdictSource::Structured);
    }

    #[test]
    fn test_malformed_json_falls_back_to_keywords() {
        let verdict = ReviewVerdict::parse("{issues_found: yes} there is a BUG in parse()");
        assert!(verdict.issues_found);
        assert_eq!(verdict.source, VerdictSource::Heuristic);
    }

    #[test]
    fn test_prose_without_keywords() {
        let verdict = ReviewVerdict::parse("Looks great, ship it.");
        assert!(!verdict.issues_found);
        assert_eq!(verdict.source, VerdictSource::Heuristic);
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        assert!(ReviewVerdict::parse("One Critical problem remains").issues_found);
        assert!(ReviewVerdict::parse("Several ISSUES noted").issues_found);
    }

    #[test]
    fn test_truthy_values() {
        assert!(ReviewVerdict::parse(r#"{"issues_found": 1}"#).issues_found);
        assert!(!ReviewVerdict::parse(r#"{"issues_found": null}"#).issues_found);
        assert!(ReviewVerdict::parse(r#"{"issues_found": "yes"}"#).issues_found);
    }

    #[test]
    fn test_to_value() {
        let value = ReviewVerdict::parse(r#"{"issues_found": true}"#).to_value();
        assert_eq!(value["issues_found"], true);
        assert_eq!(value["source"], "structured");
    }
}
