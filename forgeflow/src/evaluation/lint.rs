//! Line-level style and code-smell checks.

use super::{Dimension, Evaluator, EvaluatorReport};
use crate::errors::EvaluatorError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;

fn bare_except() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*except\s*:").expect("valid regex"))
}

fn wildcard_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*from\s+\S+\s+import\s+\*").expect("valid regex"))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LintCounts {
    long_lines: usize,
    trailing_whitespace: usize,
    tab_indentation: usize,
    bare_except: usize,
    wildcard_import: usize,
}

impl LintCounts {
    fn style(&self) -> usize {
        self.long_lines + self.trailing_whitespace + self.tab_indentation
    }

    fn smells(&self) -> usize {
        self.bare_except + self.wildcard_import
    }
}

/// Counts style violations and code smells and maps them to a score.
///
/// Half the score comes from style violations (long lines, trailing
/// whitespace, tab indentation), which reach zero at
/// `max_style_violations`; the other half from smells (bare `except`,
/// wildcard imports), which reach zero at `max_smells`.
#[derive(Debug, Clone)]
pub struct LintStyleChecker {
    max_line_length: usize,
    max_style_violations: usize,
    max_smells: usize,
}

impl Default for LintStyleChecker {
    fn default() -> Self {
        Self {
            max_line_length: 100,
            max_style_violations: 20,
            max_smells: 10,
        }
    }
}

impl LintStyleChecker {
    /// Creates a checker with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum line length in characters.
    #[must_use]
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    fn count(&self, code: &str) -> LintCounts {
        let mut counts = LintCounts::default();
        for line in code.lines() {
            if line.chars().count() > self.max_line_length {
                counts.long_lines += 1;
            }
            if line.len() != line.trim_end().len() {
                counts.trailing_whitespace += 1;
            }
            if line.starts_with('\t') {
                counts.tab_indentation += 1;
            }
            if bare_except().is_match(line) {
                counts.bare_except += 1;
            }
            if wildcard_import().is_match(line) {
                counts.wildcard_import += 1;
            }
        }
        counts
    }
}

fn ratio_score(count: usize, max: usize) -> f64 {
    if max == 0 {
        return if count == 0 { 1.0 } else { 0.0 };
    }
    (1.0 - count as f64 / max as f64).max(0.0)
}

#[async_trait]
impl Evaluator for LintStyleChecker {
    fn dimension(&self) -> Dimension {
        Dimension::StaticAnalysis
    }

    async fn evaluate(
        &self,
        artifact: &str,
        _context: Option<&str>,
    ) -> Result<EvaluatorReport, EvaluatorError> {
        if artifact.trim().is_empty() {
            return Err(EvaluatorError::Unsupported {
                dimension: Dimension::StaticAnalysis.to_string(),
                reason: "empty artifact".to_string(),
            });
        }

        let counts = self.count(artifact);
        let style_score = ratio_score(counts.style(), self.max_style_violations);
        let smell_score = ratio_score(counts.smells(), self.max_smells);
        let score = 0.5 * smell_score + 0.5 * style_score;

        let mut report = EvaluatorReport::new(score).with_details(json!({
            "long_lines": counts.long_lines,
            "trailing_whitespace": counts.trailing_whitespace,
            "tab_indentation": counts.tab_indentation,
            "bare_except": counts.bare_except,
            "wildcard_import": counts.wildcard_import,
            "style_score": style_score,
            "smell_score": smell_score,
        }));

        if counts.smells() == 0 {
            report = report.strength("No bare except clauses or wildcard imports");
        }
        if counts.style() == 0 {
            report = report.strength("Consistent formatting");
        }

        let max_len = self.max_line_length;
        let findings = [
            (counts.bare_except, "bare except clause(s)", "Catch specific exception types"),
            (counts.wildcard_import, "wildcard import(s)", "Import names explicitly"),
            (counts.long_lines, "line(s) longer than the limit", "Wrap long lines"),
            (counts.trailing_whitespace, "line(s) with trailing whitespace", "Strip trailing whitespace"),
            (counts.tab_indentation, "line(s) indented with tabs", "Indent with spaces"),
        ];
        for (n, what, fix) in findings {
            if n > 0 {
                report = report.weakness(format!("{n} {what}"));
                report = report.recommend(fix);
            }
        }
        if counts.long_lines > 0 {
            report = report.recommend(format!("Keep lines within {max_len} characters"));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn check(code: &str) -> EvaluatorReport {
        LintStyleChecker::new().evaluate(code, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_clean_code() {
        let report = check("import os\n\n\ndef main():\n    return os.getcwd()\n").await;
        assert_eq!(report.score, 1.0);
        assert_eq!(report.strengths.len(), 2);
        assert!(report.weaknesses.is_empty());
    }

    #[tokio::test]
    async fn test_style_violations() {
        let long = format!("x = '{}'", "a".repeat(120));
        let code = format!("a = 1 \nb = 2\t\n{long}\n");
        let report = check(&code).await;

        assert_eq!(report.details["trailing_whitespace"], 2);
        assert_eq!(report.details["long_lines"], 1);
        assert!((report.score - 0.925).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_smells() {
        let code = "from os import *\ntry:\n    run()\nexcept:\n    pass\n";
        let report = check(code).await;

        assert_eq!(report.details["bare_except"], 1);
        assert_eq!(report.details["wildcard_import"], 1);
        assert!((report.score - 0.9).abs() < 1e-9);
        assert_eq!(report.weaknesses[0], "1 bare except clause(s)");
    }

    #[tokio::test]
    async fn test_tab_indentation_and_line_limit() {
        let checker = LintStyleChecker::new().with_max_line_length(10);
        let report = checker
            .evaluate("def f():\n\treturn 12345678901\n", None)
            .await
            .unwrap();
        assert_eq!(report.details["tab_indentation"], 1);
        assert_eq!(report.details["long_lines"], 1);
    }

    #[tokio::test]
    async fn test_empty_artifact_is_unsupported() {
        let err = LintStyleChecker::new().evaluate("   \n", None).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Unsupported { .. }));
    }

    #[test]
    fn test_ratio_score_bounds() {
        assert_eq!(ratio_score(0, 20), 1.0);
        assert_eq!(ratio_score(40, 20), 0.0);
        assert_eq!(ratio_score(1, 0), 0.0);
    }
}
