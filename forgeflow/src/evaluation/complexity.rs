//! Cyclomatic complexity and maintainability estimation.
//!
//! Functions are found by their headers (`def`, `fn`, `function`, `func`) and
//! span until the next header. Each function's complexity is one plus the
//! number of decision points in its body. Maintainability follows the
//! classic index over Halstead volume, total complexity and line count.

use super::{Dimension, Evaluator, EvaluatorReport};
use crate::errors::EvaluatorError;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::OnceLock;

fn function_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:def|fn|function|func)\s+([A-Za-z_]\w*)",
        )
        .expect("valid regex")
    })
}

fn decision_point() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:if|elif|for|while|case|and|or|except|catch)\b|&&|\|\||\?")
            .expect("valid regex")
    })
}

fn token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+|[^\s\w]").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct FunctionComplexity {
    name: String,
    line: usize,
    complexity: usize,
    rank: char,
}

fn rank(complexity: usize) -> char {
    match complexity {
        0..=5 => 'A',
        6..=10 => 'B',
        11..=20 => 'C',
        21..=30 => 'D',
        31..=40 => 'E',
        _ => 'F',
    }
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#') || trimmed.starts_with("//")
}

fn decisions(line: &str) -> usize {
    if is_comment(line) {
        0
    } else {
        decision_point().find_iter(line).count()
    }
}

/// Score for the average complexity across functions.
fn average_band(avg: f64) -> f64 {
    if avg <= 5.0 {
        1.0
    } else if avg <= 10.0 {
        0.9
    } else if avg <= 20.0 {
        0.7
    } else if avg <= 30.0 {
        0.4
    } else {
        0.0
    }
}

/// Score for the most complex function.
fn max_band(max: usize) -> f64 {
    match max {
        0..=9 => 1.0,
        10..=19 => 0.7,
        20..=29 => 0.4,
        _ => 0.0,
    }
}

/// Estimates structural complexity from decision points.
#[derive(Debug, Clone)]
pub struct BranchComplexityAnalyzer {
    max_acceptable_complexity: usize,
    min_maintainability: f64,
}

impl Default for BranchComplexityAnalyzer {
    fn default() -> Self {
        Self {
            max_acceptable_complexity: 10,
            min_maintainability: 20.0,
        }
    }
}

impl BranchComplexityAnalyzer {
    /// Creates an analyzer with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the complexity above which a function is reported.
    #[must_use]
    pub fn with_max_acceptable_complexity(mut self, max: usize) -> Self {
        self.max_acceptable_complexity = max;
        self
    }

    fn functions(code: &str) -> Vec<FunctionComplexity> {
        let mut functions: Vec<FunctionComplexity> = Vec::new();
        for (index, line) in code.lines().enumerate() {
            if let Some(caps) = function_header().captures(line) {
                functions.push(FunctionComplexity {
                    name: caps[1].to_string(),
                    line: index + 1,
                    complexity: 1 + decisions(line),
                    rank: 'A',
                });
            } else if let Some(current) = functions.last_mut() {
                current.complexity += decisions(line);
            }
        }
        for f in &mut functions {
            f.rank = rank(f.complexity);
        }
        functions
    }

    fn maintainability_index(code: &str, total_complexity: usize) -> f64 {
        let tokens: Vec<&str> = token().find_iter(code).map(|m| m.as_str()).collect();
        let distinct: HashSet<&str> = tokens.iter().copied().collect();
        let vocabulary = distinct.len().max(2) as f64;
        let volume = (tokens.len() as f64 * vocabulary.log2()).max(1.0);
        let loc = code
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count()
            .max(1) as f64;

        let raw = 171.0 - 5.2 * volume.ln() - 0.23 * total_complexity as f64 - 16.2 * loc.ln();
        (raw * 100.0 / 171.0).clamp(0.0, 100.0)
    }
}

#[async_trait]
impl Evaluator for BranchComplexityAnalyzer {
    fn dimension(&self) -> Dimension {
        Dimension::Complexity
    }

    async fn evaluate(
        &self,
        artifact: &str,
        _context: Option<&str>,
    ) -> Result<EvaluatorReport, EvaluatorError> {
        if artifact.trim().is_empty() {
            return Err(EvaluatorError::Unsupported {
                dimension: Dimension::Complexity.to_string(),
                reason: "empty artifact".to_string(),
            });
        }

        let functions = Self::functions(artifact);
        let (avg, max, total) = if functions.is_empty() {
            let module = 1 + artifact.lines().map(decisions).sum::<usize>();
            (1.0, 1, module)
        } else {
            let total: usize = functions.iter().map(|f| f.complexity).sum();
            let max = functions.iter().map(|f| f.complexity).max().unwrap_or(1);
            (total as f64 / functions.len() as f64, max, total)
        };

        let mi = Self::maintainability_index(artifact, total);
        let score = 0.6 * (mi / 100.0) + 0.25 * average_band(avg) + 0.15 * max_band(max);
        let score = (score * 1000.0).round() / 1000.0;

        let high: Vec<&FunctionComplexity> = functions
            .iter()
            .filter(|f| f.complexity > self.max_acceptable_complexity)
            .collect();

        let mut report = EvaluatorReport::new(score).with_details(json!({
            "functions": functions.len(),
            "average_complexity": (avg * 100.0).round() / 100.0,
            "max_complexity": max,
            "maintainability_index": (mi * 100.0).round() / 100.0,
            "high_complexity": high,
        }));

        if !functions.is_empty() && high.is_empty() {
            report = report.strength("All functions have manageable cyclomatic complexity");
        }
        if mi >= self.min_maintainability {
            report = report.strength(format!("Maintainability index {mi:.1}"));
        } else {
            report = report.weakness(format!("Low maintainability index ({mi:.1})"));
        }
        for f in &high {
            report = report.weakness(format!(
                "Function '{}' (line {}) has cyclomatic complexity {}",
                f.name, f.line, f.complexity
            ));
            report = report.recommend(format!("Split '{}' into smaller functions", f.name));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands() {
        assert_eq!(average_band(5.0), 1.0);
        assert_eq!(average_band(10.0), 0.9);
        assert_eq!(average_band(10.5), 0.7);
        assert_eq!(average_band(30.0), 0.4);
        assert_eq!(average_band(31.0), 0.0);

        assert_eq!(max_band(9), 1.0);
        assert_eq!(max_band(10), 0.7);
        assert_eq!(max_band(29), 0.4);
        assert_eq!(max_band(30), 0.0);
    }

    #[test]
    fn test_function_detection_across_languages() {
        let code = "def a():\n    if x and y:\n        pass\n\npub async fn b() {\n    while go {}\n}\nfunction c() { return p || q; }\n";
        let functions = BranchComplexityAnalyzer::functions(code);
        let summary: Vec<_> = functions.iter().map(|f| (f.name.as_str(), f.complexity)).collect();
        assert_eq!(summary, vec![("a", 3), ("b", 2), ("c", 2)]);
    }

    #[test]
    fn test_comments_do_not_count() {
        let functions = BranchComplexityAnalyzer::functions("def f():\n    # if this or that\n    return 1\n");
        assert_eq!(functions[0].complexity, 1);
    }

    #[tokio::test]
    async fn test_simple_code_scores_high() {
        let report = BranchComplexityAnalyzer::new()
            .evaluate("def add(a, b):\n    return a + b\n", None)
            .await
            .unwrap();
        assert!(report.score > 0.85, "score {}", report.score);
        assert_eq!(report.details["functions"], 1);
        assert_eq!(report.details["max_complexity"], 1);
        assert!(report.weaknesses.is_empty());
    }

    #[tokio::test]
    async fn test_branchy_function_reported() {
        let mut code = String::from("def tangled(x):\n");
        for i in 0..25 {
            code.push_str(&format!("    if x == {i}:\n        return {i}\n"));
        }
        let report = BranchComplexityAnalyzer::new().evaluate(&code, None).await.unwrap();

        assert_eq!(report.details["max_complexity"], 26);
        assert!(report.score < 0.8);
        assert!(report.weaknesses.iter().any(|w| w.contains("'tangled'")));
        assert_eq!(report.recommendations, vec!["Split 'tangled' into smaller functions"]);
    }

    #[tokio::test]
    async fn test_module_without_functions() {
        let report = BranchComplexityAnalyzer::new()
            .evaluate("x = 1\ny = 2\n", None)
            .await
            .unwrap();
        assert_eq!(report.details["functions"], 0);
        assert_eq!(report.details["average_complexity"], 1.0);
    }

    #[tokio::test]
    async fn test_empty_artifact_is_unsupported() {
        let err = BranchComplexityAnalyzer::new().evaluate("", None).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Unsupported { .. }));
    }
}
