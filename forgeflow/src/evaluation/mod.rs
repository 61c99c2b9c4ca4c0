//! Multi-dimension quality evaluation.
//!
//! Four [`Evaluator`]s each score an artifact on one [`Dimension`]. The
//! [`EvaluationAggregator`] runs them concurrently, neutralises the ones that
//! fail, and combines the scores into an [`EvaluationResult`] with a weighted
//! overall score and an AND-gated pass flag. [`EvaluationMiddleware`] plugs
//! the aggregator into the hook registry.
//!
//! [`EvaluationResult`]: crate::core::EvaluationResult

mod aggregator;
mod complexity;
mod judge;
mod lint;
mod middleware;
mod security;

pub use aggregator::{EvaluationAggregator, NEUTRAL_SCORE};
pub use complexity::BranchComplexityAnalyzer;
pub use judge::ExecutorJudge;
pub use lint::LintStyleChecker;
pub use middleware::EvaluationMiddleware;
pub use security::{PatternSecurityScanner, SecurityRule, Severity};

use crate::config::{DimensionConfig, EvaluatorSettings};
use crate::errors::{ConfigError, EvaluatorError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A quality dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Vulnerable patterns.
    Security,
    /// Lint and style findings.
    StaticAnalysis,
    /// Structural complexity and maintainability.
    Complexity,
    /// Semantic judgement by a task executor.
    Judge,
}

impl Dimension {
    /// All dimensions.
    pub const ALL: [Self; 4] = [Self::Security, Self::StaticAnalysis, Self::Complexity, Self::Judge];

    /// Stable snake_case name, used as the subscore key.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::StaticAnalysis => "static_analysis",
            Self::Complexity => "complexity",
            Self::Judge => "judge",
        }
    }

    /// The configuration for this dimension.
    #[must_use]
    pub fn settings<'a>(&self, settings: &'a EvaluatorSettings) -> &'a DimensionConfig {
        match self {
            Self::Security => &settings.security,
            Self::StaticAnalysis => &settings.static_analysis,
            Self::Complexity => &settings.complexity,
            Self::Judge => &settings.judge,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weights of the four dimensions in the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Security weight.
    pub security: f64,
    /// Static-analysis weight.
    pub static_analysis: f64,
    /// Complexity weight.
    pub complexity: f64,
    /// Judge weight.
    pub judge: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            security: 0.30,
            static_analysis: 0.30,
            complexity: 0.20,
            judge: 0.20,
        }
    }
}

impl ScoreWeights {
    /// Reads the weights from evaluator settings.
    #[must_use]
    pub fn from_settings(settings: &EvaluatorSettings) -> Self {
        Self {
            security: settings.security.weight,
            static_analysis: settings.static_analysis.weight,
            complexity: settings.complexity.weight,
            judge: settings.judge.weight,
        }
    }

    /// Weight of a dimension.
    #[must_use]
    pub fn weight(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Security => self.security,
            Dimension::StaticAnalysis => self.static_analysis,
            Dimension::Complexity => self.complexity,
            Dimension::Judge => self.judge,
        }
    }

    /// Checks that weights are non-negative and sum to 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Dimension::ALL.iter().any(|d| self.weight(*d) < 0.0) {
            return Err(ConfigError::Invalid("score weights must be non-negative".to_string()));
        }
        let sum: f64 = Dimension::ALL.iter().map(|d| self.weight(*d)).sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "score weights must sum to 1.0, got {sum:.3}"
            )));
        }
        Ok(())
    }
}

/// One evaluator's findings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluatorReport {
    /// Score in [0, 1].
    pub score: f64,
    /// What the artifact does well, most important first.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// What it does badly, most important first.
    #[serde(default)]
    pub weaknesses: Vec<String>,
    /// Suggested improvements, most important first.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Evaluator-specific details.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl EvaluatorReport {
    /// Creates a report with a score clamped to [0, 1].
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// Adds a strength.
    #[must_use]
    pub fn strength(mut self, text: impl Into<String>) -> Self {
        self.strengths.push(text.into());
        self
    }

    /// Adds a weakness.
    #[must_use]
    pub fn weakness(mut self, text: impl Into<String>) -> Self {
        self.weaknesses.push(text.into());
        self
    }

    /// Adds a recommendation.
    #[must_use]
    pub fn recommend(mut self, text: impl Into<String>) -> Self {
        self.recommendations.push(text.into());
        self
    }

    /// Sets the details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Scores an artifact on one dimension.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// The dimension this evaluator scores.
    fn dimension(&self) -> Dimension;

    /// Scores the artifact. `context` is the task description, when known.
    async fn evaluate(
        &self,
        artifact: &str,
        context: Option<&str>,
    ) -> Result<EvaluatorReport, EvaluatorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_valid() {
        let weights = ScoreWeights::default();
        weights.validate().unwrap();
        assert_eq!(weights, ScoreWeights::from_settings(&EvaluatorSettings::default()));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = ScoreWeights {
            judge: 0.5,
            ..ScoreWeights::default()
        };
        assert!(weights.validate().is_err());

        let negative = ScoreWeights {
            security: -0.1,
            static_analysis: 0.7,
            ..ScoreWeights::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_report_score_clamped() {
        assert_eq!(EvaluatorReport::new(1.7).score, 1.0);
        assert_eq!(EvaluatorReport::new(-0.2).score, 0.0);
    }

    #[test]
    fn test_dimension_settings_lookup() {
        let settings = EvaluatorSettings::default();
        assert_eq!(Dimension::Judge.settings(&settings).timeout_seconds, 60.0);
        assert_eq!(Dimension::StaticAnalysis.settings(&settings).weight, 0.30);
        assert_eq!(Dimension::Security.to_string(), "security");
    }
}
