//! Concurrent evaluation and weighted, gated aggregation.

use super::{
    BranchComplexityAnalyzer, Dimension, Evaluator, EvaluatorReport, ExecutorJudge,
    LintStyleChecker, PatternSecurityScanner, ScoreWeights,
};
use crate::config::{EvaluationConfig, EvaluatorSettings};
use crate::core::EvaluationResult;
use crate::errors::EvaluatorError;
use crate::executor::TaskExecutor;
use futures::future::join_all;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info};

/// Score substituted for an evaluator that failed or timed out.
pub const NEUTRAL_SCORE: f64 = 0.5;

const FINDINGS_PER_EVALUATOR: usize = 2;
const FINDINGS_CAP: usize = 5;

/// Runs one evaluator per dimension and combines their scores.
#[derive(Clone)]
pub struct EvaluationAggregator {
    evaluators: Vec<Arc<dyn Evaluator>>,
    weights: ScoreWeights,
    settings: EvaluatorSettings,
    pass_threshold: f64,
}

impl std::fmt::Debug for EvaluationAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationAggregator")
            .field("dimensions", &self.dimensions())
            .field("weights", &self.weights)
            .field("pass_threshold", &self.pass_threshold)
            .finish()
    }
}

impl Default for EvaluationAggregator {
    fn default() -> Self {
        Self::from_config(&EvaluationConfig::default())
    }
}

impl EvaluationAggregator {
    /// Creates an aggregator with no evaluators, configured from `config`.
    #[must_use]
    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self {
            evaluators: Vec::new(),
            weights: ScoreWeights::from_settings(&config.evaluators),
            settings: config.evaluators.clone(),
            pass_threshold: config.pass_threshold,
        }
    }

    /// Creates an aggregator with the four built-in evaluators. The judge
    /// runs on `executor`.
    #[must_use]
    pub fn standard(config: &EvaluationConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        Self::from_config(config)
            .with_evaluator(Arc::new(PatternSecurityScanner::new()))
            .with_evaluator(Arc::new(LintStyleChecker::new()))
            .with_evaluator(Arc::new(BranchComplexityAnalyzer::new()))
            .with_evaluator(Arc::new(ExecutorJudge::new(executor)))
    }

    /// Adds an evaluator, replacing any evaluator of the same dimension.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        let dimension = evaluator.dimension();
        self.evaluators.retain(|e| e.dimension() != dimension);
        self.evaluators.push(evaluator);
        self
    }

    /// Overrides the pass threshold.
    #[must_use]
    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    /// Dimensions that have an evaluator.
    #[must_use]
    pub fn dimensions(&self) -> Vec<Dimension> {
        self.evaluators.iter().map(|e| e.dimension()).collect()
    }

    /// Runs every evaluator concurrently and aggregates the results.
    ///
    /// Evaluators that fail, time out or panic score [`NEUTRAL_SCORE`] and
    /// count towards `evaluators_failed`. The overall score is the weighted
    /// mean over the evaluated dimensions; the gate passes only if the
    /// overall score reaches the threshold and every dimension reaches its
    /// minimum.
    pub async fn evaluate(&self, artifact: &str, context: Option<&str>) -> EvaluationResult {
        let runs = self.evaluators.iter().map(|evaluator| {
            let dimension = evaluator.dimension();
            let timeout = dimension.settings(&self.settings).timeout();
            async move {
                let call = AssertUnwindSafe(evaluator.evaluate(artifact, context)).catch_unwind();
                let result = match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(EvaluatorError::failed(dimension.as_str(), "evaluator panicked")),
                    Err(_) => Err(EvaluatorError::Timeout {
                        dimension: dimension.to_string(),
                        timeout_seconds: timeout.as_secs_f64(),
                    }),
                };
                (dimension, result)
            }
        });
        let outcomes = join_all(runs).await;

        let mut scores: BTreeMap<Dimension, f64> = BTreeMap::new();
        let mut reports: Vec<EvaluatorReport> = Vec::new();
        let mut evaluators_failed = 0;
        for (dimension, result) in outcomes {
            match result {
                Ok(report) => {
                    scores.insert(dimension, report.score.clamp(0.0, 1.0));
                    reports.push(report);
                }
                Err(err) => {
                    error!(dimension = %dimension, error = %err, "Evaluator failed, using neutral score");
                    scores.insert(dimension, NEUTRAL_SCORE);
                    evaluators_failed += 1;
                }
            }
        }

        let total_weight: f64 = scores.keys().map(|d| self.weights.weight(*d)).sum();
        let overall = if total_weight > 0.0 {
            scores
                .iter()
                .map(|(d, s)| self.weights.weight(*d) * s)
                .sum::<f64>()
                / total_weight
        } else {
            0.0
        };

        // The gate reads the unrounded score; rounding is for reporting only.
        let all_above_min = scores
            .iter()
            .all(|(d, s)| *s >= d.settings(&self.settings).min_score);
        let passed = !scores.is_empty() && overall >= self.pass_threshold && all_above_min;

        let result = EvaluationResult {
            overall: round3(overall),
            subscores: scores
                .iter()
                .map(|(d, s)| (d.as_str().to_string(), round3(*s)))
                .collect(),
            passed,
            strengths: collect_findings(&reports, |r| &r.strengths),
            weaknesses: collect_findings(&reports, |r| &r.weaknesses),
            recommendations: collect_findings(&reports, |r| &r.recommendations),
            evaluators_run: reports.len(),
            evaluators_failed,
        };

        info!(
            overall = result.overall,
            passed = result.passed,
            evaluators_run = result.evaluators_run,
            evaluators_failed = result.evaluators_failed,
            "Evaluation complete"
        );
        result
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn collect_findings<F>(reports: &[EvaluatorReport], field: F) -> Vec<String>
where
    F: Fn(&EvaluatorReport) -> &Vec<String>,
{
    reports
        .iter()
        .flat_map(|r| field(r).iter().take(FINDINGS_PER_EVALUATOR).cloned())
        .take(FINDINGS_CAP)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingEvaluator, FixedEvaluator, HangingEvaluator};
    use pretty_assertions::assert_eq;

    fn aggregator(scores: [f64; 4]) -> EvaluationAggregator {
        Dimension::ALL
            .iter()
            .zip(scores)
            .fold(EvaluationAggregator::default(), |agg, (d, s)| {
                agg.with_evaluator(Arc::new(FixedEvaluator::new(*d, s)))
            })
    }

    #[tokio::test]
    async fn test_and_gate_blocks_single_zero() {
        let result = aggregator([1.0, 1.0, 1.0, 0.0]).evaluate("code", None).await;
        assert_eq!(result.overall, 0.8);
        assert!(!result.passed);
        assert_eq!(result.subscore("judge"), Some(0.0));
    }

    #[tokio::test]
    async fn test_all_good_scores_pass() {
        let result = aggregator([0.9, 0.8, 0.7, 0.8]).evaluate("code", None).await;
        assert_eq!(result.overall, 0.81);
        assert!(result.passed);
        assert_eq!(result.evaluators_run, 4);
        assert_eq!(result.evaluators_failed, 0);
    }

    #[tokio::test]
    async fn test_gate_uses_unrounded_overall() {
        // Weighted sum is 0.69996; it reports as 0.7 but is below the threshold.
        let result = aggregator([0.7, 0.7, 0.7, 0.6998]).evaluate("code", None).await;
        assert_eq!(result.overall, 0.7);
        assert!(!result.passed);

        let result = aggregator([0.7, 0.7, 0.7, 0.71]).evaluate("code", None).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_failing_evaluator_is_neutralised() {
        let agg = aggregator([1.0, 1.0, 1.0, 1.0])
            .with_evaluator(Arc::new(FailingEvaluator::new(Dimension::Complexity)));
        let result = agg.evaluate("code", None).await;

        assert_eq!(result.evaluators_failed, 1);
        assert_eq!(result.evaluators_run, 3);
        assert_eq!(result.subscore("complexity"), Some(NEUTRAL_SCORE));
        assert_eq!(result.overall, 0.9);
        // 0.5 is below the 0.6 minimum.
        assert!(!result.passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_evaluator_times_out() {
        let agg = aggregator([1.0, 1.0, 1.0, 1.0])
            .with_evaluator(Arc::new(HangingEvaluator::new(Dimension::Judge)));
        let result = agg.evaluate("code", Some("task")).await;

        assert_eq!(result.evaluators_failed, 1);
        assert_eq!(result.subscore("judge"), Some(NEUTRAL_SCORE));
    }

    #[tokio::test]
    async fn test_findings_top_two_per_evaluator_capped_at_five() {
        let mut agg = EvaluationAggregator::default();
        for d in Dimension::ALL {
            agg = agg.with_evaluator(Arc::new(
                FixedEvaluator::new(d, 0.9).with_strengths([
                    format!("{d} one"),
                    format!("{d} two"),
                    format!("{d} three"),
                ]),
            ));
        }
        let result = agg.evaluate("code", None).await;

        assert_eq!(result.strengths.len(), 5);
        assert_eq!(result.strengths[0], "security one");
        assert_eq!(result.strengths[1], "security two");
        assert_eq!(result.strengths[2], "static_analysis one");
        assert!(!result.strengths.iter().any(|s| s.ends_with("three")));
    }

    #[tokio::test]
    async fn test_no_evaluators_fails_gate() {
        let result = EvaluationAggregator::default().evaluate("code", None).await;
        assert!(!result.passed);
        assert_eq!(result.overall, 0.0);
        assert!(result.subscores.is_empty());
    }

    #[tokio::test]
    async fn test_missing_dimension_reweights() {
        let agg = EvaluationAggregator::default()
            .with_evaluator(Arc::new(FixedEvaluator::new(Dimension::Security, 1.0)))
            .with_evaluator(Arc::new(FixedEvaluator::new(Dimension::Complexity, 0.5)));
        let result = agg.evaluate("code", None).await;
        // (0.3 * 1.0 + 0.2 * 0.5) / 0.5
        assert_eq!(result.overall, 0.8);
        assert_eq!(agg.dimensions(), vec![Dimension::Security, Dimension::Complexity]);
    }
}
