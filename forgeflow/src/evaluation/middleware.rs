//! Hook middleware that runs the evaluation aggregator.

use super::EvaluationAggregator;
use crate::config::EvaluationConfig;
use crate::context::keys;
use crate::errors::MiddlewareError;
use crate::hooks::{HookContext, HookPoint, Middleware, MiddlewareOutcome};
use crate::observability::SpanTimer;
use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

/// Evaluates the implementation at its subscribed hooks.
///
/// The artifact is the hook output's `code` field, falling back to
/// `final_implementation` in the run context. When neither is present the
/// middleware passes without an evaluation. Otherwise the outcome carries
/// the aggregator's raw pass flag; whether a failure halts the run is the
/// pipeline's decision.
#[derive(Debug, Clone)]
pub struct EvaluationMiddleware {
    aggregator: EvaluationAggregator,
    hooks: Vec<HookPoint>,
    enabled: bool,
}

impl EvaluationMiddleware {
    /// Subscribes to `PostRefiner` only.
    #[must_use]
    pub fn new(aggregator: EvaluationAggregator) -> Self {
        Self {
            aggregator,
            hooks: vec![HookPoint::PostRefiner],
            enabled: true,
        }
    }

    /// Takes hook subscriptions and the enabled flag from configuration.
    #[must_use]
    pub fn from_config(config: &EvaluationConfig, aggregator: EvaluationAggregator) -> Self {
        let mut hooks = Vec::new();
        if config.hooks.post_refiner {
            hooks.push(HookPoint::PostRefiner);
        }
        if config.hooks.post_documenter {
            hooks.push(HookPoint::PostDocumenter);
        }
        Self {
            aggregator,
            hooks,
            enabled: config.enabled,
        }
    }
}

#[async_trait]
impl Middleware for EvaluationMiddleware {
    fn name(&self) -> &str {
        "evaluation"
    }

    fn hooks(&self) -> Vec<HookPoint> {
        self.hooks.clone()
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn execute(&self, ctx: &HookContext) -> Result<MiddlewareOutcome, MiddlewareError> {
        let Some(code) = ctx.text("code").or_else(|| ctx.text(keys::FINAL_IMPLEMENTATION)) else {
            warn!(hook = %ctx.hook, "No code to evaluate");
            return Ok(MiddlewareOutcome::pass());
        };
        let task = ctx.text(keys::ORIGINAL_REQUEST);

        let timer = SpanTimer::start(format!("evaluation.{}", ctx.hook));
        let result = self.aggregator.evaluate(code, task).await;
        let duration_ms = timer.finish();

        info!(
            hook = %ctx.hook,
            overall = result.overall,
            passed = result.passed,
            duration_ms,
            "Quality evaluation finished"
        );

        let metadata = json!({
            "hook": ctx.hook,
            "stage": ctx.stage,
            "artifact_chars": code.chars().count(),
            "evaluators_run": result.evaluators_run,
            "evaluators_failed": result.evaluators_failed,
            "duration_ms": duration_ms,
        });
        Ok(MiddlewareOutcome::evaluated(result).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluationHooks;
    use crate::evaluation::Dimension;
    use crate::testing::FixedEvaluator;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use uuid::Uuid;

    fn aggregator(score: f64) -> EvaluationAggregator {
        Dimension::ALL.iter().fold(EvaluationAggregator::default(), |agg, d| {
            agg.with_evaluator(Arc::new(FixedEvaluator::new(*d, score)))
        })
    }

    fn hook(output: serde_json::Value, context: BTreeMap<String, serde_json::Value>) -> HookContext {
        HookContext::new(Uuid::new_v4(), HookPoint::PostRefiner, "refinement")
            .with_output(output)
            .with_context(context)
    }

    #[tokio::test]
    async fn test_evaluates_code_field() {
        let mw = EvaluationMiddleware::new(aggregator(0.9));
        let outcome = mw.execute(&hook(json!({"code": "def f(): pass"}), BTreeMap::new())).await.unwrap();

        assert!(outcome.passed);
        let evaluation = outcome.evaluation.unwrap();
        assert_eq!(evaluation.overall, 0.9);
        assert_eq!(outcome.metadata.unwrap()["artifact_chars"], 13);
    }

    #[tokio::test]
    async fn test_falls_back_to_final_implementation() {
        let mw = EvaluationMiddleware::new(aggregator(0.4));
        let context = BTreeMap::from([(keys::FINAL_IMPLEMENTATION.to_string(), json!("x = 1"))]);
        let outcome = mw.execute(&hook(json!({"documentation": "docs"}), context)).await.unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.evaluation.unwrap().overall, 0.4);
    }

    #[tokio::test]
    async fn test_no_code_passes_without_evaluation() {
        let mw = EvaluationMiddleware::new(aggregator(0.1));
        let outcome = mw.execute(&hook(json!({"code": ""}), BTreeMap::new())).await.unwrap();

        assert_eq!(outcome, MiddlewareOutcome::pass());
    }

    #[test]
    fn test_hooks_from_config() {
        let config = EvaluationConfig::default().with_hooks(EvaluationHooks {
            post_refiner: true,
            post_documenter: true,
        });
        let mw = EvaluationMiddleware::from_config(&config, aggregator(1.0));
        assert_eq!(mw.hooks(), vec![HookPoint::PostRefiner, HookPoint::PostDocumenter]);
        assert!(mw.should_execute(HookPoint::PostDocumenter));
        assert!(!mw.should_execute(HookPoint::PostCoder));

        let disabled = EvaluationConfig { enabled: false, ..EvaluationConfig::default() };
        let mw = EvaluationMiddleware::from_config(&disabled, aggregator(1.0));
        assert!(!mw.should_execute(HookPoint::PostRefiner));
    }
}
