//! Semantic judgement delegated to the task executor.

use super::{Dimension, Evaluator, EvaluatorReport};
use crate::core::AgentRole;
use crate::errors::EvaluatorError;
use crate::executor::{is_error_output, TaskExecutor};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Verdict {
    score: f64,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Asks the executor, in the `judge` role, to score the artifact out of 10.
///
/// The executor must answer with a JSON object, optionally inside a
/// ```` ```json ```` fence:
///
/// ```json
/// {"score": 8, "strengths": ["..."], "weaknesses": ["..."], "suggestions": ["..."]}
/// ```
pub struct ExecutorJudge {
    executor: Arc<dyn TaskExecutor>,
}

impl std::fmt::Debug for ExecutorJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorJudge").finish_non_exhaustive()
    }
}

impl ExecutorJudge {
    /// Creates a judge backed by `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self { executor }
    }

    fn prompt(artifact: &str, context: Option<&str>) -> String {
        let task = context.unwrap_or("(no task description provided)");
        format!(
            "You are reviewing code written for the following task:\n{task}\n\n\
             Code:\n```\n{artifact}\n```\n\n\
             Judge correctness, best practices, readability, edge-case handling \
             and design. Respond with only a JSON object of the form \
             {{\"score\": <0-10>, \"strengths\": [...], \"weaknesses\": [...], \"suggestions\": [...]}}."
        )
    }

    fn parse(answer: &str) -> Result<Verdict, EvaluatorError> {
        let body = match answer.split_once("```json") {
            Some((_, rest)) => rest.split("```").next().unwrap_or(rest),
            None => answer,
        };
        let start = body.find('{');
        let end = body.rfind('}');
        let json = match (start, end) {
            (Some(s), Some(e)) if s < e => &body[s..=e],
            _ => {
                return Err(EvaluatorError::failed(
                    Dimension::Judge.as_str(),
                    "judge answer contained no JSON object",
                ))
            }
        };
        serde_json::from_str(json).map_err(|err| {
            EvaluatorError::failed(Dimension::Judge.as_str(), format!("invalid judge JSON: {err}"))
        })
    }
}

#[async_trait]
impl Evaluator for ExecutorJudge {
    fn dimension(&self) -> Dimension {
        Dimension::Judge
    }

    async fn evaluate(
        &self,
        artifact: &str,
        context: Option<&str>,
    ) -> Result<EvaluatorReport, EvaluatorError> {
        let prompt = Self::prompt(artifact, context);
        let answer = self
            .executor
            .execute(AgentRole::Judge, &prompt)
            .await
            .map_err(|err| EvaluatorError::failed(Dimension::Judge.as_str(), err.to_string()))?;

        if is_error_output(&answer) {
            return Err(EvaluatorError::failed(Dimension::Judge.as_str(), answer));
        }

        let verdict = Self::parse(&answer)?;
        if !verdict.score.is_finite() {
            return Err(EvaluatorError::failed(Dimension::Judge.as_str(), "score is not a number"));
        }
        debug!(raw_score = verdict.score, "Judge verdict parsed");

        let mut report = EvaluatorReport::new(verdict.score / 10.0)
            .with_details(json!({ "raw_score": verdict.score }));
        report.strengths = verdict.strengths;
        report.weaknesses = verdict.weaknesses;
        report.recommendations = verdict.suggestions;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExecutorError;
    use crate::executor::MockTaskExecutor;
    use mockall::predicate;

    fn judge_answering(answer: &'static str) -> ExecutorJudge {
        let mut mock = MockTaskExecutor::new();
        mock.expect_execute()
            .with(predicate::eq(AgentRole::Judge), predicate::str::contains("sort the list"))
            .times(1)
            .returning(move |_, _| Ok(answer.to_string()));
        ExecutorJudge::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_plain_json_verdict() {
        let judge = judge_answering(
            r#"{"score": 8, "strengths": ["clear"], "weaknesses": ["no tests"], "suggestions": ["add tests"]}"#,
        );
        let report = judge.evaluate("def f(): pass", Some("sort the list")).await.unwrap();

        assert_eq!(report.score, 0.8);
        assert_eq!(report.strengths, vec!["clear"]);
        assert_eq!(report.recommendations, vec!["add tests"]);
    }

    #[tokio::test]
    async fn test_fenced_verdict_with_prose() {
        let judge = judge_answering("Here you go:\n```json\n{\"score\": 6.5}\n```\nThanks!");
        let report = judge.evaluate("code", Some("sort the list")).await.unwrap();
        assert_eq!(report.score, 0.65);
        assert!(report.weaknesses.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_score_clamped() {
        let judge = judge_answering(r#"{"score": 14}"#);
        let report = judge.evaluate("code", Some("sort the list")).await.unwrap();
        assert_eq!(report.score, 1.0);
    }

    #[tokio::test]
    async fn test_unparseable_answer_fails() {
        let judge = judge_answering("looks fine to me");
        let err = judge.evaluate("code", Some("sort the list")).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_executor_error_fails() {
        let mut mock = MockTaskExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Err(ExecutorError::Unavailable { role: "judge".to_string() }));
        let judge = ExecutorJudge::new(Arc::new(mock));

        let err = judge.evaluate("code", None).await.unwrap_err();
        assert!(err.to_string().contains("judge"));
    }
}
