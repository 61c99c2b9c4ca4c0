//! Test doubles for executors and evaluators.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::AgentRole;
use crate::errors::{EvaluatorError, ExecutorError};
use crate::evaluation::{Dimension, Evaluator, EvaluatorReport};
use crate::executor::TaskExecutor;

/// Design text that passes the design stage's success check.
pub const SAMPLE_DESIGN: &str = "## Architecture\n\
The system is split into a parser component and an evaluator component. \
The parser tokenises the input; the evaluator walks the syntax tree and returns the result.";

/// An implementation answer with a fenced code block.
pub const SAMPLE_CODE: &str = "Here is the implementation:\n```python\n\
def evaluate(expression: str) -> float:\n    tokens = tokenize(expression)\n    return parse(tokens).value()\n```";

/// Documentation text.
pub const SAMPLE_DOCS: &str = "# Usage\nCall `evaluate(\"1 + 2\")` to compute an expression.";

/// A judge answer scoring 9/10.
pub const SAMPLE_JUDGE: &str =
    r#"{"score": 9, "strengths": ["clear structure"], "weaknesses": [], "suggestions": []}"#;

/// A structured review verdict.
#[must_use]
pub fn review_verdict(issues_found: bool) -> String {
    if issues_found {
        r#"{"issues_found": true, "critical_issues": ["unvalidated input"], "suggestions": ["validate input"], "code_quality_score": 5}"#.to_string()
    } else {
        r#"{"issues_found": false, "critical_issues": [], "suggestions": [], "code_quality_score": 9}"#.to_string()
    }
}

/// An executor that answers from per-role scripts.
///
/// Scripted answers are consumed in order; once a role's script is empty
/// the role's default answer is returned. Every call is recorded.
#[derive(Debug)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<AgentRole, VecDeque<Result<String, ExecutorError>>>>,
    defaults: HashMap<AgentRole, String>,
    calls: Mutex<Vec<(AgentRole, String)>>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        let defaults = HashMap::from([
            (AgentRole::Architect, SAMPLE_DESIGN.to_string()),
            (AgentRole::Coder, SAMPLE_CODE.to_string()),
            (AgentRole::Reviewer, review_verdict(false)),
            (AgentRole::Documenter, SAMPLE_DOCS.to_string()),
            (AgentRole::Judge, SAMPLE_JUDGE.to_string()),
        ]);
        Self {
            scripts: Mutex::new(HashMap::new()),
            defaults,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedExecutor {
    /// Creates an executor whose defaults complete a clean run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a role's default answer.
    #[must_use]
    pub fn with_default(mut self, role: AgentRole, answer: impl Into<String>) -> Self {
        self.defaults.insert(role, answer.into());
        self
    }

    /// Queues an answer for a role.
    #[must_use]
    pub fn then(self, role: AgentRole, answer: impl Into<String>) -> Self {
        self.push(role, Ok(answer.into()));
        self
    }

    /// Queues an error for a role.
    #[must_use]
    pub fn then_fail(self, role: AgentRole, error: ExecutorError) -> Self {
        self.push(role, Err(error));
        self
    }

    /// Queues a result for a role.
    pub fn push(&self, role: AgentRole, result: Result<String, ExecutorError>) {
        self.scripts.lock().entry(role).or_default().push_back(result);
    }

    /// Every call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(AgentRole, String)> {
        self.calls.lock().clone()
    }

    /// Number of calls for a role.
    #[must_use]
    pub fn call_count(&self, role: AgentRole) -> usize {
        self.calls.lock().iter().filter(|(r, _)| *r == role).count()
    }

    /// Prompts sent for a role, in order.
    #[must_use]
    pub fn prompts(&self, role: AgentRole) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, role: AgentRole, prompt: &str) -> Result<String, ExecutorError> {
        self.calls.lock().push((role, prompt.to_string()));
        let scripted = self.scripts.lock().get_mut(&role).and_then(VecDeque::pop_front);
        match scripted {
            Some(result) => result,
            None => self
                .defaults
                .get(&role)
                .cloned()
                .ok_or_else(|| ExecutorError::Unavailable { role: role.to_string() }),
        }
    }
}

/// An executor that sleeps before answering.
///
/// `completed()` counts calls that ran to the end, so a test can tell
/// whether an in-flight call was dropped.
#[derive(Debug)]
pub struct SlowExecutor {
    delay: Duration,
    answer: String,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl SlowExecutor {
    /// Creates an executor that answers `answer` after `delay`.
    #[must_use]
    pub fn new(delay: Duration, answer: impl Into<String>) -> Self {
        Self {
            delay,
            answer: answer.into(),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Calls started.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Calls that finished sleeping.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for SlowExecutor {
    async fn execute(&self, _role: AgentRole, _prompt: &str) -> Result<String, ExecutorError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

/// An evaluator that always returns the same score.
#[derive(Debug, Clone)]
pub struct FixedEvaluator {
    dimension: Dimension,
    score: f64,
    strengths: Vec<String>,
}

impl FixedEvaluator {
    /// Creates an evaluator scoring `score` on `dimension`.
    #[must_use]
    pub fn new(dimension: Dimension, score: f64) -> Self {
        Self {
            dimension,
            score,
            strengths: Vec::new(),
        }
    }

    /// Sets the strengths reported.
    #[must_use]
    pub fn with_strengths<I, S>(mut self, strengths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strengths = strengths.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Evaluator for FixedEvaluator {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn evaluate(
        &self,
        _artifact: &str,
        _context: Option<&str>,
    ) -> Result<EvaluatorReport, EvaluatorError> {
        let mut report = EvaluatorReport::new(self.score);
        report.strengths = self.strengths.clone();
        Ok(report)
    }
}

/// An evaluator that always fails.
#[derive(Debug, Clone, Copy)]
pub struct FailingEvaluator {
    dimension: Dimension,
}

impl FailingEvaluator {
    /// Creates a failing evaluator for `dimension`.
    #[must_use]
    pub fn new(dimension: Dimension) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Evaluator for FailingEvaluator {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn evaluate(
        &self,
        _artifact: &str,
        _context: Option<&str>,
    ) -> Result<EvaluatorReport, EvaluatorError> {
        Err(EvaluatorError::failed(self.dimension.as_str(), "scanner unavailable"))
    }
}

/// An evaluator that never finishes.
#[derive(Debug, Clone, Copy)]
pub struct HangingEvaluator {
    dimension: Dimension,
}

impl HangingEvaluator {
    /// Creates a hanging evaluator for `dimension`.
    #[must_use]
    pub fn new(dimension: Dimension) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Evaluator for HangingEvaluator {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn evaluate(
        &self,
        _artifact: &str,
        _context: Option<&str>,
    ) -> Result<EvaluatorReport, EvaluatorError> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_default() {
        let executor = ScriptedExecutor::new()
            .then(AgentRole::Reviewer, review_verdict(true))
            .then_fail(AgentRole::Reviewer, ExecutorError::failed("reviewer", "boom"));

        let first = executor.execute(AgentRole::Reviewer, "p1").await.unwrap();
        assert!(first.contains("\"issues_found\": true"));
        assert!(executor.execute(AgentRole::Reviewer, "p2").await.is_err());
        let third = executor.execute(AgentRole::Reviewer, "p3").await.unwrap();
        assert_eq!(third, review_verdict(false));

        assert_eq!(executor.call_count(AgentRole::Reviewer), 3);
        assert_eq!(executor.prompts(AgentRole::Reviewer), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_executor_counts_completion() {
        let executor = SlowExecutor::new(Duration::from_secs(5), "done");
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            executor.execute(AgentRole::Coder, "x"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(executor.started(), 1);
        assert_eq!(executor.completed(), 0);
    }
}
