//! Stage trait and the stage set driven by the pipeline.
//!
//! A stage turns the run context into a prompt, calls the task executor
//! through the deadline-bounded wrapper, post-processes the answer and
//! reports a [`StageResult`]. The pipeline looks stages up by
//! [`StageKind`] in a [`StageSet`].

mod workflow;

pub use workflow::{BuildStage, DesignStage, DocumentStage, RefineStage, ReviewStage};

use crate::cancellation::CancellationToken;
use crate::context::RunContext;
use crate::core::{StageKind, StageResult};
use crate::executor::{invoke, is_error_output, Invocation, TaskExecutor};
use crate::format::ArtifactFormat;
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Everything a stage needs for one invocation.
#[derive(Clone, Copy)]
pub struct StageCall<'a> {
    /// The executor to call.
    pub executor: &'a dyn TaskExecutor,
    /// The run context to read inputs from.
    pub context: &'a RunContext,
    /// The timeout granted by the budget tracker.
    pub timeout: Duration,
    /// The run's cancellation token.
    pub cancel: &'a CancellationToken,
}

impl Debug for StageCall<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageCall")
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// How a stage invocation ended.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// The stage produced a result, successful or not.
    Finished(StageResult),
    /// The run was cancelled during the stage.
    Cancelled(String),
}

/// A pipeline stage.
///
/// Implementors supply the prompt and the post-processing; the provided
/// [`run`](Stage::run) handles the executor call, timing and the
/// `StageResult` record.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// The stage kind. Determines the executor role.
    fn kind(&self) -> StageKind;

    /// The representation of this stage's artifact.
    fn format(&self) -> ArtifactFormat;

    /// Context keys recorded in the result's input snapshot.
    fn input_keys(&self) -> &'static [&'static str];

    /// The context key the artifact is written to.
    fn output_key(&self) -> &'static str;

    /// Builds the executor prompt from the run context.
    fn prompt(&self, ctx: &RunContext) -> String;

    /// Turns the raw executor answer into the artifact and its success flag.
    fn process(&self, raw: String) -> (String, bool) {
        let success = !is_error_output(&raw);
        (raw, success)
    }

    /// Runs the stage once.
    async fn run(&self, call: StageCall<'_>) -> StageOutcome {
        let kind = self.kind();
        let started = Instant::now();
        let input_context = call.context.input_snapshot(self.input_keys());
        let prompt = self.prompt(call.context);

        let invocation = invoke(call.executor, kind.role(), &prompt, call.timeout, call.cancel).await;
        let (output, success, error) = match invocation {
            Invocation::Cancelled(reason) => return StageOutcome::Cancelled(reason),
            Invocation::Failed(err) => (crate::executor::sentinel(&err), false, Some(err.to_string())),
            Invocation::Completed(raw) => {
                let (output, success) = self.process(raw);
                (output, success, None)
            }
        };

        StageOutcome::Finished(StageResult {
            stage: kind,
            role: kind.role(),
            timestamp: Utc::now(),
            input_context,
            output,
            format: self.format(),
            duration_seconds: started.elapsed().as_secs_f64(),
            success,
            error,
            evaluation: None,
        })
    }
}

/// The five stages of a workflow, one per kind.
#[derive(Debug, Clone)]
pub struct StageSet {
    design: Arc<dyn Stage>,
    build: Arc<dyn Stage>,
    review: Arc<dyn Stage>,
    refine: Arc<dyn Stage>,
    document: Arc<dyn Stage>,
}

impl Default for StageSet {
    fn default() -> Self {
        Self {
            design: Arc::new(DesignStage),
            build: Arc::new(BuildStage),
            review: Arc::new(ReviewStage),
            refine: Arc::new(RefineStage),
            document: Arc::new(DocumentStage),
        }
    }
}

impl StageSet {
    /// Creates the standard stage set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stage of the same kind.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        match stage.kind() {
            StageKind::Design => self.design = stage,
            StageKind::Build => self.build = stage,
            StageKind::Review => self.review = stage,
            StageKind::Refine => self.refine = stage,
            StageKind::Document => self.document = stage,
        }
        self
    }

    /// Returns the stage for a kind.
    #[must_use]
    pub fn get(&self, kind: StageKind) -> &dyn Stage {
        match kind {
            StageKind::Design => self.design.as_ref(),
            StageKind::Build => self.build.as_ref(),
            StageKind::Review => self.review.as_ref(),
            StageKind::Refine => self.refine.as_ref(),
            StageKind::Document => self.document.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::keys;
    use crate::core::AgentRole;
    use crate::errors::ExecutorError;

    #[derive(Debug)]
    struct Echo;

    #[async_trait]
    impl TaskExecutor for Echo {
        async fn execute(&self, role: AgentRole, prompt: &str) -> Result<String, ExecutorError> {
            Ok(format!("{role}: {}", prompt.len()))
        }
    }

    #[derive(Debug)]
    struct Shouting;

    impl Stage for Shouting {
        fn kind(&self) -> StageKind {
            StageKind::Document
        }

        fn format(&self) -> ArtifactFormat {
            ArtifactFormat::Narrative
        }

        fn input_keys(&self) -> &'static [&'static str] {
            &[keys::ORIGINAL_REQUEST]
        }

        fn output_key(&self) -> &'static str {
            keys::DOCUMENTATION
        }

        fn prompt(&self, ctx: &RunContext) -> String {
            ctx.get_str(keys::ORIGINAL_REQUEST).unwrap_or_default().to_uppercase()
        }
    }

    #[tokio::test]
    async fn test_default_run_records_result() {
        let ctx = RunContext::for_request("hello");
        let token = CancellationToken::new();
        let call = StageCall {
            executor: &Echo,
            context: &ctx,
            timeout: Duration::from_secs(1),
            cancel: &token,
        };

        let StageOutcome::Finished(result) = Shouting.run(call).await else {
            panic!("stage was cancelled");
        };
        assert_eq!(result.stage, StageKind::Document);
        assert_eq!(result.role, AgentRole::Documenter);
        assert_eq!(result.output, "documenter: 5");
        assert!(result.success);
        assert_eq!(result.input_context[keys::ORIGINAL_REQUEST], "hello");
    }

    #[test]
    fn test_stage_set_replaces_by_kind() {
        let set = StageSet::new().with_stage(Arc::new(Shouting));
        assert_eq!(set.get(StageKind::Document).output_key(), keys::DOCUMENTATION);
        assert_eq!(set.get(StageKind::Document).input_keys(), &[keys::ORIGINAL_REQUEST]);
        assert_eq!(set.get(StageKind::Refine).kind(), StageKind::Refine);
    }
}
