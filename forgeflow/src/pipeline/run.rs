//! The stage pipeline state machine.

use super::PipelineBuilder;
use crate::budget::BudgetTracker;
use crate::cancellation::CancellationToken;
use crate::config::ForgeflowConfig;
use crate::context::{keys, RunContext};
use crate::core::{GateFailure, PipelineState, StageKind, StageResult, WorkflowRun};
use crate::errors::PipelineError;
use crate::events::{event_types, EventSink, RunEvent};
use crate::executor::TaskExecutor;
use crate::format::ArtifactFormat;
use crate::hooks::{GateMode, HookContext, HookPoint, HookRecord, MiddlewareRegistry};
use crate::review::ReviewVerdict;
use crate::stages::{StageCall, StageOutcome, StageSet};
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives design, build, review/refine and document stages for one request.
///
/// A pipeline is immutable once built and can serve concurrent runs; each
/// run owns its context, budget tracker and stage list.
#[derive(Clone)]
pub struct StagePipeline {
    pub(super) executor: Arc<dyn TaskExecutor>,
    pub(super) config: Arc<ForgeflowConfig>,
    pub(super) registry: Arc<MiddlewareRegistry>,
    pub(super) sink: Arc<dyn EventSink>,
    pub(super) stages: StageSet,
    pub(super) gate_mode: GateMode,
}

impl std::fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePipeline")
            .field("workflow", &self.config.orchestration.workflow_name)
            .field("middleware", &self.registry.names())
            .field("gate_mode", &self.gate_mode)
            .finish_non_exhaustive()
    }
}

/// Mutable state of a single run.
struct RunState {
    run_id: Uuid,
    request: String,
    started: Instant,
    budget: BudgetTracker,
    context: RunContext,
    state: PipelineState,
    stages: Vec<StageResult>,
    iterations: u32,
    skipped: Vec<StageKind>,
    hook_records: Vec<HookRecord>,
    gate_failures: Vec<GateFailure>,
}

impl RunState {
    fn transition(&mut self, next: PipelineState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::Internal(format!(
                "illegal transition {} -> {next}",
                self.state
            )));
        }
        debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }
}

impl StagePipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// The configuration the pipeline was built with.
    #[must_use]
    pub fn config(&self) -> &ForgeflowConfig {
        &self.config
    }

    /// How gate failures are enforced.
    #[must_use]
    pub fn gate_mode(&self) -> GateMode {
        self.gate_mode
    }

    /// Names of the registered middleware.
    #[must_use]
    pub fn middleware_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Runs the workflow for `request`.
    pub async fn run(&self, request: &str) -> WorkflowRun {
        self.run_with_cancellation(request, &CancellationToken::new()).await
    }

    /// Runs the workflow, stopping early if `cancel` fires.
    ///
    /// Always returns a [`WorkflowRun`]. Errors that escape a stage, a
    /// blocking gate failure, cancellation and panics end the run in
    /// [`PipelineState::Aborted`] with the completed stage results kept and
    /// an empty `final_output`.
    pub async fn run_with_cancellation(
        &self,
        request: &str,
        cancel: &CancellationToken,
    ) -> WorkflowRun {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "workflow_run",
            run_id = %run_id,
            workflow = %self.config.orchestration.workflow_name,
        );
        self.run_inner(run_id, request, cancel).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, request: &str, cancel: &CancellationToken) -> WorkflowRun {
        let mut run = RunState {
            run_id,
            request: request.to_string(),
            started: Instant::now(),
            budget: BudgetTracker::start(&self.config.orchestration.timeouts),
            context: RunContext::for_request(request),
            state: PipelineState::Design,
            stages: Vec::new(),
            iterations: 0,
            skipped: Vec::new(),
            hook_records: Vec::new(),
            gate_failures: Vec::new(),
        };

        info!(request_chars = request.chars().count(), "Workflow run started");
        self.emit(
            &run,
            event_types::RUN_STARTED,
            json!({
                "workflow": self.config.orchestration.workflow_name,
                "request_chars": request.chars().count(),
            }),
        )
        .await;

        let outcome = AssertUnwindSafe(self.drive(&mut run, cancel))
            .catch_unwind()
            .await;
        let abort = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Workflow run panicked");
                Some(PipelineError::Internal(format!("panic: {message}")))
            }
        };
        self.finish(run, abort).await
    }

    async fn drive(&self, run: &mut RunState, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let orchestration = &self.config.orchestration;

        self.execute_stage(run, StageKind::Design, cancel).await?;
        run.transition(PipelineState::Build)?;
        self.execute_stage(run, StageKind::Build, cancel).await?;

        loop {
            run.transition(PipelineState::Review)?;
            let review = self.execute_stage(run, StageKind::Review, cancel).await?;
            let verdict = ReviewVerdict::parse(&review);
            run.context.set(keys::REVIEW_VERDICT, verdict.to_value());

            if !verdict.issues_found {
                debug!(source = ?verdict.source, "Review found no issues");
                break;
            }
            if run.iterations >= orchestration.max_iterations {
                info!(iterations = run.iterations, "Iteration limit reached with open review issues");
                break;
            }
            if !run.budget.has_refine_budget(orchestration.refine_floor()) {
                info!(
                    remaining_s = run.budget.remaining().as_secs_f64(),
                    "Not enough budget left for another refine iteration"
                );
                break;
            }

            run.transition(PipelineState::Refine)?;
            self.execute_stage(run, StageKind::Refine, cancel).await?;
            run.iterations += 1;
        }

        let final_implementation = run.context.get_str(keys::IMPLEMENTATION).unwrap_or_default();
        run.context
            .set(keys::FINAL_IMPLEMENTATION, Value::String(final_implementation.clone()));

        let records = self
            .fire_hook(
                run,
                HookPoint::PostRefiner,
                StageKind::Refine,
                json!({ "code": final_implementation }),
            )
            .await;
        self.enforce_gates(run, &records).await?;

        run.transition(PipelineState::Document)?;
        if run.budget.should_skip_optional(orchestration.optional_stage_min()) {
            let remaining = run.budget.remaining();
            warn!(remaining_s = remaining.as_secs_f64(), "Skipping documentation, budget exhausted");
            run.skipped.push(StageKind::Document);
            self.emit(
                run,
                event_types::STAGE_SKIPPED,
                json!({
                    "stage": StageKind::Document.name(),
                    "reason": "budget_exhausted",
                    "remaining_seconds": remaining.as_secs_f64(),
                }),
            )
            .await;
        } else {
            self.execute_stage(run, StageKind::Document, cancel).await?;
        }

        run.transition(PipelineState::Done)
    }

    /// Runs one stage with its hooks and records the result.
    ///
    /// Returns the stage output. Refine's post hook is not fired here; the
    /// pipeline fires it once after the loop.
    async fn execute_stage(
        &self,
        run: &mut RunState,
        kind: StageKind,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let stage = self.stages.get(kind);

        let records = self.fire_hook(run, HookPoint::pre(kind), kind, Value::Null).await;
        self.enforce_gates(run, &records).await?;

        let timeout = run.budget.stage_timeout(kind.name());
        self.emit(
            run,
            event_types::STAGE_STARTED,
            json!({
                "stage": kind.name(),
                "iteration": run.iterations,
                "timeout_seconds": timeout.as_secs_f64(),
            }),
        )
        .await;

        let call = StageCall {
            executor: self.executor.as_ref(),
            context: &run.context,
            timeout,
            cancel,
        };
        let mut result = match stage.run(call).await {
            StageOutcome::Finished(result) => result,
            StageOutcome::Cancelled(reason) => {
                warn!(stage = kind.name(), reason = %reason, "Stage cancelled");
                return Err(PipelineError::Cancelled(reason));
            }
        };

        run.context
            .set(stage.output_key(), Value::String(result.output.clone()));
        info!(
            stage = kind.name(),
            duration_ms = result.duration_ms(),
            success = result.success,
            "Stage completed"
        );

        let mut post = Vec::new();
        if kind != StageKind::Refine {
            let output = stage_output(stage.output_key(), &result);
            post = self.fire_hook(run, HookPoint::post(kind), kind, output).await;
            result.evaluation = post.iter().rev().find_map(|r| r.evaluation().cloned());
        }

        let output = result.output.clone();
        self.emit(
            run,
            event_types::STAGE_COMPLETED,
            json!({
                "stage": kind.name(),
                "success": result.success,
                "duration_ms": result.duration_ms(),
                "error": result.error,
            }),
        )
        .await;
        run.stages.push(result);

        self.enforce_gates(run, &post).await?;
        Ok(output)
    }

    /// Dispatches a hook and merges every record into the run context.
    async fn fire_hook(
        &self,
        run: &mut RunState,
        hook: HookPoint,
        kind: StageKind,
        output: Value,
    ) -> Vec<HookRecord> {
        if !self.registry.has_subscribers(hook) {
            return Vec::new();
        }
        let ctx = HookContext::new(run.run_id, hook, kind.name())
            .with_context(run.context.snapshot())
            .with_output(output);
        let records = self.registry.dispatch(&ctx).await;
        for record in &records {
            let key = run.context.insert_unique(&record.context_key(), record.to_value());
            debug!(hook = %hook, key = %key, "Merged hook record");
        }
        run.hook_records.extend(records.iter().cloned());
        records
    }

    /// Records gate failures; in blocking mode the first one halts the run.
    async fn enforce_gates(&self, run: &mut RunState, records: &[HookRecord]) -> Result<(), PipelineError> {
        let blocking = self.gate_mode == GateMode::Blocking;
        for record in records.iter().filter(|r| r.gate_failed()) {
            let failure = GateFailure {
                hook: record.hook.to_string(),
                middleware: record.middleware.clone(),
                overall: record.evaluation().map(|e| e.overall),
                blocking,
            };
            self.emit(run, event_types::GATE_FAILED, json!(failure)).await;
            run.gate_failures.push(failure);

            if blocking {
                error!(hook = %record.hook, middleware = %record.middleware, "Quality gate failed, halting run");
                return Err(PipelineError::GateBlocked {
                    hook: record.hook.to_string(),
                    middleware: record.middleware.clone(),
                });
            }
            warn!(hook = %record.hook, middleware = %record.middleware, "Quality gate failed, continuing");
        }
        Ok(())
    }

    async fn finish(&self, mut run: RunState, abort: Option<PipelineError>) -> WorkflowRun {
        let total_duration_seconds = run.started.elapsed().as_secs_f64();
        let interrupted_stage = run.state.stage();
        let final_output = match &abort {
            None => run.context.get_str(keys::FINAL_IMPLEMENTATION).unwrap_or_default(),
            Some(_) => {
                run.state = PipelineState::Aborted;
                String::new()
            }
        };
        let abort_reason = abort.as_ref().map(abort_reason);
        let success = run.state == PipelineState::Done
            && WorkflowRun::compute_success(&run.stages, &final_output);

        match abort.as_ref().zip(abort_reason.as_ref()) {
            Some((err, reason)) => {
                warn!(reason = %reason, stages = run.stages.len(), "Workflow run aborted");
                self.emit(
                    &run,
                    event_types::RUN_ABORTED,
                    json!({
                        "reason": reason,
                        "error": err.to_dict(),
                        "stage": interrupted_stage.map(|kind| kind.name()),
                        "stages": run.stages.len(),
                        "duration_seconds": total_duration_seconds,
                    }),
                )
                .await;
            }
            None => {
                info!(
                    success,
                    iterations = run.iterations,
                    stages = run.stages.len(),
                    duration_s = total_duration_seconds,
                    "Workflow run finished"
                );
                self.emit(
                    &run,
                    event_types::RUN_COMPLETED,
                    json!({
                        "success": success,
                        "iterations": run.iterations,
                        "stages": run.stages.len(),
                        "duration_seconds": total_duration_seconds,
                    }),
                )
                .await;
            }
        }

        WorkflowRun {
            run_id: run.run_id,
            original_request: run.request,
            workflow_name: self.config.orchestration.workflow_name.clone(),
            context: run.context.snapshot(),
            stages: run.stages,
            final_output,
            iterations: run.iterations,
            total_duration_seconds,
            success,
            state: run.state,
            abort_reason,
            skipped_stages: run.skipped,
            hook_records: run.hook_records,
            gate_failures: run.gate_failures,
        }
    }

    async fn emit(&self, run: &RunState, event_type: &str, data: Value) {
        self.sink
            .emit(RunEvent::new(event_type, run.run_id).with_data(data))
            .await;
    }
}

/// The JSON object handed to a stage's post hook.
fn stage_output(output_key: &str, result: &StageResult) -> Value {
    let mut map = Map::new();
    map.insert(output_key.to_string(), Value::String(result.output.clone()));
    if result.format == ArtifactFormat::Code {
        map.insert("code".to_string(), Value::String(result.output.clone()));
    }
    map.insert("success".to_string(), Value::Bool(result.success));
    Value::Object(map)
}

fn abort_reason(err: &PipelineError) -> String {
    match err {
        PipelineError::GateBlocked { hook, .. } => format!("quality gate failed at {hook}"),
        PipelineError::Cancelled(reason) => format!("cancelled: {reason}"),
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
