//! Stage results, evaluation results and the workflow run record.

use super::{AgentRole, PipelineState, StageKind};
use crate::format::ArtifactFormat;
use crate::hooks::HookRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Final artifacts at or below this many characters (after trimming) fail the run.
pub const MIN_FINAL_OUTPUT_CHARS: usize = 50;

/// Weighted, gated quality score for an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Weighted overall score in [0, 1].
    pub overall: f64,
    /// Per-dimension scores in [0, 1].
    pub subscores: BTreeMap<String, f64>,
    /// Whether the gate passed.
    pub passed: bool,
    /// Up to five strengths.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// Up to five weaknesses.
    #[serde(default)]
    pub weaknesses: Vec<String>,
    /// Up to five recommendations.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Evaluators that completed.
    #[serde(default)]
    pub evaluators_run: usize,
    /// Evaluators that failed and were neutralised.
    #[serde(default)]
    pub evaluators_failed: usize,
}

impl EvaluationResult {
    /// Returns the score for a dimension.
    #[must_use]
    pub fn subscore(&self, dimension: &str) -> Option<f64> {
        self.subscores.get(dimension).copied()
    }
}

/// Result from a single stage invocation. Appended to the run, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Which stage ran.
    pub stage: StageKind,
    /// The role the executor played.
    pub role: AgentRole,
    /// When the stage finished.
    pub timestamp: DateTime<Utc>,
    /// Snapshot of the context inputs the stage used.
    pub input_context: BTreeMap<String, String>,
    /// The stage artifact, or a sentinel error string.
    pub output: String,
    /// Representation of `output`.
    pub format: ArtifactFormat,
    /// Wall-clock duration of the stage.
    pub duration_seconds: f64,
    /// Per-stage success flag.
    pub success: bool,
    /// Error message if the executor failed or timed out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Evaluation attached by middleware at the stage's post hook.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
}

impl StageResult {
    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration_seconds * 1000.0
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.success
    }
}

/// A quality-gate failure recorded while the run continued or halted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateFailure {
    /// Hook point name.
    pub hook: String,
    /// Middleware that reported the failure.
    pub middleware: String,
    /// Overall score, when the middleware produced an evaluation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall: Option<f64>,
    /// Whether the failure halted the pipeline.
    pub blocking: bool,
}

/// Complete record of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique run ID.
    pub run_id: Uuid,
    /// The request the run was started with.
    pub original_request: String,
    /// Workflow name from configuration.
    pub workflow_name: String,
    /// Stage results in execution order.
    pub stages: Vec<StageResult>,
    /// The final implementation, empty when aborted.
    pub final_output: String,
    /// Number of refine iterations executed.
    pub iterations: u32,
    /// Total wall-clock duration of the run.
    pub total_duration_seconds: f64,
    /// Overall success flag.
    pub success: bool,
    /// Terminal state.
    pub state: PipelineState,
    /// Why the run was aborted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// Optional stages skipped for lack of budget.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_stages: Vec<StageKind>,
    /// Every middleware invocation, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hook_records: Vec<HookRecord>,
    /// Gate failures reported by middleware.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gate_failures: Vec<GateFailure>,
    /// Final snapshot of the run context.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl WorkflowRun {
    /// Run-level success: every stage succeeded and the final artifact is substantive.
    ///
    /// The length check overrides an all-stages-succeeded result.
    #[must_use]
    pub fn compute_success(stages: &[StageResult], final_output: &str) -> bool {
        let all_succeeded = !stages.is_empty() && stages.iter().all(|s| s.success);
        let has_content = final_output.trim().chars().count() > MIN_FINAL_OUTPUT_CHARS;
        all_succeeded && has_content
    }

    /// Number of stage results of a given kind.
    #[must_use]
    pub fn count_of(&self, kind: StageKind) -> usize {
        self.stages.iter().filter(|s| s.stage == kind).count()
    }

    /// Returns true if the run ended in `Aborted`.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state == PipelineState::Aborted
    }

    /// The last evaluation attached to any stage or recorded by a hook.
    #[must_use]
    pub fn latest_evaluation(&self) -> Option<&EvaluationResult> {
        self.hook_records
            .iter()
            .rev()
            .find_map(|r| r.evaluation())
            .or_else(|| self.stages.iter().rev().find_map(|s| s.evaluation.as_ref()))
    }

    /// Serialises the run as a pretty JSON document.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(kind: StageKind, success: bool) -> StageResult {
        StageResult {
            stage: kind,
            role: kind.role(),
            timestamp: Utc::now(),
            input_context: BTreeMap::new(),
            output: "output".to_string(),
            format: ArtifactFormat::Narrative,
            duration_seconds: 0.25,
            success,
            error: None,
            evaluation: None,
        }
    }

    #[test]
    fn test_success_requires_all_stages() {
        let long = "x".repeat(80);
        let stages = vec![stage(StageKind::Design, true), stage(StageKind::Build, false)];
        assert!(!WorkflowRun::compute_success(&stages, &long));

        let stages = vec![stage(StageKind::Design, true), stage(StageKind::Build, true)];
        assert!(WorkflowRun::compute_success(&stages, &long));
    }

    #[test]
    fn test_short_output_fails_even_when_stages_succeed() {
        let stages = vec![stage(StageKind::Design, true), stage(StageKind::Build, true)];
        let short = "y".repeat(30);
        assert!(!WorkflowRun::compute_success(&stages, &short));
    }

    #[test]
    fn test_content_gate_trims_whitespace() {
        let stages = vec![stage(StageKind::Build, true)];
        let padded = format!("   {}   \n\n", "z".repeat(50));
        assert!(!WorkflowRun::compute_success(&stages, &padded));

        let enough = "z".repeat(51);
        assert!(WorkflowRun::compute_success(&stages, &enough));
    }

    #[test]
    fn test_empty_stage_list_is_not_success() {
        assert!(!WorkflowRun::compute_success(&[], &"x".repeat(100)));
    }

    #[test]
    fn test_stage_result_duration_ms() {
        let result = stage(StageKind::Review, true);
        assert_eq!(result.duration_ms(), 250.0);
        assert!(!result.is_failure());
    }

    #[test]
    fn test_stage_result_serialization() {
        let result = stage(StageKind::Refine, false);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["stage"], "refinement");
        assert_eq!(json["role"], "coder");
        assert_eq!(json["format"], "narrative");
        assert!(json.get("error").is_none());
    }
}
