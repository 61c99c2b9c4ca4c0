//! Assertions over workflow runs.

use crate::core::{PipelineState, StageKind, WorkflowRun};

/// Asserts that the run reached `Done` and succeeded.
pub fn assert_run_succeeded(run: &WorkflowRun) {
    assert!(
        run.success && run.state == PipelineState::Done,
        "Expected a successful run, got state {:?} (success={}, abort_reason={:?})",
        run.state,
        run.success,
        run.abort_reason
    );
}

/// Asserts that the run was aborted and the reason contains `reason`.
pub fn assert_run_aborted(run: &WorkflowRun, reason: &str) {
    assert_eq!(
        run.state,
        PipelineState::Aborted,
        "Expected an aborted run, got {:?}",
        run.state
    );
    assert!(!run.success, "Aborted run must not be successful");
    let actual = run.abort_reason.as_deref().unwrap_or_default();
    assert!(
        actual.contains(reason),
        "Expected abort reason containing '{}', got '{}'",
        reason,
        actual
    );
}

/// Asserts the exact order of stage results.
pub fn assert_stage_sequence(run: &WorkflowRun, expected: &[StageKind]) {
    let actual: Vec<StageKind> = run.stages.iter().map(|s| s.stage).collect();
    assert_eq!(
        actual, expected,
        "Stage sequence mismatch: expected {:?}, got {:?}",
        expected, actual
    );
}

/// Asserts that every stage of `kind` produced a sentinel error output.
pub fn assert_stage_errored(run: &WorkflowRun, kind: StageKind) {
    let matching: Vec<_> = run.stages.iter().filter(|s| s.stage == kind).collect();
    assert!(!matching.is_empty(), "No {} stage in run", kind.name());
    for stage in matching {
        assert!(
            !stage.success && crate::executor::is_error_output(&stage.output),
            "Expected {} to fail with a sentinel output, got '{}'",
            kind.name(),
            stage.output
        );
    }
}
