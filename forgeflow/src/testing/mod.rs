//! Testing utilities for forgeflow pipelines.
//!
//! This module provides:
//! - Scripted and slow task executors
//! - Fixed, failing and hanging evaluators
//! - Assertions over workflow runs
//! - A fast configuration for paused-clock tests

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_run_aborted, assert_run_succeeded, assert_stage_errored, assert_stage_sequence,
};
pub use fixtures::{fast_config, test_builder, test_pipeline};
pub use mocks::{
    review_verdict, FailingEvaluator, FixedEvaluator, HangingEvaluator, ScriptedExecutor,
    SlowExecutor, SAMPLE_CODE, SAMPLE_DESIGN, SAMPLE_DOCS, SAMPLE_JUDGE,
};
