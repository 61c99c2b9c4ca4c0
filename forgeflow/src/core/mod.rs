//! Core domain model types for forgeflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage kinds, agent roles and pipeline states
//! - Stage results and evaluation results
//! - The workflow run record returned to callers

mod result;
mod status;

pub use result::{
    EvaluationResult, GateFailure, StageResult, WorkflowRun, MIN_FINAL_OUTPUT_CHARS,
};
pub use status::{AgentRole, PipelineState, StageKind};
