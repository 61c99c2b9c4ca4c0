//! The stage pipeline.
//!
//! This module provides:
//! - [`StagePipeline`], the state machine that drives a run
//! - [`PipelineBuilder`], which validates configuration and wires the
//!   executor, middleware, stages and event sink together
//!
//! A run moves through `Design → Build → Review → (Refine → Review)* →
//! Document → Done`, or into `Aborted` from any non-terminal state.

mod builder;
mod run;

pub use builder::PipelineBuilder;
pub use run::StagePipeline;
