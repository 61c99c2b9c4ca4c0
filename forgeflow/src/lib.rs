//! # Forgeflow
//!
//! A deadline-bounded software-development workflow: design, build, an
//! iterative review/refine loop, and documentation, each stage delegated to
//! a pluggable [`TaskExecutor`](executor::TaskExecutor).
//!
//! Forgeflow provides:
//!
//! - **A stage state machine**: `Design → Build → Review → (Refine → Review)* → Document → Done`
//! - **Global deadline budgeting**: per-stage timeouts derived from the remaining budget
//! - **Middleware hooks**: pre/post stage hook points with optional blocking quality gates
//! - **Multi-dimensional evaluation**: security, static analysis, complexity and a semantic judge
//! - **Cancellation**: in-flight executor calls are dropped when a run is cancelled
//! - **Run caching**: successful runs are reused for identical requests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use forgeflow::prelude::*;
//!
//! let pipeline = StagePipeline::builder()
//!     .executor(Arc::new(MyExecutor::new()))
//!     .config(ForgeflowConfig::load(Some(Path::new("forgeflow.json")))?)
//!     .with_standard_evaluation()
//!     .build()?;
//!
//! let run = pipeline.run("Build a URL shortener").await;
//! println!("{}", run.final_output);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod budget;
pub mod cache;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod evaluation;
pub mod events;
pub mod executor;
pub mod format;
pub mod hooks;
pub mod observability;
pub mod pipeline;
pub mod review;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheKey, CachedPipeline, InMemoryRunCache, RunCache};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{EvaluationConfig, ForgeflowConfig, OrchestrationConfig};
    pub use crate::core::{
        AgentRole, EvaluationResult, PipelineState, StageKind, StageResult, WorkflowRun,
    };
    pub use crate::errors::{ConfigError, EvaluatorError, ExecutorError, PipelineError};
    pub use crate::evaluation::{Dimension, EvaluationAggregator, Evaluator, EvaluatorReport};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::TaskExecutor;
    pub use crate::hooks::{GateMode, HookContext, HookPoint, Middleware, MiddlewareOutcome};
    pub use crate::observability::{init_tracing, TracingOptions};
    pub use crate::pipeline::{PipelineBuilder, StagePipeline};
    pub use crate::stages::Stage;
}
