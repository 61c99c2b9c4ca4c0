//! Fixtures for pipeline tests.

use std::sync::Arc;

use crate::config::{BudgetConfig, ForgeflowConfig, OrchestrationConfig};
use crate::errors::PipelineError;
use crate::executor::TaskExecutor;
use crate::pipeline::{PipelineBuilder, StagePipeline};

/// A configuration with a short budget suitable for paused-clock tests.
///
/// Total budget 60 s, default stage timeout 5 s, floors of 1 s.
#[must_use]
pub fn fast_config() -> ForgeflowConfig {
    let timeouts = BudgetConfig::default()
        .with_total_budget(60.0)
        .with_default_stage_timeout(5.0);
    ForgeflowConfig {
        orchestration: OrchestrationConfig::new()
            .with_timeouts(timeouts)
            .with_refine_floor(1.0)
            .with_optional_stage_min(1.0),
        ..ForgeflowConfig::default()
    }
}

/// A builder preloaded with `executor` and [`fast_config`].
#[must_use]
pub fn test_builder(executor: Arc<dyn TaskExecutor>) -> PipelineBuilder {
    StagePipeline::builder().executor(executor).config(fast_config())
}

/// Builds a pipeline with no middleware.
pub fn test_pipeline(executor: Arc<dyn TaskExecutor>) -> Result<StagePipeline, PipelineError> {
    test_builder(executor).build()
}
