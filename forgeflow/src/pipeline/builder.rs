//! Pipeline builder with validation.

use super::StagePipeline;
use crate::config::ForgeflowConfig;
use crate::errors::{ConfigError, PipelineError};
use crate::evaluation::{EvaluationAggregator, EvaluationMiddleware};
use crate::events::{EventSink, NoOpEventSink};
use crate::executor::TaskExecutor;
use crate::hooks::{GateMode, Middleware, MiddlewareRegistry};
use crate::stages::{Stage, StageSet};
use std::sync::Arc;
use tracing::debug;

/// Builder for a [`StagePipeline`].
#[derive(Clone)]
pub struct PipelineBuilder {
    executor: Option<Arc<dyn TaskExecutor>>,
    config: ForgeflowConfig,
    registry: MiddlewareRegistry,
    sink: Arc<dyn EventSink>,
    stages: StageSet,
    evaluation: Option<EvaluationAggregator>,
    standard_evaluation: bool,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            executor: None,
            config: ForgeflowConfig::default(),
            registry: MiddlewareRegistry::new(),
            sink: Arc::new(NoOpEventSink),
            stages: StageSet::new(),
            evaluation: None,
            standard_evaluation: false,
        }
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("has_executor", &self.executor.is_some())
            .field("middleware", &self.registry.names())
            .field("standard_evaluation", &self.standard_evaluation)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates a builder with default configuration and no executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the task executor. Required.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ForgeflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a middleware after those already registered.
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.registry.register(middleware);
        self
    }

    /// Sets the event sink for run telemetry.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the stage of the same kind.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages = self.stages.with_stage(stage);
        self
    }

    /// Registers the evaluation middleware with the four built-in evaluators.
    ///
    /// The semantic judge runs on the pipeline's executor.
    #[must_use]
    pub fn with_standard_evaluation(mut self) -> Self {
        self.standard_evaluation = true;
        self
    }

    /// Registers the evaluation middleware around a custom aggregator.
    #[must_use]
    pub fn with_evaluation(mut self, aggregator: EvaluationAggregator) -> Self {
        self.evaluation = Some(aggregator);
        self
    }

    /// Validates the configuration and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if no executor was set or the
    /// configuration is invalid.
    pub fn build(self) -> Result<StagePipeline, PipelineError> {
        self.config.validate()?;
        let executor = self
            .executor
            .ok_or_else(|| ConfigError::Invalid("a task executor is required".to_string()))?;

        let mut registry = self.registry;
        let aggregator = match self.evaluation {
            Some(aggregator) => Some(aggregator),
            None if self.standard_evaluation => Some(EvaluationAggregator::standard(
                &self.config.evaluation,
                executor.clone(),
            )),
            None => None,
        };
        if let Some(aggregator) = aggregator {
            registry.register(Arc::new(EvaluationMiddleware::from_config(
                &self.config.evaluation,
                aggregator,
            )));
        }

        let gate_mode = GateMode::from_gate_on_failure(self.config.evaluation.gate_on_failure);
        debug!(
            middleware = ?registry.names(),
            gate_mode = ?gate_mode,
            "Built stage pipeline"
        );

        Ok(StagePipeline {
            executor,
            config: Arc::new(self.config),
            registry: Arc::new(registry),
            sink: self.sink,
            stages: self.stages,
            gate_mode,
        })
    }
}
