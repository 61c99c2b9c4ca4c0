//! Timeouts, budget and loop limits for a pipeline run.

use super::{check_seconds, saturating_duration};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Deadline configuration shared by every stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total wall-clock budget for one run, in seconds.
    #[serde(default = "default_total_budget")]
    pub total_budget_seconds: f64,
    /// Base per-stage timeout before multipliers, in seconds.
    #[serde(default = "default_stage_timeout")]
    pub default_stage_timeout: f64,
    /// Lower bound for any derived timeout, in seconds.
    #[serde(default = "default_floor")]
    pub floor_seconds: f64,
    /// Per-stage multipliers applied to `default_stage_timeout`.
    #[serde(default = "default_multipliers")]
    pub stage_multipliers: HashMap<String, f64>,
}

fn default_total_budget() -> f64 {
    900.0
}

fn default_stage_timeout() -> f64 {
    180.0
}

fn default_floor() -> f64 {
    0.1
}

fn default_multipliers() -> HashMap<String, f64> {
    [
        ("architecture", 1.5),
        ("implementation", 1.2),
        ("review", 1.0),
        ("refinement", 1.0),
        ("documentation", 1.0),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_budget_seconds: default_total_budget(),
            default_stage_timeout: default_stage_timeout(),
            floor_seconds: default_floor(),
            stage_multipliers: default_multipliers(),
        }
    }
}

impl BudgetConfig {
    /// Sets the total budget.
    #[must_use]
    pub fn with_total_budget(mut self, seconds: f64) -> Self {
        self.total_budget_seconds = seconds;
        self
    }

    /// Sets the default stage timeout.
    #[must_use]
    pub fn with_default_stage_timeout(mut self, seconds: f64) -> Self {
        self.default_stage_timeout = seconds;
        self
    }

    /// Sets a stage multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, stage: impl Into<String>, multiplier: f64) -> Self {
        self.stage_multipliers.insert(stage.into(), multiplier);
        self
    }

    /// Returns the multiplier for a stage, 1.0 when unconfigured.
    #[must_use]
    pub fn multiplier(&self, stage: &str) -> f64 {
        self.stage_multipliers.get(stage).copied().unwrap_or(1.0)
    }

    /// Gets the total budget as a Duration.
    #[must_use]
    pub fn total_budget(&self) -> Duration {
        saturating_duration(self.total_budget_seconds)
    }

    /// Gets the default stage timeout as a Duration.
    #[must_use]
    pub fn stage_timeout_base(&self) -> Duration {
        saturating_duration(self.default_stage_timeout)
    }

    /// Gets the timeout floor as a Duration.
    #[must_use]
    pub fn floor(&self) -> Duration {
        saturating_duration(self.floor_seconds)
    }

    /// Validates ranges.
    ///
    /// Every derived timeout, including the default stage timeout times each
    /// multiplier, must fit a `Duration`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_seconds("total_budget_seconds", self.total_budget_seconds, false)?;
        check_seconds("default_stage_timeout", self.default_stage_timeout, false)?;
        check_seconds("floor_seconds", self.floor_seconds, false)?;
        for (stage, multiplier) in &self.stage_multipliers {
            if !(multiplier.is_finite() && *multiplier >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "stage multiplier for '{stage}' must be non-negative, got {multiplier}"
                )));
            }
            check_seconds(
                &format!("stage timeout for '{stage}'"),
                self.default_stage_timeout * multiplier,
                true,
            )?;
        }
        Ok(())
    }
}

/// Orchestration settings for the stage pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Deadline configuration.
    #[serde(default)]
    pub timeouts: BudgetConfig,
    /// Maximum number of refine iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Remaining budget that must be exceeded to start another refine.
    #[serde(default = "default_refine_floor")]
    pub refine_floor_seconds: f64,
    /// Remaining budget below which optional stages are skipped.
    #[serde(default = "default_optional_min")]
    pub optional_stage_min_seconds: f64,
    /// Name recorded on each workflow run.
    #[serde(default = "default_workflow_name")]
    pub workflow_name: String,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_refine_floor() -> f64 {
    10.0
}

fn default_optional_min() -> f64 {
    10.0
}

fn default_workflow_name() -> String {
    "feature_development".to_string()
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            timeouts: BudgetConfig::default(),
            max_iterations: default_max_iterations(),
            refine_floor_seconds: default_refine_floor(),
            optional_stage_min_seconds: default_optional_min(),
            workflow_name: default_workflow_name(),
        }
    }
}

impl OrchestrationConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline configuration.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: BudgetConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sets the maximum number of refine iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the refine floor.
    #[must_use]
    pub fn with_refine_floor(mut self, seconds: f64) -> Self {
        self.refine_floor_seconds = seconds;
        self
    }

    /// Sets the minimum budget an optional stage needs.
    #[must_use]
    pub fn with_optional_stage_min(mut self, seconds: f64) -> Self {
        self.optional_stage_min_seconds = seconds;
        self
    }

    /// Gets the refine floor as a Duration.
    #[must_use]
    pub fn refine_floor(&self) -> Duration {
        saturating_duration(self.refine_floor_seconds)
    }

    /// Gets the optional-stage minimum as a Duration.
    #[must_use]
    pub fn optional_stage_min(&self) -> Duration {
        saturating_duration(self.optional_stage_min_seconds)
    }

    /// Applies overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable source.
    ///
    /// Recognised keys: `ORCHESTRATION_TOTAL_BUDGET`,
    /// `ORCHESTRATION_DEFAULT_TIMEOUT`, `ORCHESTRATION_MAX_ITERATIONS` and
    /// `ORCHESTRATION_MULTIPLIER_<STAGE>` for every known stage. Values that
    /// fail to parse are logged and ignored.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override::<f64>(&lookup, "ORCHESTRATION_TOTAL_BUDGET") {
            self.timeouts.total_budget_seconds = value;
        }
        if let Some(value) = parse_override::<f64>(&lookup, "ORCHESTRATION_DEFAULT_TIMEOUT") {
            self.timeouts.default_stage_timeout = value;
        }
        if let Some(value) = parse_override::<u32>(&lookup, "ORCHESTRATION_MAX_ITERATIONS") {
            self.max_iterations = value;
        }

        let mut stages: Vec<String> = self.timeouts.stage_multipliers.keys().cloned().collect();
        for known in default_multipliers().into_keys() {
            if !stages.contains(&known) {
                stages.push(known);
            }
        }
        for stage in stages {
            let key = format!("ORCHESTRATION_MULTIPLIER_{}", stage.to_uppercase());
            if let Some(value) = parse_override::<f64>(&lookup, &key) {
                self.timeouts.stage_multipliers.insert(stage, value);
            }
        }

        self
    }

    /// Validates ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeouts.validate()?;
        check_seconds("refine_floor_seconds", self.refine_floor_seconds, true)?;
        check_seconds("optional_stage_min_seconds", self.optional_stage_min_seconds, true)?;
        Ok(())
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Invalid override, using config value");
            None
        }
    }
}
