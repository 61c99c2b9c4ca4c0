//! Quality-gate settings for the evaluation middleware.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one evaluation dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
    /// Weight in the overall score.
    pub weight: f64,
    /// Minimum individual score required to pass the gate.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Time allowed for the evaluator, in seconds.
    #[serde(default = "default_evaluator_timeout")]
    pub timeout_seconds: f64,
}

fn default_min_score() -> f64 {
    0.6
}

fn default_evaluator_timeout() -> f64 {
    30.0
}

impl DimensionConfig {
    /// Creates a dimension config with default minimum score and timeout.
    #[must_use]
    pub fn new(weight: f64) -> Self {
        Self {
            weight,
            min_score: default_min_score(),
            timeout_seconds: default_evaluator_timeout(),
        }
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Gets the timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        super::saturating_duration(self.timeout_seconds)
    }
}

/// Per-dimension settings for the four evaluators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorSettings {
    /// Security scanner.
    #[serde(default = "default_security")]
    pub security: DimensionConfig,
    /// Style / static-analysis checker.
    #[serde(default = "default_static_analysis")]
    pub static_analysis: DimensionConfig,
    /// Structural complexity analyzer.
    #[serde(default = "default_complexity")]
    pub complexity: DimensionConfig,
    /// Semantic judge.
    #[serde(default = "default_judge")]
    pub judge: DimensionConfig,
}

fn default_security() -> DimensionConfig {
    DimensionConfig::new(0.30)
}

fn default_static_analysis() -> DimensionConfig {
    DimensionConfig::new(0.30)
}

fn default_complexity() -> DimensionConfig {
    DimensionConfig::new(0.20)
}

fn default_judge() -> DimensionConfig {
    DimensionConfig::new(0.20).with_timeout(60.0)
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            security: default_security(),
            static_analysis: default_static_analysis(),
            complexity: default_complexity(),
            judge: default_judge(),
        }
    }
}

/// Which hook points the evaluation middleware subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationHooks {
    /// Evaluate the final implementation once the refine loop ends.
    #[serde(default = "default_true")]
    pub post_refiner: bool,
    /// Evaluate after the documentation stage.
    #[serde(default)]
    pub post_documenter: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EvaluationHooks {
    fn default() -> Self {
        Self {
            post_refiner: true,
            post_documenter: false,
        }
    }
}

/// Evaluation middleware configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Whether the evaluation middleware is active.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hook subscriptions.
    #[serde(default)]
    pub hooks: EvaluationHooks,
    /// Halt the pipeline when the gate fails.
    #[serde(default)]
    pub gate_on_failure: bool,
    /// Minimum overall score for passing.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    /// Per-dimension settings.
    #[serde(default)]
    pub evaluators: EvaluatorSettings,
}

fn default_pass_threshold() -> f64 {
    0.7
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hooks: EvaluationHooks::default(),
            gate_on_failure: false,
            pass_threshold: default_pass_threshold(),
            evaluators: EvaluatorSettings::default(),
        }
    }
}

impl EvaluationConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pass threshold.
    #[must_use]
    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    /// Sets blocking gate mode.
    #[must_use]
    pub fn with_gate_on_failure(mut self, gate: bool) -> Self {
        self.gate_on_failure = gate;
        self
    }

    /// Sets the hook subscriptions.
    #[must_use]
    pub fn with_hooks(mut self, hooks: EvaluationHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validates ranges and that the weights sum to 1.0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(ConfigError::Invalid(format!(
                "pass_threshold must be within [0, 1], got {}",
                self.pass_threshold
            )));
        }

        let dimensions = [
            ("security", &self.evaluators.security),
            ("static_analysis", &self.evaluators.static_analysis),
            ("complexity", &self.evaluators.complexity),
            ("judge", &self.evaluators.judge),
        ];
        for (name, dimension) in dimensions {
            if !(dimension.weight.is_finite() && dimension.weight >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "weight for '{name}' must be non-negative, got {}",
                    dimension.weight
                )));
            }
            if !(0.0..=1.0).contains(&dimension.min_score) {
                return Err(ConfigError::Invalid(format!(
                    "min_score for '{name}' must be within [0, 1], got {}",
                    dimension.min_score
                )));
            }
            super::check_seconds(&format!("timeout for '{name}'"), dimension.timeout_seconds, false)?;
        }

        let total: f64 = dimensions.iter().map(|(_, d)| d.weight).sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "evaluator weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_weights() {
        let config = EvaluationConfig::default();
        assert!(config.enabled);
        assert!(!config.gate_on_failure);
        assert_eq!(config.pass_threshold, 0.7);
        assert_eq!(config.evaluators.security.weight, 0.30);
        assert_eq!(config.evaluators.static_analysis.weight, 0.30);
        assert_eq!(config.evaluators.complexity.weight, 0.20);
        assert_eq!(config.evaluators.judge.weight, 0.20);
        assert_eq!(config.evaluators.judge.timeout_seconds, 60.0);
        assert!(config.hooks.post_refiner);
        assert!(!config.hooks.post_documenter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = EvaluationConfig::default();
        config.evaluators.judge.weight = 0.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = EvaluationConfig::default().with_pass_threshold(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EvaluationConfig = serde_json::from_str(
            r#"{"gate_on_failure": true, "hooks": {"post_documenter": true}}"#,
        )
        .unwrap();
        assert!(config.gate_on_failure);
        assert!(config.hooks.post_refiner);
        assert!(config.hooks.post_documenter);
        assert_eq!(config.pass_threshold, 0.7);
    }
}
