//! Configuration for forgeflow pipelines.
//!
//! Configuration is read-only once a pipeline is built and is shared across
//! concurrent runs behind an `Arc`. A single JSON document carries both
//! sections:
//!
//! ```json
//! {
//!   "orchestration": { "max_iterations": 3, "timeouts": { "total_budget_seconds": 900 } },
//!   "evaluation": { "pass_threshold": 0.7, "gate_on_failure": false }
//! }
//! ```

mod evaluation;
mod orchestration;

pub use evaluation::{DimensionConfig, EvaluationConfig, EvaluationHooks, EvaluatorSettings};
pub use orchestration::{BudgetConfig, OrchestrationConfig};

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Converts seconds to a `Duration`, saturating instead of panicking.
///
/// Values too large for a `Duration` become `Duration::MAX`; negative and
/// NaN values become zero.
pub(crate) fn saturating_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(if seconds > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

/// Checks that `seconds` is a positive value representable as a `Duration`.
pub(crate) fn check_seconds(name: &str, seconds: f64, allow_zero: bool) -> Result<(), ConfigError> {
    let in_range = if allow_zero { seconds >= 0.0 } else { seconds > 0.0 };
    if in_range && Duration::try_from_secs_f64(seconds).is_ok() {
        return Ok(());
    }
    let expected = if allow_zero { "non-negative" } else { "positive" };
    Err(ConfigError::Invalid(format!(
        "{name} must be a {expected} number of seconds that fits a duration, got {seconds}"
    )))
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForgeflowConfig {
    /// Stage pipeline settings.
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// Evaluation middleware settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

impl ForgeflowConfig {
    /// Parses a configuration document from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })
    }

    /// Reads and validates a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        info!(path = %path.display(), "Loaded forgeflow config");
        Ok(config)
    }

    /// Loads configuration, falling back to defaults when the file is absent.
    ///
    /// Environment overrides are applied last. A file that exists but cannot
    /// be parsed or fails validation is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.orchestration = config.orchestration.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Validates both sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.orchestration.validate()?;
        self.evaluation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"orchestration": {{"max_iterations": 2}}, "evaluation": {{"gate_on_failure": true}}}}"#
        )
        .unwrap();

        let config = ForgeflowConfig::from_file(file.path()).unwrap();
        assert_eq!(config.orchestration.max_iterations, 2);
        assert!(config.evaluation.gate_on_failure);
        assert_eq!(config.orchestration.timeouts.total_budget_seconds, 900.0);
    }

    #[test]
    fn test_from_file_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = ForgeflowConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"evaluation": {{"pass_threshold": 2.0}}}}"#).unwrap();

        let err = ForgeflowConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ForgeflowConfig::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.evaluation.pass_threshold, 0.7);
    }

    #[test]
    fn test_from_json_str() {
        let config = ForgeflowConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ForgeflowConfig::default());
    }
}
