//! Error types for the forgeflow pipeline.
//!
//! Only errors that escape a stage's protective wrapper surface as
//! [`PipelineError`]; executor timeouts and failures are folded into the
//! stage result, and evaluator failures are neutralised by the aggregator.

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run was cancelled by its caller.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// An executor error that was not absorbed by a stage wrapper.
    #[error("{0}")]
    Executor(#[from] ExecutorError),

    /// A middleware error that could not be isolated.
    #[error("{0}")]
    Middleware(#[from] MiddlewareError),

    /// A quality gate halted the pipeline in blocking mode.
    #[error("Quality gate failed at {hook}: {middleware}")]
    GateBlocked {
        /// The hook point at which the gate failed.
        hook: String,
        /// The middleware that reported the failure.
        middleware: String,
    },

    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generic internal error, including panics caught at the run boundary.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Converts to a dictionary representation.
    ///
    /// Carried as the `error` field of `run.aborted` events.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let kind = match self {
            Self::Cancelled(_) => "Cancelled",
            Self::Executor(_) => "Executor",
            Self::Middleware(_) => "Middleware",
            Self::GateBlocked { .. } => "GateBlocked",
            Self::Config(_) => "Config",
            Self::Serialization(_) => "Serialization",
            Self::Internal(_) => "Internal",
        };

        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Errors reported by a task executor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutorError {
    /// The call exceeded its stage timeout and was cancelled.
    #[error("task executor timed out after {timeout_seconds:.1}s")]
    Timeout {
        /// The timeout that was applied.
        timeout_seconds: f64,
    },

    /// The executor ran but failed.
    #[error("task executor failed for role '{role}': {reason}")]
    Failed {
        /// The role the call was issued for.
        role: String,
        /// The reason for failure.
        reason: String,
    },

    /// No executor is able to serve the role.
    #[error("no task executor available for role '{role}'")]
    Unavailable {
        /// The role the call was issued for.
        role: String,
    },
}

impl ExecutorError {
    /// Creates a timeout error from the applied duration.
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout {
            timeout_seconds: timeout.as_secs_f64(),
        }
    }

    /// Creates an execution failed error.
    #[must_use]
    pub fn failed(role: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            role: role.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors reported by a quality evaluator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluatorError {
    /// The evaluator ran but failed.
    #[error("evaluator '{dimension}' failed: {reason}")]
    Failed {
        /// The evaluated dimension.
        dimension: String,
        /// The reason for failure.
        reason: String,
    },

    /// The evaluator did not finish within its timeout.
    #[error("evaluator '{dimension}' timed out after {timeout_seconds:.1}s")]
    Timeout {
        /// The evaluated dimension.
        dimension: String,
        /// The timeout that was applied.
        timeout_seconds: f64,
    },

    /// The evaluator cannot handle this artifact.
    #[error("evaluator '{dimension}' does not support this artifact: {reason}")]
    Unsupported {
        /// The evaluated dimension.
        dimension: String,
        /// Why the artifact is unsupported.
        reason: String,
    },
}

impl EvaluatorError {
    /// Creates an evaluator failure.
    #[must_use]
    pub fn failed(dimension: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            dimension: dimension.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised by a middleware while handling a hook.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Middleware '{middleware}' failed at {hook}: {reason}")]
pub struct MiddlewareError {
    /// The middleware name.
    pub middleware: String,
    /// The hook point.
    pub hook: String,
    /// The reason for failure.
    pub reason: String,
}

impl MiddlewareError {
    /// Creates a new middleware error.
    #[must_use]
    pub fn new(
        middleware: impl Into<String>,
        hook: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            middleware: middleware.into(),
            hook: hook.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config from {path}: {source}")]
    Io {
        /// The file path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse config from {path}: {source}")]
    Parse {
        /// The file path.
        path: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_timeout_message() {
        let err = ExecutorError::timeout(Duration::from_secs(5));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "task executor timed out after 5.0s");
    }

    #[test]
    fn test_executor_failed_message() {
        let err = ExecutorError::failed("coder", "rate limited");
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("coder"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_pipeline_error_to_dict() {
        let err = PipelineError::Cancelled("user abort".to_string());
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "Cancelled");
        assert_eq!(dict.get("message").unwrap(), "Pipeline cancelled: user abort");
    }

    #[test]
    fn test_gate_blocked_display() {
        let err = PipelineError::GateBlocked {
            hook: "post_refiner".to_string(),
            middleware: "evaluation".to_string(),
        };
        assert_eq!(err.to_string(), "Quality gate failed at post_refiner: evaluation");
    }

    #[test]
    fn test_middleware_error_converts() {
        let err: PipelineError = MiddlewareError::new("audit", "post_coder", "sink closed").into();
        assert!(matches!(err, PipelineError::Middleware(_)));
        assert!(err.to_string().contains("audit"));
    }
}
