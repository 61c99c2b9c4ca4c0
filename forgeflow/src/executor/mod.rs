//! The task executor capability and the deadline-bounded call wrapper.
//!
//! A [`TaskExecutor`] turns a role and a prompt into text. The pipeline never
//! calls it directly: [`invoke`] applies the stage timeout and races the call
//! against the run's cancellation token. Whichever side loses is dropped, so a
//! timed-out or cancelled call stops consuming resources.

use crate::cancellation::CancellationToken;
use crate::core::AgentRole;
use crate::errors::ExecutorError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Prefix marking an artifact that is really an error report.
pub const ERROR_SENTINEL: &str = "[ERROR]";

/// Produces text for a role.
///
/// Implementations must be thread-safe; the pipeline holds them as
/// `Arc<dyn TaskExecutor>` and may share one executor between runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes a prompt in the given role.
    async fn execute(&self, role: AgentRole, prompt: &str) -> Result<String, ExecutorError>;
}

/// How an executor call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The executor returned text. The text may still be an `[ERROR]` sentinel.
    Completed(String),
    /// The executor failed or timed out.
    Failed(ExecutorError),
    /// The run was cancelled while the call was in flight.
    Cancelled(String),
}

impl Invocation {
    /// Returns the artifact text, turning failures into `[ERROR]` sentinels.
    ///
    /// Returns `None` for cancelled calls.
    #[must_use]
    pub fn into_output(self) -> Option<(String, Option<String>)> {
        match self {
            Self::Completed(text) => Some((text, None)),
            Self::Failed(err) => Some((sentinel(&err), Some(err.to_string()))),
            Self::Cancelled(_) => None,
        }
    }
}

/// Formats an executor error as an `[ERROR]` artifact.
#[must_use]
pub fn sentinel(err: &ExecutorError) -> String {
    format!("{ERROR_SENTINEL} {err}")
}

/// Returns true if the text is an `[ERROR]` artifact.
#[must_use]
pub fn is_error_output(text: &str) -> bool {
    text.trim_start().starts_with(ERROR_SENTINEL)
}

/// Calls the executor under `timeout`, racing it against `cancel`.
pub async fn invoke(
    executor: &dyn TaskExecutor,
    role: AgentRole,
    prompt: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Invocation {
    if cancel.is_cancelled() {
        return Invocation::Cancelled(cancel_reason(cancel));
    }

    debug!(role = %role, timeout_ms = timeout.as_millis() as u64, "Invoking task executor");

    tokio::select! {
        biased;
        () = cancel.cancelled() => Invocation::Cancelled(cancel_reason(cancel)),
        result = tokio::time::timeout(timeout, executor.execute(role, prompt)) => match result {
            Ok(Ok(text)) => Invocation::Completed(text),
            Ok(Err(err)) => {
                warn!(role = %role, error = %err, "Task executor failed");
                Invocation::Failed(err)
            }
            Err(_) => {
                warn!(role = %role, timeout_s = timeout.as_secs_f64(), "Task executor timed out");
                Invocation::Failed(ExecutorError::timeout(timeout))
            }
        },
    }
}

fn cancel_reason(cancel: &CancellationToken) -> String {
    cancel.reason().unwrap_or_else(|| "cancelled".to_string())
}
