//! Middleware hook points and the registry that dispatches them.
//!
//! The pipeline fires a hook before and after each stage. Every enabled
//! middleware subscribed to that hook runs in registration order; each
//! invocation yields a [`HookRecord`] that the pipeline keeps on the run
//! and merges into the run context.

mod audit;
mod registry;

pub use audit::EventMiddleware;
pub use registry::{
    HookContext, HookRecord, Middleware, MiddlewareOutcome, MiddlewareRegistry,
};

use crate::core::StageKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Points in the workflow where middleware may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Before the design stage.
    PreArchitect,
    /// After the design stage.
    PostArchitect,
    /// Before the build stage.
    PreCoder,
    /// After the build stage.
    PostCoder,
    /// Before each review.
    PreReviewer,
    /// After each review.
    PostReviewer,
    /// Before each refine iteration.
    PreRefiner,
    /// Once, after the review/refine loop has finished.
    PostRefiner,
    /// Before the document stage.
    PreDocumenter,
    /// After the document stage.
    PostDocumenter,
}

impl HookPoint {
    /// Every hook point in workflow order.
    pub const ALL: [Self; 10] = [
        Self::PreArchitect,
        Self::PostArchitect,
        Self::PreCoder,
        Self::PostCoder,
        Self::PreReviewer,
        Self::PostReviewer,
        Self::PreRefiner,
        Self::PostRefiner,
        Self::PreDocumenter,
        Self::PostDocumenter,
    ];

    /// The hook fired before a stage.
    #[must_use]
    pub fn pre(kind: StageKind) -> Self {
        match kind {
            StageKind::Design => Self::PreArchitect,
            StageKind::Build => Self::PreCoder,
            StageKind::Review => Self::PreReviewer,
            StageKind::Refine => Self::PreRefiner,
            StageKind::Document => Self::PreDocumenter,
        }
    }

    /// The hook fired after a stage.
    #[must_use]
    pub fn post(kind: StageKind) -> Self {
        match kind {
            StageKind::Design => Self::PostArchitect,
            StageKind::Build => Self::PostCoder,
            StageKind::Review => Self::PostReviewer,
            StageKind::Refine => Self::PostRefiner,
            StageKind::Document => Self::PostDocumenter,
        }
    }

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreArchitect => "pre_architect",
            Self::PostArchitect => "post_architect",
            Self::PreCoder => "pre_coder",
            Self::PostCoder => "post_coder",
            Self::PreReviewer => "pre_reviewer",
            Self::PostReviewer => "post_reviewer",
            Self::PreRefiner => "pre_refiner",
            Self::PostRefiner => "post_refiner",
            Self::PreDocumenter => "pre_documenter",
            Self::PostDocumenter => "post_documenter",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the pipeline does when a middleware reports `passed = false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Log, record a gate failure and continue.
    #[default]
    Advisory,
    /// Abort the run at the failing hook.
    Blocking,
}

impl GateMode {
    /// Maps the `gate_on_failure` setting to a mode.
    #[must_use]
    pub fn from_gate_on_failure(gate_on_failure: bool) -> Self {
        if gate_on_failure {
            Self::Blocking
        } else {
            Self::Advisory
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_names_are_stable() {
        let names: Vec<_> = HookPoint::ALL.iter().map(HookPoint::as_str).collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "pre_architect");
        assert_eq!(names[9], "post_documenter");

        let json = serde_json::to_string(&HookPoint::PostRefiner).unwrap();
        assert_eq!(json, r#""post_refiner""#);
    }

    #[test]
    fn test_pre_and_post_per_stage() {
        assert_eq!(HookPoint::pre(StageKind::Build), HookPoint::PreCoder);
        assert_eq!(HookPoint::post(StageKind::Review), HookPoint::PostReviewer);
        assert_eq!(HookPoint::post(StageKind::Refine), HookPoint::PostRefiner);
    }

    #[test]
    fn test_gate_mode() {
        assert_eq!(GateMode::default(), GateMode::Advisory);
        assert_eq!(GateMode::from_gate_on_failure(true), GateMode::Blocking);
        assert_eq!(GateMode::from_gate_on_failure(false), GateMode::Advisory);
    }
}
