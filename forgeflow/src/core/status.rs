//! Stage kinds, agent roles and pipeline states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// High-level design of the solution.
    #[serde(rename = "architecture")]
    Design,
    /// First implementation of the design.
    #[serde(rename = "implementation")]
    Build,
    /// Review of the current implementation.
    #[serde(rename = "review")]
    Review,
    /// Revision of the implementation against review findings.
    #[serde(rename = "refinement")]
    Refine,
    /// Documentation of the final implementation.
    #[serde(rename = "documentation")]
    Document,
}

impl StageKind {
    /// Returns the stage name used for multipliers, logs and records.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Design => "architecture",
            Self::Build => "implementation",
            Self::Review => "review",
            Self::Refine => "refinement",
            Self::Document => "documentation",
        }
    }

    /// Returns the agent role that executes this stage.
    ///
    /// Refinement reuses the coder role with review context.
    #[must_use]
    pub fn role(&self) -> AgentRole {
        match self {
            Self::Design => AgentRole::Architect,
            Self::Build | Self::Refine => AgentRole::Coder,
            Self::Review => AgentRole::Reviewer,
            Self::Document => AgentRole::Documenter,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The role a task executor is asked to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Produces the design document.
    Architect,
    /// Produces and refines code.
    Coder,
    /// Reviews code and reports issues.
    Reviewer,
    /// Writes documentation.
    Documenter,
    /// Scores an artifact for the semantic-judge evaluator.
    Judge,
}

impl AgentRole {
    /// Returns the role identifier passed to executors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::Documenter => "documenter",
            Self::Judge => "judge",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States of the stage pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Running the design stage.
    Design,
    /// Running the build stage.
    Build,
    /// Running a review.
    Review,
    /// Running a refine iteration.
    Refine,
    /// Running the document stage (or deciding to skip it).
    Document,
    /// Finished normally.
    Done,
    /// Stopped by an error, cancellation or blocking gate.
    Aborted,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Design
    }
}

impl PipelineState {
    /// Returns true for `Done` and `Aborted`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Returns the stage run in this state, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Design => Some(StageKind::Design),
            Self::Build => Some(StageKind::Build),
            Self::Review => Some(StageKind::Review),
            Self::Refine => Some(StageKind::Refine),
            Self::Document => Some(StageKind::Document),
            Self::Done | Self::Aborted => None,
        }
    }

    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        if next == Self::Aborted {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Design, Self::Build)
                | (Self::Build, Self::Review)
                | (Self::Review, Self::Refine)
                | (Self::Review, Self::Document)
                | (Self::Refine, Self::Review)
                | (Self::Document, Self::Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Design => write!(f, "design"),
            Self::Build => write!(f, "build"),
            Self::Review => write!(f, "review"),
            Self::Refine => write!(f, "refine"),
            Self::Document => write!(f, "document"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}
