//! Shared state for a single pipeline run.
//!
//! Each run owns one [`RunContext`]. Stages read their inputs from it and
//! write their artifacts back under the well-known [`keys`]; middleware
//! results are merged under `"<hook>.<middleware>"` keys.

mod bags;

pub use bags::{RunContext, INPUT_SNAPSHOT_CHARS};

/// Well-known context keys.
pub mod keys {
    /// The request the run was started with.
    pub const ORIGINAL_REQUEST: &str = "original_request";
    /// The design stage output.
    pub const ARCHITECTURE: &str = "architecture";
    /// The latest build or refine output.
    pub const IMPLEMENTATION: &str = "implementation";
    /// The latest review output.
    pub const REVIEW: &str = "review";
    /// The latest parsed review verdict.
    pub const REVIEW_VERDICT: &str = "review_verdict";
    /// The implementation that left the refine loop.
    pub const FINAL_IMPLEMENTATION: &str = "final_implementation";
    /// The document stage output.
    pub const DOCUMENTATION: &str = "documentation";
}
