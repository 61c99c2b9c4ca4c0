//! The five standard workflow stages.

use super::Stage;
use crate::context::{keys, RunContext};
use crate::core::StageKind;
use crate::executor::is_error_output;
use crate::format::{ArtifactFormat, FormatConverter};

/// Design output shorter than this (trimmed) is not a usable design.
const MIN_DESIGN_CHARS: usize = 100;

const DESIGN_KEYWORDS: [&str; 5] = ["architecture", "design", "component", "system", "structure"];

fn section(title: &str, body: &str) -> String {
    format!("=== {title} ===\n{body}\n\n")
}

fn read(ctx: &RunContext, key: &str) -> String {
    ctx.get_str(key).unwrap_or_default()
}

/// Produces a design document for the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesignStage;

impl Stage for DesignStage {
    fn kind(&self) -> StageKind {
        StageKind::Design
    }

    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Narrative
    }

    fn input_keys(&self) -> &'static [&'static str] {
        &[keys::ORIGINAL_REQUEST]
    }

    fn output_key(&self) -> &'static str {
        keys::ARCHITECTURE
    }

    fn prompt(&self, ctx: &RunContext) -> String {
        let mut prompt = String::from("Design a solution for the task below.\n\n");
        prompt.push_str(&section("TASK", &read(ctx, keys::ORIGINAL_REQUEST)));
        prompt.push_str(
            "Cover the high-level architecture, the components and their interfaces, \
             the data flow and the key design decisions. Answer in Markdown.",
        );
        prompt
    }

    /// A design must be substantive and talk about structure.
    fn process(&self, raw: String) -> (String, bool) {
        let lower = raw.to_lowercase();
        let success = !is_error_output(&raw)
            && raw.trim().chars().count() > MIN_DESIGN_CHARS
            && DESIGN_KEYWORDS.iter().any(|k| lower.contains(k));
        (raw, success)
    }
}

/// Implements the design.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStage;

impl Stage for BuildStage {
    fn kind(&self) -> StageKind {
        StageKind::Build
    }

    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Code
    }

    fn input_keys(&self) -> &'static [&'static str] {
        &[keys::ORIGINAL_REQUEST, keys::ARCHITECTURE]
    }

    fn output_key(&self) -> &'static str {
        keys::IMPLEMENTATION
    }

    fn prompt(&self, ctx: &RunContext) -> String {
        let mut prompt = String::from("Implement the solution described by the design.\n\n");
        prompt.push_str(&section("ORIGINAL REQUEST", &read(ctx, keys::ORIGINAL_REQUEST)));
        prompt.push_str(&section("DESIGN", &read(ctx, keys::ARCHITECTURE)));
        prompt.push_str(
            "Write complete, working code with error handling. \
             Return only the code; explanations belong in code comments.",
        );
        prompt
    }

    fn process(&self, raw: String) -> (String, bool) {
        code_output(raw)
    }
}

/// Reviews the current implementation and reports a JSON verdict.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewStage;

impl Stage for ReviewStage {
    fn kind(&self) -> StageKind {
        StageKind::Review
    }

    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Structured
    }

    fn input_keys(&self) -> &'static [&'static str] {
        &[keys::IMPLEMENTATION, keys::ARCHITECTURE]
    }

    fn output_key(&self) -> &'static str {
        keys::REVIEW
    }

    fn prompt(&self, ctx: &RunContext) -> String {
        let mut prompt = String::from("Review the implementation for correctness and quality.\n\n");
        prompt.push_str(&section("ORIGINAL REQUEST", &read(ctx, keys::ORIGINAL_REQUEST)));
        prompt.push_str(&section("DESIGN", &read(ctx, keys::ARCHITECTURE)));
        prompt.push_str(&section("CODE", &read(ctx, keys::IMPLEMENTATION)));
        prompt.push_str(
            "Check the code against both the request and the design: security, \
             edge cases and error handling. Answer with JSON only:\n\
             {\"issues_found\": bool, \"critical_issues\": [string], \
             \"suggestions\": [string], \"code_quality_score\": 0-10}",
        );
        prompt
    }
}

/// Revises the implementation against the latest review.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefineStage;

impl Stage for RefineStage {
    fn kind(&self) -> StageKind {
        StageKind::Refine
    }

    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Code
    }

    fn input_keys(&self) -> &'static [&'static str] {
        &[keys::IMPLEMENTATION, keys::REVIEW]
    }

    fn output_key(&self) -> &'static str {
        keys::IMPLEMENTATION
    }

    fn prompt(&self, ctx: &RunContext) -> String {
        let mut prompt = String::from("Fix the issues raised in the review.\n\n");
        prompt.push_str(&section("ORIGINAL REQUEST", &read(ctx, keys::ORIGINAL_REQUEST)));
        prompt.push_str(&section("DESIGN", &read(ctx, keys::ARCHITECTURE)));
        prompt.push_str(&section("CURRENT CODE", &read(ctx, keys::IMPLEMENTATION)));
        prompt.push_str(&section("REVIEW FINDINGS", &read(ctx, keys::REVIEW)));
        prompt.push_str(
            "Keep the design intent and the original request in view. \
             Return only the complete revised code.",
        );
        prompt
    }

    fn process(&self, raw: String) -> (String, bool) {
        code_output(raw)
    }
}

/// Documents the final implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentStage;

impl Stage for DocumentStage {
    fn kind(&self) -> StageKind {
        StageKind::Document
    }

    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Narrative
    }

    fn input_keys(&self) -> &'static [&'static str] {
        &[keys::ARCHITECTURE, keys::FINAL_IMPLEMENTATION]
    }

    fn output_key(&self) -> &'static str {
        keys::DOCUMENTATION
    }

    fn prompt(&self, ctx: &RunContext) -> String {
        let mut prompt = String::from("Write user documentation for the solution.\n\n");
        prompt.push_str(&section("ORIGINAL REQUEST", &read(ctx, keys::ORIGINAL_REQUEST)));
        prompt.push_str(&section("DESIGN", &read(ctx, keys::ARCHITECTURE)));
        prompt.push_str(&section("CODE", &read(ctx, keys::FINAL_IMPLEMENTATION)));
        prompt.push_str(
            "Explain what it does and how to use it, with examples, setup steps \
             and an API reference where relevant. Answer in Markdown.",
        );
        prompt
    }
}

fn code_output(raw: String) -> (String, bool) {
    let success = !is_error_output(&raw);
    (FormatConverter::extract_code(&raw), success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_design_success_rules() {
        let good = format!("## Architecture\n{}", "The cache component sits in front of storage. ".repeat(4));
        assert!(DesignStage.process(good).1);

        let short = "Architecture: tiny".to_string();
        assert!(!DesignStage.process(short).1);

        let no_keywords = "Lorem ipsum dolor sit amet. ".repeat(10);
        assert!(!DesignStage.process(no_keywords).1);

        let error = format!("[ERROR] {}", "architecture ".repeat(20));
        assert!(!DesignStage.process(error).1);
    }

    #[test]
    fn test_build_extracts_code() {
        let raw = "Here you go:\n```python\ndef add(a, b):\n    return a + b\n```".to_string();
        let (output, success) = BuildStage.process(raw);
        assert_eq!(output, "def add(a, b):\n    return a + b");
        assert!(success);
    }

    #[test]
    fn test_refine_error_output_fails() {
        let (output, success) = RefineStage.process("[ERROR] upstream closed".to_string());
        assert_eq!(output, "[ERROR] upstream closed");
        assert!(!success);
    }

    #[test]
    fn test_prompts_include_context() {
        let ctx = RunContext::for_request("Add rate limiting");
        ctx.set(keys::ARCHITECTURE, json!("token bucket"));
        ctx.set(keys::IMPLEMENTATION, json!("fn limit() {}"));
        ctx.set(keys::REVIEW, json!("missing burst handling"));

        let refine = RefineStage.prompt(&ctx);
        assert!(refine.contains("Add rate limiting"));
        assert!(refine.contains("token bucket"));
        assert!(refine.contains("fn limit() {}"));
        assert!(refine.contains("missing burst handling"));

        let review = ReviewStage.prompt(&ctx);
        assert!(review.contains("issues_found"));
    }

    #[test]
    fn test_refine_writes_implementation() {
        assert_eq!(RefineStage.output_key(), BuildStage.output_key());
        assert_eq!(RefineStage.kind().role(), BuildStage.kind().role());
    }
}
