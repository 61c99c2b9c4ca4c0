//! Artifact format detection and conversion.
//!
//! Executors answer in free text. Stages use [`FormatConverter`] to pull code
//! out of fenced markdown and to normalise structured answers before they are
//! written to the run context.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// The representation of a stage artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// Markdown or plain prose.
    Narrative,
    /// JSON.
    Structured,
    /// Source code.
    Code,
    /// XML-like markup.
    Markup,
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Narrative => write!(f, "narrative"),
            Self::Structured => write!(f, "structured"),
            Self::Code => write!(f, "code"),
            Self::Markup => write!(f, "markup"),
        }
    }
}

/// How [`FormatConverter::extract_code_detailed`] obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// The longest of `blocks` fenced blocks was returned.
    Fenced {
        /// Number of fenced blocks found.
        blocks: usize,
    },
    /// No fences, but the text looks like code and was returned unchanged.
    Unfenced,
    /// No fences and no code markers; the text was returned unchanged.
    Prose,
}

const CODE_MARKERS: [&str; 6] = ["def ", "class ", "import ", "from ", "function", "const "];

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"```(?:[a-zA-Z0-9_+\-#]+)?\s*([\s\S]*?)```").expect("valid regex")
    })
}

/// Stateless conversions between artifact formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatConverter;

impl FormatConverter {
    /// Returns the longest fenced code block, trimmed.
    ///
    /// Ties go to the earliest block. Text without fences is returned
    /// unchanged. Applying this twice gives the same result as applying it
    /// once, since an extracted block never contains a fence.
    #[must_use]
    pub fn extract_code(text: &str) -> String {
        Self::extract_code_detailed(text).0
    }

    /// Like [`extract_code`](Self::extract_code), also reporting how the
    /// result was obtained.
    #[must_use]
    pub fn extract_code_detailed(text: &str) -> (String, Extraction) {
        let blocks: Vec<&str> = fence_regex()
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .collect();

        // Strict comparison keeps the first of several equally long blocks.
        let longest = blocks.iter().fold(None::<&str>, |best, block| match best {
            Some(b) if block.len() <= b.len() => Some(b),
            _ => Some(block),
        });

        match longest {
            Some(block) => (
                block.to_string(),
                Extraction::Fenced {
                    blocks: blocks.len(),
                },
            ),
            None if Self::looks_like_code(text) => (text.to_string(), Extraction::Unfenced),
            None => (text.to_string(), Extraction::Prose),
        }
    }

    /// Returns true if the text contains definitions, imports or braces.
    #[must_use]
    pub fn looks_like_code(text: &str) -> bool {
        CODE_MARKERS.iter().any(|marker| text.contains(marker))
            || (text.contains('{') && text.contains('}'))
    }

    /// Re-emits JSON text pretty-printed, or wraps other text as `{"content": text}`.
    #[must_use]
    pub fn to_structured(text: &str) -> String {
        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Artifact is not JSON, wrapping as content");
                serde_json::json!({ "content": text })
            }
        };
        pretty(&value)
    }

    /// Renders a value as markdown: objects become `## key` sections.
    #[must_use]
    pub fn to_markdown(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Object(map) => {
                let mut lines = vec!["# Data\n".to_string()];
                for (key, v) in map {
                    lines.push(format!("## {key}\n"));
                    lines.push(format!("{}\n", scalar_text(v)));
                }
                lines.join("\n")
            }
            other => other.to_string(),
        }
    }

    /// Renders a value as XML-like markup.
    #[must_use]
    pub fn to_markup(value: &Value) -> String {
        match value {
            Value::Object(map) => {
                let mut lines = vec!["<data>".to_string()];
                for (key, v) in map {
                    lines.push(format!("  <{key}>{}</{key}>", scalar_text(v)));
                }
                lines.push("</data>".to_string());
                lines.join("\n")
            }
            other => format!("<content>{}</content>", scalar_text(other)),
        }
    }

    /// Converts `content` from one format to another.
    ///
    /// The source is first parsed into a JSON value: structured text as JSON
    /// (falling back to `{"content": …}`), code as `{"code": extracted}`, and
    /// anything else as `{"content": …}`.
    #[must_use]
    pub fn convert(content: &str, from: ArtifactFormat, to: ArtifactFormat) -> String {
        if from == to {
            return content.to_string();
        }

        let parsed = match from {
            ArtifactFormat::Structured => serde_json::from_str::<Value>(content)
                .unwrap_or_else(|_| serde_json::json!({ "content": content })),
            ArtifactFormat::Code => serde_json::json!({ "code": Self::extract_code(content) }),
            ArtifactFormat::Narrative | ArtifactFormat::Markup => {
                serde_json::json!({ "content": content })
            }
        };

        match to {
            ArtifactFormat::Structured => pretty(&parsed),
            ArtifactFormat::Markup => Self::to_markup(&parsed),
            ArtifactFormat::Narrative => Self::to_markdown(&parsed),
            ArtifactFormat::Code => parsed
                .get("code")
                .and_then(Value::as_str)
                .map_or_else(|| content.to_string(), str::to_string),
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
