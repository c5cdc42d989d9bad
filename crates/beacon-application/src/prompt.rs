//! Unified Diagnosis Prompt Assembly
//!
//! One prompt per diagnosis, assembled from everything the pipeline knows:
//! the error itself, any prior diagnosis, the source snippet around the
//! resolved location, and the sourcemap mapping block. The prompt demands a
//! strict JSON answer with four sections so the response parser stays
//! simple.

use std::fmt::Write as _;

use beacon_domain::entities::ErrorAggregation;
use beacon_domain::ports::{LocatedSource, ResolvedFrame};

/// System prompt demanding the four report sections in strict JSON
pub const DIAGNOSIS_SYSTEM_PROMPT: &str = r#"You are a senior frontend reliability engineer analyzing production browser errors.

You receive one error with its stack trace, release metadata, optional prior
diagnosis, the original source snippet around the failing line (when source
maps resolved it), and the minified-to-original mapping.

Analyze the actual evidence. Do not restate the stack; explain what broke and
why. If a prior diagnosis exists, refine it instead of repeating it.

Respond with STRICT JSON only, no markdown fences, using exactly this shape:

{
  "rootCause": "what actually broke and why, grounded in the snippet",
  "preciseLocation": {
    "file": "original source path",
    "line": 0,
    "function": "enclosing function if known"
  },
  "fixSuggestions": [
    { "priority": 1, "suggestion": "concrete, directly applicable change" }
  ],
  "technicalDetails": "mechanism of the failure: types, state, timing",
  "summary": "one-sentence diagnosis"
}

Every fixSuggestion must be concrete enough to apply without further
investigation. Priority 1 is highest."#;

/// Everything the prompt is assembled from
#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    /// The aggregation under diagnosis
    pub aggregation: Option<&'a ErrorAggregation>,
    /// Source window around the resolved location
    pub source: Option<&'a LocatedSource>,
    /// Resolution of the top stack frame
    pub mapping: Option<&'a ResolvedFrame>,
    /// Release version the error was reported under
    pub version: Option<&'a str>,
}

/// Assemble the single unified user prompt
pub fn build_prompt(ctx: &PromptContext<'_>) -> String {
    let mut prompt = String::with_capacity(2048);

    if let Some(agg) = ctx.aggregation {
        let _ = writeln!(prompt, "## Error");
        let _ = writeln!(prompt, "type: {}", agg.error_type);
        let _ = writeln!(prompt, "message: {}", agg.error_message);
        let _ = writeln!(
            prompt,
            "occurrences: {} (affected users: {})",
            agg.occurrence_count, agg.affected_users
        );
        if let Some(version) = ctx.version {
            let _ = writeln!(prompt, "release: {version}");
        }
        if let Some(stack) = &agg.error_stack {
            let _ = writeln!(prompt, "\n## Stack trace\n{stack}");
        }
        if let Some(prior) = &agg.ai_diagnosis {
            let _ = writeln!(prompt, "\n## Prior diagnosis (refine, do not repeat)\n{prior}");
        }
    }

    if let Some(mapping) = ctx.mapping {
        let _ = writeln!(prompt, "\n## Source map resolution");
        let _ = writeln!(
            prompt,
            "minified: {}:{}:{}",
            mapping.frame.file, mapping.frame.line, mapping.frame.column
        );
        if let Some(original) = &mapping.original {
            let _ = writeln!(
                prompt,
                "original: {}:{}:{} ({})",
                original.source,
                original.line,
                original.column,
                original.name.as_deref().unwrap_or("<unknown fn>")
            );
        } else {
            let _ = writeln!(prompt, "original: unresolved (no map coverage)");
        }
    }

    if let Some(source) = ctx.source {
        let _ = writeln!(prompt, "\n## Source snippet ({})", source.file.file_path);
        if let Some(window) = &source.window {
            for (offset, line) in window.lines.iter().enumerate() {
                let number = window.start_line + offset as u32;
                let marker = if number == window.target_line { ">" } else { " " };
                let _ = writeln!(prompt, "{marker}{number:>5} | {line}");
            }
        }
    }

    let _ = writeln!(
        prompt,
        "\nProduce the four-section JSON report (rootCause, preciseLocation, fixSuggestions, technicalDetails)."
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_domain::entities::{AggregationStatus, ErrorType};
    use beacon_domain::ports::{OriginalPosition, ResolvedFrame};
    use beacon_domain::stack::StackFrame;
    use chrono::Utc;

    fn aggregation() -> ErrorAggregation {
        let now = Utc::now();
        ErrorAggregation {
            id: 1,
            project_id: "p1".to_owned(),
            error_hash: "h".to_owned(),
            error_type: ErrorType::JsError,
            error_message: "TypeError: x is undefined".to_owned(),
            error_stack: Some("at foo (a.js:1:2)".to_owned()),
            source_file: None,
            source_line: None,
            source_column: None,
            first_seen: now,
            last_seen: now,
            occurrence_count: 12,
            affected_users: 4,
            status: AggregationStatus::Open,
            error_level: 3,
            assigned_to: None,
            notes: None,
            tags: None,
            ai_diagnosis: Some("stale diagnosis".to_owned()),
            ai_fix_suggestion: None,
            ai_diagnosis_history: Vec::new(),
            comprehensive_analysis_report: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn prompt_carries_all_sections() {
        let agg = aggregation();
        let mapping = ResolvedFrame {
            frame: StackFrame {
                function: Some("foo".to_owned()),
                file: "a.js".to_owned(),
                line: 1,
                column: 2,
            },
            original: Some(OriginalPosition {
                source: "src/a.ts".to_owned(),
                line: 42,
                column: 3,
                name: Some("foo".to_owned()),
            }),
            context: None,
        };
        let prompt = build_prompt(&PromptContext {
            aggregation: Some(&agg),
            source: None,
            mapping: Some(&mapping),
            version: Some("1.0.0"),
        });

        assert!(prompt.contains("TypeError: x is undefined"));
        assert!(prompt.contains("Prior diagnosis"));
        assert!(prompt.contains("src/a.ts:42:3"));
        assert!(prompt.contains("release: 1.0.0"));
        assert!(prompt.contains("fixSuggestions"));
    }

    #[test]
    fn system_prompt_demands_the_four_sections() {
        for section in ["rootCause", "preciseLocation", "fixSuggestions", "technicalDetails"] {
            assert!(DIAGNOSIS_SYSTEM_PROMPT.contains(section), "missing {section}");
        }
    }
}
