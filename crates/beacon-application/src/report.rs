//! Comprehensive Report Parsing
//!
//! Schema-tolerant decoding of the analyzer's raw completion into the
//! structured report persisted on aggregations and mirrored onto error
//! logs. Providers drift: fields may be missing, fenced in markdown, or the
//! whole completion may be prose. Anything that is not valid JSON becomes a
//! report whose root cause is the raw text, so no analyzer answer is ever
//! discarded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Report schema version stamped on every persisted report
pub const REPORT_VERSION: &str = "2.0.0";

/// Location block of a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportLocation {
    /// Original source path
    pub file: String,
    /// Line (base-1); 0 when the analyzer could not pin one
    pub line: u32,
    /// Enclosing function, when known
    pub function: Option<String>,
}

/// One prioritized fix suggestion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixSuggestion {
    /// 1 = highest
    pub priority: u32,
    /// Concrete, applicable change
    pub suggestion: String,
}

/// The structured four-section analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComprehensiveReport {
    /// What actually broke and why
    pub root_cause: String,
    /// Where it broke
    pub precise_location: ReportLocation,
    /// Concrete fixes, highest priority first
    pub fix_suggestions: Vec<FixSuggestion>,
    /// Mechanism of the failure
    pub technical_details: String,
    /// One-sentence diagnosis
    pub summary: String,
}

/// Report plus persistence metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    /// The structured analysis
    #[serde(flatten)]
    pub report: ComprehensiveReport,
    /// Schema version of the report
    pub version: String,
    /// When the analyzer produced it
    pub generated_at: DateTime<Utc>,
}

/// Decode the analyzer's raw completion.
///
/// Tries, in order: the whole text as JSON, the first fenced or embedded
/// JSON object, and finally a fallback report wrapping the raw text.
pub fn parse_report(raw: &str) -> ComprehensiveReport {
    let trimmed = raw.trim();
    if let Ok(report) = serde_json::from_str::<ComprehensiveReport>(trimmed) {
        return report;
    }
    if let Some(embedded) = extract_json_object(trimmed) {
        if let Ok(report) = serde_json::from_str::<ComprehensiveReport>(embedded) {
            return report;
        }
    }
    ComprehensiveReport {
        root_cause: trimmed.to_owned(),
        summary: first_line(trimmed),
        ..ComprehensiveReport::default()
    }
}

/// Wrap a parsed report with persistence metadata
pub fn stored(report: ComprehensiveReport, generated_at: DateTime<Utc>) -> StoredReport {
    StoredReport {
        report,
        version: REPORT_VERSION.to_owned(),
        generated_at,
    }
}

/// Slice out the outermost `{ .. }` of the text, if any
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start { Some(&text[start..=end]) } else { None }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let raw = r#"{
            "rootCause": "x was never initialized",
            "preciseLocation": {"file": "src/a.ts", "line": 42, "function": "foo"},
            "fixSuggestions": [{"priority": 1, "suggestion": "guard the access"}],
            "technicalDetails": "undefined deref",
            "summary": "uninitialized x"
        }"#;
        let report = parse_report(raw);
        assert_eq!(report.root_cause, "x was never initialized");
        assert_eq!(report.precise_location.line, 42);
        assert_eq!(report.fix_suggestions.len(), 1);
    }

    #[test]
    fn parses_json_behind_markdown_fences() {
        let raw = "Here is my analysis:\n```json\n{\"rootCause\": \"bad state\", \"summary\": \"s\"}\n```\nend";
        let report = parse_report(raw);
        assert_eq!(report.root_cause, "bad state");
    }

    #[test]
    fn tolerates_missing_fields() {
        let report = parse_report(r#"{"rootCause": "only this"}"#);
        assert_eq!(report.root_cause, "only this");
        assert!(report.fix_suggestions.is_empty());
        assert_eq!(report.precise_location, ReportLocation::default());
    }

    #[test]
    fn prose_falls_back_to_raw_wrap() {
        let report = parse_report("The error is caused by a race.\nMore detail.");
        assert_eq!(report.summary, "The error is caused by a race.");
        assert!(report.root_cause.contains("More detail."));
    }

    #[test]
    fn stored_report_is_stamped() {
        let s = stored(ComprehensiveReport::default(), Utc::now());
        assert_eq!(s.version, REPORT_VERSION);
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("rootCause").is_some());
        assert!(json.get("version").is_some());
    }
}
