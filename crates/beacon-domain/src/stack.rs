//! Stack Trace Parser
//!
//! Parses raw browser stack text into structured frames. Three line shapes
//! are recognized:
//!
//! - V8 with location parens: `    at foo (https://a.com/x.js:10:5)`
//! - V8 without parens:       `    at https://a.com/x.js:10:5`
//! - Firefox/Safari:          `foo@https://a.com/x.js:10:5`
//!
//! Lines matching none of the shapes are discarded silently; invalid line or
//! column numbers drop the line. Line and column are base-1.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One parsed stack frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Function name, when present in the frame
    pub function: Option<String>,
    /// Script URL or path
    pub file: String,
    /// Line number (base-1)
    pub line: u32,
    /// Column number (base-1)
    pub column: u32,
}

#[allow(clippy::expect_used)]
static V8_WITH_PAREN: Lazy<Regex> = Lazy::new(|| {
    // `at fn (file:line:col)` — fn may contain spaces ("Object.foo [as bar]")
    Regex::new(r"^\s*at\s+(.+?)\s+\((.+):(\d+):(\d+)\)\s*$").expect("static regex")
});

#[allow(clippy::expect_used)]
static V8_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*at\s+(.+):(\d+):(\d+)\s*$").expect("static regex"));

#[allow(clippy::expect_used)]
static GECKO: Lazy<Regex> = Lazy::new(|| {
    // `fn@file:line:col` — empty fn allowed for anonymous frames
    Regex::new(r"^\s*(.*?)@(.+):(\d+):(\d+)\s*$").expect("static regex")
});

/// Parse raw stack text into frames, silently discarding unrecognized lines.
///
/// Returns an empty vector when nothing matches (including empty input).
pub fn parse_stack(stack_text: &str) -> Vec<StackFrame> {
    stack_text.lines().filter_map(parse_line).collect()
}

/// Parse a single stack line, or `None` if it matches no known shape
pub fn parse_line(line: &str) -> Option<StackFrame> {
    if let Some(caps) = V8_WITH_PAREN.captures(line) {
        return Some(StackFrame {
            function: non_empty(&caps[1]),
            file: caps[2].to_owned(),
            line: caps[3].parse().ok()?,
            column: caps[4].parse().ok()?,
        });
    }
    if let Some(caps) = V8_BARE.captures(line) {
        return Some(StackFrame {
            function: None,
            file: caps[1].to_owned(),
            line: caps[2].parse().ok()?,
            column: caps[3].parse().ok()?,
        });
    }
    if let Some(caps) = GECKO.captures(line) {
        return Some(StackFrame {
            function: non_empty(&caps[1]),
            file: caps[2].to_owned(),
            line: caps[3].parse().ok()?,
            column: caps[4].parse().ok()?,
        });
    }
    None
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::v8_with_parens(
        "    at foo (https://a.com/x.js:10:5)",
        Some("foo"),
        "https://a.com/x.js",
        10,
        5
    )]
    #[case::v8_without_parens(
        "    at https://a.com/bundle.min.js:1:43021",
        None,
        "https://a.com/bundle.min.js",
        1,
        43021
    )]
    #[case::gecko("handleClick@https://a.com/app.js:42:13", Some("handleClick"), "https://a.com/app.js", 42, 13)]
    #[case::gecko_anonymous("@https://a.com/app.js:7:2", None, "https://a.com/app.js", 7, 2)]
    fn parses_each_supported_line_shape(
        #[case] line: &str,
        #[case] function: Option<&str>,
        #[case] file: &str,
        #[case] line_no: u32,
        #[case] column: u32,
    ) {
        let frames = parse_stack(line);
        assert_eq!(
            frames,
            vec![StackFrame {
                function: function.map(str::to_owned),
                file: file.to_owned(),
                line: line_no,
                column,
            }]
        );
    }

    #[test]
    fn mixed_stack_keeps_order_and_drops_noise() {
        let stack = "TypeError: x is undefined\n\
                         at foo (https://a.com/x.js:10:5)\n\
                     some random line\n\
                     bar@https://a.com/y.js:2:1";
        let frames = parse_stack(stack);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].function.as_deref(), Some("foo"));
        assert_eq!(frames[1].function.as_deref(), Some("bar"));
    }

    #[test]
    fn empty_input_yields_no_frames() {
        assert!(parse_stack("").is_empty());
        assert!(parse_stack("nothing to see here").is_empty());
    }

    #[test]
    fn overflowing_line_number_drops_the_frame() {
        // 2^64 does not fit a u32; the line must be silently dropped
        assert!(parse_stack("    at foo (a.js:18446744073709551616:1)").is_empty());
    }

    #[test]
    fn method_names_with_qualifiers_are_kept_whole() {
        let frames = parse_stack("    at Object.foo [as onClick] (https://a.com/x.js:3:4)");
        assert_eq!(frames[0].function.as_deref(), Some("Object.foo [as onClick]"));
    }
}
