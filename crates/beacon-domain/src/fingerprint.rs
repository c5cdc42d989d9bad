//! Error Fingerprinting
//!
//! Computes the stable structural hash (`error_hash`) that groups
//! same-shape errors into one aggregation. The function is pure: the same
//! stack, message, and source file always produce the same hash, and
//! volatile payload fragments (literals, ids, addresses) never leak into it.
//!
//! Canonicalization rules:
//! - each frame shrinks to `function@file:line` (column dropped)
//! - runtime-supplied anonymous/native frames collapse to `<anon>`
//! - file paths are lowercased
//! - frames from third-party directories (`/node_modules/`, `/.git/`) lose
//!   their line number, so dependency re-bundles do not split groups
//! - the message is truncated to 200 chars and stripped of numeric
//!   literals, quoted strings, hex blobs, and addresses

use once_cell::sync::Lazy;
use regex::Regex;
use xxhash_rust::xxh3::xxh3_128;

use crate::stack::{StackFrame, parse_stack};

/// Max message length participating in the hash
const MESSAGE_PREFIX_LEN: usize = 200;

/// Placeholder for frames with no usable identity
const ANON_FRAME: &str = "<anon>";

/// Path fragments marking third-party code
const THIRD_PARTY_MARKERS: &[&str] = &["/node_modules/", "/.git/"];

#[allow(clippy::expect_used)]
static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#).expect("static regex"));

#[allow(clippy::expect_used)]
static HEX_BLOB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0[xX][0-9a-fA-F]+|\b[0-9a-fA-F]{8,}\b").expect("static regex"));

#[allow(clippy::expect_used)]
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

/// Compute the structural fingerprint of an error.
///
/// `stack` is the raw stack text (may be empty), `message` the raw error
/// message, and `source_file` the minified file the SDK attributed the
/// error to (empty when unknown).
pub fn fingerprint(stack: &str, message: &str, source_file: &str) -> String {
    let frames = parse_stack(stack);
    let mut input = String::new();
    for frame in &frames {
        input.push_str(&canonical_frame(frame));
        input.push('\n');
    }
    input.push_str(&canonical_message(message));
    input.push('\n');
    input.push_str(&source_file.to_lowercase());

    format!("{:032x}", xxh3_128(input.as_bytes()))
}

/// Canonical `function@file:line` form of one frame
fn canonical_frame(frame: &StackFrame) -> String {
    let file = frame.file.to_lowercase();
    if is_runtime_supplied(&file) {
        return ANON_FRAME.to_owned();
    }
    let function = frame.function.as_deref().unwrap_or(ANON_FRAME);
    if THIRD_PARTY_MARKERS.iter().any(|m| file.contains(m)) {
        // third-party frames keep identity but not position
        format!("{function}@{file}")
    } else {
        format!("{function}@{file}:{}", frame.line)
    }
}

/// Frames whose "file" is a runtime placeholder, not a script location
fn is_runtime_supplied(lowered_file: &str) -> bool {
    matches!(lowered_file, "<anonymous>" | "native" | "[native code]" | "eval")
}

/// Message with volatile literals stripped and length bounded
fn canonical_message(message: &str) -> String {
    let truncated: String = message.chars().take(MESSAGE_PREFIX_LEN).collect();
    let no_quotes = QUOTED.replace_all(&truncated, "");
    let no_hex = HEX_BLOB.replace_all(&no_quotes, "");
    let no_numbers = NUMBER.replace_all(&no_hex, "");
    no_numbers.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = "    at foo (https://a.com/App.js:10:5)\n\
                             at bar (https://a.com/lib/node_modules/dep/index.js:99:1)";

    #[test]
    fn deterministic_for_identical_input() {
        let a = fingerprint(STACK, "TypeError: x is undefined", "app.js");
        let b = fingerprint(STACK, "TypeError: x is undefined", "app.js");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn stable_under_stack_whitespace() {
        let spaced = "  at foo (https://a.com/App.js:10:5)  \n\
                          at bar (https://a.com/lib/node_modules/dep/index.js:99:1)";
        assert_eq!(
            fingerprint(STACK, "boom", "app.js"),
            fingerprint(spaced, "boom", "app.js")
        );
    }

    #[test]
    fn stable_under_column_changes() {
        let shifted = "    at foo (https://a.com/App.js:10:87)\n\
                           at bar (https://a.com/lib/node_modules/dep/index.js:99:3)";
        assert_eq!(
            fingerprint(STACK, "boom", "app.js"),
            fingerprint(shifted, "boom", "app.js")
        );
    }

    #[test]
    fn third_party_frames_ignore_line_numbers() {
        let moved = "    at foo (https://a.com/App.js:10:5)\n\
                         at bar (https://a.com/lib/node_modules/dep/index.js:12:1)";
        assert_eq!(
            fingerprint(STACK, "boom", "app.js"),
            fingerprint(moved, "boom", "app.js")
        );
    }

    #[test]
    fn first_party_line_changes_split_the_group() {
        let moved = "    at foo (https://a.com/App.js:11:5)";
        assert_ne!(
            fingerprint("    at foo (https://a.com/App.js:10:5)", "boom", "app.js"),
            fingerprint(moved, "boom", "app.js")
        );
    }

    #[test]
    fn file_path_case_is_ignored() {
        assert_eq!(
            fingerprint("    at foo (https://a.com/App.js:10:5)", "boom", "app.js"),
            fingerprint("    at foo (https://a.com/app.js:10:5)", "boom", "app.js")
        );
    }

    #[test]
    fn messages_differing_only_in_literals_collide() {
        let a = fingerprint(STACK, "Cannot read 'name' of user 42 at 0xdeadbeef", "a.js");
        let b = fingerprint(STACK, "Cannot read 'email' of user 7 at 0xcafebabe", "a.js");
        assert_eq!(a, b);
    }

    #[test]
    fn different_messages_do_not_collide() {
        let a = fingerprint(STACK, "TypeError: x is undefined", "a.js");
        let b = fingerprint(STACK, "RangeError: invalid array length", "a.js");
        assert_ne!(a, b);
    }

    #[test]
    fn native_frames_collapse_to_anon() {
        let a = fingerprint("    at <anonymous>:1:1", "boom", "");
        let b = fingerprint("    at native:1:1", "boom", "");
        // both hash the literal `<anon>` frame; identical remainder
        assert_eq!(a, b);
    }

    #[test]
    fn empty_inputs_still_hash() {
        let h = fingerprint("", "", "");
        assert_eq!(h.len(), 32);
    }
}
