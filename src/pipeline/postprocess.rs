//! Post-processing of the text returned by the vision model.
//!
//! In text mode the caller asked for prose, but models still emit headings
//! and list markers now and then. [`strip_markup_markers`] removes them with
//! three line-anchored rules. Rules run until the text stops changing, so a
//! line like `1. - item` loses both markers, not just the first.
//!
//! Document mode output is returned as the model wrote it, trimmed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::pipeline::recognize::RecognitionMode;

/// Apply the mode-specific cleanup to the model's raw answer.
pub fn finalize(content: &str, mode: &RecognitionMode) -> String {
    if content.trim().is_empty() {
        return String::new();
    }
    match mode {
        RecognitionMode::Text => strip_markup_markers(content),
        RecognitionMode::Document | RecognitionMode::Other(_) => content.trim().to_string(),
    }
}

// ── Rule 1: Heading markers ──────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#+(?:[ \t]+|$)").unwrap());

// ── Rule 2: Bullet markers ───────────────────────────────────────────────────

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-*+](?:[ \t]+|$)").unwrap());

// ── Rule 3: Ordered-list markers ─────────────────────────────────────────────

static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d+\.(?:[ \t]+|$)").unwrap());

/// Strip heading, bullet and ordered-list markers from every line.
pub fn strip_markup_markers(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = RE_HEADING.replace_all(&current, "");
        let next = RE_BULLET.replace_all(&next, "");
        let next = RE_ORDERED.replace_all(&next, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current.trim().to_string()
}

/// Whether a line starts with a marker that text mode removes.
#[cfg(test)]
fn starts_with_marker(line: &str) -> bool {
    strip_markup_markers(line) != line.trim()
}
