//! Pulls the playable HTML document out of free-form model output.
//!
//! The model does not reliably format its fences, so extraction tries an ordered
//! list of independent matchers. The first one that captures anything decides
//! the result; later matchers are not consulted even if that capture is rejected.

use std::sync::LazyLock;

use regex::Regex;

/// A single fallback strategy: returns the raw fenced interior if it matches.
type Matcher = fn(&str) -> Option<&str>;

/// Tried in order, most specific first.
const MATCHERS: &[(&str, Matcher)] = &[
    ("tagged-html", tagged_html_block),
    ("untagged", untagged_block),
    ("tagged-html-inline", inline_html_block),
];

static TAGGED_HTML: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?i:html)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("valid regex"));
static UNTAGGED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("valid regex"));
static INLINE_HTML: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?i:html)(.*?)```").expect("valid regex"));

fn first_capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn tagged_html_block(text: &str) -> Option<&str> {
    first_capture(&TAGGED_HTML, text)
}

fn untagged_block(text: &str) -> Option<&str> {
    first_capture(&UNTAGGED, text)
}

fn inline_html_block(text: &str) -> Option<&str> {
    first_capture(&INLINE_HTML, text)
}

/// Returns the trimmed document, or `None` when the response carries no usable
/// artifact. `None` is a normal outcome: the caller keeps its current artifact.
pub fn extract(response: &str) -> Option<String> {
    let (name, captured) = MATCHERS
        .iter()
        .find_map(|(name, matcher)| matcher(response).map(|c| (*name, c)))?;

    let candidate = captured.trim();
    if is_document(candidate) {
        tracing::debug!(matcher = name, bytes = candidate.len(), "Extracted artifact");
        Some(candidate.to_string())
    } else {
        tracing::debug!(matcher = name, "Fenced block is not an HTML document");
        None
    }
}

/// True when `text` contains a doctype declaration or an `<html` root tag.
pub fn is_document(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("<!doctype html") || lower.contains("<html")
}

/// Drops every fence marker and trims, for responses that were asked to be
/// bare HTML but may still arrive fenced.
pub fn strip_fences(text: &str) -> String {
    text.replace("```html", "").replace("```", "").trim().to_string()
}
