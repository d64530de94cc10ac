//! Fence extraction: strip an enclosing code fence from reshaper output.
//!
//! Models are asked to return bare Markdown but frequently wrap it in
//! ` ```markdown … ``` ` anyway. Three rules are tried in order, first match
//! wins:
//!
//! 1. a fence tagged `markdown`, `md` or `marp` (any case);
//! 2. an untagged fence;
//! 3. no fence: the whole text, trimmed.
//!
//! In rules 1 and 2 the closing fence must be the last thing in the text
//! (trailing whitespace allowed). A fence in the middle of a document is
//! example content, not a wrapper.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_TAGGED_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```[ \t]*(?i:markdown|md|marp)[ \t]*\r?\n([\s\S]*?)\r?\n?```\s*$").unwrap()
});

static RE_PLAIN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[ \t]*\r?\n([\s\S]*?)\r?\n?```\s*$").unwrap());

/// Return the Markdown payload of `text` with any enclosing fence removed.
pub fn extract_markdown(text: &str) -> String {
    if let Some(caps) = RE_TAGGED_FENCE.captures(text) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = RE_PLAIN_FENCE.captures(text) {
        return caps[1].trim().to_string();
    }
    text.trim().to_string()
}
