//! Text normalization for raw model replies.
//!
//! Only two rewrites happen here: markdown fences around the whole reply are
//! removed, and backslash-newline line continuations are collapsed. Anything
//! else is left alone so file content survives byte for byte.

use std::sync::LazyLock;

use regex::Regex;

static OPEN_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[\w.+-]*[ \t]*\r?\n?").expect("open fence regex"));
static CLOSE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?```\s*$").expect("close fence regex"));
static LINE_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\r?\n").expect("line continuation regex"));

/// Normalize a raw reply.
///
/// Returns `None` when the reply is empty or whitespace-only.
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let unfenced = strip_fences(trimmed);
    Some(LINE_CONTINUATION.replace_all(unfenced.trim(), "").into_owned())
}

/// Strip an opening fence line (with optional language tag) and a trailing fence.
///
/// Text that does not start with a fence is returned unchanged.
pub fn strip_fences(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }
    let without_open = OPEN_FENCE.replace(text, "");
    CLOSE_FENCE.replace(&without_open, "").into_owned()
}
