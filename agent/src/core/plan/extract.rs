//! Balanced-object extraction.
//!
//! A single forward scan from the first `{` that tracks brace depth outside of
//! string literals. Replies frequently carry prose after the object (sometimes
//! containing braces of its own), so first-`{`-to-last-`}` slicing is not
//! enough.

/// Scanner state. A quote opens a string only outside of one; inside a
/// string a backslash escapes exactly one following character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    InString { quote: char },
    EscapePending { quote: char },
}

/// Return the first balanced `{...}` substring of `text`.
///
/// Returns an empty string when there is no `{` or when the scan runs out of
/// input before the opening brace is closed.
pub fn extract_balanced_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return "";
    };
    let tail = &text[start..];
    let mut depth = 0usize;
    let mut state = ScanState::Outside;

    for (offset, ch) in tail.char_indices() {
        state = match state {
            ScanState::EscapePending { quote } => ScanState::InString { quote },
            ScanState::InString { quote } if ch == '\\' => ScanState::EscapePending { quote },
            ScanState::InString { quote } if ch == quote => ScanState::Outside,
            ScanState::InString { .. } => state,
            ScanState::Outside => match ch {
                '"' | '\'' => ScanState::InString { quote: ch },
                '{' => {
                    depth += 1;
                    state
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return &tail[..offset + ch.len_utf8()];
                    }
                    state
                }
                _ => state,
            },
        };
    }

    ""
}
