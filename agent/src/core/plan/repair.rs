//! Targeted textual repairs for replies that fail to parse.
//!
//! Each step is a pure text-to-text transform aimed at one malformed-output
//! pattern around the `content_base64` field. [`REPAIR_CHAIN`] lists them in
//! the order the pipeline applies them; new heuristics are appended there.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::document::ENCODED_FIELD;

/// A named repair transform.
#[derive(Debug, Clone, Copy)]
pub struct RepairStep {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

/// Repairs in application order. Steps are cumulative: each one receives the
/// output of the previous step.
pub const REPAIR_CHAIN: &[RepairStep] = &[
    RepairStep {
        name: "fragment-merge",
        apply: merge_split_fragments,
    },
    RepairStep {
        name: "inline-newline-strip",
        apply: strip_newlines_in_encoded_values,
    },
    RepairStep {
        name: "pure-alphabet-clip",
        apply: clip_encoded_values_to_alphabet,
    },
];

// Key, first fragment, then either a bare colon or a (possibly object-closing)
// comma that re-opens the same key, then the second fragment.
static SPLIT_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""content_base64"\s*:\s*"([A-Za-z0-9+/=]+)"\s*(?::|\}?\s*,\s*"content_base64"\s*:)\s*"([A-Za-z0-9+/=]+)""#,
    )
    .expect("split fragment regex")
});

static ENCODED_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"content_base64"\s*:\s*"(.*?)"\s*[}\],]"#).expect("encoded value regex")
});

static VALUE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""\s*[}\],]"#).expect("value end regex"));

/// True for characters of the standard base64 alphabet, padding included.
pub fn is_encoding_alphabet(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'/' | b'=')
}

/// Merge an encoded value that was split across a repeated key.
///
/// Handles `"k":"AB":"CD"`, `"k":"AB","k":"CD"` and `"k":"AB"},"k":"CD"`,
/// each becoming `"k":"ABCD"`. Runs until no split remains, so three or more
/// fragments collapse pairwise.
pub fn merge_split_fragments(text: &str) -> String {
    let mut current = text.to_string();
    // Every merge strictly shortens the text, so this terminates.
    while let Some(caps) = SPLIT_FRAGMENT.captures(&current) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let merged = format!(r#""{ENCODED_FIELD}":"{}{}""#, &caps[1], &caps[2]);
        current.replace_range(whole, &merged);
    }
    current
}

/// Delete raw CR/LF characters inside every `content_base64` string value.
pub fn strip_newlines_in_encoded_values(text: &str) -> String {
    ENCODED_VALUE
        .replace_all(text, |caps: &Captures<'_>| {
            let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
                return caps[0].to_string();
            };
            let cleaned: String = value
                .as_str()
                .chars()
                .filter(|ch| !matches!(ch, '\r' | '\n'))
                .collect();
            format!(
                "{}{}{}",
                &text[whole.start()..value.start()],
                cleaned,
                &text[value.end()..whole.end()]
            )
        })
        .into_owned()
}

/// Clip malformed `content_base64` values to their longest base64-alphabet
/// prefix.
///
/// Whatever follows the prefix up to the next quote-then-delimiter boundary
/// (or the end of the text) is discarded. Values that already read as a JSON
/// string of pure alphabet (escapes such as `\/` included) are kept verbatim,
/// as are values with an empty prefix.
pub fn clip_encoded_values_to_alphabet(text: &str) -> String {
    let key = format!("\"{ENCODED_FIELD}\"");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(&key) {
        let after_key = pos + key.len();
        let Some(value_start) = value_start_offset(&rest[after_key..]).map(|o| after_key + o)
        else {
            out.push_str(&rest[..after_key]);
            rest = &rest[after_key..];
            continue;
        };

        let value = &rest[value_start..];
        let prefix_len = value
            .bytes()
            .take_while(|byte| is_encoding_alphabet(*byte))
            .count();
        let end = VALUE_END.find(value).map_or(value.len(), |m| m.start());

        out.push_str(&rest[..value_start]);
        if prefix_len == 0 || is_intact_value(&value[..end]) {
            out.push_str(&value[..end]);
        } else {
            out.push_str(&value[..prefix_len]);
        }
        rest = &value[end..];
    }

    out.push_str(rest);
    out
}

/// True when `raw` (the text between the quotes) is a valid JSON string whose
/// decoded form is pure alphabet.
fn is_intact_value(raw: &str) -> bool {
    serde_json::from_str::<String>(&format!("\"{raw}\""))
        .is_ok_and(|decoded| decoded.bytes().all(is_encoding_alphabet))
}

/// Offset of the first value character after a key: skips `\s*:\s*"`.
fn value_start_offset(after_key: &str) -> Option<usize> {
    let rest = after_key.trim_start().strip_prefix(':')?;
    let rest = rest.trim_start().strip_prefix('"')?;
    Some(after_key.len() - rest.len())
}
