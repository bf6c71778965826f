//! Payload decoding for plan entries.

use std::fmt;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value;
use tracing::warn;

use super::document::{EntrySlot, RawFileEntry};

/// Standard alphabet, canonical padding required (missing padding is retried
/// explicitly), non-zero trailing bits tolerated.
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Padding suffixes tried in order.
const PADDING_ATTEMPTS: [&str; 4] = ["", "=", "==", "==="];

/// Characters of an undecodable value kept for diagnostics.
pub const VALUE_PREFIX_CHARS: usize = 80;

/// Why an entry's encoded content was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Not valid base64 under any padding variant.
    InvalidBase64,
    /// Decoded bytes are not UTF-8 text.
    InvalidUtf8,
    /// `content_base64` is present but is not a string.
    NotAString,
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFailure::InvalidBase64 => {
                f.write_str("invalid base64 (tried 0-3 padding characters)")
            }
            DecodeFailure::InvalidUtf8 => f.write_str("decoded bytes are not UTF-8"),
            DecodeFailure::NotAString => f.write_str("encoded content is not a string"),
        }
    }
}

/// An entry dropped because its encoded content could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEntry {
    /// Entry path, or an empty string if the entry had none.
    pub path: String,
    /// First [`VALUE_PREFIX_CHARS`] characters of the offending value.
    pub value_prefix: String,
    pub reason: DecodeFailure,
}

/// An entry after decoding, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    pub path: Option<String>,
    pub content: Option<String>,
}

/// Decode a base64 token into UTF-8 text.
///
/// ASCII whitespace (wrapped payloads) is ignored. Missing padding is retried
/// with one to three `=` appended. A token that is several padded chunks glued
/// together (the result of merging split fragments) decodes chunk by chunk.
pub fn decode_base64_text(token: &str) -> Result<String, DecodeFailure> {
    let compact: String = token
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let bytes = decode_padded(&compact)
        .or_else(|| decode_concatenated(&compact))
        .ok_or(DecodeFailure::InvalidBase64)?;
    String::from_utf8(bytes).map_err(|_| DecodeFailure::InvalidUtf8)
}

fn decode_padded(token: &str) -> Option<Vec<u8>> {
    PADDING_ATTEMPTS
        .iter()
        .find_map(|pad| ENGINE.decode(format!("{token}{pad}")).ok())
}

fn decode_concatenated(token: &str) -> Option<Vec<u8>> {
    let chunks = split_after_padding(token);
    if chunks.len() < 2 {
        return None;
    }
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(decode_padded(chunk)?);
    }
    Some(out)
}

/// Split a token after every run of `=` that is followed by more data.
fn split_after_padding(token: &str) -> Vec<&str> {
    let bytes = token.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    for i in 1..bytes.len() {
        if bytes[i - 1] == b'=' && bytes[i] != b'=' {
            chunks.push(&token[start..i]);
            start = i;
        }
    }
    chunks.push(&token[start..]);
    chunks
}

/// Decode every entry slot, dropping entries whose encoded content fails.
///
/// Non-object slots disappear silently. Encoded content takes precedence over
/// plain `content`; a failed decode drops the entry rather than falling back.
pub fn decode_entries(slots: Vec<EntrySlot>) -> (Vec<DecodedEntry>, Vec<DroppedEntry>) {
    let mut decoded = Vec::with_capacity(slots.len());
    let mut dropped = Vec::new();
    for slot in slots {
        let EntrySlot::Entry(entry) = slot else {
            continue;
        };
        match decode_entry(&entry) {
            Ok(content) => decoded.push(DecodedEntry {
                path: entry.path().map(str::to_string),
                content,
            }),
            Err(failure) => {
                warn!(
                    path = %failure.path,
                    value_prefix = %failure.value_prefix,
                    reason = %failure.reason,
                    "content_base64 decode failed, dropping entry"
                );
                dropped.push(failure);
            }
        }
    }
    (decoded, dropped)
}

fn decode_entry(entry: &RawFileEntry) -> Result<Option<String>, DroppedEntry> {
    if let Some(encoded) = &entry.content_base64 {
        let failure = |reason, prefix: String| DroppedEntry {
            path: entry.path().unwrap_or_default().to_string(),
            value_prefix: prefix,
            reason,
        };
        let Some(token) = encoded.as_str() else {
            return Err(failure(DecodeFailure::NotAString, prefix_chars(&encoded.to_string())));
        };
        return decode_base64_text(token.trim())
            .map(Some)
            .map_err(|reason| failure(reason, prefix_chars(token)));
    }
    Ok(entry
        .content
        .as_ref()
        .and_then(Value::as_str)
        .map(str::to_string))
}

fn prefix_chars(value: &str) -> String {
    value.chars().take(VALUE_PREFIX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, encoded: Option<Value>, content: Option<Value>) -> EntrySlot {
        EntrySlot::Entry(RawFileEntry {
            path: Some(Value::from(path)),
            content_base64: encoded,
            content,
        })
    }

    #[test]
    fn decodes_canonical_base64() {
        assert_eq!(decode_base64_text("eD0x").as_deref(), Ok("x=1"));
    }

    #[test]
    fn tolerates_missing_padding() {
        let padded = "aGVsbG8gd29ybGQ=";
        let expected = decode_base64_text(padded).expect("padded");
        assert_eq!(expected, "hello world");
        assert_eq!(decode_base64_text("aGVsbG8gd29ybGQ").as_deref(), Ok("hello world"));
        assert_eq!(decode_base64_text("eQ").as_deref(), Ok("y"));
        assert_eq!(decode_base64_text("eQ=").as_deref(), Ok("y"));
    }

    #[test]
    fn ignores_wrapped_whitespace() {
        assert_eq!(decode_base64_text("aGVs\nbG8g\r\nd29y bGQ=").as_deref(), Ok("hello world"));
    }

    #[test]
    fn decodes_glued_padded_chunks() {
        assert_eq!(decode_base64_text("eQ==PT0y").as_deref(), Ok("y==2"));
    }

    #[test]
    fn rejects_non_alphabet() {
        assert_eq!(
            decode_base64_text("bm90-base64!!"),
            Err(DecodeFailure::InvalidBase64)
        );
    }

    #[test]
    fn rejects_non_utf8_bytes() {
        // 0xff 0xfe
        assert_eq!(decode_base64_text("//4="), Err(DecodeFailure::InvalidUtf8));
    }

    #[test]
    fn empty_token_decodes_to_empty_text() {
        assert_eq!(decode_base64_text("").as_deref(), Ok(""));
    }

    #[test]
    fn split_after_padding_keeps_trailing_padding_attached() {
        assert_eq!(split_after_padding("eQ==PT0y"), vec!["eQ==", "PT0y"]);
        assert_eq!(split_after_padding("eQ=="), vec!["eQ=="]);
        assert_eq!(split_after_padding("AAAA"), vec!["AAAA"]);
    }

    #[test]
    fn bad_entry_is_dropped_and_good_entry_kept() {
        let slots = vec![
            entry("d.py", Some(Value::from("bm90-base64!!")), None),
            entry("a.py", Some(Value::from("eD0x")), None),
        ];
        let (decoded, dropped) = decode_entries(slots);
        assert_eq!(
            decoded,
            vec![DecodedEntry {
                path: Some("a.py".to_string()),
                content: Some("x=1".to_string()),
            }]
        );
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].path, "d.py");
        assert_eq!(dropped[0].value_prefix, "bm90-base64!!");
        assert_eq!(dropped[0].reason, DecodeFailure::InvalidBase64);
    }

    #[test]
    fn plain_content_passes_through() {
        let (decoded, dropped) =
            decode_entries(vec![entry("c.py", None, Some(Value::from("z=3")))]);
        assert!(dropped.is_empty());
        assert_eq!(decoded[0].content.as_deref(), Some("z=3"));
    }

    #[test]
    fn encoded_content_wins_over_plain() {
        let (decoded, _) = decode_entries(vec![entry(
            "a.py",
            Some(Value::from("eD0x")),
            Some(Value::from("ignored")),
        )]);
        assert_eq!(decoded[0].content.as_deref(), Some("x=1"));
    }

    #[test]
    fn non_string_encoded_value_is_dropped() {
        let (decoded, dropped) = decode_entries(vec![entry("a.py", Some(Value::from(12)), None)]);
        assert!(decoded.is_empty());
        assert_eq!(dropped[0].reason, DecodeFailure::NotAString);
        assert_eq!(dropped[0].value_prefix, "12");
    }

    #[test]
    fn value_prefix_is_bounded() {
        let long = "!".repeat(500);
        let (_, dropped) = decode_entries(vec![entry("a.py", Some(Value::from(long)), None)]);
        assert_eq!(dropped[0].value_prefix.chars().count(), VALUE_PREFIX_CHARS);
    }

    #[test]
    fn skipped_slots_vanish() {
        let (decoded, dropped) = decode_entries(vec![EntrySlot::Skipped]);
        assert!(decoded.is_empty());
        assert!(dropped.is_empty());
    }
}
