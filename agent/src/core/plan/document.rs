//! Typed shape of a plan reply: `{"files": [{"path", "content_base64" | "content"}]}`.
//!
//! Deserialization is strict where a silent success would corrupt content and
//! lenient everywhere else:
//!
//! - A repeated `content_base64` key inside one entry fails the whole parse
//!   (a split fragment must be repaired, never resolved by "last key wins").
//! - A `files` value that is not a list parses as [`FilesField::NotAList`].
//! - List items that are not objects parse as [`EntrySlot::Skipped`].

use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Wire name of the base64-encoded content field.
pub const ENCODED_FIELD: &str = "content_base64";

/// Top-level reply object.
#[derive(Debug, Deserialize)]
pub struct PlanDocument {
    #[serde(default)]
    pub files: FilesField,
}

/// The `files` member of a reply.
#[derive(Debug, Default)]
pub enum FilesField {
    #[default]
    Missing,
    NotAList,
    List(Vec<EntrySlot>),
}

/// One item of the `files` list.
#[derive(Debug)]
pub enum EntrySlot {
    Entry(RawFileEntry),
    Skipped,
}

/// Pre-decode representation of one file edit.
///
/// Fields are kept as loose JSON values so a wrongly typed field drops only
/// its entry; a JSON `null` counts as absent.
#[derive(Debug, Default, Deserialize)]
pub struct RawFileEntry {
    #[serde(default)]
    pub path: Option<Value>,
    #[serde(default)]
    pub content_base64: Option<Value>,
    #[serde(default)]
    pub content: Option<Value>,
}

impl RawFileEntry {
    /// Non-empty string path, if any.
    pub fn path(&self) -> Option<&str> {
        self.path
            .as_ref()
            .and_then(Value::as_str)
            .filter(|path| !path.is_empty())
    }
}

/// Parse `text` as a plan object.
///
/// Only text that starts with `{` is considered; anything else is not a
/// structured object and fails without consulting the JSON parser.
pub fn parse_document(text: &str) -> Option<PlanDocument> {
    if !text.trim_start().starts_with('{') {
        return None;
    }
    match serde_json::from_str::<PlanDocument>(text) {
        Ok(document) => Some(document),
        Err(err) => {
            debug!(err = %err, "plan object did not parse");
            None
        }
    }
}

impl<'de> Deserialize<'de> for FilesField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FilesVisitor)
    }
}

struct FilesVisitor;

impl<'de> Visitor<'de> for FilesVisitor {
    type Value = FilesField;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a list of file entries")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FilesField, A::Error> {
        let mut entries = Vec::new();
        while let Some(entry) = seq.next_element::<EntrySlot>()? {
            entries.push(entry);
        }
        Ok(FilesField::List(entries))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FilesField, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(FilesField::NotAList)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<FilesField, E> {
        Ok(FilesField::NotAList)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<FilesField, E> {
        Ok(FilesField::NotAList)
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<FilesField, E> {
        Ok(FilesField::NotAList)
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<FilesField, E> {
        Ok(FilesField::NotAList)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<FilesField, E> {
        Ok(FilesField::NotAList)
    }

    fn visit_unit<E: de::Error>(self) -> Result<FilesField, E> {
        Ok(FilesField::NotAList)
    }
}

impl<'de> Deserialize<'de> for EntrySlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(EntryVisitor)
    }
}

struct EntryVisitor;

impl<'de> Visitor<'de> for EntryVisitor {
    type Value = EntrySlot;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a file entry object")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<EntrySlot, A::Error> {
        // Errors here (notably duplicate keys) fail the enclosing document.
        RawFileEntry::deserialize(de::value::MapAccessDeserializer::new(map)).map(EntrySlot::Entry)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<EntrySlot, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(EntrySlot::Skipped)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<EntrySlot, E> {
        Ok(EntrySlot::Skipped)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<EntrySlot, E> {
        Ok(EntrySlot::Skipped)
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<EntrySlot, E> {
        Ok(EntrySlot::Skipped)
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<EntrySlot, E> {
        Ok(EntrySlot::Skipped)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<EntrySlot, E> {
        Ok(EntrySlot::Skipped)
    }

    fn visit_unit<E: de::Error>(self) -> Result<EntrySlot, E> {
        Ok(EntrySlot::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(text: &str) -> Vec<EntrySlot> {
        match parse_document(text).expect("parse").files {
            FilesField::List(entries) => entries,
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn parses_encoded_and_plain_entries() {
        let got = entries(
            r#"{"files":[{"path":"a.py","content_base64":"eD0x"},{"path":"b.py","content":"y"}]}"#,
        );
        assert_eq!(got.len(), 2);
        let EntrySlot::Entry(first) = &got[0] else {
            panic!("expected entry");
        };
        assert_eq!(first.path(), Some("a.py"));
        assert_eq!(
            first.content_base64.as_ref().and_then(Value::as_str),
            Some("eD0x")
        );
    }

    #[test]
    fn duplicate_encoded_key_fails_whole_document() {
        let text = r#"{"files":[{"path":"b.py","content_base64":"eQ==","content_base64":"PT0y"}]}"#;
        assert!(parse_document(text).is_none());
    }

    #[test]
    fn missing_files_is_missing() {
        let doc = parse_document(r#"{"summary":"nothing"}"#).expect("parse");
        assert!(matches!(doc.files, FilesField::Missing));
    }

    #[test]
    fn non_list_files_is_not_a_list() {
        for text in [
            r#"{"files":{"path":"a"}}"#,
            r#"{"files":"a.py"}"#,
            r#"{"files":3}"#,
            r#"{"files":null}"#,
            r#"{"files":true}"#,
        ] {
            let doc = parse_document(text).expect("parse");
            assert!(matches!(doc.files, FilesField::NotAList), "{text}");
        }
    }

    #[test]
    fn non_object_items_are_skipped() {
        let got = entries(r#"{"files":["a.py",1,null,[1,2],{"path":"b.py","content":"x"}]}"#);
        assert_eq!(got.len(), 5);
        assert!(got[..4].iter().all(|slot| matches!(slot, EntrySlot::Skipped)));
        assert!(matches!(got[4], EntrySlot::Entry(_)));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let got = entries(r#"{"explanation":"done","files":[{"path":"a","content":"b","mode":"w"}]}"#);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn non_object_text_is_rejected() {
        assert!(parse_document(r#"[{"files":[]}]"#).is_none());
        assert!(parse_document("files: []").is_none());
    }

    #[test]
    fn trailing_prose_fails_parse() {
        assert!(parse_document(r#"{"files":[]} thanks"#).is_none());
    }

    #[test]
    fn empty_or_non_string_path_is_none() {
        let entry = RawFileEntry {
            path: Some(Value::String(String::new())),
            ..RawFileEntry::default()
        };
        assert_eq!(entry.path(), None);
        let entry = RawFileEntry {
            path: Some(Value::from(7)),
            ..RawFileEntry::default()
        };
        assert_eq!(entry.path(), None);
    }
}
