//! Final filtering of decoded entries into a [`Plan`].

use crate::core::types::{FileEdit, Plan};

use super::decode::DecodedEntry;

/// Keep entries with a non-empty path and a content value, in input order.
pub fn validate_entries(entries: Vec<DecodedEntry>) -> Plan {
    let files = entries
        .into_iter()
        .filter_map(|entry| match (entry.path, entry.content) {
            (Some(path), Some(content)) if !path.is_empty() => Some(FileEdit { path, content }),
            _ => None,
        })
        .collect();
    Plan::new(files)
}
