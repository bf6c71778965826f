//! Snapshot of the working copy handed to the implement planner.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::io::config::ContextSettings;

pub const CONTEXT_HEADER: &str = "Current repo files (path -> content):";
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Render every regular file under `root` as `--- <path> ---` blocks.
///
/// Files are visited in path order and `.git` is skipped. Content is read as
/// lossy UTF-8; files over `max_file_bytes` keep only their first
/// `truncated_prefix_chars` characters. Returns an empty string when there is
/// nothing to show.
pub fn repo_context(root: &Path, limits: &ContextSettings) -> String {
    let mut blocks = vec![CONTEXT_HEADER.to_string()];
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(err = %err, "skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let bytes = match fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %entry.path().display(), err = %err, "skipping unreadable file");
                continue;
            }
        };
        let mut content = String::from_utf8_lossy(&bytes).into_owned();
        if content.len() > limits.max_file_bytes {
            debug!(path = %rel.display(), bytes = content.len(), "truncating large file");
            content = content.chars().take(limits.truncated_prefix_chars).collect();
            content.push_str(TRUNCATION_MARKER);
        }
        blocks.push(format!("\n--- {} ---\n{content}", display_path(rel)));
    }

    if blocks.len() == 1 {
        return String::new();
    }
    blocks.join("\n")
}

fn display_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
