//! Writing a plan into the working copy.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::path::is_safe_relative_path;
use crate::core::types::Plan;

/// What `apply_plan` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub written: Vec<String>,
    /// Paths refused because they were empty, absolute, or escaped the root.
    pub skipped: Vec<String>,
}

/// Write every edit under `root`, in plan order.
///
/// Parent directories are created and existing files overwritten. Unsafe
/// paths are skipped with a warning; a write failure aborts the apply.
#[instrument(skip_all, fields(root = %root.display(), files = plan.len()))]
pub fn apply_plan(root: &Path, plan: &Plan) -> Result<ApplyReport> {
    let mut report = ApplyReport::default();
    for edit in plan {
        if !is_safe_relative_path(&edit.path) {
            warn!(path = %edit.path, "refusing to write outside the working copy");
            report.skipped.push(edit.path.clone());
            continue;
        }
        let target = root.join(&edit.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&target, &edit.content)
            .with_context(|| format!("write {}", target.display()))?;
        debug!(path = %edit.path, bytes = edit.content.len(), "wrote file");
        report.written.push(edit.path.clone());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FileEdit;

    #[test]
    fn writes_nested_files_and_overwrites() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.py"), "old").expect("seed");
        let plan = Plan::new(vec![
            FileEdit::new("a.py", "x=1"),
            FileEdit::new("pkg/sub/b.py", "y=2"),
        ]);
        let report = apply_plan(temp.path(), &plan).expect("apply");
        assert_eq!(report.written, vec!["a.py", "pkg/sub/b.py"]);
        assert_eq!(fs::read_to_string(temp.path().join("a.py")).expect("read"), "x=1");
        assert_eq!(
            fs::read_to_string(temp.path().join("pkg/sub/b.py")).expect("read"),
            "y=2"
        );
    }

    #[test]
    fn unsafe_paths_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("root");
        fs::create_dir_all(&root).expect("mkdir");
        let plan = Plan::new(vec![
            FileEdit::new("../escape.txt", "no"),
            FileEdit::new("/tmp/abs.txt", "no"),
            FileEdit::new("ok.txt", "yes"),
        ]);
        let report = apply_plan(&root, &plan).expect("apply");
        assert_eq!(report.skipped, vec!["../escape.txt", "/tmp/abs.txt"]);
        assert_eq!(report.written, vec!["ok.txt"]);
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn later_edit_of_same_path_wins() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = Plan::new(vec![FileEdit::new("a.txt", "1"), FileEdit::new("a.txt", "2")]);
        apply_plan(temp.path(), &plan).expect("apply");
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "2");
    }
}
