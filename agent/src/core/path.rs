//! Path safety checks for plan edits.

use std::path::{Component, Path};

/// True when `path` is non-empty, relative, and never climbs out of its root.
///
/// `.` segments are tolerated; `..`, root, and prefix (drive letter)
/// components are not.
pub fn is_safe_relative_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    let mut saw_normal = false;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => saw_normal = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    saw_normal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_relative_paths() {
        assert!(is_safe_relative_path("src/main.py"));
        assert!(is_safe_relative_path("./README.md"));
        assert!(is_safe_relative_path("a/b/c/d.txt"));
    }

    #[test]
    fn rejects_escapes_and_absolutes() {
        assert!(!is_safe_relative_path(""));
        assert!(!is_safe_relative_path("   "));
        assert!(!is_safe_relative_path("/etc/passwd"));
        assert!(!is_safe_relative_path("../outside.txt"));
        assert!(!is_safe_relative_path("src/../../outside.txt"));
        assert!(!is_safe_relative_path("."));
    }
}
