//! Shared deterministic types for agent core logic.
//!
//! These types define stable contracts between the plan pipeline, the plan
//! producers and the apply step. They carry no I/O and serialize
//! deterministically.

use serde::{Deserialize, Serialize};

/// One full-file replacement produced by a plan.
///
/// `path` is relative to the working-copy root; `content` replaces the whole
/// file (it is never a diff).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

impl FileEdit {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Ordered list of edits. Order is the order edits are applied in.
///
/// An empty plan is a valid terminal outcome meaning "nothing to do".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub files: Vec<FileEdit>,
}

impl Plan {
    pub fn new(files: Vec<FileEdit>) -> Self {
        Self { files }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEdit> {
        self.files.iter()
    }

    /// Paths in application order.
    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|edit| edit.path.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a FileEdit;
    type IntoIter = std::slice::Iter<'a, FileEdit>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

impl IntoIterator for Plan {
    type Item = FileEdit;
    type IntoIter = std::vec::IntoIter<FileEdit>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// What a plan is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Implement an issue from scratch.
    Implement,
    /// Address reviewer feedback on an existing pull request.
    Fix,
}

impl PlanKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanKind::Implement => "implement",
            PlanKind::Fix => "fix",
        }
    }
}

/// Issue text handed to the planners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueText {
    pub number: u64,
    pub title: String,
    pub body: String,
}

impl IssueText {
    /// True when the tracker returned neither a title nor a body.
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }
}

/// A reviewer or issue comment fed back into a fix plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub body: String,
    pub path: Option<String>,
}

impl Feedback {
    /// Text used for the feedback bullet: the body, or the path when the body is empty.
    pub fn display_text(&self) -> &str {
        if self.body.trim().is_empty() {
            self.path.as_deref().unwrap_or("")
        } else {
            &self.body
        }
    }
}
