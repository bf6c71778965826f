//! Reviewer agent: asks the model for a review and posts it on the PR.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::types::IssueText;
use crate::io::github::{IssueTracker, PrFile};
use crate::io::llm::{ChatClient, ChatMessage};
use crate::io::prompt::{render_review_prompt, review_system_prompt};

const CHANGES_REQUESTED: &str = "CHANGES_REQUESTED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    ChangesRequested,
}

impl Verdict {
    /// Any case-insensitive mention of `CHANGES_REQUESTED` counts.
    pub fn from_review(review: &str) -> Self {
        if review.to_uppercase().contains(CHANGES_REQUESTED) {
            Verdict::ChangesRequested
        } else {
            Verdict::Approved
        }
    }
}

pub struct ReviewerAgent<'a> {
    chat: &'a dyn ChatClient,
}

impl<'a> ReviewerAgent<'a> {
    pub fn new(chat: &'a dyn ChatClient) -> Self {
        Self { chat }
    }

    #[instrument(skip_all, fields(issue = issue.number, files = files.len()))]
    pub fn review(
        &self,
        issue: &IssueText,
        diff: &str,
        files: &[PrFile],
        ci_summary: &str,
    ) -> Result<String> {
        let prompt = render_review_prompt(issue, diff, files, ci_summary)?;
        self.chat
            .chat(&[
                ChatMessage::system(review_system_prompt()),
                ChatMessage::user(prompt),
            ])
            .context("request review")
    }
}

/// Comment `review` on the pull request and label it when changes are
/// requested. Labelling is best effort.
#[instrument(skip_all, fields(pr))]
pub fn post_review(
    tracker: &dyn IssueTracker,
    pr: u64,
    review: &str,
    fix_label: &str,
) -> Result<Verdict> {
    tracker
        .add_comment(pr, review)
        .with_context(|| format!("comment on pull request #{pr}"))?;
    let verdict = Verdict::from_review(review);
    if verdict == Verdict::ChangesRequested {
        match tracker.add_label(pr, fix_label) {
            Ok(()) => info!(label = fix_label, "fix label added"),
            Err(err) => warn!(label = fix_label, err = %err, "could not add fix label"),
        }
    }
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::llm::ChatRole;
    use crate::test_support::{RecordingTracker, ScriptedChat};

    #[test]
    fn verdict_is_case_insensitive() {
        assert_eq!(Verdict::from_review("VERDICT: APPROVED"), Verdict::Approved);
        assert_eq!(
            Verdict::from_review("verdict: changes_requested"),
            Verdict::ChangesRequested
        );
        assert_eq!(Verdict::from_review(""), Verdict::Approved);
    }

    #[test]
    fn review_sends_system_and_user_prompt() {
        let chat = ScriptedChat::replying(&["Looks fine.\nVERDICT: APPROVED"]);
        let issue = IssueText {
            number: 2,
            title: "Fix typo".to_string(),
            body: "In README".to_string(),
        };
        let text = ReviewerAgent::new(&chat)
            .review(&issue, "DIFF", &[], "No CI data provided.")
            .expect("review");
        assert!(text.ends_with("VERDICT: APPROVED"));

        let sent = chat.requests.borrow();
        assert_eq!(sent[0][0].role, ChatRole::System);
        assert!(sent[0][1].content.starts_with("Issue: Fix typo\nIn README"));
        assert!(sent[0][1].content.ends_with("CI summary:\nNo CI data provided."));
    }

    #[test]
    fn approved_review_is_only_commented() {
        let tracker = RecordingTracker::default();
        let verdict = post_review(&tracker, 7, "VERDICT: APPROVED", "fix-me").expect("post");
        assert_eq!(verdict, Verdict::Approved);
        assert_eq!(*tracker.comments.borrow(), vec![(7, "VERDICT: APPROVED".to_string())]);
        assert!(tracker.labels.borrow().is_empty());
    }

    #[test]
    fn changes_requested_adds_label() {
        let tracker = RecordingTracker::default();
        post_review(&tracker, 7, "VERDICT: CHANGES_REQUESTED", "fix-me").expect("post");
        assert_eq!(*tracker.labels.borrow(), vec![(7, "fix-me".to_string())]);
    }

    #[test]
    fn label_failure_is_ignored() {
        let tracker = RecordingTracker {
            fail_labels: true,
            ..RecordingTracker::default()
        };
        let verdict = post_review(&tracker, 7, "CHANGES_REQUESTED", "fix-me").expect("post");
        assert_eq!(verdict, Verdict::ChangesRequested);
        assert_eq!(tracker.comments.borrow().len(), 1);
    }
}
