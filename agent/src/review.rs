//! `agent review`: review a pull request against its issue and post the result.

use anyhow::{Context, Result};
use tracing::instrument;

use crate::agents::reviewer::{ReviewerAgent, Verdict, post_review};
use crate::io::config::AgentConfig;
use crate::io::github::{IssueTracker, render_pr_diff};
use crate::io::llm::ChatClient;

pub const DEFAULT_CI_SUMMARY: &str = "No CI data provided.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewRequest {
    pub pr: u64,
    pub issue: u64,
    pub ci_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub verdict: Verdict,
    pub review: String,
}

/// The flag wins over `CI_SUMMARY`; blank values count as unset.
pub fn resolve_ci_summary(flag: Option<&str>, config: &AgentConfig) -> String {
    flag.filter(|value| !value.trim().is_empty())
        .or(config.ci_summary.as_deref())
        .unwrap_or(DEFAULT_CI_SUMMARY)
        .to_string()
}

#[instrument(skip_all, fields(pr = request.pr, issue = request.issue))]
pub fn run_review(
    config: &AgentConfig,
    tracker: &dyn IssueTracker,
    chat: &dyn ChatClient,
    request: &ReviewRequest,
) -> Result<ReviewOutcome> {
    let ci_summary = resolve_ci_summary(request.ci_summary.as_deref(), config);
    let issue = tracker
        .issue(request.issue)
        .with_context(|| format!("fetch issue #{}", request.issue))?;
    let files = tracker
        .pull_request_files(request.pr)
        .with_context(|| format!("fetch files of pull request #{}", request.pr))?;
    let diff = render_pr_diff(&files);

    let review = ReviewerAgent::new(chat).review(&issue, &diff, &files, &ci_summary)?;
    let verdict = post_review(tracker, request.pr, &review, &config.settings.review.fix_label)?;
    Ok(ReviewOutcome { verdict, review })
}
