//! `agent code`: turn an issue (or reviewer feedback on its PR) into a pushed
//! branch and a pull request.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::agents::code::CodeAgent;
use crate::core::remote::clone_url;
use crate::core::types::IssueText;
use crate::io::config::AgentConfig;
use crate::io::github::{IssueTracker, NewPullRequest, PullRequest, render_pr_diff};
use crate::io::llm::ChatClient;
use crate::io::workspace::{WorkspaceSource, resolve_workspace};

const TITLE_LIMIT: usize = 72;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeRequest {
    pub issue: u64,
    /// Existing pull request to update with fixes.
    pub pr: Option<u64>,
    pub repo_path: Option<PathBuf>,
    pub verbose: bool,
    pub no_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeOutcome {
    /// The model produced no usable plan; nothing was touched.
    NoChanges,
    Pushed(PushedChange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedChange {
    pub branch: String,
    pub pull: PullRequest,
    /// False when an open pull request for the branch already existed.
    pub created: bool,
    /// False when the working tree already matched the plan.
    pub committed: bool,
    /// Set for `--no-cache` runs; the clone is left for the caller to remove.
    pub temp_clone: Option<PathBuf>,
}

/// Branch the agent pushes for `issue` when no PR is given.
pub fn issue_branch(issue: u64) -> String {
    format!("agent-issue-{issue}")
}

pub fn commit_message(issue: u64) -> String {
    format!("Agent: address issue #{issue}")
}

pub fn pull_request_title(title: &str) -> String {
    let short: String = title.chars().take(TITLE_LIMIT).collect();
    format!("[Agent] {short}")
}

pub fn pull_request_body(issue: u64) -> String {
    format!("Closes #{issue}\n\nAutomated PR by Code Agent.")
}

#[instrument(skip_all, fields(issue = request.issue, pr = request.pr))]
pub fn run_code(
    config: &AgentConfig,
    tracker: &dyn IssueTracker,
    chat: &dyn ChatClient,
    request: &CodeRequest,
) -> Result<CodeOutcome> {
    let workspace = resolve_workspace(config, request.repo_path.as_deref(), request.no_cache)?;

    let issue = tracker
        .issue(request.issue)
        .with_context(|| format!("fetch issue #{}", request.issue))?;
    if issue.is_blank() {
        bail!("Issue not found or empty");
    }
    if request.verbose {
        print_issue(config, &issue);
    }

    let agent = CodeAgent::new(
        chat,
        &workspace.root,
        config.settings.context.clone(),
        config.structured_planning_enabled(),
    );

    let (branch, plan) = match request.pr {
        Some(pr) => {
            let pull = tracker
                .pull_request(pr)
                .with_context(|| format!("fetch pull request #{pr}"))?;
            let diff = render_pr_diff(&tracker.pull_request_files(pr)?);
            let mut feedback = tracker.review_comments(pr)?;
            feedback.extend(tracker.issue_comments(pr)?);
            (pull.head_ref, agent.plan_fixes(&issue, &diff, &feedback)?)
        }
        None => (issue_branch(request.issue), agent.plan_changes(&issue)?),
    };

    if plan.is_empty() {
        return Ok(CodeOutcome::NoChanges);
    }

    let git = workspace.git(config);
    git.ensure_branch(&branch, config.base_branch(), request.pr.is_some())?;
    let report = agent.apply_plan(&plan)?;
    info!(written = report.written.len(), skipped = report.skipped.len(), "plan applied");

    let push_url = match &config.repo {
        Some(repo) => Some(clone_url(
            &config.server_url,
            &repo.owner,
            &repo.name,
            &config.github_token,
        )?),
        None => None,
    };
    let committed =
        git.commit_and_push(&branch, &commit_message(request.issue), push_url.as_deref())?;

    let (pull, created) = match tracker.open_pull_for_branch(&branch)? {
        Some(existing) => {
            info!(number = existing.number, "pull request already open");
            (existing, false)
        }
        None => {
            let pull = tracker.create_pull_request(&NewPullRequest {
                title: pull_request_title(&issue.title),
                body: pull_request_body(request.issue),
                head: branch.clone(),
                base: config.base_branch().to_string(),
            })?;
            (pull, true)
        }
    };

    Ok(CodeOutcome::Pushed(PushedChange {
        branch,
        pull,
        created,
        committed,
        temp_clone: (workspace.source == WorkspaceSource::Temporary).then_some(workspace.root),
    }))
}

fn print_issue(config: &AgentConfig, issue: &IssueText) {
    if let Some(repo) = &config.repo {
        eprintln!("Repo: {repo}");
    }
    eprintln!("Issue #{} title: {:?}", issue.number, issue.title);
    eprintln!("Issue #{} body:\n{}", issue.number, issue.body);
}
