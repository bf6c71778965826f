//! GitHub REST access behind the [`IssueTracker`] seam.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::types::{Feedback, IssueText};
use crate::io::config::RepoSlug;
use crate::io::http::{build_client, ensure_success};

const API_TIMEOUT_SECS: u64 = 60;
const PER_PAGE: usize = 100;

/// A pull request as far as the agents care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub head_ref: String,
    pub html_url: String,
}

/// One changed file of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrFile {
    pub filename: String,
    /// Absent for binary or oversized files.
    #[serde(default)]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Issue and pull-request operations used by the code and reviewer agents.
pub trait IssueTracker {
    fn issue(&self, number: u64) -> Result<IssueText>;
    fn pull_request(&self, number: u64) -> Result<PullRequest>;
    fn pull_request_files(&self, number: u64) -> Result<Vec<PrFile>>;
    /// Inline review comments.
    fn review_comments(&self, number: u64) -> Result<Vec<Feedback>>;
    /// Conversation comments on the PR.
    fn issue_comments(&self, number: u64) -> Result<Vec<Feedback>>;
    /// First open PR whose head is `branch` in the configured repository.
    fn open_pull_for_branch(&self, branch: &str) -> Result<Option<PullRequest>>;
    fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest>;
    fn add_comment(&self, number: u64, body: &str) -> Result<()>;
    fn add_label(&self, number: u64, label: &str) -> Result<()>;
}

/// Concatenate per-file patches into a unified-diff-like text.
///
/// Files without a patch are skipped.
pub fn render_pr_diff(files: &[PrFile]) -> String {
    files
        .iter()
        .filter_map(|file| {
            let patch = file.patch.as_deref().filter(|p| !p.is_empty())?;
            Some(format!(
                "--- a/{name}\n+++ b/{name}\n{patch}",
                name = file.filename
            ))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: String,
    repo: RepoSlug,
}

#[derive(Deserialize)]
struct IssueResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    head: HeadRef,
    #[serde(default)]
    html_url: String,
}

#[derive(Deserialize)]
struct HeadRef {
    #[serde(rename = "ref")]
    name: String,
}

impl From<PullResponse> for PullRequest {
    fn from(pull: PullResponse) -> Self {
        Self {
            number: pull.number,
            head_ref: pull.head.name,
            html_url: pull.html_url,
        }
    }
}

#[derive(Deserialize)]
struct CommentResponse {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

impl From<CommentResponse> for Feedback {
    fn from(comment: CommentResponse) -> Self {
        Self {
            body: comment.body.unwrap_or_default(),
            path: comment.path,
        }
    }
}

impl GitHubClient {
    pub fn new(api_url: &str, token: &str, repo: RepoSlug) -> Result<Self> {
        Ok(Self {
            http: build_client(Duration::from_secs(API_TIMEOUT_SECS))?,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            repo,
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{tail}",
            self.api_url, self.repo.owner, self.repo.name
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .bearer_auth(&self.token)
    }

    fn get<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self
            .authed(self.http.get(url))
            .send()
            .with_context(|| format!("send {what}"))?;
        ensure_success(response, what)?
            .json()
            .with_context(|| format!("decode {what}"))
    }

    fn get_all<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for page in 1.. {
            let separator = if url.contains('?') { '&' } else { '?' };
            let paged = format!("{url}{separator}per_page={PER_PAGE}&page={page}");
            let batch: Vec<T> = self.get(&paged, what)?;
            let done = batch.len() < PER_PAGE;
            out.extend(batch);
            if done {
                break;
            }
        }
        Ok(out)
    }

    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        what: &str,
    ) -> Result<reqwest::blocking::Response> {
        let response = self
            .authed(self.http.post(url))
            .json(body)
            .send()
            .with_context(|| format!("send {what}"))?;
        ensure_success(response, what)
    }
}

impl IssueTracker for GitHubClient {
    #[instrument(skip_all, fields(issue = number))]
    fn issue(&self, number: u64) -> Result<IssueText> {
        let issue: IssueResponse =
            self.get(&self.repo_url(&format!("issues/{number}")), "get issue")?;
        Ok(IssueText {
            number,
            title: issue.title.unwrap_or_default(),
            body: issue.body.unwrap_or_default(),
        })
    }

    #[instrument(skip_all, fields(pr = number))]
    fn pull_request(&self, number: u64) -> Result<PullRequest> {
        let pull: PullResponse =
            self.get(&self.repo_url(&format!("pulls/{number}")), "get pull request")?;
        Ok(pull.into())
    }

    #[instrument(skip_all, fields(pr = number))]
    fn pull_request_files(&self, number: u64) -> Result<Vec<PrFile>> {
        let files: Vec<PrFile> = self.get_all(
            &self.repo_url(&format!("pulls/{number}/files")),
            "list pull request files",
        )?;
        debug!(files = files.len(), "pull request files");
        Ok(files)
    }

    #[instrument(skip_all, fields(pr = number))]
    fn review_comments(&self, number: u64) -> Result<Vec<Feedback>> {
        let comments: Vec<CommentResponse> = self.get_all(
            &self.repo_url(&format!("pulls/{number}/comments")),
            "list review comments",
        )?;
        Ok(comments.into_iter().map(Feedback::from).collect())
    }

    #[instrument(skip_all, fields(pr = number))]
    fn issue_comments(&self, number: u64) -> Result<Vec<Feedback>> {
        let comments: Vec<CommentResponse> = self.get_all(
            &self.repo_url(&format!("issues/{number}/comments")),
            "list issue comments",
        )?;
        Ok(comments.into_iter().map(Feedback::from).collect())
    }

    #[instrument(skip_all, fields(branch))]
    fn open_pull_for_branch(&self, branch: &str) -> Result<Option<PullRequest>> {
        let url = format!(
            "{}?state=open&head={}:{branch}",
            self.repo_url("pulls"),
            self.repo.owner
        );
        let pulls: Vec<PullResponse> = self.get(&url, "list open pull requests")?;
        Ok(pulls.into_iter().next().map(PullRequest::from))
    }

    #[instrument(skip_all, fields(head = %request.head, base = %request.base))]
    fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let body = serde_json::to_value(request).context("serialize pull request")?;
        let pull: PullResponse = self
            .post_json(&self.repo_url("pulls"), &body, "create pull request")?
            .json()
            .context("decode created pull request")?;
        Ok(pull.into())
    }

    #[instrument(skip_all, fields(number))]
    fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        self.post_json(
            &self.repo_url(&format!("issues/{number}/comments")),
            &json!({ "body": body }),
            "add comment",
        )?;
        Ok(())
    }

    #[instrument(skip_all, fields(number, label))]
    fn add_label(&self, number: u64, label: &str) -> Result<()> {
        self.post_json(
            &self.repo_url(&format!("issues/{number}/labels")),
            &json!({ "labels": [label] }),
            "add label",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, patch: Option<&str>) -> PrFile {
        PrFile {
            filename: name.to_string(),
            patch: patch.map(str::to_string),
        }
    }

    #[test]
    fn diff_joins_patched_files_only() {
        let diff = render_pr_diff(&[
            file("a.py", Some("@@ -1 +1 @@\n-x\n+y")),
            file("logo.png", None),
            file("b.py", Some("@@ -0,0 +1 @@\n+z")),
        ]);
        assert_eq!(
            diff,
            "--- a/a.py\n+++ b/a.py\n@@ -1 +1 @@\n-x\n+y\n--- a/b.py\n+++ b/b.py\n@@ -0,0 +1 @@\n+z"
        );
    }

    #[test]
    fn diff_of_no_files_is_empty() {
        assert_eq!(render_pr_diff(&[]), "");
    }

    #[test]
    fn pull_response_maps_head_ref() {
        let pull: PullResponse = serde_json::from_str(
            r#"{"number":7,"head":{"ref":"agent-issue-3","sha":"abc"},"html_url":"https://x/pull/7"}"#,
        )
        .expect("parse");
        let pull = PullRequest::from(pull);
        assert_eq!(pull.head_ref, "agent-issue-3");
        assert_eq!(pull.number, 7);
    }

    #[test]
    fn repo_url_joins_api_base() {
        let client = GitHubClient::new(
            "https://api.github.com/",
            "t",
            RepoSlug {
                owner: "o".to_string(),
                name: "r".to_string(),
            },
        )
        .expect("client");
        assert_eq!(client.repo_url("pulls/1"), "https://api.github.com/repos/o/r/pulls/1");
    }
}
