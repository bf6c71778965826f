//! Test-only fakes: a scripted chat client, a recording issue tracker, and a
//! throwaway git remote.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::types::{Feedback, IssueText};
use crate::io::config::RepoSlug;
use crate::io::github::{IssueTracker, NewPullRequest, PrFile, PullRequest};
use crate::io::llm::{ChatClient, ChatMessage, ResponseSchema};

/// One scripted chat reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(String),
}

/// Chat client that replays queued replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedChat {
    replies: RefCell<VecDeque<Scripted>>,
    /// `None` means structured output is unsupported.
    structured: Option<RefCell<VecDeque<Scripted>>>,
    pub requests: RefCell<Vec<Vec<ChatMessage>>>,
    pub structured_requests: RefCell<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Scripted>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Scripted::Reply((*r).to_string())).collect())
    }

    /// Also answer structured requests from `replies`.
    pub fn with_structured(mut self, replies: Vec<Scripted>) -> Self {
        self.structured = Some(RefCell::new(replies.into()));
        self
    }

    fn next(queue: &RefCell<VecDeque<Scripted>>) -> Result<String> {
        match queue.borrow_mut().pop_front() {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

impl ChatClient for ScriptedChat {
    fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.requests.borrow_mut().push(messages.to_vec());
        Self::next(&self.replies)
    }

    fn chat_structured(
        &self,
        messages: &[ChatMessage],
        _schema: &ResponseSchema,
    ) -> Result<Option<String>> {
        let Some(queue) = &self.structured else {
            return Ok(None);
        };
        self.structured_requests.borrow_mut().push(messages.to_vec());
        Self::next(queue).map(Some)
    }
}

/// In-memory issue tracker that records writes.
#[derive(Debug, Default)]
pub struct RecordingTracker {
    pub issues: Vec<IssueText>,
    pub pulls: Vec<PullRequest>,
    pub files: Vec<PrFile>,
    pub review_feedback: Vec<Feedback>,
    pub issue_feedback: Vec<Feedback>,
    /// Branch names that already have an open PR.
    pub open_branches: Vec<String>,
    pub fail_labels: bool,
    pub created: RefCell<Vec<NewPullRequest>>,
    pub comments: RefCell<Vec<(u64, String)>>,
    pub labels: RefCell<Vec<(u64, String)>>,
}

impl RecordingTracker {
    pub fn with_issue(number: u64, title: &str, body: &str) -> Self {
        Self {
            issues: vec![IssueText {
                number,
                title: title.to_string(),
                body: body.to_string(),
            }],
            ..Self::default()
        }
    }
}

impl IssueTracker for RecordingTracker {
    fn issue(&self, number: u64) -> Result<IssueText> {
        self.issues
            .iter()
            .find(|issue| issue.number == number)
            .cloned()
            .ok_or_else(|| anyhow!("issue #{number} not found"))
    }

    fn pull_request(&self, number: u64) -> Result<PullRequest> {
        self.pulls
            .iter()
            .find(|pull| pull.number == number)
            .cloned()
            .ok_or_else(|| anyhow!("pull request #{number} not found"))
    }

    fn pull_request_files(&self, _number: u64) -> Result<Vec<PrFile>> {
        Ok(self.files.clone())
    }

    fn review_comments(&self, _number: u64) -> Result<Vec<Feedback>> {
        Ok(self.review_feedback.clone())
    }

    fn issue_comments(&self, _number: u64) -> Result<Vec<Feedback>> {
        Ok(self.issue_feedback.clone())
    }

    fn open_pull_for_branch(&self, branch: &str) -> Result<Option<PullRequest>> {
        Ok(self
            .open_branches
            .iter()
            .any(|open| open == branch)
            .then(|| PullRequest {
                number: 99,
                head_ref: branch.to_string(),
                html_url: format!("https://example.test/pull/{branch}"),
            }))
    }

    fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let mut created = self.created.borrow_mut();
        created.push(request.clone());
        Ok(PullRequest {
            number: 100 + created.len() as u64,
            head_ref: request.head.clone(),
            html_url: format!("https://example.test/pull/{}", 100 + created.len()),
        })
    }

    fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        self.comments.borrow_mut().push((number, body.to_string()));
        Ok(())
    }

    fn add_label(&self, number: u64, label: &str) -> Result<()> {
        if self.fail_labels {
            bail!("label {label} does not exist");
        }
        self.labels.borrow_mut().push((number, label.to_string()));
        Ok(())
    }
}

/// A bare `origin` at `<tmp>/remotes/owner/repo.git` seeded with one commit
/// on `main` (`README.md` = `# seed\n`).
pub struct TestRepo {
    temp: TempDir,
    seed: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let origin = temp.path().join("remotes").join("owner").join("repo.git");
        fs::create_dir_all(&origin).context("create origin dir")?;
        run_git(&origin, &["init", "--bare", "--quiet"])?;
        run_git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"])?;

        let seed = temp.path().join("seed");
        fs::create_dir_all(&seed).context("create seed dir")?;
        run_git(&seed, &["init", "--quiet"])?;
        run_git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        configure_identity(&seed)?;
        fs::write(seed.join("README.md"), "# seed\n").context("write seed readme")?;
        run_git(&seed, &["add", "."])?;
        run_git(&seed, &["commit", "--quiet", "-m", "chore: seed"])?;
        let origin_str = origin.to_string_lossy().to_string();
        run_git(&seed, &["remote", "add", "origin", &origin_str])?;
        run_git(&seed, &["push", "--quiet", "origin", "main"])?;

        Ok(Self { temp, seed })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn origin_path(&self) -> PathBuf {
        self.temp.path().join("remotes").join("owner").join("repo.git")
    }

    /// `file://` server URL under which `owner/repo.git` resolves to the origin.
    pub fn server_url(&self) -> String {
        format!("file://{}", self.temp.path().join("remotes").display())
    }

    pub fn slug(&self) -> RepoSlug {
        RepoSlug {
            owner: "owner".to_string(),
            name: "repo".to_string(),
        }
    }

    /// Commit `path` on `main` from the seed clone and push it to origin.
    pub fn push_file(&self, path: &str, content: &str) -> Result<()> {
        let target = self.seed.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).context("create parent")?;
        }
        fs::write(&target, content).context("write file")?;
        run_git(&self.seed, &["add", "."])?;
        run_git(&self.seed, &["commit", "--quiet", "-m", &format!("add {path}")])?;
        run_git(&self.seed, &["push", "--quiet", "origin", "main"])?;
        Ok(())
    }

    /// Clone origin into `<tmp>/<name>` with an identity configured.
    pub fn clone_into(&self, name: &str) -> Result<PathBuf> {
        let dest = self.temp.path().join(name);
        let origin = self.origin_path().to_string_lossy().to_string();
        let dest_str = dest.to_string_lossy().to_string();
        run_git(self.temp.path(), &["clone", "--quiet", &origin, &dest_str])?;
        configure_identity(&dest)?;
        Ok(dest)
    }

    /// Content of `path` at the tip of `branch` in origin, if both exist.
    pub fn origin_file(&self, branch: &str, path: &str) -> Option<String> {
        run_git(&self.origin_path(), &["show", &format!("{branch}:{path}")]).ok()
    }

    pub fn origin_has_branch(&self, branch: &str) -> bool {
        run_git(
            &self.origin_path(),
            &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")],
        )
        .is_ok()
    }

    /// Subject line of the tip commit of `branch` in origin.
    pub fn origin_subject(&self, branch: &str) -> Result<String> {
        Ok(run_git(&self.origin_path(), &["log", "-1", "--format=%s", branch])?
            .trim()
            .to_string())
    }
}

fn configure_identity(dir: &Path) -> Result<()> {
    run_git(dir, &["config", "user.name", "Agent Test"])?;
    run_git(dir, &["config", "user.email", "agent-test@example.com"])?;
    Ok(())
}

/// Run git in `dir`, returning stdout.
pub fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("run git {args:?}"))?;
    if !output.status.success() {
        bail!(
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
