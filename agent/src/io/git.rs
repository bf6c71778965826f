//! Git adapter for the code agent.
//!
//! A small, explicit wrapper around `git` subprocess calls. Local operations
//! run to completion; network operations (clone, fetch, pull, push) are
//! bounded by a timeout.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Output kept from a network command (progress chatter is discarded beyond this).
const NETWORK_OUTPUT_LIMIT: usize = 64 * 1024;

/// Identity used for commits when the repository has none configured.
const FALLBACK_NAME: &str = "agent";
const FALLBACK_EMAIL: &str = "agent@localhost";

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    network_timeout: Duration,
}

/// Clone `url` at `branch` into `dest`.
#[instrument(skip_all, fields(dest = %dest.display(), branch))]
pub fn clone_repo(url: &str, dest: &Path, branch: &str, timeout: Duration) -> Result<Git> {
    let mut cmd = Command::new("git");
    cmd.args(["clone", "--branch", branch, "--", url])
        .arg(dest)
        .env("GIT_TERMINAL_PROMPT", "0");
    run_network(cmd, "clone", timeout)?;
    info!("cloned repository");
    Ok(Git::new(dest, timeout))
}

/// True when `path` is inside a git work tree.
pub fn is_work_tree(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(path)
        .output()
        .map(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
        .unwrap_or(false)
}

fn run_network(cmd: Command, what: &str, timeout: Duration) -> Result<()> {
    let out = run_command_with_timeout(cmd, timeout, NETWORK_OUTPUT_LIMIT)
        .with_context(|| format!("run git {what}"))?;
    if out.timed_out {
        bail!("git {what} timed out after {}s", timeout.as_secs());
    }
    if !out.status.success() {
        bail!("git {what} failed: {}", out.stderr_text());
    }
    Ok(())
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>, network_timeout: Duration) -> Self {
        Self {
            workdir: workdir.into(),
            network_timeout,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            return Err(anyhow!("detached HEAD"));
        }
        Ok(name)
    }

    /// Full SHA of `rev`.
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        Ok(self.run_capture(&["rev-parse", "--verify", rev])?.trim().to_string())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    #[instrument(skip_all, fields(remote))]
    pub fn fetch(&self, remote: &str) -> Result<()> {
        self.network(&["fetch", remote], "fetch")
    }

    #[instrument(skip_all, fields(remote, branch))]
    pub fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        self.network(&["pull", "--no-rebase", remote, branch], "pull")
    }

    /// Force-push `branch` to the same-named branch on `remote`.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn push_force(&self, remote: &str, branch: &str) -> Result<()> {
        let refspec = format!("{branch}:{branch}");
        self.network(&["push", "--force", remote, &refspec], "push")
    }

    /// Checkout an existing branch.
    pub fn checkout(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Create `branch` at `start` (or HEAD) and check it out.
    pub fn checkout_new_branch(&self, branch: &str, start: Option<&str>) -> Result<()> {
        debug!(branch, start, "creating and checking out new branch");
        let mut args = vec!["checkout", "-b", branch];
        if let Some(start) = start {
            args.push(start);
        }
        self.run_checked(&args)?;
        Ok(())
    }

    /// Create or reset `branch` to HEAD and check it out.
    pub fn checkout_reset_branch(&self, branch: &str) -> Result<()> {
        self.run_checked(&["checkout", "-B", branch])?;
        Ok(())
    }

    pub fn reset_hard(&self, target: &str) -> Result<()> {
        self.run_checked(&["reset", "--hard", target])?;
        Ok(())
    }

    pub fn remote_url(&self, remote: &str) -> Result<String> {
        Ok(self.run_capture(&["remote", "get-url", remote])?.trim().to_string())
    }

    pub fn set_remote_url(&self, remote: &str, url: &str) -> Result<()> {
        self.run_checked(&["remote", "set-url", remote, url])
            .map(|_| ())
            .map_err(|_| anyhow!("git remote set-url {remote} failed"))
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        let mut args: Vec<String> = Vec::new();
        if !self.has_identity() {
            args.extend([
                "-c".to_string(),
                format!("user.name={FALLBACK_NAME}"),
                "-c".to_string(),
                format!("user.email={FALLBACK_EMAIL}"),
            ]);
        }
        args.extend(["commit".to_string(), "-m".to_string(), message.to_string()]);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(&args)?;
        Ok(true)
    }

    fn has_identity(&self) -> bool {
        ["user.name", "user.email"].iter().all(|key| {
            self.run(&["config", "--get", key])
                .map(|out| out.status.success())
                .unwrap_or(false)
        })
    }

    /// Put the work tree on `branch`.
    ///
    /// With `from_current_head` the branch is (re)created at HEAD. Otherwise:
    /// an existing local branch is checked out and pulled; a missing one is
    /// created from `origin/<branch>`, else `origin/<base>`, else HEAD.
    #[instrument(skip_all, fields(branch, base, from_current_head))]
    pub fn ensure_branch(&self, branch: &str, base: &str, from_current_head: bool) -> Result<()> {
        if from_current_head {
            return self.checkout_reset_branch(branch);
        }
        if let Err(err) = self.fetch("origin") {
            warn!(err = %err, "fetch failed, continuing with local refs");
        }
        if self.branch_exists(branch)? {
            self.checkout(branch)?;
            if let Err(err) = self.pull("origin", branch) {
                debug!(err = %err, "pull skipped");
            }
            return Ok(());
        }
        for start in [format!("origin/{branch}"), format!("origin/{base}")] {
            if self.checkout_new_branch(branch, Some(&start)).is_ok() {
                debug!(start = %start, "branch created");
                return Ok(());
            }
        }
        self.checkout_new_branch(branch, None)
    }

    /// Stage everything, commit if anything changed, then force-push `branch`
    /// to `origin` (after pointing `origin` at `remote_url` when given).
    #[instrument(skip_all, fields(branch))]
    pub fn commit_and_push(
        &self,
        branch: &str,
        message: &str,
        remote_url: Option<&str>,
    ) -> Result<bool> {
        self.add_all()?;
        let committed = self.commit_staged(message)?;
        if let Some(url) = remote_url {
            self.set_remote_url("origin", url)?;
        }
        self.push_force("origin", branch)?;
        info!(committed, "pushed branch");
        Ok(committed)
    }

    fn network(&self, args: &[&str], what: &str) -> Result<()> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0");
        run_network(cmd, what, self.network_timeout)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
