//! Resolution of the working copy the code agent edits.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, instrument, warn};

use crate::core::remote::{cache_key, clone_url, parse_github_url};
use crate::io::config::{AgentConfig, RepoSlug};
use crate::io::git::{Git, clone_repo, is_work_tree};

/// Prefix of temporary clone directories.
pub const TEMP_CLONE_PREFIX: &str = "coding_agent_";

/// Branch tried when the configured base branch is missing in a cached clone.
const FALLBACK_BASE: &str = "master";

/// Where a workspace came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceSource {
    /// `--repo-path`.
    Explicit,
    /// Reused clone under the cache root.
    Cached,
    /// Fresh clone in a kept temporary directory (`--no-cache`).
    Temporary,
    /// `GITHUB_WORKSPACE` (or the current directory).
    Environment,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub source: WorkspaceSource,
}

impl Workspace {
    pub fn git(&self, config: &AgentConfig) -> Git {
        Git::new(&self.root, git_timeout(config))
    }
}

fn git_timeout(config: &AgentConfig) -> Duration {
    Duration::from_secs(config.settings.git.timeout_secs)
}

/// Pick the working copy for a code run.
///
/// An explicit path must be a git work tree. Otherwise a configured
/// repository is cloned (temporary with `no_cache`, cached by default), and
/// without one `config.workspace` must be a git work tree.
#[instrument(skip_all, fields(explicit = repo_path.is_some(), no_cache))]
pub fn resolve_workspace(
    config: &AgentConfig,
    repo_path: Option<&Path>,
    no_cache: bool,
) -> Result<Workspace> {
    if let Some(path) = repo_path {
        if !is_work_tree(path) {
            bail!("Not a Git repository: {}", path.display());
        }
        return Ok(Workspace {
            root: path.to_path_buf(),
            source: WorkspaceSource::Explicit,
        });
    }

    if let Some(repo) = &config.repo {
        return if no_cache {
            let root = clone_to_temp(config, repo)?;
            eprintln!("Cloned repo to {}", root.display());
            Ok(Workspace {
                root,
                source: WorkspaceSource::Temporary,
            })
        } else {
            let root = ensure_cached_clone(config, repo)?;
            eprintln!("Using cached clone at {} (updated from origin)", root.display());
            Ok(Workspace {
                root,
                source: WorkspaceSource::Cached,
            })
        };
    }

    if !is_work_tree(&config.workspace) {
        bail!(
            "Not a Git repository and GITHUB_REPOSITORY not set. \
             Set GITHUB_REPOSITORY=owner/repo or run from a repo clone."
        );
    }
    Ok(Workspace {
        root: config.workspace.clone(),
        source: WorkspaceSource::Environment,
    })
}

/// Repository slug of the GitHub `origin` of the work tree at `path`.
pub fn infer_repo(path: &Path) -> Option<RepoSlug> {
    if !is_work_tree(path) {
        return None;
    }
    let url = Git::new(path, Duration::from_secs(0)).remote_url("origin").ok()?;
    let (owner, name) = parse_github_url(&url)?;
    Some(RepoSlug { owner, name })
}

/// Target repository for tracker calls: the configured one, else the one
/// behind `checkout`'s `origin`.
pub fn target_repo(config: &AgentConfig, checkout: &Path) -> Result<RepoSlug> {
    if let Some(repo) = &config.repo {
        return Ok(repo.clone());
    }
    if !is_work_tree(checkout) {
        bail!(
            "Not a Git repository and GITHUB_REPOSITORY not set. \
             Set GITHUB_REPOSITORY=owner/repo or run from a repo clone."
        );
    }
    infer_repo(checkout).ok_or_else(|| {
        anyhow!(
            "GITHUB_REPOSITORY not set and origin of {} is not a GitHub repository",
            checkout.display()
        )
    })
}

/// Clone into a fresh `coding_agent_*` directory that outlives the process.
pub fn clone_to_temp(config: &AgentConfig, repo: &RepoSlug) -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(TEMP_CLONE_PREFIX)
        .tempdir()
        .context("create temporary clone directory")?;
    let path = dir.keep();
    let url = clone_url(&config.server_url, &repo.owner, &repo.name, &config.github_token)?;
    clone_repo(&url, &path, config.base_branch(), git_timeout(config))?;
    Ok(path)
}

/// Reuse (or create) `<cache root>/<owner>_<repo>` and sync it with origin.
///
/// The clone is fetched and hard-reset to `origin/<base>` (falling back to
/// `origin/master`). A cache that cannot be fetched is deleted and re-cloned.
#[instrument(skip_all, fields(repo = %repo))]
pub fn ensure_cached_clone(config: &AgentConfig, repo: &RepoSlug) -> Result<PathBuf> {
    let cache_root = &config.cache_root;
    fs::create_dir_all(cache_root)
        .with_context(|| format!("create cache root {}", cache_root.display()))?;
    let cache_dir = cache_root.join(cache_key(&repo.owner, &repo.name));
    let url = clone_url(&config.server_url, &repo.owner, &repo.name, &config.github_token)?;
    let timeout = git_timeout(config);

    if cache_dir.exists() {
        match refresh_cached_clone(&Git::new(&cache_dir, timeout), config.base_branch()) {
            Ok(()) => return Ok(cache_dir),
            Err(err) => {
                warn!(err = %err, "cached clone unusable, re-cloning");
                fs::remove_dir_all(&cache_dir)
                    .with_context(|| format!("remove stale cache {}", cache_dir.display()))?;
            }
        }
    }

    clone_repo(&url, &cache_dir, config.base_branch(), timeout)?;
    Ok(cache_dir)
}

fn refresh_cached_clone(git: &Git, base: &str) -> Result<()> {
    if !is_work_tree(git.workdir()) {
        bail!("{} is not a git work tree", git.workdir().display());
    }
    git.fetch("origin")?;
    for branch in [base, FALLBACK_BASE] {
        let synced = git
            .checkout(branch)
            .and_then(|()| git.reset_hard(&format!("origin/{branch}")));
        match synced {
            Ok(()) => {
                info!(branch, "cached clone synced");
                return Ok(());
            }
            Err(err) => warn!(branch, err = %err, "could not sync branch"),
        }
    }
    Ok(())
}
