//! Remote repository naming: cache keys, clone URLs, and GitHub URL parsing.

use anyhow::{Context, Result, anyhow};
use url::Url;

/// User name GitHub accepts alongside an installation or PAT token.
pub const TOKEN_USER: &str = "x-access-token";

/// Directory name for a cached clone of `owner/repo`.
///
/// Characters other than word characters, `-` and `.` become `_`; leading
/// and trailing `_` are trimmed; an empty result becomes `repo`.
pub fn cache_key(owner: &str, repo: &str) -> String {
    let key: String = format!("{owner}_{repo}")
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let key = key.trim_matches('_');
    if key.is_empty() {
        "repo".to_string()
    } else {
        key.to_string()
    }
}

/// `{server}/{owner}/{repo}.git`, with `token` injected as credentials.
///
/// The token is only injected into URLs that carry a host; local `file://`
/// remotes are returned as-is.
pub fn clone_url(server_url: &str, owner: &str, repo: &str, token: &str) -> Result<String> {
    let plain = format!("{}/{owner}/{repo}.git", server_url.trim_end_matches('/'));
    if token.is_empty() {
        return Ok(plain);
    }
    let mut url = Url::parse(&plain).with_context(|| format!("invalid server url {server_url}"))?;
    if url.host().is_none() {
        return Ok(plain);
    }
    url.set_username(TOKEN_USER)
        .map_err(|()| anyhow!("cannot set credentials on {server_url}"))?;
    url.set_password(Some(token))
        .map_err(|()| anyhow!("cannot set credentials on {server_url}"))?;
    Ok(url.to_string())
}

/// Extract `(owner, repo)` from a GitHub remote URL.
///
/// Supports:
/// - git@github.com:owner/repo.git (any SSH host)
/// - https://github.com/owner/repo.git
/// - https://github.com/owner/repo
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    let url = url.trim().trim_end_matches('/');

    if let Some(rest) = url.strip_prefix("git@") {
        let (_, path) = rest.split_once(':')?;
        return split_owner_repo(path);
    }

    if !url.contains("github.com") {
        return None;
    }
    if let Ok(parsed) = Url::parse(url) {
        if let Some(found) = split_owner_repo(parsed.path().trim_start_matches('/')) {
            return Some(found);
        }
    }
    // No scheme, e.g. `github.com/owner/repo`.
    let path = url.split("github.com").nth(1)?.trim_start_matches(['/', ':']);
    split_owner_repo(path)
}

fn split_owner_repo(path: &str) -> Option<(String, String)> {
    let (owner, repo) = path.split_once('/')?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
