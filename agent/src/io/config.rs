//! Agent configuration: an optional `agent.toml` plus the process environment.
//!
//! [`AgentSettings`] is the human-edited TOML layer. [`AgentConfig`] is the
//! resolved view built once in `main` from settings and environment variables
//! and passed down by reference.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Settings file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "agent.toml";

/// Label added to a PR when the reviewer requests changes.
pub const DEFAULT_FIX_LABEL: &str = "agent-fix-requested";

/// LLM backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenRouter,
    YandexGpt,
}

impl Provider {
    /// Parse a provider name; anything unrecognised selects OpenRouter.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "yandexgpt" => Provider::YandexGpt,
            _ => Provider::OpenRouter,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::YandexGpt => "yandexgpt",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenRouter => "openai/gpt-4o-mini",
            Provider::YandexGpt => "yandexgpt-lite/latest",
        }
    }
}

/// Settings file (TOML).
///
/// Every table is optional; missing fields take the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    pub llm: LlmSettings,
    pub git: GitSettings,
    pub context: ContextSettings,
    pub review: ReviewSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: Provider,
    /// Model id; the provider default applies when unset.
    pub model: Option<String>,
    /// Override of the provider API base URL.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Try schema-constrained output before the text pipeline (OpenRouter only).
    pub structured_output: bool,
    pub temperature: f64,
    /// Completion limit (YandexGPT only).
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::OpenRouter,
            model: None,
            base_url: None,
            timeout_secs: 120,
            structured_output: true,
            temperature: 0.6,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitSettings {
    pub base_branch: String,
    /// Wall-clock limit for clone, fetch, pull, and push.
    pub timeout_secs: u64,
    pub cache_dir: Option<PathBuf>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            base_branch: "main".to_string(),
            timeout_secs: 300,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextSettings {
    /// Files larger than this are truncated in the repo context.
    pub max_file_bytes: usize,
    /// Characters kept from a truncated file.
    pub truncated_prefix_chars: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: 50_000,
            truncated_prefix_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReviewSettings {
    pub fix_label: String,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            fix_label: DEFAULT_FIX_LABEL.to_string(),
        }
    }
}

impl AgentSettings {
    pub fn validate(&self) -> Result<()> {
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if !self.llm.temperature.is_finite() || self.llm.temperature < 0.0 {
            return Err(anyhow!("llm.temperature must be a non-negative number"));
        }
        if self.llm.max_tokens == 0 {
            return Err(anyhow!("llm.max_tokens must be > 0"));
        }
        if self.git.base_branch.trim().is_empty() {
            return Err(anyhow!("git.base_branch must be non-empty"));
        }
        if self.git.timeout_secs == 0 {
            return Err(anyhow!("git.timeout_secs must be > 0"));
        }
        if self.context.max_file_bytes == 0 {
            return Err(anyhow!("context.max_file_bytes must be > 0"));
        }
        if self.review.fix_label.trim().is_empty() {
            return Err(anyhow!("review.fix_label must be non-empty"));
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `AgentSettings::default()`.
pub fn load_settings(path: &Path) -> Result<AgentSettings> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        let settings = AgentSettings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: AgentSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(settings)
}

/// `owner/name` of the target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub settings: AgentSettings,
    pub github_token: String,
    /// Target repository, when `GITHUB_REPOSITORY` (or owner + name) is set.
    pub repo: Option<RepoSlug>,
    pub server_url: String,
    pub api_url: String,
    /// Fallback working copy when no repository is configured.
    pub workspace: PathBuf,
    pub provider: Provider,
    pub model: String,
    /// OpenRouter key, or the YandexGPT API key.
    pub llm_api_key: String,
    pub yc_folder_id: String,
    pub yc_iam_token: String,
    pub cache_root: PathBuf,
    pub ci_summary: Option<String>,
}

impl AgentConfig {
    /// Resolve against the process environment.
    pub fn from_env(settings: AgentSettings) -> Self {
        Self::from_env_with(settings, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary variable lookup. Empty values count as unset.
    pub fn from_env_with(settings: AgentSettings, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let repo = resolve_repo(
            var("GITHUB_REPOSITORY"),
            var("GITHUB_REPOSITORY_OWNER"),
            var("REPO_NAME"),
        );

        let provider =
            var("LLM_PROVIDER").map_or(settings.llm.provider, |name| Provider::from_name(&name));
        let model = var("LLM_MODEL")
            .or_else(|| settings.llm.model.clone())
            .unwrap_or_else(|| provider.default_model().to_string());
        let llm_api_key = match provider {
            Provider::OpenRouter => var("OPENROUTER_API_KEY").or_else(|| var("OPENAI_API_KEY")),
            Provider::YandexGpt => var("YC_API_KEY"),
        }
        .unwrap_or_default();

        let cache_root = var("AGENT_CACHE_DIR")
            .map(PathBuf::from)
            .or_else(|| settings.git.cache_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".agent_cache"));

        Self {
            github_token: var("GITHUB_TOKEN").unwrap_or_default(),
            repo,
            server_url: var("GITHUB_SERVER_URL")
                .unwrap_or_else(|| "https://github.com".to_string()),
            api_url: var("GITHUB_API_URL").unwrap_or_else(|| "https://api.github.com".to_string()),
            workspace: PathBuf::from(var("GITHUB_WORKSPACE").unwrap_or_else(|| ".".to_string())),
            provider,
            model,
            llm_api_key,
            yc_folder_id: var("YC_FOLDER_ID").unwrap_or_default(),
            yc_iam_token: var("YC_IAM_TOKEN").unwrap_or_default(),
            cache_root,
            ci_summary: var("CI_SUMMARY"),
            settings,
        }
    }

    pub fn require_github_token(&self) -> Result<&str> {
        if self.github_token.is_empty() {
            bail!("Set GITHUB_TOKEN");
        }
        Ok(&self.github_token)
    }

    /// True when schema-constrained planning should be attempted first.
    pub fn structured_planning_enabled(&self) -> bool {
        self.settings.llm.structured_output
            && self.provider == Provider::OpenRouter
            && !self.llm_api_key.is_empty()
    }

    pub fn base_branch(&self) -> &str {
        &self.settings.git.base_branch
    }
}

fn resolve_repo(
    repository: Option<String>,
    owner: Option<String>,
    name: Option<String>,
) -> Option<RepoSlug> {
    let (owner, name) = match repository {
        Some(full) => match full.split_once('/') {
            Some((owner, name)) => (Some(owner.to_string()), Some(name.to_string())),
            None => (owner, Some(full)),
        },
        None => (owner, name),
    };
    match (owner, name) {
        (Some(owner), Some(name)) if !owner.is_empty() && !name.is_empty() => {
            Some(RepoSlug { owner, name })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(vars: &[(&str, &str)]) -> AgentConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AgentConfig::from_env_with(AgentSettings::default(), |key| map.get(key).cloned())
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(settings, AgentSettings::default());
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(
            &path,
            "[llm]\nprovider = \"yandexgpt\"\ntemperature = 0.2\n\n[git]\nbase_branch = \"develop\"\n",
        )
        .expect("write");
        let settings = load_settings(&path).expect("load");
        assert_eq!(settings.llm.provider, Provider::YandexGpt);
        assert!((settings.llm.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(settings.llm.timeout_secs, 120);
        assert_eq!(settings.git.base_branch, "develop");
        assert_eq!(settings.context.max_file_bytes, 50_000);
        assert_eq!(settings.review.fix_label, DEFAULT_FIX_LABEL);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(&path, "[git]\ntimeout_secs = 0\n").expect("write");
        let err = load_settings(&path).expect_err("zero timeout");
        assert!(format!("{err:#}").contains("git.timeout_secs"));
    }

    #[test]
    fn repository_splits_owner_and_name() {
        let cfg = resolve(&[("GITHUB_REPOSITORY", "octo/widgets")]);
        assert_eq!(
            cfg.repo,
            Some(RepoSlug {
                owner: "octo".to_string(),
                name: "widgets".to_string()
            })
        );
    }

    #[test]
    fn repository_falls_back_to_owner_and_repo_name() {
        let cfg = resolve(&[("GITHUB_REPOSITORY_OWNER", "octo"), ("REPO_NAME", "widgets")]);
        assert_eq!(cfg.repo.map(|r| r.to_string()), Some("octo/widgets".to_string()));
        assert!(resolve(&[("REPO_NAME", "widgets")]).repo.is_none());
    }

    #[test]
    fn unknown_provider_falls_back_to_openrouter() {
        let cfg = resolve(&[("LLM_PROVIDER", "Anthropic"), ("OPENAI_API_KEY", "k")]);
        assert_eq!(cfg.provider, Provider::OpenRouter);
        assert_eq!(cfg.llm_api_key, "k");
        assert_eq!(cfg.model, "openai/gpt-4o-mini");
    }

    #[test]
    fn yandex_uses_its_own_key_and_model() {
        let cfg = resolve(&[
            ("LLM_PROVIDER", "YandexGPT"),
            ("OPENROUTER_API_KEY", "or"),
            ("YC_API_KEY", "yc"),
        ]);
        assert_eq!(cfg.provider, Provider::YandexGpt);
        assert_eq!(cfg.llm_api_key, "yc");
        assert_eq!(cfg.model, "yandexgpt-lite/latest");
        assert!(!cfg.structured_planning_enabled());
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = resolve(&[]);
        assert_eq!(cfg.server_url, "https://github.com");
        assert_eq!(cfg.api_url, "https://api.github.com");
        assert_eq!(cfg.workspace, PathBuf::from("."));
        assert_eq!(cfg.cache_root, PathBuf::from(".agent_cache"));
        assert!(cfg.require_github_token().is_err());
        assert!(cfg.repo.is_none());
        assert!(!cfg.structured_planning_enabled());
    }

    #[test]
    fn empty_values_count_as_unset() {
        let cfg = resolve(&[("GITHUB_TOKEN", ""), ("LLM_MODEL", " ")]);
        assert!(cfg.github_token.is_empty());
        assert_eq!(cfg.model, "openai/gpt-4o-mini");
    }

    #[test]
    fn structured_planning_needs_openrouter_key() {
        assert!(resolve(&[("OPENROUTER_API_KEY", "k")]).structured_planning_enabled());
    }
}
