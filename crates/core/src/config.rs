//! Configuration for the MergeWatch daemon.
//!
//! Loaded once at startup from a TOML file. Secrets are never stored in the
//! file itself; `*_env` fields name environment variables that are resolved
//! by [`MergeWatchConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeWatchConfig {
    /// Polling and concurrency settings.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// The shared working copy and its remote.
    pub repository: RepositoryConfig,

    /// Where open pull requests are listed from.
    pub github: GitHubConfig,

    /// The external conflict-resolution agent.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Merge commit formatting.
    #[serde(default)]
    pub merge: MergeConfig,
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Seconds between polls of the open pull request list (default 30).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Upper bound on merge workers running at once (default 3).
    #[serde(default = "default_max_parallel_merges")]
    pub max_parallel_merges: usize,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_max_parallel_merges() -> usize {
    3
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_parallel_merges: default_max_parallel_merges(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Local checkout shared by every merge worker. A leading `~/` is
    /// expanded to the home directory.
    pub working_copy: PathBuf,

    /// Remote name used for fetch, pull, push and branch deletion.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Integration branch that pull requests are merged into.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,

    /// Name or path of the `git` executable.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
}

fn default_remote() -> String {
    "origin".into()
}

fn default_base_branch() -> String {
    "main".into()
}

fn default_git_binary() -> String {
    "git".into()
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Repository in `owner/repo` format.
    pub repo: String,

    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// The conflict-resolution agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Name or path of the agent executable.
    #[serde(default = "default_agent_command")]
    pub command: String,

    /// Tools the agent may use, passed as a comma-joined allow list.
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,

    /// Environment variables stripped from the agent's environment.
    #[serde(default = "default_env_remove")]
    pub env_remove: Vec<String>,

    /// Instruction prompt.
    /// Placeholders: `{number}`, `{title}`, `{working_copy}`
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

fn default_agent_command() -> String {
    "claude".into()
}

fn default_allowed_tools() -> Vec<String> {
    ["Bash", "Read", "Edit", "Write", "Glob", "Grep"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_env_remove() -> Vec<String> {
    vec!["CLAUDECODE".into()]
}

fn default_prompt_template() -> String {
    r#"You are an agent that resolves git merge conflicts.

Pull request: #{number} - {title}
Working directory: {working_copy} (a merge is already in progress and has conflicts)

Resolve it as follows:
1. List the conflicted files with: git -C {working_copy} diff --name-only --diff-filter=U
2. For each file, read every <<<<<<< ... >>>>>>> block and resolve it so the intent of both sides is kept.
3. Stage each resolved file with: git -C {working_copy} add <file>
4. Complete the merge with: git -C {working_copy} merge --continue --no-edit

If the conflict cannot be resolved, run git -C {working_copy} merge --abort and explain why.

IMPORTANT: never run git checkout."#
        .into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            allowed_tools: default_allowed_tools(),
            env_remove: default_env_remove(),
            prompt_template: default_prompt_template(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Merge commit message.
    /// Placeholders: `{number}`, `{title}`, `{branch}`
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

fn default_message_template() -> String {
    "Merge PR #{number}: {title}".into()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            message_template: default_message_template(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl MergeWatchConfig {
    /// Load a [`MergeWatchConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: MergeWatchConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.repository.working_copy = expand_tilde(&config.repository.working_copy);

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");
        self.github.token = resolve_optional_env(&self.github.token_env, "github.token_env");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watcher.poll_interval_secs == 0 {
            return Err(invalid("watcher.poll_interval_secs", "poll interval must be > 0"));
        }
        if self.watcher.max_parallel_merges == 0 {
            return Err(invalid(
                "watcher.max_parallel_merges",
                "at least one merge worker is required",
            ));
        }
        if self.repository.working_copy.as_os_str().is_empty() {
            return Err(invalid(
                "repository.working_copy",
                "working copy path must not be empty",
            ));
        }
        if self.repository.remote.is_empty() {
            return Err(invalid("repository.remote", "remote name must not be empty"));
        }
        if self.repository.base_branch.is_empty() {
            return Err(invalid(
                "repository.base_branch",
                "base branch must not be empty",
            ));
        }
        if self.github.repo.is_empty() {
            return Err(invalid("github.repo", "GitHub repo must not be empty"));
        }
        if !self.github.repo.contains('/') {
            return Err(invalid(
                "github.repo",
                "GitHub repo must be in 'owner/repo' format",
            ));
        }
        if self.agent.command.is_empty() {
            return Err(invalid("agent.command", "agent command must not be empty"));
        }
        if !self.merge.message_template.contains("{number}") {
            return Err(invalid(
                "merge.message_template",
                "merge message must identify the pull request via {number}",
            ));
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# MergeWatch configuration

[watcher]
poll_interval_secs = 30
max_parallel_merges = 3
log_level = "info"

[repository]
working_copy = "~/src/project"
remote = "origin"
base_branch = "main"
git_binary = "git"

[github]
api_url = "https://api.github.com"
repo = "owner/project"
token_env = "GITHUB_TOKEN"

[agent]
command = "claude"
allowed_tools = ["Bash", "Read", "Edit", "Write", "Glob", "Grep"]
env_remove = ["CLAUDECODE"]
# prompt_template = "..."   # uses a built-in conflict resolution prompt

[merge]
message_template = "Merge PR #{number}: {title}"
"#
    }
}

fn invalid(field: &str, detail: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        detail: detail.into(),
    }
}

/// Try to read an environment variable by name.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
