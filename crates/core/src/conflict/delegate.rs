//! Delegation of textual conflicts to an external resolution agent.
//!
//! The agent runs inside the already-conflicted working copy with a fixed
//! instruction prompt and a restricted tool allow list. Whatever it prints
//! or returns, the verdict comes from the working copy afterwards.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use super::detector::judge_resolution;
use crate::config::AgentConfig;
use crate::errors::DelegateError;
use crate::git::IntegrationRunner;
use crate::models::{Change, CommandOutput};

/// Something that can try to clear a conflicted merge in the working copy.
#[async_trait]
pub trait ConflictDelegate: Send + Sync {
    /// Attempt a resolution for `change`. Returns `true` when the working
    /// copy no longer has a merge in progress.
    async fn resolve(&self, change: &Change) -> bool;
}

/// Fill the prompt template for one pull request.
pub fn render_prompt(template: &str, change: &Change, working_copy: &str) -> String {
    template
        .replace("{number}", &change.number.to_string())
        .replace("{title}", &change.title)
        .replace("{working_copy}", working_copy)
}

/// [`ConflictDelegate`] that shells out to an agent CLI.
///
/// Invocation: `<command> -p <prompt> --allowedTools <a,b,c>`, run in the
/// working copy, with `env_remove` variables stripped.
pub struct AgentDelegate {
    config: AgentConfig,
    runner: Arc<dyn IntegrationRunner>,
}

impl AgentDelegate {
    pub fn new(config: AgentConfig, runner: Arc<dyn IntegrationRunner>) -> Self {
        info!(
            command = %config.command,
            allowed_tools = %config.allowed_tools.join(","),
            "created AgentDelegate"
        );
        Self { config, runner }
    }

    /// Run the agent to completion and capture its output.
    #[instrument(skip(self, change), fields(pr = change.number))]
    pub async fn invoke_agent(&self, change: &Change) -> Result<CommandOutput, DelegateError> {
        let working_copy = self.runner.working_copy();
        let prompt = render_prompt(
            &self.config.prompt_template,
            change,
            &working_copy.display().to_string(),
        );

        let mut cmd = Command::new(&self.config.command);
        cmd.current_dir(working_copy)
            .arg("-p")
            .arg(&prompt)
            .arg("--allowedTools")
            .arg(self.config.allowed_tools.join(","))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for var in &self.config.env_remove {
            cmd.env_remove(var);
        }

        debug!(command = %self.config.command, "spawning resolution agent");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DelegateError::BinaryNotFound(self.config.command.clone())
            } else {
                DelegateError::IoError(e)
            }
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl ConflictDelegate for AgentDelegate {
    async fn resolve(&self, change: &Change) -> bool {
        info!(
            pr = change.number,
            title = %change.title,
            "conflict detected, delegating to resolution agent"
        );

        match self.invoke_agent(change).await {
            Ok(output) => {
                if !output.stdout.trim().is_empty() {
                    info!(pr = change.number, agent_stdout = %output.stdout.trim_end(), "agent output");
                }
                if !output.stderr.trim().is_empty() {
                    warn!(pr = change.number, agent_stderr = %output.stderr.trim_end(), "agent stderr");
                }
                debug!(pr = change.number, exit_code = output.exit_code, "agent exited");
            }
            Err(e) => {
                error!(pr = change.number, error = %e, "resolution agent could not be run");
            }
        }

        let resolved = judge_resolution(self.runner.is_merge_in_progress());
        if resolved {
            info!(pr = change.number, "conflict resolved");
        } else {
            warn!(pr = change.number, "conflict not resolved");
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::errors::GitError;
    use crate::lock::IntegrationLock;

    /// Runner whose only meaningful state is the merge-in-progress flag.
    struct MarkerRunner {
        path: PathBuf,
        lock: IntegrationLock,
        merging: AtomicBool,
    }

    impl MarkerRunner {
        fn new(merging: bool) -> Self {
            Self {
                path: std::env::temp_dir(),
                lock: IntegrationLock::new(),
                merging: AtomicBool::new(merging),
            }
        }
    }

    #[async_trait]
    impl IntegrationRunner for MarkerRunner {
        fn working_copy(&self) -> &Path {
            &self.path
        }
        fn integration_lock(&self) -> &IntegrationLock {
            &self.lock
        }
        async fn fetch(&self, _: &str, _: &str) -> Result<CommandOutput, GitError> {
            Ok(CommandOutput::ok())
        }
        async fn diff_stat(&self, _: &str, _: &str) -> Result<CommandOutput, GitError> {
            Ok(CommandOutput::ok())
        }
        async fn pull_ff_only(&self, _: &str, _: &str) -> Result<CommandOutput, GitError> {
            Ok(CommandOutput::ok())
        }
        async fn merge_no_ff(&self, _: &str, _: &str) -> Result<CommandOutput, GitError> {
            Ok(CommandOutput::ok())
        }
        fn is_merge_in_progress(&self) -> bool {
            self.merging.load(Ordering::SeqCst)
        }
        async fn abort_merge(&self) -> Result<CommandOutput, GitError> {
            Ok(CommandOutput::ok())
        }
        async fn push_branch(&self, _: &str, _: &str) -> Result<CommandOutput, GitError> {
            Ok(CommandOutput::ok())
        }
        async fn delete_remote_branch(&self, _: &str, _: &str) -> Result<CommandOutput, GitError> {
            Ok(CommandOutput::ok())
        }
        async fn delete_local_branch_forced(&self, _: &str) -> Result<CommandOutput, GitError> {
            Ok(CommandOutput::ok())
        }
    }

    fn agent(command: &str) -> AgentConfig {
        AgentConfig {
            command: command.into(),
            ..AgentConfig::default()
        }
    }

    fn change() -> Change {
        Change::new(5, "Rework config loader", "feature/config")
    }

    #[test]
    fn test_render_prompt() {
        let prompt = render_prompt(
            "PR #{number} - {title} in {working_copy}; again {number}",
            &change(),
            "/srv/checkout",
        );
        assert_eq!(
            prompt,
            "PR #5 - Rework config loader in /srv/checkout; again 5"
        );
    }

    #[test]
    fn test_default_prompt_mentions_everything() {
        let prompt = render_prompt(&AgentConfig::default().prompt_template, &change(), "/wc");
        assert!(prompt.contains("#5 - Rework config loader"));
        assert!(prompt.contains("git -C /wc diff --name-only --diff-filter=U"));
        assert!(prompt.contains("merge --continue --no-edit"));
        assert!(prompt.contains("merge --abort"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_verdict_ignores_successful_exit() {
        // `true` exits 0 but the merge is still in progress.
        let runner = Arc::new(MarkerRunner::new(true));
        let delegate = AgentDelegate::new(agent("true"), runner);
        assert!(!delegate.resolve(&change()).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_verdict_ignores_failed_exit() {
        // `false` exits 1 but the marker is gone.
        let runner = Arc::new(MarkerRunner::new(false));
        let delegate = AgentDelegate::new(agent("false"), runner);
        assert!(delegate.resolve(&change()).await);
    }

    #[tokio::test]
    async fn test_missing_agent_binary_still_judged_by_marker() {
        let runner = Arc::new(MarkerRunner::new(true));
        let delegate = AgentDelegate::new(agent("definitely-not-an-agent"), runner.clone());
        assert!(matches!(
            delegate.invoke_agent(&change()).await,
            Err(DelegateError::BinaryNotFound(_))
        ));
        assert!(!delegate.resolve(&change()).await);

        runner.merging.store(false, Ordering::SeqCst);
        assert!(delegate.resolve(&change()).await);
    }
}
