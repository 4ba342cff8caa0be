//! Version-control command runner bound to one working copy.
//!
//! Mutating operations shell out to the `git` CLI so that merges, conflict
//! markers and `MERGE_HEAD` behave exactly as they would for a human (and
//! for the resolution agent working in the same checkout). Repository state
//! is read through `git2`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use git2::{ErrorCode, Repository, RepositoryState};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;
use crate::lock::IntegrationLock;
use crate::models::CommandOutput;

/// Primitives a merge worker needs from the shared working copy.
///
/// Every command returns its exit code and captured output; `Err` is
/// reserved for commands that could not be run at all.
#[async_trait]
pub trait IntegrationRunner: Send + Sync {
    /// Path of the working copy all commands run in.
    fn working_copy(&self) -> &Path;

    /// The lock guarding pull + merge + push on this working copy.
    fn integration_lock(&self) -> &IntegrationLock;

    /// `git fetch --no-write-fetch-head <remote> <branch>`
    ///
    /// Runs outside the integration lock, so it must leave `FETCH_HEAD` to
    /// the locked `git pull`.
    async fn fetch(&self, remote: &str, branch: &str) -> Result<CommandOutput, GitError>;

    /// `git diff --stat <from>...<to>`
    async fn diff_stat(&self, from_ref: &str, to_ref: &str) -> Result<CommandOutput, GitError>;

    /// `git pull --ff-only <remote> <branch>`
    async fn pull_ff_only(&self, remote: &str, branch: &str) -> Result<CommandOutput, GitError>;

    /// `git merge --no-ff <reference> -m <message>`
    async fn merge_no_ff(&self, reference: &str, message: &str)
        -> Result<CommandOutput, GitError>;

    /// Whether a merge was started and neither completed nor aborted.
    fn is_merge_in_progress(&self) -> bool;

    /// `git merge --abort`
    async fn abort_merge(&self) -> Result<CommandOutput, GitError>;

    /// `git push <remote> <branch>`
    async fn push_branch(&self, remote: &str, branch: &str) -> Result<CommandOutput, GitError>;

    /// `git push <remote> --delete <branch>`
    async fn delete_remote_branch(
        &self,
        remote: &str,
        branch: &str,
    ) -> Result<CommandOutput, GitError>;

    /// `git branch -D <branch>`
    ///
    /// Forced: after a `--no-ff` merge of the remote-tracking ref, git's
    /// "fully merged" check on the local branch is not reliable.
    async fn delete_local_branch_forced(&self, branch: &str) -> Result<CommandOutput, GitError>;
}

/// [`IntegrationRunner`] backed by the `git` CLI.
pub struct GitRunner {
    working_copy: PathBuf,
    git_dir: PathBuf,
    git_binary: String,
    lock: IntegrationLock,
}

impl GitRunner {
    /// Bind to an existing working copy at `working_copy`.
    pub fn new<P: AsRef<Path>>(
        working_copy: P,
        git_binary: impl Into<String>,
    ) -> Result<Self, GitError> {
        let path = working_copy.as_ref();
        info!(path = %path.display(), "opening working copy");
        let repo = match Repository::open(path) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(GitError::WorkingCopyNotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let git_dir = repo.path().to_path_buf();
        Ok(Self {
            working_copy: path.to_path_buf(),
            git_dir,
            git_binary: git_binary.into(),
            lock: IntegrationLock::new(),
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    async fn run_git(&self, args: &[&str]) -> Result<CommandOutput, GitError> {
        let mut cmd = Command::new(&self.git_binary);
        cmd.current_dir(&self.working_copy)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(cmd = %format!("git {}", args.join(" ")), "running git command");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::BinaryNotFound(self.git_binary.clone())
            } else {
                GitError::IoError(e)
            }
        })?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        if !result.success() {
            debug!(
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "git command exited non-zero"
            );
        }
        Ok(result)
    }
}

#[async_trait]
impl IntegrationRunner for GitRunner {
    fn working_copy(&self) -> &Path {
        &self.working_copy
    }

    fn integration_lock(&self) -> &IntegrationLock {
        &self.lock
    }

    #[instrument(skip(self))]
    async fn fetch(&self, remote: &str, branch: &str) -> Result<CommandOutput, GitError> {
        self.run_git(&["fetch", "--no-write-fetch-head", remote, branch])
            .await
    }

    #[instrument(skip(self))]
    async fn diff_stat(&self, from_ref: &str, to_ref: &str) -> Result<CommandOutput, GitError> {
        let range = format!("{}...{}", from_ref, to_ref);
        self.run_git(&["diff", "--stat", &range]).await
    }

    #[instrument(skip(self))]
    async fn pull_ff_only(&self, remote: &str, branch: &str) -> Result<CommandOutput, GitError> {
        self.run_git(&["pull", "--ff-only", remote, branch]).await
    }

    #[instrument(skip(self, message))]
    async fn merge_no_ff(
        &self,
        reference: &str,
        message: &str,
    ) -> Result<CommandOutput, GitError> {
        self.run_git(&["merge", "--no-ff", reference, "-m", message])
            .await
    }

    fn is_merge_in_progress(&self) -> bool {
        match Repository::open(&self.working_copy) {
            Ok(repo) => repo.state() == RepositoryState::Merge,
            Err(e) => {
                warn!(error = %e, "could not open working copy; checking MERGE_HEAD directly");
                self.git_dir.join("MERGE_HEAD").exists()
            }
        }
    }

    #[instrument(skip(self))]
    async fn abort_merge(&self) -> Result<CommandOutput, GitError> {
        self.run_git(&["merge", "--abort"]).await
    }

    #[instrument(skip(self))]
    async fn push_branch(&self, remote: &str, branch: &str) -> Result<CommandOutput, GitError> {
        self.run_git(&["push", remote, branch]).await
    }

    #[instrument(skip(self))]
    async fn delete_remote_branch(
        &self,
        remote: &str,
        branch: &str,
    ) -> Result<CommandOutput, GitError> {
        self.run_git(&["push", remote, "--delete", branch]).await
    }

    #[instrument(skip(self))]
    async fn delete_local_branch_forced(&self, branch: &str) -> Result<CommandOutput, GitError> {
        self.run_git(&["branch", "-D", branch]).await
    }
}
