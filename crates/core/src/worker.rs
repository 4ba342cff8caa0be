//! Per-change merge worker.
//!
//! State sequence for one pull request:
//! `Fetching → DiffLogging → Integrating → [ConflictDelegation] → Pushing →
//! BranchCleanup → Done`
//!
//! `Integrating` through `Pushing` run under the working copy's
//! [`IntegrationLock`](crate::lock::IntegrationLock); every other state runs
//! unsynchronized and may interleave with other workers.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::MergeWatchConfig;
use crate::conflict::detector::{is_branch_not_found, is_textual_conflict};
use crate::conflict::ConflictDelegate;
use crate::errors::GitError;
use crate::git::IntegrationRunner;
use crate::models::{AbortStep, Change, CommandOutput, MergeOutcome, SoftStep, WorkerReport};

/// Current step of a merge worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Fetching,
    DiffLogging,
    Integrating,
    ConflictDelegation,
    Pushing,
    BranchCleanup,
    Done,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetching => write!(f, "fetching"),
            Self::DiffLogging => write!(f, "diff_logging"),
            Self::Integrating => write!(f, "integrating"),
            Self::ConflictDelegation => write!(f, "conflict_delegation"),
            Self::Pushing => write!(f, "pushing"),
            Self::BranchCleanup => write!(f, "branch_cleanup"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Remote/branch naming and commit formatting used by every worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub remote: String,
    pub base_branch: String,
    /// Placeholders: `{number}`, `{title}`, `{branch}`
    pub message_template: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            remote: "origin".into(),
            base_branch: "main".into(),
            message_template: "Merge PR #{number}: {title}".into(),
        }
    }
}

impl From<&MergeWatchConfig> for WorkerSettings {
    fn from(config: &MergeWatchConfig) -> Self {
        Self {
            remote: config.repository.remote.clone(),
            base_branch: config.repository.base_branch.clone(),
            message_template: config.merge.message_template.clone(),
        }
    }
}

/// Render the merge commit message for `change`.
pub fn render_merge_message(template: &str, change: &Change) -> String {
    template
        .replace("{number}", &change.number.to_string())
        .replace("{title}", &change.title)
        .replace("{branch}", &change.source_branch)
}

/// How the locked section ended.
enum Integration {
    /// The merge commit reached the remote.
    Published { conflict_resolved: bool },
    /// Terminal outcome reached inside the lock.
    Stopped(MergeOutcome),
}

/// Runs the merge state machine for one change at a time.
///
/// Cheap to share: one instance serves every task in the pool.
pub struct MergeWorker {
    runner: Arc<dyn IntegrationRunner>,
    delegate: Arc<dyn ConflictDelegate>,
    settings: WorkerSettings,
}

impl MergeWorker {
    pub fn new(
        runner: Arc<dyn IntegrationRunner>,
        delegate: Arc<dyn ConflictDelegate>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            runner,
            delegate,
            settings,
        }
    }

    /// Drive `change` to a terminal outcome. Never panics on git failures;
    /// every failure is folded into the returned [`MergeOutcome`].
    pub async fn run(&self, change: &Change) -> WorkerReport {
        let started_at = Utc::now();
        info!(pr = change.number, title = %change.title, branch = %change.source_branch, "processing started");

        let outcome = self.execute(change).await;
        self.enter(change, WorkerState::Done);
        log_outcome(change, &outcome);

        WorkerReport {
            change: change.clone(),
            outcome,
            started_at,
            completed_at: Utc::now(),
        }
    }

    async fn execute(&self, change: &Change) -> MergeOutcome {
        let remote = &self.settings.remote;
        let branch = &change.source_branch;

        self.enter(change, WorkerState::Fetching);
        if let Some(reason) = failure(self.runner.fetch(remote, branch).await) {
            return MergeOutcome::Aborted {
                step: AbortStep::Fetch,
                reason,
            };
        }

        self.enter(change, WorkerState::DiffLogging);
        self.log_diff(change).await;

        let conflict_resolved = match self.integrate(change).await {
            Integration::Published { conflict_resolved } => conflict_resolved,
            Integration::Stopped(outcome) => return outcome,
        };

        self.enter(change, WorkerState::BranchCleanup);
        match self.cleanup(change).await {
            Err(reason) => MergeOutcome::SoftFailure {
                step: SoftStep::Cleanup,
                reason,
            },
            Ok(()) if conflict_resolved => MergeOutcome::ConflictResolved,
            Ok(()) => MergeOutcome::Succeeded,
        }
    }

    /// Purely observational; failures are logged and ignored.
    async fn log_diff(&self, change: &Change) {
        let base = format!("{}/{}", self.settings.remote, self.settings.base_branch);
        let head = format!("{}/{}", self.settings.remote, change.source_branch);
        match self.runner.diff_stat(&base, &head).await {
            Ok(out) if out.success() => {
                let stat = out.stdout.trim_end();
                if !stat.trim().is_empty() {
                    info!(pr = change.number, "diff summary:\n{}", stat);
                }
            }
            Ok(out) => {
                warn!(pr = change.number, detail = %out.detail(), "diff summary failed");
            }
            Err(e) => {
                warn!(pr = change.number, error = %e, "diff summary failed");
            }
        }
    }

    /// Pull, merge, optionally delegate, and push while holding the lock.
    async fn integrate(&self, change: &Change) -> Integration {
        let remote = &self.settings.remote;
        let base = &self.settings.base_branch;

        let _guard = self.runner.integration_lock().acquire(change.number).await;
        self.enter(change, WorkerState::Integrating);

        if let Some(reason) = failure(self.runner.pull_ff_only(remote, base).await) {
            return Integration::Stopped(MergeOutcome::Aborted {
                step: AbortStep::Pull,
                reason,
            });
        }

        let reference = format!("{}/{}", remote, change.source_branch);
        let message = render_merge_message(&self.settings.message_template, change);
        let mut conflict_resolved = false;

        match self.runner.merge_no_ff(&reference, &message).await {
            Ok(out) if out.success() => {
                debug!(pr = change.number, "merge commit created");
            }
            Ok(out) if is_textual_conflict(&out, self.runner.is_merge_in_progress()) => {
                self.enter(change, WorkerState::ConflictDelegation);
                if !self.delegate.resolve(change).await {
                    self.abort_merge(change).await;
                    return Integration::Stopped(MergeOutcome::ConflictUnresolved);
                }
                conflict_resolved = true;
            }
            other => {
                let reason = failure(other).unwrap_or_default();
                self.abort_merge(change).await;
                return Integration::Stopped(MergeOutcome::Aborted {
                    step: AbortStep::Merge,
                    reason,
                });
            }
        }

        self.enter(change, WorkerState::Pushing);
        if let Some(reason) = failure(self.runner.push_branch(remote, base).await) {
            return Integration::Stopped(MergeOutcome::SoftFailure {
                step: SoftStep::Push,
                reason,
            });
        }

        Integration::Published { conflict_resolved }
    }

    async fn abort_merge(&self, change: &Change) {
        if let Some(reason) = failure(self.runner.abort_merge().await) {
            warn!(pr = change.number, reason = %reason, "git merge --abort failed");
        }
    }

    /// Delete the source branch remotely, then locally. Both deletions are
    /// always attempted; the merge is never rolled back over a failure here.
    async fn cleanup(&self, change: &Change) -> Result<(), String> {
        let branch = &change.source_branch;
        let mut failures = Vec::new();

        match self
            .runner
            .delete_remote_branch(&self.settings.remote, branch)
            .await
        {
            Ok(out) if out.success() => debug!(pr = change.number, "remote branch deleted"),
            result => {
                let reason = failure(result).unwrap_or_default();
                warn!(pr = change.number, branch = %branch, reason = %reason, "remote branch deletion failed");
                failures.push(format!("remote: {}", reason));
            }
        }

        match self.runner.delete_local_branch_forced(branch).await {
            Ok(out) if out.success() => debug!(pr = change.number, "local branch deleted"),
            Ok(out) if is_branch_not_found(&out) => {
                debug!(pr = change.number, "no local branch to delete");
            }
            result => {
                let reason = failure(result).unwrap_or_default();
                warn!(pr = change.number, branch = %branch, reason = %reason, "local branch deletion failed");
                failures.push(format!("local: {}", reason));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }

    fn enter(&self, change: &Change, state: WorkerState) {
        debug!(pr = change.number, state = %state, "worker state");
    }
}

/// `Some(reason)` when a git step did not succeed.
fn failure(result: Result<CommandOutput, GitError>) -> Option<String> {
    match result {
        Ok(out) if out.success() => None,
        Ok(out) => Some(format!("exit {}: {}", out.exit_code, out.detail())),
        Err(e) => Some(e.to_string()),
    }
}

fn log_outcome(change: &Change, outcome: &MergeOutcome) {
    let pr = change.number;
    match outcome {
        MergeOutcome::Succeeded | MergeOutcome::ConflictResolved => {
            info!(pr, title = %change.title, outcome = %outcome, "merge completed");
        }
        MergeOutcome::ConflictUnresolved => {
            warn!(pr, outcome = %outcome, "conflict left unresolved; merge aborted");
        }
        MergeOutcome::Aborted { step, reason } => {
            error!(pr, step = %step, reason = %reason, "merge aborted");
        }
        MergeOutcome::SoftFailure {
            step: SoftStep::Push,
            reason,
        } => {
            error!(
                pr,
                reason = %reason,
                "push failed; merge commit is applied locally but unpublished, operator attention required"
            );
        }
        MergeOutcome::SoftFailure {
            step: SoftStep::Cleanup,
            reason,
        } => {
            warn!(pr, reason = %reason, "merge published but branch cleanup failed");
        }
    }
}
