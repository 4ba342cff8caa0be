//! Domain model types used throughout MergeWatch.
//!
//! These types flow between the change source, the poller, the worker pool,
//! and the merge workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// An open pull request targeting the integration branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Pull request number (stable and unique within the repository).
    pub number: u64,
    /// Pull request title.
    pub title: String,
    /// Name of the branch the pull request merges from.
    pub source_branch: String,
}

impl Change {
    pub fn new(number: u64, title: impl Into<String>, source_branch: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            source_branch: source_branch.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Command output
// ---------------------------------------------------------------------------

/// Exit status plus captured output of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code, `-1` when terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful, silent command.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A failed command with the given stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stderr, falling back to stdout when stderr is empty.
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Merge outcome
// ---------------------------------------------------------------------------

/// Step at which a merge worker gave up before integrating the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortStep {
    Fetch,
    Pull,
    Merge,
}

impl std::fmt::Display for AbortStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Pull => write!(f, "pull"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Step that failed after the merge commit already exists locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftStep {
    /// The merge commit is applied locally but was not published.
    Push,
    /// The merge is published but a branch could not be deleted.
    Cleanup,
}

impl std::fmt::Display for SoftStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Terminal result of one merge worker run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Merged without conflicts, pushed, and branches cleaned up.
    Succeeded,
    /// The delegate cleared a conflict; pushed and cleaned up.
    ConflictResolved,
    /// The delegate left the merge in progress; it was aborted.
    ConflictUnresolved,
    /// Stopped before anything was integrated.
    Aborted { step: AbortStep, reason: String },
    /// Integrated locally, but a later step failed.
    SoftFailure { step: SoftStep, reason: String },
}

impl MergeOutcome {
    /// Whether the change reached the remote integration branch.
    pub fn is_published(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::ConflictResolved
                | Self::SoftFailure {
                    step: SoftStep::Cleanup,
                    ..
                }
        )
    }
}

impl std::fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::ConflictResolved => write!(f, "conflict_resolved"),
            Self::ConflictUnresolved => write!(f, "conflict_unresolved"),
            Self::Aborted { step, .. } => write!(f, "aborted({})", step),
            Self::SoftFailure { step, .. } => write!(f, "soft_failure({})", step),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker report
// ---------------------------------------------------------------------------

/// What one merge worker run did, with timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub change: Change,
    pub outcome: MergeOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl WorkerReport {
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

// ---------------------------------------------------------------------------
// Poll statistics
// ---------------------------------------------------------------------------

/// Result of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Open changes reported by the source.
    pub open: usize,
    /// Changes newly submitted to the pool this cycle.
    pub submitted: usize,
    /// Whether listing changes failed this cycle.
    pub list_failed: bool,
}
