//! Test doubles for the merge orchestration engine.
//!
//! Hand-written rather than generated: each double records its calls,
//! supports scripted failures, and exposes concurrency probes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mergewatch_core::conflict::ConflictDelegate;
use mergewatch_core::errors::{GitError, SourceError};
use mergewatch_core::git::IntegrationRunner;
use mergewatch_core::lock::IntegrationLock;
use mergewatch_core::models::{Change, CommandOutput};
use mergewatch_core::source::ChangeSource;

// ---------------------------------------------------------------------------
// MockRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Fetch,
    DiffStat,
    Pull,
    Merge,
    Abort,
    Push,
    DeleteRemote,
    DeleteLocal,
}

/// One recorded runner call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub args: Vec<String>,
    /// Whether the integration lock was held when the call was made.
    pub locked: bool,
}

/// In-memory [`IntegrationRunner`].
///
/// Features:
/// - Call log with lock state at call time
/// - Per-operation scripted results (`fail`, `error`)
/// - Simulated conflicts that set the merge-in-progress marker
/// - Optional per-call delay plus probes for concurrent fetches and
///   overlapping pull..push windows
pub struct MockRunner {
    path: PathBuf,
    lock: IntegrationLock,
    calls: Mutex<Vec<Call>>,
    scripted: Mutex<HashMap<Op, CommandOutput>>,
    errors: Mutex<HashMap<Op, String>>,
    conflict_branches: Mutex<Vec<String>>,
    panic_branches: Mutex<Vec<String>>,
    merging: AtomicBool,
    delay: Duration,
    // Probes
    fetching: AtomicUsize,
    max_fetching: AtomicUsize,
    integrating: AtomicUsize,
    max_integrating: AtomicUsize,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            path: PathBuf::from("/srv/mock-checkout"),
            lock: IntegrationLock::new(),
            calls: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            errors: Mutex::new(HashMap::new()),
            conflict_branches: Mutex::new(Vec::new()),
            panic_branches: Mutex::new(Vec::new()),
            merging: AtomicBool::new(false),
            delay,
            fetching: AtomicUsize::new(0),
            max_fetching: AtomicUsize::new(0),
            integrating: AtomicUsize::new(0),
            max_integrating: AtomicUsize::new(0),
        }
    }

    /// Make every call of `op` exit non-zero with `stderr`.
    pub fn fail(&self, op: Op, exit_code: i32, stderr: &str) {
        self.scripted
            .lock()
            .unwrap()
            .insert(op, CommandOutput::failed(exit_code, stderr));
    }

    /// Make every call of `op` return a specific output.
    pub fn respond(&self, op: Op, output: CommandOutput) {
        self.scripted.lock().unwrap().insert(op, output);
    }

    /// Make every call of `op` fail to run at all.
    pub fn error(&self, op: Op, message: &str) {
        self.errors.lock().unwrap().insert(op, message.to_string());
    }

    /// Merging `<remote>/<branch>` stops on a textual conflict.
    pub fn conflict_on(&self, branch: &str) {
        self.conflict_branches.lock().unwrap().push(branch.to_string());
    }

    /// Fetching `branch` panics, simulating a crashed worker run.
    pub fn panic_on(&self, branch: &str) {
        self.panic_branches.lock().unwrap().push(branch.to_string());
    }

    pub fn set_merging(&self, merging: bool) {
        self.merging.store(merging, Ordering::SeqCst);
    }

    pub fn is_merging(&self) -> bool {
        self.merging.load(Ordering::SeqCst)
    }

    pub fn integration_lock_is_held(&self) -> bool {
        self.lock.is_held()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_fetching.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_integrations(&self) -> usize {
        self.max_integrating.load(Ordering::SeqCst)
    }

    fn record(&self, op: Op, args: &[&str]) {
        self.calls.lock().unwrap().push(Call {
            op,
            args: args.iter().map(|a| a.to_string()).collect(),
            locked: self.lock.is_held(),
        });
    }

    async fn respond_to(&self, op: Op, args: &[&str]) -> Result<CommandOutput, GitError> {
        self.record(op, args);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let error = self.errors.lock().unwrap().get(&op).cloned();
        if let Some(message) = error {
            return Err(GitError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                message,
            )));
        }
        Ok(self
            .scripted
            .lock()
            .unwrap()
            .get(&op)
            .cloned()
            .unwrap_or_else(CommandOutput::ok))
    }

    fn leave_integration(&self) {
        let _ = self
            .integrating
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

#[async_trait]
impl IntegrationRunner for MockRunner {
    fn working_copy(&self) -> &Path {
        &self.path
    }

    fn integration_lock(&self) -> &IntegrationLock {
        &self.lock
    }

    async fn fetch(&self, remote: &str, branch: &str) -> Result<CommandOutput, GitError> {
        if self.panic_branches.lock().unwrap().iter().any(|b| b == branch) {
            panic!("simulated crash while fetching {}", branch);
        }
        let now = self.fetching.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_fetching.fetch_max(now, Ordering::SeqCst);
        let result = self.respond_to(Op::Fetch, &[remote, branch]).await;
        self.fetching.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn diff_stat(&self, from_ref: &str, to_ref: &str) -> Result<CommandOutput, GitError> {
        self.respond_to(Op::DiffStat, &[from_ref, to_ref]).await
    }

    async fn pull_ff_only(&self, remote: &str, branch: &str) -> Result<CommandOutput, GitError> {
        let now = self.integrating.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_integrating.fetch_max(now, Ordering::SeqCst);
        let result = self.respond_to(Op::Pull, &[remote, branch]).await;
        if !matches!(&result, Ok(out) if out.success()) {
            self.leave_integration();
        }
        result
    }

    async fn merge_no_ff(&self, reference: &str, message: &str) -> Result<CommandOutput, GitError> {
        let conflicted = self
            .conflict_branches
            .lock()
            .unwrap()
            .iter()
            .any(|b| reference.ends_with(&format!("/{}", b)));
        if conflicted {
            self.record(Op::Merge, &[reference, message]);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.merging.store(true, Ordering::SeqCst);
            return Ok(CommandOutput {
                exit_code: 1,
                stdout: "Auto-merging src/lib.rs\nCONFLICT (content): Merge conflict in src/lib.rs\nAutomatic merge failed; fix conflicts and then commit the result.\n".into(),
                stderr: String::new(),
            });
        }
        self.respond_to(Op::Merge, &[reference, message]).await
    }

    fn is_merge_in_progress(&self) -> bool {
        self.merging.load(Ordering::SeqCst)
    }

    async fn abort_merge(&self) -> Result<CommandOutput, GitError> {
        let result = self.respond_to(Op::Abort, &[]).await;
        self.merging.store(false, Ordering::SeqCst);
        self.leave_integration();
        result
    }

    async fn push_branch(&self, remote: &str, branch: &str) -> Result<CommandOutput, GitError> {
        let result = self.respond_to(Op::Push, &[remote, branch]).await;
        self.leave_integration();
        result
    }

    async fn delete_remote_branch(
        &self,
        remote: &str,
        branch: &str,
    ) -> Result<CommandOutput, GitError> {
        self.respond_to(Op::DeleteRemote, &[remote, branch]).await
    }

    async fn delete_local_branch_forced(&self, branch: &str) -> Result<CommandOutput, GitError> {
        self.respond_to(Op::DeleteLocal, &[branch]).await
    }
}

// ---------------------------------------------------------------------------
// MockDelegate
// ---------------------------------------------------------------------------

/// What the fake agent does to the working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    /// Stage and `merge --continue`: marker cleared, merge commit exists.
    CompleteMerge,
    /// `merge --abort`: marker cleared, no merge commit.
    AbortMerge,
    /// Leave the conflict in place.
    GiveUp,
}

pub struct MockDelegate {
    runner: Arc<MockRunner>,
    action: AgentAction,
    calls: Mutex<Vec<(u64, String)>>,
    lock_held: AtomicBool,
}

impl MockDelegate {
    pub fn new(runner: Arc<MockRunner>, action: AgentAction) -> Self {
        Self {
            runner,
            action,
            calls: Mutex::new(Vec::new()),
            lock_held: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<(u64, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether the integration lock was held during the last resolve call.
    pub fn saw_lock_held(&self) -> bool {
        self.lock_held.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConflictDelegate for MockDelegate {
    async fn resolve(&self, change: &Change) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push((change.number, change.title.clone()));
        self.lock_held
            .store(self.runner.integration_lock().is_held(), Ordering::SeqCst);
        match self.action {
            AgentAction::CompleteMerge | AgentAction::AbortMerge => self.runner.set_merging(false),
            AgentAction::GiveUp => {}
        }
        // Same verdict rule as the real delegate.
        mergewatch_core::conflict::judge_resolution(self.runner.is_merge_in_progress())
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// [`ChangeSource`] returning a fixed list, with scripted one-off results
/// consumed first.
pub struct MockSource {
    changes: Mutex<Vec<Change>>,
    scripted: Mutex<VecDeque<Result<Vec<Change>, String>>>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            changes: Mutex::new(changes),
            scripted: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_changes(&self, changes: Vec<Change>) {
        *self.changes.lock().unwrap() = changes;
    }

    /// The next call fails with an HTTP 503.
    pub fn fail_next(&self, body: &str) {
        self.scripted.lock().unwrap().push_back(Err(body.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeSource for MockSource {
    async fn list_open_changes(&self) -> Result<Vec<Change>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.scripted.lock().unwrap().pop_front() {
            return next.map_err(|body| SourceError::ApiError { status: 503, body });
        }
        Ok(self.changes.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn change(number: u64) -> Change {
    Change::new(number, format!("Change {}", number), format!("feature/{}", number))
}
