//! Heuristics for recognising textual merge conflicts.
//!
//! Git does not report "this merge stopped on a conflict" through a
//! dedicated exit code, so the worker relies on output keywords and on the
//! merge-in-progress marker. Every such judgment lives here.

use crate::models::CommandOutput;

/// Printed by git for each conflicted path (`CONFLICT (content): ...`).
pub const CONFLICT_KEYWORD: &str = "CONFLICT";

/// Printed by git when a merge stops for manual resolution.
pub const AUTOMATIC_MERGE_FAILED: &str = "Automatic merge failed";

/// Whether a failed `git merge` stopped on a textual conflict, as opposed
/// to some other failure (unknown ref, dirty tree, ...).
///
/// Either keyword may appear on stdout or stderr depending on the git
/// version, so both streams are searched. A merge-in-progress marker on
/// disk also counts as a conflict.
pub fn is_textual_conflict(merge_output: &CommandOutput, merge_in_progress: bool) -> bool {
    if merge_output.success() {
        return false;
    }
    let mentions = |needle: &str| {
        merge_output.stdout.contains(needle) || merge_output.stderr.contains(needle)
    };
    mentions(CONFLICT_KEYWORD) || mentions(AUTOMATIC_MERGE_FAILED) || merge_in_progress
}

/// Verdict on a delegated resolution, taken from repository state alone.
///
/// The marker disappears both when the agent completes the merge and when
/// it aborts it, so an aborting agent is reported as resolved. Callers that
/// need to tell the two apart must inspect history themselves.
pub fn judge_resolution(merge_in_progress_after: bool) -> bool {
    !merge_in_progress_after
}

/// Whether a failed `git branch -D` failed only because the branch does not
/// exist locally.
pub fn is_branch_not_found(output: &CommandOutput) -> bool {
    !output.success() && output.stderr.contains("not found")
}
