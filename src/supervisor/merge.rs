use crate::config::{CleanupDefaults, MergeMethod};

/// How often the waiting step re-checks whether the PR landed.
pub const MERGE_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStep {
    ReviewDiff,
    MergeMethod,
    Push,
    CreatePr,
    DirectMerge,
    WaitingMerge,
    PostMergeConfirmation,
    Cleanup,
    Done,
}

impl MergeStep {
    pub const ALL: [MergeStep; 9] = [
        MergeStep::ReviewDiff,
        MergeStep::MergeMethod,
        MergeStep::Push,
        MergeStep::CreatePr,
        MergeStep::DirectMerge,
        MergeStep::WaitingMerge,
        MergeStep::PostMergeConfirmation,
        MergeStep::Cleanup,
        MergeStep::Done,
    ];

    fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// Steps whose work runs as a background task.
    pub fn is_automatic(self) -> bool {
        matches!(
            self,
            MergeStep::Push | MergeStep::CreatePr | MergeStep::DirectMerge | MergeStep::Cleanup
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Done,
    Error,
}

/// Post-merge cleanup checkboxes, with a focus cursor for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupToggles {
    pub delete_worktree: bool,
    pub delete_local_branch: bool,
    pub delete_remote_branch: bool,
    pub pull_after_merge: bool,
}

pub const CLEANUP_TOGGLE_COUNT: usize = 4;

impl CleanupToggles {
    pub fn from_defaults(defaults: &CleanupDefaults) -> Self {
        Self {
            delete_worktree: defaults.delete_worktree,
            delete_local_branch: defaults.delete_local_branch,
            delete_remote_branch: defaults.delete_remote_branch,
            pull_after_merge: defaults.pull_after_merge,
        }
    }

    pub fn toggle(&mut self, index: usize) {
        match index {
            0 => self.delete_worktree = !self.delete_worktree,
            1 => self.delete_local_branch = !self.delete_local_branch,
            2 => self.delete_remote_branch = !self.delete_remote_branch,
            3 => self.pull_after_merge = !self.pull_after_merge,
            _ => {}
        }
    }

    pub fn skip_all(&mut self) {
        *self = Self {
            delete_worktree: false,
            delete_local_branch: false,
            delete_remote_branch: false,
            pull_after_merge: false,
        };
    }

    pub fn any(&self) -> bool {
        self.delete_worktree
            || self.delete_local_branch
            || self.delete_remote_branch
            || self.pull_after_merge
    }
}

/// The merge workflow for one worktree: review the diff, pick a method,
/// push, raise (or directly land) a PR, wait for it to merge, confirm, and
/// clean up. Side effects are executed by the event loop; this struct only
/// tracks state.
#[derive(Debug)]
pub struct MergeWorkflow {
    pub worktree: String,
    pub step: MergeStep,
    statuses: [StepStatus; MergeStep::ALL.len()],
    pub diff_summary: String,
    pub pr_url: Option<String>,
    pub method: MergeMethod,
    /// Raise a PR and wait, vs create-and-merge in one step.
    pub use_pr: bool,
    pub cleanup: CleanupToggles,
    pub cleanup_cursor: usize,
    pub error: Option<String>,
    /// Cleanup failures accumulate here; they never abort the workflow.
    pub warnings: Vec<String>,
}

impl MergeWorkflow {
    pub fn new(
        worktree: String,
        diff_summary: String,
        method: MergeMethod,
        cleanup_defaults: &CleanupDefaults,
    ) -> Self {
        let mut wf = Self {
            worktree,
            step: MergeStep::ReviewDiff,
            statuses: Default::default(),
            diff_summary,
            pr_url: None,
            method,
            use_pr: true,
            cleanup: CleanupToggles::from_defaults(cleanup_defaults),
            cleanup_cursor: 0,
            error: None,
            warnings: Vec::new(),
        };
        wf.set_status(MergeStep::ReviewDiff, StepStatus::Running);
        wf
    }

    pub fn status(&self, step: MergeStep) -> StepStatus {
        self.statuses[step.index()]
    }

    pub fn set_status(&mut self, step: MergeStep, status: StepStatus) {
        self.statuses[step.index()] = status;
    }

    fn enter(&mut self, step: MergeStep) {
        self.step = step;
        self.set_status(step, StepStatus::Running);
    }

    /// User accepted the diff.
    pub fn confirm_review(&mut self) {
        if self.step != MergeStep::ReviewDiff {
            return;
        }
        self.set_status(MergeStep::ReviewDiff, StepStatus::Done);
        self.enter(MergeStep::MergeMethod);
    }

    /// User picked a method; the push begins.
    pub fn select_method(&mut self, method: MergeMethod, use_pr: bool) {
        if self.step != MergeStep::MergeMethod {
            return;
        }
        self.method = method;
        self.use_pr = use_pr;
        self.set_status(MergeStep::MergeMethod, StepStatus::Done);
        self.enter(MergeStep::Push);
    }

    /// A background step finished. Returns the next step the event loop
    /// should execute, if the workflow advanced into an automatic one.
    pub fn on_step_result(
        &mut self,
        step: MergeStep,
        result: Result<Option<String>, String>,
    ) -> Option<MergeStep> {
        if step != self.step {
            // A cancelled or superseded workflow's task came home late.
            return None;
        }
        match result {
            Err(message) => {
                self.set_status(step, StepStatus::Error);
                self.error = Some(message);
                None
            }
            Ok(detail) => {
                self.set_status(step, StepStatus::Done);
                self.error = None;
                match step {
                    MergeStep::Push => {
                        let next = if self.use_pr {
                            MergeStep::CreatePr
                        } else {
                            MergeStep::DirectMerge
                        };
                        self.enter(next);
                        Some(next)
                    }
                    MergeStep::CreatePr => {
                        self.pr_url = detail;
                        self.enter(MergeStep::WaitingMerge);
                        None
                    }
                    MergeStep::DirectMerge => {
                        self.enter(MergeStep::PostMergeConfirmation);
                        None
                    }
                    MergeStep::Cleanup => {
                        self.enter(MergeStep::Done);
                        self.set_status(MergeStep::Done, StepStatus::Done);
                        None
                    }
                    _ => None,
                }
            }
        }
    }

    /// Answer from a PR merged-state check. `None` is a check error:
    /// requeue silently, the PR state is unknown, not un-merged.
    pub fn on_merge_check(&mut self, merged: Option<bool>) -> bool {
        if self.step != MergeStep::WaitingMerge {
            return false;
        }
        if merged == Some(true) {
            self.set_status(MergeStep::WaitingMerge, StepStatus::Done);
            self.enter(MergeStep::PostMergeConfirmation);
            true
        } else {
            false
        }
    }

    /// User confirmed the merge landed; cleanup begins.
    pub fn confirm_post_merge(&mut self) -> Option<MergeStep> {
        if self.step != MergeStep::PostMergeConfirmation {
            return None;
        }
        self.set_status(MergeStep::PostMergeConfirmation, StepStatus::Done);
        self.enter(MergeStep::Cleanup);
        Some(MergeStep::Cleanup)
    }

    pub fn move_cleanup_cursor(&mut self, down: bool) {
        if down {
            self.cleanup_cursor = (self.cleanup_cursor + 1) % CLEANUP_TOGGLE_COUNT;
        } else {
            self.cleanup_cursor = self
                .cleanup_cursor
                .checked_sub(1)
                .unwrap_or(CLEANUP_TOGGLE_COUNT - 1);
        }
    }

    pub fn toggle_focused_cleanup(&mut self) {
        self.cleanup.toggle(self.cleanup_cursor);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow() -> MergeWorkflow {
        MergeWorkflow::new(
            "feat-x".into(),
            "2 files changed".into(),
            MergeMethod::Squash,
            &CleanupDefaults::default(),
        )
    }

    #[test]
    fn happy_path_through_pr() {
        let mut wf = workflow();
        assert_eq!(wf.step, MergeStep::ReviewDiff);

        wf.confirm_review();
        assert_eq!(wf.step, MergeStep::MergeMethod);

        wf.select_method(MergeMethod::Merge, true);
        assert_eq!(wf.step, MergeStep::Push);
        assert_eq!(wf.method, MergeMethod::Merge);

        let next = wf.on_step_result(MergeStep::Push, Ok(None));
        assert_eq!(next, Some(MergeStep::CreatePr));

        let next = wf.on_step_result(
            MergeStep::CreatePr,
            Ok(Some("https://github.com/o/r/pull/7".into())),
        );
        assert_eq!(next, None);
        assert_eq!(wf.step, MergeStep::WaitingMerge);
        assert_eq!(wf.pr_url.as_deref(), Some("https://github.com/o/r/pull/7"));

        assert!(wf.on_merge_check(Some(true)));
        assert_eq!(wf.step, MergeStep::PostMergeConfirmation);

        assert_eq!(wf.confirm_post_merge(), Some(MergeStep::Cleanup));
        assert_eq!(wf.on_step_result(MergeStep::Cleanup, Ok(None)), None);
        assert_eq!(wf.step, MergeStep::Done);
        assert_eq!(wf.status(MergeStep::Done), StepStatus::Done);
    }

    #[test]
    fn direct_merge_skips_waiting() {
        let mut wf = workflow();
        wf.confirm_review();
        wf.select_method(MergeMethod::Squash, false);
        assert_eq!(
            wf.on_step_result(MergeStep::Push, Ok(None)),
            Some(MergeStep::DirectMerge)
        );
        wf.on_step_result(MergeStep::DirectMerge, Ok(None));
        assert_eq!(wf.step, MergeStep::PostMergeConfirmation);
    }

    #[test]
    fn step_error_halts_until_user_acts() {
        let mut wf = workflow();
        wf.confirm_review();
        wf.select_method(MergeMethod::Squash, true);
        let next = wf.on_step_result(MergeStep::Push, Err("remote rejected".into()));
        assert_eq!(next, None);
        assert_eq!(wf.step, MergeStep::Push);
        assert_eq!(wf.status(MergeStep::Push), StepStatus::Error);
        assert_eq!(wf.error.as_deref(), Some("remote rejected"));
    }

    #[test]
    fn merge_check_errors_requeue_silently() {
        let mut wf = workflow();
        wf.confirm_review();
        wf.select_method(MergeMethod::Squash, true);
        wf.on_step_result(MergeStep::Push, Ok(None));
        wf.on_step_result(MergeStep::CreatePr, Ok(Some("url".into())));

        assert!(!wf.on_merge_check(None));
        assert!(!wf.on_merge_check(Some(false)));
        assert_eq!(wf.step, MergeStep::WaitingMerge);
        assert!(wf.error.is_none());
    }

    #[test]
    fn stale_step_results_are_ignored() {
        let mut wf = workflow();
        wf.confirm_review();
        // A Push result arriving while still on MergeMethod is inert.
        assert_eq!(wf.on_step_result(MergeStep::Push, Ok(None)), None);
        assert_eq!(wf.step, MergeStep::MergeMethod);
    }

    #[test]
    fn user_steps_only_fire_in_their_state() {
        let mut wf = workflow();
        assert_eq!(wf.confirm_post_merge(), None);
        wf.select_method(MergeMethod::Merge, true); // not in MergeMethod yet
        assert_eq!(wf.step, MergeStep::ReviewDiff);
    }

    #[test]
    fn skip_all_clears_every_toggle() {
        let mut wf = workflow();
        assert!(wf.cleanup.any());
        wf.cleanup.skip_all();
        assert!(!wf.cleanup.any());
    }

    #[test]
    fn cleanup_cursor_wraps_and_toggles() {
        let mut wf = workflow();
        wf.move_cleanup_cursor(false);
        assert_eq!(wf.cleanup_cursor, CLEANUP_TOGGLE_COUNT - 1);
        wf.move_cleanup_cursor(true);
        assert_eq!(wf.cleanup_cursor, 0);

        let before = wf.cleanup.delete_worktree;
        wf.toggle_focused_cleanup();
        assert_eq!(wf.cleanup.delete_worktree, !before);
    }

    #[test]
    fn warnings_accumulate_without_failing() {
        let mut wf = workflow();
        wf.add_warning("could not delete remote branch".into());
        wf.add_warning("pull failed".into());
        assert_eq!(wf.warnings.len(), 2);
        assert!(wf.error.is_none());
    }
}
