use crate::domain::agent::{Agent, AgentKind};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Lifecycle state of a worktree's agent, distilled from its scrollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeStatus {
    /// Agent is producing output.
    Active,
    /// Agent is reasoning (thinking markers in the tail).
    Thinking,
    /// Agent is blocked on user input.
    Waiting,
    /// Agent reported completion.
    Done,
    /// Agent reported a failure.
    Error,
    /// No agent is running in this worktree.
    Paused,
}

/// Grouping used by the board renderer: errored worktrees sit with paused
/// ones, everything else keeps its own lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardGroup {
    Active,
    Thinking,
    Waiting,
    Done,
    Idle,
}

impl WorktreeStatus {
    pub fn board_group(self) -> BoardGroup {
        match self {
            WorktreeStatus::Active => BoardGroup::Active,
            WorktreeStatus::Thinking => BoardGroup::Thinking,
            WorktreeStatus::Waiting => BoardGroup::Waiting,
            WorktreeStatus::Done => BoardGroup::Done,
            WorktreeStatus::Error | WorktreeStatus::Paused => BoardGroup::Idle,
        }
    }

    /// Statuses that warrant an OS notification when the board is unfocused.
    pub fn needs_attention(self) -> bool {
        matches!(
            self,
            WorktreeStatus::Waiting | WorktreeStatus::Done | WorktreeStatus::Error
        )
    }
}

impl std::fmt::Display for WorktreeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorktreeStatus::Active => "active",
            WorktreeStatus::Thinking => "thinking",
            WorktreeStatus::Waiting => "waiting",
            WorktreeStatus::Done => "done",
            WorktreeStatus::Error => "error",
            WorktreeStatus::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

/// Counts from `git status --porcelain`, used to gate the merge workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub staged: usize,
    pub modified: usize,
    pub untracked: usize,
}

impl StatusCounts {
    pub fn is_clean(&self) -> bool {
        self.staged == 0 && self.modified == 0 && self.untracked == 0
    }
}

/// A checked-out branch at a filesystem path, with its (at most one) agent.
#[derive(Debug)]
pub struct Worktree {
    /// Stable name derived from the directory basename.
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
    /// Linked task-tracker id, if a `.sidecar-task` file exists.
    pub task_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub diff: DiffStats,
    pub agent_kind: AgentKind,
    pub status: WorktreeStatus,
    /// The running agent, if any. The agent stores this worktree's name by
    /// value; there is no back-pointer.
    pub agent: Option<Agent>,
}

impl Worktree {
    pub fn new(name: String, path: PathBuf, branch: String, agent_kind: AgentKind) -> Self {
        Self {
            name,
            path,
            branch,
            task_id: None,
            updated_at: Utc::now(),
            diff: DiffStats::default(),
            agent_kind,
            status: WorktreeStatus::Paused,
            agent: None,
        }
    }

    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_groups_with_paused_on_the_board() {
        assert_eq!(WorktreeStatus::Error.board_group(), BoardGroup::Idle);
        assert_eq!(WorktreeStatus::Paused.board_group(), BoardGroup::Idle);
        assert_eq!(WorktreeStatus::Waiting.board_group(), BoardGroup::Waiting);
    }

    #[test]
    fn attention_statuses() {
        assert!(WorktreeStatus::Waiting.needs_attention());
        assert!(WorktreeStatus::Done.needs_attention());
        assert!(WorktreeStatus::Error.needs_attention());
        assert!(!WorktreeStatus::Active.needs_attention());
        assert!(!WorktreeStatus::Thinking.needs_attention());
    }

    #[test]
    fn new_worktree_is_paused_without_agent() {
        let wt = Worktree::new(
            "feat-x".into(),
            PathBuf::from("/tmp/feat-x"),
            "feat/x".into(),
            AgentKind::Claude,
        );
        assert_eq!(wt.status, WorktreeStatus::Paused);
        assert!(!wt.has_agent());
    }

    #[test]
    fn status_counts_clean() {
        assert!(StatusCounts::default().is_clean());
        assert!(!StatusCounts {
            staged: 0,
            modified: 1,
            untracked: 0
        }
        .is_clean());
    }
}
