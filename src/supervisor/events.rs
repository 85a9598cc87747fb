use crate::domain::agent::AgentKind;
use crate::domain::worktree::WorktreeStatus;
use crate::error::SidecarError;
use crate::infra::git::ConflictDescriptor;
use crate::supervisor::merge::{MergeStep, StepStatus};
use crossterm::event::KeyEvent;

/// What a background capture task hands back to the event loop.
#[derive(Debug)]
pub struct CaptureOutcome {
    pub output: String,
    /// The agent's session file reported "idle at prompt". Read in the same
    /// task so the loop never touches the filesystem.
    pub session_file_idle: bool,
}

/// Result of starting (or reconnecting to) an agent session.
#[derive(Debug)]
pub struct StartOutcome {
    pub session_name: String,
    pub reconnected: bool,
}

/// User actions relayed into a pane whose outcome the UI wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Approve,
    Reject,
    SendText,
}

/// Everything the event loop reacts to. Input, timer ticks and background
/// task results all arrive on the same channel; state mutation happens only
/// in the handlers that drain it.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// A scheduled poll timer fired for a worktree's session.
    PollTick { worktree: String, generation: u64 },
    /// A background capture finished.
    CaptureResult {
        worktree: String,
        generation: u64,
        outcome: Result<CaptureOutcome, SidecarError>,
    },
    /// An agent's session file changed on disk.
    SessionFileChanged { worktree: String },

    StartAgent {
        worktree: String,
        kind: Option<AgentKind>,
        prompt: Option<String>,
        skip_permissions: bool,
    },
    AgentStartFinished {
        worktree: String,
        result: Result<StartOutcome, SidecarError>,
    },
    StopAgent { worktree: String },
    AgentStopFinished { worktree: String },

    Approve { worktree: String },
    Reject { worktree: String },
    SendText { worktree: String, text: String },
    ActionFinished {
        worktree: String,
        action: UserAction,
        result: Result<(), String>,
    },

    /// Hand the terminal over to a full tmux attach for this worktree.
    Attach { worktree: String },
    AttachFinished { worktree: String },

    EnterInteractive { worktree: String },
    ExitInteractive,
    /// A key event while the user is driving a pane through the supervisor.
    InteractiveKey { key: KeyEvent },
    /// Multi-character rune input (typed burst, terminal paste, clipboard).
    InteractiveRunes { runes: String },
    /// The pending-escape timer elapsed with no second Escape.
    EscapeTimerFired { worktree: String },
    /// Paste the system clipboard into the interactive pane.
    PasteClipboard,
    /// The preview area changed size.
    PreviewResized { width: u16, height: u16 },
    CursorInfoResult {
        worktree: String,
        info: Option<crate::infra::tmux::CursorInfo>,
    },

    /// Merge workflow controls.
    MergeOpen { worktree: String },
    /// Background precheck before the workflow opens: uncommitted-change
    /// counts and the diff summary.
    MergePrecheck {
        worktree: String,
        counts: crate::domain::worktree::StatusCounts,
        diff_summary: String,
    },
    MergeCommitMessage { message: String },
    MergeSelectMethod {
        method: crate::config::MergeMethod,
        direct: bool,
    },
    MergeConfirmReview,
    MergeCheckNow,
    MergeToggleCleanup,
    MergeCleanupCursor { down: bool },
    MergeSkipAllCleanup,
    MergeConfirmCleanup,
    MergeOpenPrInBrowser,
    MergeCancel,
    MergeStepResult {
        worktree: String,
        step: MergeStep,
        result: Result<Option<String>, String>,
    },
    /// Periodic PR merged-state answer.
    MergeCheckResult { worktree: String, merged: Option<bool> },

    RefreshWorktrees,
    WorktreesLoaded {
        result: Result<Vec<LoadedWorktree>, SidecarError>,
    },
    ConflictScanResult { conflicts: Vec<ConflictDescriptor> },
    ReconnectAgents,
    SessionsListed { result: Result<Vec<String>, SidecarError> },
    CleanupOrphans,

    /// The host told us whether the board is visible / the app focused.
    FocusChanged { focused: bool, output_visible: bool },

    Shutdown,
}

/// A worktree as loaded from disk by a background refresh.
#[derive(Debug)]
pub struct LoadedWorktree {
    pub name: String,
    pub path: std::path::PathBuf,
    pub branch: String,
    pub task_id: Option<String>,
    pub agent_kind: Option<AgentKind>,
    pub diff: crate::domain::worktree::DiffStats,
}

/// Render-agnostic messages for the enclosing TUI. The supervisor never
/// draws; the host decides what any of this looks like.
#[derive(Debug)]
pub enum UiMsg {
    AgentStarted { worktree: String, reconnected: bool },
    AgentStopped { worktree: String },
    AgentOutput {
        worktree: String,
        output: String,
        status: WorktreeStatus,
        waiting_for: Option<String>,
    },
    AgentPollUnchanged {
        worktree: String,
        status: WorktreeStatus,
    },
    ApproveResult { worktree: String, result: Result<(), String> },
    RejectResult { worktree: String, result: Result<(), String> },
    SendTextResult { worktree: String, result: Result<(), String> },
    TmuxAttachFinished { worktree: String },
    InteractiveSessionDead { worktree: String },
    InteractiveExited { worktree: String },
    MergeStepCompleted {
        worktree: String,
        step: MergeStep,
        status: StepStatus,
    },
    ConflictsDetected { conflicts: Vec<ConflictDescriptor> },
    WorktreesRefreshed,
    Notify { level: NotifyLevel, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Error,
}
