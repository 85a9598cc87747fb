use thiserror::Error;

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("tmux error: {0}")]
    Tmux(String),

    #[error("session gone: {0}")]
    SessionGone(String),

    #[error("capture timed out")]
    CaptureTimeout,

    #[error("Git error: {0}")]
    Git(String),

    #[error("gh error: {0}")]
    Gh(String),

    #[error("launcher script error: {0}")]
    Launcher(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worktree not found: {0}")]
    WorktreeNotFound(String),

    #[error("Not a git repository")]
    NotGitRepo,

    #[error("tmux not installed. Install with: brew install tmux")]
    TmuxNotInstalled,

    #[error("git not found on PATH")]
    GitNotInstalled,

    #[error("{0}")]
    User(String),
}

/// Substrings in tmux stderr that mean the target session/pane no longer
/// resolves, as opposed to a genuine command failure.
const SESSION_GONE_MARKERS: [&str; 5] = [
    "can't find pane",
    "no such session",
    "session not found",
    "pane not found",
    "no server",
];

impl SidecarError {
    /// Classify tmux stderr into SessionGone vs a generic tmux failure.
    pub fn from_tmux_stderr(stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if SESSION_GONE_MARKERS.iter().any(|m| lower.contains(m)) {
            SidecarError::SessionGone(stderr.trim().to_string())
        } else {
            SidecarError::Tmux(stderr.trim().to_string())
        }
    }

    pub fn is_session_gone(&self) -> bool {
        matches!(self, SidecarError::SessionGone(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_session_gone_variants() {
        for stderr in [
            "can't find pane: %4",
            "no such session: sidecar-wt-foo",
            "error connecting to /tmp/tmux-1000/default (no server running)",
            "session not found: x",
            "pane not found: %9",
        ] {
            assert!(
                SidecarError::from_tmux_stderr(stderr).is_session_gone(),
                "expected SessionGone for {stderr:?}"
            );
        }
    }

    #[test]
    fn generic_failure_is_not_session_gone() {
        let err = SidecarError::from_tmux_stderr("usage: send-keys [-FHlMRX] ...");
        assert!(!err.is_session_gone());
        assert!(matches!(err, SidecarError::Tmux(_)));
    }
}
