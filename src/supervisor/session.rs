use crate::domain::agent::AgentKind;
use crate::error::SidecarError;
use crate::infra::launcher;
use crate::infra::task;
use crate::infra::tmux::TmuxController;
use crate::supervisor::events::StartOutcome;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// How long a Ctrl-C gets to take effect before the session is killed.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Replace the characters a worktree name can carry that tmux session names
/// cannot. The mapping is lossy: reverse lookup must iterate worktrees and
/// re-sanitize to match.
pub fn sanitize_name(name: &str) -> String {
    name.replace(['.', ':', '/'], "-")
}

pub fn session_name(prefix: &str, worktree_name: &str) -> String {
    format!("{prefix}{}", sanitize_name(worktree_name))
}

/// Find the worktree a supervisor session belongs to. Forward mapping is
/// not injective, so the match re-sanitizes every candidate.
pub fn worktree_for_session<'a>(
    session: &str,
    prefix: &str,
    worktree_names: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let suffix = session.strip_prefix(prefix)?;
    worktree_names
        .into_iter()
        .find(|name| sanitize_name(name) == suffix)
        .map(String::from)
}

/// Shell lines exported into a fresh session before the agent starts. The
/// task tracker scopes itself by session id, and workspace-scoping
/// variables inherited from the host shell must not leak into a worktree
/// that is a different checkout.
pub fn env_isolation_commands(session: &str, host_cwd: &Path, worktree: &Path) -> Vec<String> {
    let mut cmds = vec![format!("export TD_SESSION_ID={session}")];
    if host_cwd != worktree {
        cmds.push("unset TD_WORKSPACE TD_WORKSPACE_DIR".to_string());
    }
    cmds
}

pub struct StartOptions {
    pub prompt: Option<String>,
    pub skip_permissions: bool,
    /// Send the agent invocation after creating the session. Off means the
    /// session comes up as a bare shell.
    pub launch_agent: bool,
    pub task_id: Option<String>,
    pub history_limit: u32,
}

/// Spawn (or adopt) the tmux session for a worktree's agent.
///
/// An existing session is adopted as-is: the result says `reconnected` and
/// nothing is sent into the pane. On launch failure the fresh session is
/// killed so a half-started pane never lingers.
pub async fn start_agent(
    prefix: &str,
    worktree_name: &str,
    worktree_path: &Path,
    kind: AgentKind,
    options: StartOptions,
) -> Result<StartOutcome, SidecarError> {
    let session = session_name(prefix, worktree_name);

    if TmuxController::session_exists(&session).await? {
        info!(session = %session, "session already exists, reconnecting");
        return Ok(StartOutcome {
            session_name: session,
            reconnected: true,
        });
    }

    let dir = worktree_path.to_str().unwrap_or(".");
    TmuxController::new_session(&session, dir).await?;

    if let Err(e) = launch_into_session(&session, worktree_name, worktree_path, kind, &options).await
    {
        tracing::warn!(session = %session, error = %e, "agent launch failed, killing session");
        let _ = TmuxController::kill_session(&session).await;
        return Err(e);
    }

    Ok(StartOutcome {
        session_name: session,
        reconnected: false,
    })
}

async fn launch_into_session(
    session: &str,
    worktree_name: &str,
    worktree_path: &Path,
    kind: AgentKind,
    options: &StartOptions,
) -> Result<(), SidecarError> {
    TmuxController::set_history_limit(session, options.history_limit).await?;

    let host_cwd = std::env::current_dir().unwrap_or_default();
    for cmd in env_isolation_commands(session, &host_cwd, worktree_path) {
        TmuxController::send_command(session, &cmd).await?;
    }

    if let Some(task_id) = &options.task_id {
        task::start(task_id).await;
        task::write_task_link(worktree_path, task_id).await?;
    }
    task::write_agent_link(worktree_path, kind).await?;

    if options.launch_agent {
        let cmd = launcher::launch_command(
            worktree_path,
            kind,
            options.prompt.as_deref(),
            options.skip_permissions,
        );
        TmuxController::send_command(session, &cmd).await?;
        info!(session = %session, worktree = worktree_name, agent = %kind, "agent launched");
    }

    Ok(())
}

/// Graceful stop: Ctrl-C, give the agent its grace period, then check both
/// the session and the agent process itself before escalating to a kill.
pub async fn stop_agent(session: &str) -> Result<(), SidecarError> {
    let pane_pid = TmuxController::pane_pid(session).await.ok();

    TmuxController::send_key(session, "C-c").await?;
    tokio::time::sleep(STOP_GRACE).await;

    if TmuxController::session_exists(session).await? {
        if let Some(pid) = pane_pid {
            if !pid_alive(pid) {
                info!(session = %session, "agent process exited after interrupt");
            }
        }
        TmuxController::kill_session(session).await?;
    }
    Ok(())
}

/// Signal-0 process existence probe.
fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

pub async fn approve(session: &str) -> Result<(), SidecarError> {
    TmuxController::send_key(session, "y").await?;
    TmuxController::send_key(session, "Enter").await
}

pub async fn reject(session: &str) -> Result<(), SidecarError> {
    TmuxController::send_key(session, "n").await?;
    TmuxController::send_key(session, "Enter").await
}

/// Literal text, then Enter as a separate command so nothing in the text is
/// key-name interpreted.
pub async fn send_text(session: &str, text: &str) -> Result<(), SidecarError> {
    TmuxController::send_literal(session, text).await?;
    TmuxController::send_key(session, "Enter").await
}

#[derive(Debug, Deserialize)]
struct SessionFileState {
    #[serde(default)]
    state: String,
}

/// The agent-specific session file's verdict on "idle at prompt". The file
/// format belongs to the agent; anything unparseable simply reports false.
pub fn session_file_says_idle(path: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(path) else {
        return false;
    };
    match serde_json::from_str::<SessionFileState>(&content) {
        Ok(state) => state.state.eq_ignore_ascii_case("idle"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn sanitize_replaces_separator_characters() {
        assert_eq!(sanitize_name("feat.v1:beta/x"), "feat-v1-beta-x");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_name("a.b:c/d");
        assert_eq!(sanitize_name(&once), once);
    }

    #[test]
    fn sanitize_leaves_other_characters_alone() {
        assert_eq!(sanitize_name("feat_x-1"), "feat_x-1");
    }

    #[test]
    fn session_names_carry_the_prefix() {
        assert_eq!(
            session_name("sidecar-wt-", "feat.v1"),
            "sidecar-wt-feat-v1"
        );
    }

    #[test]
    fn reverse_lookup_resanitizes() {
        let names = ["feat.v1", "other"];
        assert_eq!(
            worktree_for_session("sidecar-wt-feat-v1", "sidecar-wt-", names),
            Some("feat.v1".to_string())
        );
        assert_eq!(
            worktree_for_session("sidecar-wt-missing", "sidecar-wt-", names),
            None
        );
        // Foreign prefix never matches.
        assert_eq!(
            worktree_for_session("other-prefix-feat-v1", "sidecar-wt-", names),
            None
        );
    }

    #[test]
    fn env_isolation_always_exports_session_id() {
        let cmds = env_isolation_commands(
            "sidecar-wt-x",
            &PathBuf::from("/repo"),
            &PathBuf::from("/repo-wt/x"),
        );
        assert_eq!(cmds[0], "export TD_SESSION_ID=sidecar-wt-x");
        assert!(cmds.iter().any(|c| c.starts_with("unset ")));
    }

    #[test]
    fn env_isolation_skips_unset_in_same_dir() {
        let cmds = env_isolation_commands(
            "sidecar-wt-x",
            &PathBuf::from("/repo"),
            &PathBuf::from("/repo"),
        );
        assert_eq!(cmds.len(), 1);
    }

    #[test]
    fn session_file_idle_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sidecar-session.json");

        assert!(!session_file_says_idle(&path)); // missing

        std::fs::write(&path, r#"{"state":"idle"}"#).unwrap();
        assert!(session_file_says_idle(&path));

        std::fs::write(&path, r#"{"state":"running"}"#).unwrap();
        assert!(!session_file_says_idle(&path));

        std::fs::write(&path, "not json").unwrap();
        assert!(!session_file_says_idle(&path));
    }
}
