use crate::config::MergedConfig;
use crate::error::SidecarError;
use crate::supervisor::events::{NotifyLevel, SupervisorEvent, UiMsg};
use crate::supervisor::init_supervisor;
use std::path::Path;
use std::time::Duration;

/// How often the host asks for a worktree refresh and an orphan sweep.
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Run the supervisor with a line-printing host. A full TUI sits on the
/// same two channels; this host just renders every message as a line,
/// which is also what makes the supervisor scriptable.
pub async fn execute(workspace_root: &Path, cfg: MergedConfig) -> Result<(), SidecarError> {
    let mut handle = init_supervisor(cfg, workspace_root.to_path_buf());

    // Periodic maintenance the supervisor does not self-schedule.
    let refresh_tx = handle.events.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        ticker.tick().await; // the supervisor refreshes once on startup
        loop {
            ticker.tick().await;
            if refresh_tx.send(SupervisorEvent::RefreshWorktrees).is_err() {
                break;
            }
            let _ = refresh_tx.send(SupervisorEvent::CleanupOrphans);
        }
    });

    let shutdown_tx = handle.events.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(SupervisorEvent::Shutdown);
        }
    });

    while let Some(msg) = handle.ui.recv().await {
        print_msg(&msg);
    }

    let _ = handle.join.await;
    Ok(())
}

fn print_msg(msg: &UiMsg) {
    match msg {
        UiMsg::AgentStarted {
            worktree,
            reconnected,
        } => {
            if *reconnected {
                println!("[{worktree}] reconnected to agent session");
            } else {
                println!("[{worktree}] agent started");
            }
        }
        UiMsg::AgentStopped { worktree } => println!("[{worktree}] agent stopped"),
        UiMsg::AgentOutput {
            worktree,
            status,
            waiting_for,
            ..
        } => match waiting_for {
            Some(prompt) => println!("[{worktree}] {status}: {prompt}"),
            None => println!("[{worktree}] {status}"),
        },
        UiMsg::AgentPollUnchanged { .. } => {}
        UiMsg::ApproveResult { worktree, result } => print_action(worktree, "approve", result),
        UiMsg::RejectResult { worktree, result } => print_action(worktree, "reject", result),
        UiMsg::SendTextResult { worktree, result } => print_action(worktree, "send", result),
        UiMsg::TmuxAttachFinished { worktree } => println!("[{worktree}] attach finished"),
        UiMsg::InteractiveSessionDead { worktree } => {
            println!("[{worktree}] interactive session died")
        }
        UiMsg::InteractiveExited { worktree } => println!("[{worktree}] left interactive mode"),
        UiMsg::MergeStepCompleted {
            worktree,
            step,
            status,
        } => println!("[{worktree}] merge {step:?}: {status:?}"),
        UiMsg::ConflictsDetected { conflicts } => {
            for c in conflicts {
                println!(
                    "conflict: {} dirty in {}",
                    c.path,
                    c.worktrees.join(", ")
                );
            }
        }
        UiMsg::WorktreesRefreshed => {}
        UiMsg::Notify { level, message } => {
            let tag = match level {
                NotifyLevel::Info => "info",
                NotifyLevel::Success => "ok",
                NotifyLevel::Error => "error",
            };
            println!("{tag}: {message}");
        }
    }
}

fn print_action(worktree: &str, action: &str, result: &Result<(), String>) {
    match result {
        Ok(()) => println!("[{worktree}] {action} sent"),
        Err(e) => println!("[{worktree}] {action} failed: {e}"),
    }
}
