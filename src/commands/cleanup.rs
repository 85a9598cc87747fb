use crate::config::MergedConfig;
use crate::error::SidecarError;
use crate::infra::git;
use crate::infra::tmux::TmuxController;
use crate::supervisor::session;
use std::path::Path;

/// Kill supervisor-prefixed sessions whose worktree is gone. Without
/// `--force` this only reports; the explicit flag is what adopts the
/// orphans for killing. Sessions without the prefix are never touched.
pub async fn execute(
    workspace_root: &Path,
    cfg: &MergedConfig,
    force: bool,
) -> Result<(), SidecarError> {
    let entries = git::list_worktrees(workspace_root).await?;
    let names: Vec<String> = entries
        .iter()
        .filter_map(|e| e.path.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();

    let prefix = cfg.session_prefix();
    let sessions = TmuxController::list_sessions().await?;
    let orphans: Vec<String> = sessions
        .into_iter()
        .filter(|s| s.starts_with(prefix))
        .filter(|s| {
            session::worktree_for_session(s, prefix, names.iter().map(String::as_str)).is_none()
        })
        .collect();

    if orphans.is_empty() {
        println!("No orphaned sessions.");
        return Ok(());
    }

    for sess in &orphans {
        if force {
            match TmuxController::kill_session(sess).await {
                Ok(()) => println!("Killed {sess}"),
                Err(e) => println!("Failed to kill {sess}: {e}"),
            }
        } else {
            println!("Orphan: {sess}");
        }
    }
    if !force {
        println!("\nDry run. Re-run with --force to kill.");
    }
    Ok(())
}
