use crate::config::MergedConfig;
use crate::error::SidecarError;
use crate::infra::tmux::TmuxController;
use crate::infra::{gh, git, task};
use crate::supervisor::session;
use std::path::Path;

pub async fn execute(workspace_root: &Path, cfg: &MergedConfig) -> Result<(), SidecarError> {
    println!("Tools:");
    println!("  tmux  {}", check(TmuxController::is_available()));
    println!("  git   {}", check(which::which("git").is_ok()));
    println!("  gh    {}", check(gh::is_available()));
    println!("  td    {}", check(task::is_available()));

    let entries = git::list_worktrees(workspace_root).await?;
    let names: Vec<String> = entries
        .iter()
        .filter_map(|e| e.path.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();

    let prefix = cfg.session_prefix();
    let sessions = TmuxController::list_sessions().await?;
    let ours: Vec<&String> = sessions.iter().filter(|s| s.starts_with(prefix)).collect();

    println!("\nWorktrees: {}", names.len());
    println!("Supervisor sessions: {}", ours.len());

    let mut orphans = 0;
    for sess in &ours {
        let matched =
            session::worktree_for_session(sess, prefix, names.iter().map(String::as_str));
        match matched {
            Some(worktree) => println!("  {sess} -> {worktree}"),
            None => {
                println!("  {sess} -> ORPHAN (no matching worktree)");
                orphans += 1;
            }
        }
    }
    if orphans > 0 {
        println!("\n{orphans} orphaned session(s). Run `sidecar cleanup --force` to kill them.");
    }

    Ok(())
}

fn check(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "missing"
    }
}
