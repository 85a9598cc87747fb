use crate::config::MergedConfig;
use crate::error::SidecarError;
use crate::infra::tmux::TmuxController;
use crate::infra::{git, task};
use crate::supervisor::session;
use std::path::Path;

pub async fn execute(workspace_root: &Path, cfg: &MergedConfig) -> Result<(), SidecarError> {
    let entries = git::list_worktrees(workspace_root).await?;
    if entries.is_empty() {
        println!("No worktrees.");
        return Ok(());
    }

    println!("{:<24} {:<24} {:<10} {:<8} SESSION", "NAME", "BRANCH", "AGENT", "TASK");
    for entry in entries {
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.branch.clone());
        let agent = task::read_agent_link(&entry.path)
            .await
            .map(|k| k.to_string())
            .unwrap_or_else(|| "-".into());
        let task_label = match task::read_task_link(&entry.path).await {
            Some(id) => match task::show(&id).await {
                Some(info) if !info.title.is_empty() => format!("{id} ({})", info.title),
                _ => id,
            },
            None => "-".into(),
        };

        let session = session::session_name(cfg.session_prefix(), &name);
        let session_state = match TmuxController::session_exists(&session).await {
            Ok(true) => "running",
            Ok(false) => "-",
            Err(_) => "?",
        };

        println!(
            "{name:<24} {:<24} {agent:<10} {task_label:<8} {session_state}",
            entry.branch
        );
    }
    Ok(())
}
