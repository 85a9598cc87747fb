use crate::config::MergedConfig;
use crate::domain::agent::AgentKind;
use crate::error::SidecarError;
use crate::infra::{git, task};
use crate::supervisor::session::{self, StartOptions};
use std::path::Path;

pub async fn execute(
    workspace_root: &Path,
    cfg: &MergedConfig,
    name: String,
    agent: Option<String>,
    prompt: Option<String>,
    skip_permissions: bool,
) -> Result<(), SidecarError> {
    let entries = git::list_worktrees(workspace_root).await?;
    let entry = entries
        .into_iter()
        .find(|e| e.path.file_name().is_some_and(|n| n.to_string_lossy() == name))
        .ok_or_else(|| SidecarError::WorktreeNotFound(name.clone()))?;

    let kind = match agent {
        Some(raw) => AgentKind::parse(&raw)
            .ok_or_else(|| SidecarError::User(format!("Unknown agent '{raw}'")))?,
        None => task::read_agent_link(&entry.path)
            .await
            .unwrap_or_else(|| cfg.default_agent()),
    };
    let task_id = task::read_task_link(&entry.path).await;

    let outcome = session::start_agent(
        cfg.session_prefix(),
        &name,
        &entry.path,
        kind,
        StartOptions {
            prompt,
            skip_permissions,
            launch_agent: true,
            task_id,
            history_limit: cfg.global.history_limit,
        },
    )
    .await?;

    if outcome.reconnected {
        println!("Reconnected to session '{}'", outcome.session_name);
    } else {
        println!("Started {kind} in session '{}'", outcome.session_name);
    }
    Ok(())
}
