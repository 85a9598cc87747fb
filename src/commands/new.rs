use crate::config::MergedConfig;
use crate::domain::agent::AgentKind;
use crate::error::SidecarError;
use crate::infra::{git, task};
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    workspace_root: &Path,
    cfg: &MergedConfig,
    name: String,
    branch: Option<String>,
    base: Option<String>,
    agent: Option<String>,
    task_id: Option<String>,
) -> Result<(), SidecarError> {
    let agent_kind = match agent {
        Some(raw) => AgentKind::parse(&raw)
            .ok_or_else(|| SidecarError::User(format!("Unknown agent '{raw}'")))?,
        None => cfg.default_agent(),
    };

    let branch = branch.unwrap_or_else(|| name.clone());
    let worktree_path = cfg.worktree_base_dir(workspace_root).join(&name);

    let entry =
        git::create_worktree(workspace_root, &branch, base.as_deref(), &worktree_path).await?;

    task::write_agent_link(&entry.path, agent_kind).await?;
    if let Some(task_id) = &task_id {
        task::write_task_link(&entry.path, task_id).await?;
    }

    println!(
        "Created worktree '{name}' at {} on branch '{}'",
        entry.path.display(),
        entry.branch
    );
    Ok(())
}
