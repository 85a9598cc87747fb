use crate::error::SidecarError;
use crate::infra::git;
use std::path::Path;

pub async fn execute(workspace_root: &Path, name: String) -> Result<(), SidecarError> {
    let entries = git::list_worktrees(workspace_root).await?;
    let entry = entries
        .into_iter()
        .find(|e| e.path.file_name().is_some_and(|n| n.to_string_lossy() == name))
        .ok_or_else(|| SidecarError::WorktreeNotFound(name.clone()))?;

    git::remove_worktree(workspace_root, &entry.path).await?;
    git::prune_worktrees(workspace_root).await?;

    println!("Removed worktree '{name}'");
    Ok(())
}
