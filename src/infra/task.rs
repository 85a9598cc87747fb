use crate::domain::agent::AgentKind;
use crate::error::SidecarError;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

/// Single-line artifact linking a worktree to a task-tracker id.
const TASK_LINK_FILE: &str = ".sidecar-task";
/// Single-line artifact recording the agent kind chosen for a worktree.
const AGENT_LINK_FILE: &str = ".sidecar-agent";

#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
}

pub async fn read_task_link(worktree_path: &Path) -> Option<String> {
    let content = fs::read_to_string(worktree_path.join(TASK_LINK_FILE))
        .await
        .ok()?;
    let id = content.lines().next()?.trim().to_string();
    (!id.is_empty()).then_some(id)
}

pub async fn write_task_link(worktree_path: &Path, task_id: &str) -> Result<(), SidecarError> {
    fs::write(worktree_path.join(TASK_LINK_FILE), format!("{task_id}\n")).await?;
    Ok(())
}

pub async fn read_agent_link(worktree_path: &Path) -> Option<AgentKind> {
    let content = fs::read_to_string(worktree_path.join(AGENT_LINK_FILE))
        .await
        .ok()?;
    AgentKind::parse(content.lines().next()?)
}

pub async fn write_agent_link(worktree_path: &Path, kind: AgentKind) -> Result<(), SidecarError> {
    fs::write(worktree_path.join(AGENT_LINK_FILE), format!("{kind}\n")).await?;
    Ok(())
}

/// Fetch task metadata from the `td` tracker. Absence of the binary or a
/// failed lookup degrades to None; the task id alone still renders.
pub async fn show(task_id: &str) -> Option<TaskInfo> {
    if !is_available() {
        return None;
    }
    let output = Command::new("td")
        .args(["show", task_id, "--json"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        debug!(task = task_id, "td show failed");
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

/// Mark a task started in the tracker. Best-effort.
pub async fn start(task_id: &str) {
    if !is_available() {
        return;
    }
    match Command::new("td").args(["start", task_id]).output().await {
        Ok(output) if !output.status.success() => {
            debug!(task = task_id, "td start failed");
        }
        Err(e) => debug!(task = task_id, error = %e, "td start failed to spawn"),
        _ => {}
    }
}

pub fn is_available() -> bool {
    which::which("td").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn task_link_roundtrip() {
        let dir = tempdir().unwrap();
        write_task_link(dir.path(), "TD-123").await.unwrap();
        assert_eq!(read_task_link(dir.path()).await.as_deref(), Some("TD-123"));
    }

    #[tokio::test]
    async fn missing_task_link_is_none() {
        let dir = tempdir().unwrap();
        assert!(read_task_link(dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn blank_task_link_is_none() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(TASK_LINK_FILE), "\n").await.unwrap();
        assert!(read_task_link(dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn agent_link_roundtrip() {
        let dir = tempdir().unwrap();
        write_agent_link(dir.path(), AgentKind::OpenCode).await.unwrap();
        assert_eq!(
            read_agent_link(dir.path()).await,
            Some(AgentKind::OpenCode)
        );
    }

    #[tokio::test]
    async fn unknown_agent_link_is_none() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(AGENT_LINK_FILE), "not-an-agent\n")
            .await
            .unwrap();
        assert!(read_agent_link(dir.path()).await.is_none());
    }
}
