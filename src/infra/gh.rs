use crate::config::MergeMethod;
use crate::error::SidecarError;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrStatus {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub merged_at: Option<String>,
}

impl PrStatus {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some() || self.state.eq_ignore_ascii_case("merged")
    }
}

/// Create a PR for the current branch. Returns the PR URL that gh prints.
pub async fn create_pr(
    worktree_path: &Path,
    title: &str,
    body: &str,
) -> Result<String, SidecarError> {
    let output = Command::new("gh")
        .current_dir(worktree_path)
        .args(["pr", "create", "--title", title, "--body", body])
        .output()
        .await?;

    if !output.status.success() {
        return Err(SidecarError::Gh(format!(
            "gh pr create failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    // gh prints the created PR URL as the last stdout line.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let url = stdout
        .lines()
        .rev()
        .find(|l| l.starts_with("http"))
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(url)
}

/// Fetch the merge state of the current branch's PR via gh CLI.
pub async fn pr_status(worktree_path: &Path) -> Result<PrStatus, SidecarError> {
    let output = Command::new("gh")
        .current_dir(worktree_path)
        .args(["pr", "view", "--json", "url,state,mergedAt"])
        .output()
        .await?;

    if !output.status.success() {
        return Err(SidecarError::Gh(format!(
            "gh pr view failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let status: PrStatus = serde_json::from_slice(&output.stdout)
        .map_err(|e| SidecarError::Gh(format!("Failed to parse PR status: {e}")))?;
    Ok(status)
}

/// Merge the current branch's PR with the chosen method.
pub async fn merge_pr(worktree_path: &Path, method: MergeMethod) -> Result<(), SidecarError> {
    let output = Command::new("gh")
        .current_dir(worktree_path)
        .args(["pr", "merge", method.gh_flag()])
        .output()
        .await?;

    if !output.status.success() {
        return Err(SidecarError::Gh(format!(
            "gh pr merge failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// Open the branch's PR in the default browser.
pub async fn open_pr_in_browser(worktree_path: &Path) -> Result<(), SidecarError> {
    let output = Command::new("gh")
        .current_dir(worktree_path)
        .args(["pr", "view", "--web"])
        .output()
        .await?;
    if !output.status.success() {
        return Err(SidecarError::Gh(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(())
}

/// Check if gh CLI is available
pub fn is_available() -> bool {
    which::which("gh").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_at_implies_merged() {
        let status: PrStatus = serde_json::from_str(
            r#"{"url":"https://github.com/o/r/pull/1","state":"CLOSED","mergedAt":"2026-07-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(status.is_merged());
    }

    #[test]
    fn merged_state_implies_merged() {
        let status: PrStatus =
            serde_json::from_str(r#"{"url":"","state":"MERGED","mergedAt":null}"#).unwrap();
        assert!(status.is_merged());
    }

    #[test]
    fn open_pr_is_not_merged() {
        let status: PrStatus =
            serde_json::from_str(r#"{"url":"u","state":"OPEN","mergedAt":null}"#).unwrap();
        assert!(!status.is_merged());
    }
}
