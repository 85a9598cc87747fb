use crate::domain::worktree::{DiffStats, StatusCounts};
use crate::error::SidecarError;
use git2::Repository;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: String,
}

/// A file dirty in more than one worktree at once. Surfaced as advisory
/// information only; sidecar makes no decisions on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDescriptor {
    pub path: String,
    pub worktrees: Vec<String>,
}

/// Detect the repository root from any path within it
pub fn find_repo_root(start_path: &Path) -> Result<PathBuf, SidecarError> {
    let repo = Repository::discover(start_path).map_err(|_| SidecarError::NotGitRepo)?;
    let workdir = repo
        .workdir()
        .ok_or(SidecarError::Git("Bare repositories are not supported".into()))?;
    Ok(workdir.to_path_buf())
}

/// Get the default branch (main or master)
pub fn default_branch(repo_root: &Path) -> Result<String, SidecarError> {
    let repo = Repository::open(repo_root).map_err(|_| SidecarError::NotGitRepo)?;
    for candidate in &["refs/remotes/origin/main", "refs/remotes/origin/master"] {
        if repo.find_reference(candidate).is_ok() {
            return Ok(candidate.rsplit('/').next().unwrap().to_string());
        }
    }
    Ok("main".to_string())
}

/// List every linked worktree of the repository (the main checkout is
/// excluded; sidecar only manages linked worktrees).
pub async fn list_worktrees(repo_root: &Path) -> Result<Vec<WorktreeEntry>, SidecarError> {
    let output = run_git(repo_root, &["worktree", "list", "--porcelain"]).await?;
    let mut entries = parse_worktree_list(&output);
    entries.retain(|e| e.path != repo_root);
    Ok(entries)
}

/// Create a worktree on a new branch. If the branch already exists the
/// creation is retried without `-b`, checking the existing branch out.
pub async fn create_worktree(
    repo_root: &Path,
    branch_name: &str,
    base_ref: Option<&str>,
    worktree_path: &Path,
) -> Result<WorktreeEntry, SidecarError> {
    let resolved_base = match base_ref {
        Some(b) => b.to_string(),
        None => default_branch(repo_root)?,
    };

    let first = Command::new("git")
        .current_dir(repo_root)
        .args(["worktree", "add", "-b", branch_name])
        .arg(worktree_path)
        .arg(&resolved_base)
        .output()
        .await?;

    if !first.status.success() {
        let second = Command::new("git")
            .current_dir(repo_root)
            .args(["worktree", "add"])
            .arg(worktree_path)
            .arg(branch_name)
            .output()
            .await?;
        if !second.status.success() {
            return Err(SidecarError::Git(
                String::from_utf8_lossy(&second.stderr).to_string(),
            ));
        }
    }

    Ok(WorktreeEntry {
        path: worktree_path.to_path_buf(),
        branch: branch_name.to_string(),
    })
}

pub async fn remove_worktree(repo_root: &Path, worktree_path: &Path) -> Result<(), SidecarError> {
    let output = Command::new("git")
        .current_dir(repo_root)
        .args(["worktree", "remove", "--force"])
        .arg(worktree_path)
        .output()
        .await?;
    if !output.status.success() {
        return Err(SidecarError::Git(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(())
}

pub async fn prune_worktrees(repo_root: &Path) -> Result<(), SidecarError> {
    run_git(repo_root, &["worktree", "prune"]).await?;
    Ok(())
}

pub async fn delete_local_branch(repo_root: &Path, branch: &str) -> Result<(), SidecarError> {
    run_git(repo_root, &["branch", "-D", branch]).await?;
    Ok(())
}

pub async fn delete_remote_branch(repo_root: &Path, branch: &str) -> Result<(), SidecarError> {
    run_git(repo_root, &["push", "origin", "--delete", branch]).await?;
    Ok(())
}

/// Diff stats of the worktree's branch against its merge base.
pub async fn diff_stats(worktree_path: &Path, base: &str) -> Result<DiffStats, SidecarError> {
    let range = format!("{base}...HEAD");
    let output = run_git(worktree_path, &["diff", "--shortstat", &range]).await?;
    Ok(parse_shortstat(&output))
}

/// Full diff text for review, branch tip against the merge base plus any
/// uncommitted changes on top.
pub async fn diff_text(worktree_path: &Path, base: &str) -> Result<String, SidecarError> {
    let range = format!("{base}...HEAD");
    let committed = run_git(worktree_path, &["diff", &range]).await?;
    let uncommitted = run_git(worktree_path, &["diff", "HEAD"]).await.unwrap_or_default();
    if uncommitted.is_empty() {
        Ok(committed)
    } else {
        Ok(format!("{committed}\n{uncommitted}"))
    }
}

/// Staged / modified / untracked counts from `git status --porcelain`.
pub async fn status_counts(worktree_path: &Path) -> Result<StatusCounts, SidecarError> {
    let output = run_git(worktree_path, &["status", "--porcelain"]).await?;
    Ok(parse_porcelain_counts(&output))
}

/// Paths dirty in a worktree, for the cross-worktree conflict advisor.
pub async fn dirty_paths(worktree_path: &Path) -> Result<Vec<String>, SidecarError> {
    let output = run_git(worktree_path, &["status", "--porcelain"]).await?;
    Ok(output
        .lines()
        .filter_map(|l| l.get(3..).map(|p| p.trim().to_string()))
        .filter(|p| !p.is_empty())
        .collect())
}

/// Opaque conflict advisor: a path dirty in two or more worktrees yields one
/// descriptor naming all of them.
pub fn conflicting_paths(per_worktree: &[(String, Vec<String>)]) -> Vec<ConflictDescriptor> {
    use std::collections::BTreeMap;
    let mut by_path: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (worktree, paths) in per_worktree {
        for path in paths {
            by_path.entry(path).or_default().push(worktree);
        }
    }
    by_path
        .into_iter()
        .filter(|(_, wts)| wts.len() > 1)
        .map(|(path, wts)| ConflictDescriptor {
            path: path.to_string(),
            worktrees: wts.into_iter().map(String::from).collect(),
        })
        .collect()
}

pub async fn add_all_and_commit(worktree_path: &Path, message: &str) -> Result<(), SidecarError> {
    run_git(worktree_path, &["add", "-A"]).await?;
    let output = Command::new("git")
        .current_dir(worktree_path)
        .args(["commit", "-m", message])
        .output()
        .await?;
    if !output.status.success() {
        return Err(SidecarError::Git(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(())
}

pub async fn push_branch(worktree_path: &Path, branch: &str) -> Result<(), SidecarError> {
    run_git(worktree_path, &["push", "-u", "origin", branch]).await?;
    Ok(())
}

pub async fn pull(repo_root: &Path) -> Result<(), SidecarError> {
    run_git(repo_root, &["pull", "--ff-only"]).await?;
    Ok(())
}

async fn run_git(cwd: &Path, args: &[&str]) -> Result<String, SidecarError> {
    let output = Command::new("git").current_dir(cwd).args(args).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(args = ?args, cwd = %cwd.display(), stderr = %stderr, "git command failed");
        return Err(SidecarError::Git(stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn parse_worktree_list(stdout: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    for block in stdout.split("\n\n") {
        let mut path = None;
        let mut branch = None;
        for line in block.lines() {
            if let Some(p) = line.strip_prefix("worktree ") {
                path = Some(PathBuf::from(p));
            }
            if let Some(b) = line.strip_prefix("branch refs/heads/") {
                branch = Some(b.to_string());
            }
        }
        if let (Some(path), Some(branch)) = (path, branch) {
            entries.push(WorktreeEntry { path, branch });
        }
    }
    entries
}

/// Parse `git diff --shortstat` output, e.g.
/// ` 3 files changed, 14 insertions(+), 2 deletions(-)`.
fn parse_shortstat(line: &str) -> DiffStats {
    let mut stats = DiffStats::default();
    for part in line.trim().split(',') {
        let part = part.trim();
        let Some(num) = part.split_whitespace().next().and_then(|n| n.parse().ok()) else {
            continue;
        };
        if part.contains("file") {
            stats.files_changed = num;
        } else if part.contains("insertion") {
            stats.insertions = num;
        } else if part.contains("deletion") {
            stats.deletions = num;
        }
    }
    stats
}

fn parse_porcelain_counts(stdout: &str) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for line in stdout.lines() {
        let mut chars = line.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');
        if x == '?' && y == '?' {
            counts.untracked += 1;
            continue;
        }
        if x != ' ' {
            counts.staged += 1;
        }
        if y != ' ' {
            counts.modified += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worktree_list_porcelain() {
        let out = "worktree /repo\nHEAD aaaa\nbranch refs/heads/main\n\n\
                   worktree /repo-wt/feat-x\nHEAD bbbb\nbranch refs/heads/feat/x\n\n\
                   worktree /repo-wt/detached\nHEAD cccc\ndetached\n";
        let entries = parse_worktree_list(out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].branch, "main");
        assert_eq!(entries[1].path, PathBuf::from("/repo-wt/feat-x"));
        assert_eq!(entries[1].branch, "feat/x");
    }

    #[test]
    fn parses_shortstat() {
        let stats = parse_shortstat(" 3 files changed, 14 insertions(+), 2 deletions(-)\n");
        assert_eq!(
            stats,
            DiffStats {
                files_changed: 3,
                insertions: 14,
                deletions: 2
            }
        );
    }

    #[test]
    fn shortstat_handles_missing_sections() {
        let stats = parse_shortstat(" 1 file changed, 5 deletions(-)\n");
        assert_eq!(stats.files_changed, 1);
        assert_eq!(stats.insertions, 0);
        assert_eq!(stats.deletions, 5);
        assert_eq!(parse_shortstat(""), DiffStats::default());
    }

    #[test]
    fn parses_porcelain_counts() {
        let out = "M  staged.rs\nMM both.rs\n?? new.rs\nA  added.rs\n M modified.rs\n";
        let counts = parse_porcelain_counts(out);
        assert_eq!(counts.staged, 3); // staged.rs, both.rs, added.rs
        assert_eq!(counts.modified, 2); // both.rs, modified.rs
        assert_eq!(counts.untracked, 1);
    }

    #[test]
    fn clean_tree_counts() {
        assert!(parse_porcelain_counts("").is_clean());
    }

    #[test]
    fn conflict_advisor_flags_shared_paths() {
        let per = vec![
            ("wt-a".to_string(), vec!["src/lib.rs".to_string(), "a.rs".to_string()]),
            ("wt-b".to_string(), vec!["src/lib.rs".to_string()]),
        ];
        let conflicts = conflicting_paths(&per);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "src/lib.rs");
        assert_eq!(conflicts[0].worktrees, vec!["wt-a", "wt-b"]);
    }

    #[test]
    fn conflict_advisor_empty_when_disjoint() {
        let per = vec![
            ("wt-a".to_string(), vec!["a.rs".to_string()]),
            ("wt-b".to_string(), vec!["b.rs".to_string()]),
        ];
        assert!(conflicting_paths(&per).is_empty());
    }
}
