use crate::domain::agent::AgentKind;
use crate::error::SidecarError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global config: ~/.config/sidecar/config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Prefix for every tmux session this supervisor creates.
    pub session_prefix: String,
    /// tmux scrollback retained per agent session.
    pub history_limit: u32,
    /// Default agent launched into new worktrees.
    pub default_agent: AgentKind,
    /// Primary interactive-mode exit key (unambiguous, exits immediately).
    pub exit_key: ExitKey,
    /// Key that exits interactive mode into a full tmux attach.
    pub attach_key: ExitKey,
    /// Default merge method for the merge workflow.
    pub merge_method: MergeMethod,
    pub cleanup: CleanupDefaults,
    /// OS notification when an unfocused agent starts waiting or finishes.
    pub notify_on_attention: bool,
}

/// A ctrl-chord the relay recognizes without forwarding. Stored as the
/// character pressed with Ctrl held (e.g. '\\' for Ctrl+\).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitKey(pub char);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    /// The `gh pr merge` flag for this method.
    pub fn gh_flag(self) -> &'static str {
        match self {
            MergeMethod::Merge => "--merge",
            MergeMethod::Squash => "--squash",
            MergeMethod::Rebase => "--rebase",
        }
    }
}

/// Default states for the post-merge cleanup checkboxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupDefaults {
    pub delete_worktree: bool,
    pub delete_local_branch: bool,
    pub delete_remote_branch: bool,
    pub pull_after_merge: bool,
}

impl Default for CleanupDefaults {
    fn default() -> Self {
        Self {
            delete_worktree: true,
            delete_local_branch: true,
            delete_remote_branch: false,
            pull_after_merge: true,
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            session_prefix: "sidecar-wt-".into(),
            history_limit: 10_000,
            default_agent: AgentKind::Claude,
            exit_key: ExitKey('\\'),
            attach_key: ExitKey(']'),
            merge_method: MergeMethod::Squash,
            cleanup: CleanupDefaults::default(),
            notify_on_attention: true,
        }
    }
}

/// Workspace config: <workspace>/.sidecar/config.toml (overrides)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub worktree_base_dir: Option<PathBuf>,
    pub default_branch: Option<String>,
    pub default_agent: Option<AgentKind>,
}

/// Merged config with resolved values
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub global: GlobalConfig,
    pub workspace: WorkspaceConfig,
}

impl MergedConfig {
    pub fn session_prefix(&self) -> &str {
        &self.global.session_prefix
    }

    pub fn default_agent(&self) -> AgentKind {
        self.workspace
            .default_agent
            .unwrap_or(self.global.default_agent)
    }

    pub fn worktree_base_dir(&self, workspace_root: &Path) -> PathBuf {
        self.workspace
            .worktree_base_dir
            .clone()
            .unwrap_or_else(|| {
                workspace_root
                    .parent()
                    .unwrap_or(workspace_root)
                    .to_path_buf()
            })
    }
}

/// Load and merge configuration from all sources.
///
/// Resolution order:
/// 1. <workspace>/.sidecar/config.toml
/// 2. ~/.config/sidecar/config.toml
/// 3. Built-in defaults
///
/// A missing file at any layer is not an error; defaults apply.
pub fn load_config(workspace_root: Option<&Path>) -> Result<MergedConfig, SidecarError> {
    let global_config_path = global_config_dir().join("config.toml");
    let global = if global_config_path.exists() {
        let content = std::fs::read_to_string(&global_config_path)
            .map_err(|e| SidecarError::Config(format!("Failed to read global config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| SidecarError::Config(format!("Failed to parse global config: {e}")))?
    } else {
        GlobalConfig::default()
    };

    let workspace = if let Some(root) = workspace_root {
        let ws_config_path = root.join(".sidecar").join("config.toml");
        if ws_config_path.exists() {
            let content = std::fs::read_to_string(&ws_config_path).map_err(|e| {
                SidecarError::Config(format!("Failed to read workspace config: {e}"))
            })?;
            toml::from_str(&content).map_err(|e| {
                SidecarError::Config(format!("Failed to parse workspace config: {e}"))
            })?
        } else {
            WorkspaceConfig::default()
        }
    } else {
        WorkspaceConfig::default()
    };

    Ok(MergedConfig { global, workspace })
}

pub fn global_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("sidecar")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = GlobalConfig::default();
        assert_eq!(cfg.session_prefix, "sidecar-wt-");
        assert_eq!(cfg.history_limit, 10_000);
        assert_eq!(cfg.exit_key, ExitKey('\\'));
        assert_eq!(cfg.attach_key, ExitKey(']'));
    }

    #[test]
    fn workspace_overrides_default_agent() {
        let merged = MergedConfig {
            global: GlobalConfig::default(),
            workspace: WorkspaceConfig {
                default_agent: Some(AgentKind::Aider),
                ..Default::default()
            },
        };
        assert_eq!(merged.default_agent(), AgentKind::Aider);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: GlobalConfig = toml::from_str("session_prefix = \"wt-\"").unwrap();
        assert_eq!(cfg.session_prefix, "wt-");
        assert_eq!(cfg.history_limit, 10_000);
    }

    #[test]
    fn merge_method_flags() {
        assert_eq!(MergeMethod::Squash.gh_flag(), "--squash");
        assert_eq!(MergeMethod::Merge.gh_flag(), "--merge");
        assert_eq!(MergeMethod::Rebase.gh_flag(), "--rebase");
    }
}
