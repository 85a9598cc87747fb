use crate::buffer::OutputBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The interactive coding agents sidecar knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Claude,
    Codex,
    Aider,
    Gemini,
    Cursor,
    OpenCode,
}

/// How an agent's CLI accepts its initial prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSyntax {
    /// `agent "<prompt>"`
    Positional,
    /// `agent --message "<prompt>"`
    MessageFlag,
    /// `agent run "<prompt>"`
    RunSubcommand,
}

/// Static launch configuration for one agent kind. Each kind gets one record
/// instead of runtime string lookups for command shape.
#[derive(Debug, Clone, Copy)]
pub struct AgentLaunchSpec {
    pub command: &'static str,
    pub skip_permissions_flag: Option<&'static str>,
    pub prompt_syntax: PromptSyntax,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Claude,
        AgentKind::Codex,
        AgentKind::Aider,
        AgentKind::Gemini,
        AgentKind::Cursor,
        AgentKind::OpenCode,
    ];

    pub fn launch_spec(self) -> AgentLaunchSpec {
        match self {
            AgentKind::Claude => AgentLaunchSpec {
                command: "claude",
                skip_permissions_flag: Some("--dangerously-skip-permissions"),
                prompt_syntax: PromptSyntax::Positional,
            },
            AgentKind::Codex => AgentLaunchSpec {
                command: "codex",
                skip_permissions_flag: Some("--full-auto"),
                prompt_syntax: PromptSyntax::Positional,
            },
            AgentKind::Aider => AgentLaunchSpec {
                command: "aider",
                skip_permissions_flag: Some("--yes-always"),
                prompt_syntax: PromptSyntax::MessageFlag,
            },
            AgentKind::Gemini => AgentLaunchSpec {
                command: "gemini",
                skip_permissions_flag: Some("--yolo"),
                prompt_syntax: PromptSyntax::Positional,
            },
            AgentKind::Cursor => AgentLaunchSpec {
                command: "cursor-agent",
                skip_permissions_flag: Some("-f"),
                prompt_syntax: PromptSyntax::Positional,
            },
            AgentKind::OpenCode => AgentLaunchSpec {
                command: "opencode",
                skip_permissions_flag: None,
                prompt_syntax: PromptSyntax::RunSubcommand,
            },
        }
    }

    /// Path of the per-agent session state file, if this kind writes one.
    /// The file is more authoritative than a scrollback scrape for "idle at
    /// prompt" but less responsive, so it is only consulted to upgrade an
    /// Active classification.
    pub fn session_file(self, worktree_path: &Path) -> Option<PathBuf> {
        match self {
            AgentKind::Claude | AgentKind::Codex | AgentKind::OpenCode => {
                Some(worktree_path.join(".sidecar-session.json"))
            }
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<AgentKind> {
        match s.trim().to_lowercase().as_str() {
            "claude" => Some(AgentKind::Claude),
            "codex" => Some(AgentKind::Codex),
            "aider" => Some(AgentKind::Aider),
            "gemini" => Some(AgentKind::Gemini),
            "cursor" | "cursor-agent" => Some(AgentKind::Cursor),
            "opencode" => Some(AgentKind::OpenCode),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
            AgentKind::Aider => "aider",
            AgentKind::Gemini => "gemini",
            AgentKind::Cursor => "cursor",
            AgentKind::OpenCode => "opencode",
        };
        write!(f, "{name}")
    }
}

/// A running interactive agent inside a tmux pane. Owned by its Worktree;
/// holds the worktree's name by value, never a back-pointer.
#[derive(Debug)]
pub struct Agent {
    pub kind: AgentKind,
    pub worktree_name: String,
    pub tmux_session: String,
    pub pane_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_output_at: DateTime<Utc>,
    /// Prompt text the agent is currently blocked on, if any.
    pub waiting_for: Option<String>,
    pub buffer: OutputBuffer,
}

impl Agent {
    pub fn new(kind: AgentKind, worktree_name: String, tmux_session: String) -> Self {
        let now = Utc::now();
        Self {
            kind,
            worktree_name,
            tmux_session,
            pane_id: None,
            started_at: now,
            last_output_at: now,
            waiting_for: None,
            buffer: OutputBuffer::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_display() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::parse(&kind.to_string()), Some(kind));
        }
        assert_eq!(AgentKind::parse("Cursor-Agent"), Some(AgentKind::Cursor));
        assert_eq!(AgentKind::parse("unknown"), None);
    }

    #[test]
    fn launch_specs_cover_prompt_syntaxes() {
        assert_eq!(
            AgentKind::Aider.launch_spec().prompt_syntax,
            PromptSyntax::MessageFlag
        );
        assert_eq!(
            AgentKind::OpenCode.launch_spec().prompt_syntax,
            PromptSyntax::RunSubcommand
        );
        assert_eq!(
            AgentKind::Claude.launch_spec().prompt_syntax,
            PromptSyntax::Positional
        );
    }

    #[test]
    fn opencode_has_no_skip_flag() {
        assert!(AgentKind::OpenCode
            .launch_spec()
            .skip_permissions_flag
            .is_none());
        assert_eq!(
            AgentKind::Claude.launch_spec().skip_permissions_flag,
            Some("--dangerously-skip-permissions")
        );
    }

    #[test]
    fn session_file_only_for_supported_kinds() {
        let wt = Path::new("/tmp/wt");
        assert!(AgentKind::Claude.session_file(wt).is_some());
        assert!(AgentKind::Aider.session_file(wt).is_none());
    }

    #[test]
    fn new_agent_has_empty_buffer() {
        let agent = Agent::new(AgentKind::Claude, "feat-x".into(), "sidecar-wt-feat-x".into());
        assert!(agent.pane_id.is_none());
        assert!(agent.waiting_for.is_none());
        assert!(agent.buffer.lines().is_empty());
    }
}
