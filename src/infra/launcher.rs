use crate::domain::agent::{AgentKind, PromptSyntax};
use crate::error::SidecarError;
use std::path::Path;
use tracing::warn;

/// File name of the one-shot launcher written into the worktree.
pub const SCRIPT_NAME: &str = ".sidecar-start.sh";

/// Heredoc delimiter. Quoted in the script so the prompt body is never
/// subject to shell expansion.
const PROMPT_EOF: &str = "SIDECAR_PROMPT_EOF";

/// Agent invocation without a prompt. Used directly for promptless starts
/// and as the degraded form when the launcher script cannot be written.
pub fn bare_command(kind: AgentKind, skip_permissions: bool) -> String {
    let spec = kind.launch_spec();
    let mut cmd = spec.command.to_string();
    if skip_permissions {
        if let Some(flag) = spec.skip_permissions_flag {
            cmd.push(' ');
            cmd.push_str(flag);
        }
    }
    cmd
}

/// Build the launcher script body.
///
/// A long free-form prompt cannot be interpolated into a shell command line:
/// backticks, quotes, dollar signs, newlines and embedded code blocks all
/// break escaping. The quoted heredoc embeds the prompt byte-for-byte. The
/// preamble sources the user's profile (lazy-loaded node version managers
/// put agent binaries on PATH there), and the script removes itself once
/// the agent exits.
pub fn script_contents(kind: AgentKind, prompt: &str, skip_permissions: bool) -> String {
    let spec = kind.launch_spec();
    let mut agent_cmd = bare_command(kind, skip_permissions);
    match spec.prompt_syntax {
        PromptSyntax::Positional => {}
        PromptSyntax::MessageFlag => agent_cmd.push_str(" --message"),
        PromptSyntax::RunSubcommand => agent_cmd.push_str(" run"),
    }

    format!(
        "#!/bin/bash\n\
         # Pick up PATH entries from the user's profile (nvm and friends).\n\
         [ -f \"$HOME/.bash_profile\" ] && source \"$HOME/.bash_profile\" >/dev/null 2>&1\n\
         [ -f \"$HOME/.bashrc\" ] && source \"$HOME/.bashrc\" >/dev/null 2>&1\n\
         [ -f \"$HOME/.profile\" ] && source \"$HOME/.profile\" >/dev/null 2>&1\n\
         \n\
         {agent_cmd} \"$(cat <<'{PROMPT_EOF}'\n\
         {prompt}\n\
         {PROMPT_EOF}\n\
         )\"\n\
         rm -f \"$0\"\n"
    )
}

/// Write the launcher script (mode 0700) into the worktree and return the
/// command line that starts it.
pub fn write_script(
    worktree_path: &Path,
    kind: AgentKind,
    prompt: &str,
    skip_permissions: bool,
) -> Result<String, SidecarError> {
    let script_path = worktree_path.join(SCRIPT_NAME);
    let contents = script_contents(kind, prompt, skip_permissions);
    std::fs::write(&script_path, contents)
        .map_err(|e| SidecarError::Launcher(format!("write {}: {e}", script_path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o700))
            .map_err(|e| SidecarError::Launcher(format!("chmod {}: {e}", script_path.display())))?;
    }

    Ok(format!("./{SCRIPT_NAME}"))
}

/// Prompted launch command: the launcher script when it can be written,
/// degrading to the bare agent invocation (prompt dropped) on IO failure.
pub fn launch_command(
    worktree_path: &Path,
    kind: AgentKind,
    prompt: Option<&str>,
    skip_permissions: bool,
) -> String {
    match prompt {
        Some(prompt) if !prompt.is_empty() => {
            match write_script(worktree_path, kind, prompt, skip_permissions) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!(error = %e, "launcher script write failed, starting without prompt");
                    bare_command(kind, skip_permissions)
                }
            }
        }
        _ => bare_command(kind, skip_permissions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bare_command_appends_known_skip_flag() {
        assert_eq!(
            bare_command(AgentKind::Claude, true),
            "claude --dangerously-skip-permissions"
        );
        assert_eq!(bare_command(AgentKind::Claude, false), "claude");
        // No known flag: silently dropped.
        assert_eq!(bare_command(AgentKind::OpenCode, true), "opencode");
    }

    #[test]
    fn script_embeds_prompt_verbatim() {
        let prompt = "fix `foo()` — handle \"$HOME\" and\n```\nrm -rf /tmp/x\n```";
        let script = script_contents(AgentKind::Claude, prompt, false);
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains(&format!("<<'{PROMPT_EOF}'\n{prompt}\n{PROMPT_EOF}")));
        assert!(script.ends_with("rm -f \"$0\"\n"));
    }

    #[test]
    fn prompt_syntax_per_agent() {
        let script = script_contents(AgentKind::Aider, "p", false);
        assert!(script.contains("aider --message \"$(cat"));
        let script = script_contents(AgentKind::OpenCode, "p", false);
        assert!(script.contains("opencode run \"$(cat"));
        let script = script_contents(AgentKind::Codex, "p", false);
        assert!(script.contains("codex \"$(cat"));
    }

    #[test]
    fn write_script_sets_exec_mode() {
        let dir = tempdir().unwrap();
        let cmd = write_script(dir.path(), AgentKind::Claude, "do it", false).unwrap();
        assert_eq!(cmd, format!("./{SCRIPT_NAME}"));

        let path = dir.path().join(SCRIPT_NAME);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("do it"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn launch_command_degrades_on_unwritable_worktree() {
        let cmd = launch_command(
            Path::new("/nonexistent/worktree"),
            AgentKind::Claude,
            Some("prompt"),
            true,
        );
        assert_eq!(cmd, "claude --dangerously-skip-permissions");
    }

    #[test]
    fn promptless_launch_uses_bare_command() {
        let dir = tempdir().unwrap();
        let cmd = launch_command(dir.path(), AgentKind::Gemini, None, true);
        assert_eq!(cmd, "gemini --yolo");
        assert!(!dir.path().join(SCRIPT_NAME).exists());
    }
}
