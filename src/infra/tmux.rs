use crate::error::SidecarError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// All tmux operations. Shells out to the `tmux` CLI; the tmux server owns
/// the session processes, sidecar only holds names and pane ids.
pub struct TmuxController;

/// Cursor and pane geometry reported by `display-message`, cached by the
/// poll handler for the interactive overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorInfo {
    pub x: u16,
    pub y: u16,
    pub visible: bool,
    pub pane_height: u16,
    pub pane_width: u16,
}

impl TmuxController {
    /// Check if tmux is installed
    pub fn is_available() -> bool {
        which::which("tmux").is_ok()
    }

    /// Check if a tmux session exists. A nonzero exit is the normal
    /// "not found" answer, not a failure.
    pub async fn session_exists(session_name: &str) -> Result<bool, SidecarError> {
        let output = Command::new("tmux")
            .args(["has-session", "-t", session_name])
            .output()
            .await?;
        Ok(output.status.success())
    }

    /// Create a detached session rooted in the given working directory.
    pub async fn new_session(session_name: &str, working_dir: &str) -> Result<(), SidecarError> {
        debug!(session = session_name, dir = working_dir, "creating tmux session");
        run_tmux(&["new-session", "-d", "-s", session_name, "-c", working_dir]).await
    }

    pub async fn set_history_limit(session_name: &str, limit: u32) -> Result<(), SidecarError> {
        let limit = limit.to_string();
        run_tmux(&["set-option", "-t", session_name, "history-limit", &limit]).await
    }

    /// Send a named key (Enter, Escape, C-c, Up, ...). tmux interprets the
    /// argument through its key-name table.
    pub async fn send_key(session_name: &str, key: &str) -> Result<(), SidecarError> {
        run_tmux(&["send-keys", "-t", session_name, key]).await
    }

    /// Send text without key-name interpretation (`-l`).
    pub async fn send_literal(session_name: &str, text: &str) -> Result<(), SidecarError> {
        run_tmux(&["send-keys", "-l", "-t", session_name, text]).await
    }

    /// Send a shell command line followed by Enter. Enter goes as a separate
    /// invocation so the command text itself is never key-name interpreted.
    pub async fn send_command(session_name: &str, command: &str) -> Result<(), SidecarError> {
        Self::send_literal(session_name, command).await?;
        Self::send_key(session_name, "Enter").await
    }

    /// Capture the last `lines` lines of a pane: `-e` keeps escape
    /// sequences, `-J` joins wrapped lines.
    pub async fn capture_pane(session_name: &str, lines: u32) -> Result<String, SidecarError> {
        let start = format!("-{lines}");
        run_tmux_output(&[
            "capture-pane",
            "-p",
            "-e",
            "-J",
            "-S",
            &start,
            "-t",
            session_name,
        ])
        .await
    }

    pub async fn kill_session(session_name: &str) -> Result<(), SidecarError> {
        run_tmux(&["kill-session", "-t", session_name]).await
    }

    /// Names of all sessions on the server. "no server running" means no
    /// sessions, not an error.
    pub async fn list_sessions() -> Result<Vec<String>, SidecarError> {
        let output = Command::new("tmux")
            .args(["list-sessions", "-F", "#{session_name}"])
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server") {
                return Ok(vec![]);
            }
            return Err(SidecarError::from_tmux_stderr(&stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Resize a window to match the preview area so captured scrollback
    /// wraps at the displayed width. Falls back to `resize-pane` on servers
    /// where `resize-window` is unavailable.
    pub async fn resize(target: &str, width: u16, height: u16) -> Result<(), SidecarError> {
        let w = width.to_string();
        let h = height.to_string();
        if run_tmux(&["resize-window", "-t", target, "-x", &w, "-y", &h])
            .await
            .is_ok()
        {
            return Ok(());
        }
        run_tmux(&["resize-pane", "-t", target, "-x", &w, "-y", &h]).await
    }

    pub async fn display_message(target: &str, format: &str) -> Result<String, SidecarError> {
        run_tmux_output(&["display-message", "-p", "-t", target, format]).await
    }

    /// Cursor position, visibility and pane dimensions in one round-trip.
    pub async fn cursor_info(target: &str) -> Result<CursorInfo, SidecarError> {
        let raw = Self::display_message(
            target,
            "#{cursor_x},#{cursor_y},#{cursor_flag},#{pane_height},#{pane_width}",
        )
        .await?;
        parse_cursor_info(&raw)
            .ok_or_else(|| SidecarError::Tmux(format!("unparseable cursor info: {raw}")))
    }

    /// Current pane size as (width, height).
    pub async fn pane_size(target: &str) -> Result<(u16, u16), SidecarError> {
        let raw = Self::display_message(target, "#{pane_width},#{pane_height}").await?;
        let mut parts = raw.split(',');
        let w = parts.next().and_then(|s| s.trim().parse().ok());
        let h = parts.next().and_then(|s| s.trim().parse().ok());
        match (w, h) {
            (Some(w), Some(h)) => Ok((w, h)),
            _ => Err(SidecarError::Tmux(format!("unparseable pane size: {raw}"))),
        }
    }

    pub async fn pane_pid(target: &str) -> Result<u32, SidecarError> {
        let raw = Self::display_message(target, "#{pane_pid}").await?;
        raw.trim()
            .parse()
            .map_err(|_| SidecarError::Tmux(format!("unparseable pane pid: {raw}")))
    }

    /// Deliver multi-line text through a tmux buffer: `load-buffer -` from
    /// stdin, then `paste-buffer`. Repeated `send-keys -l` is slow for long
    /// payloads and prone to partial interpretation.
    pub async fn paste_text(session_name: &str, text: &str) -> Result<(), SidecarError> {
        let mut child = Command::new("tmux")
            .args(["load-buffer", "-"])
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SidecarError::from_tmux_stderr(&String::from_utf8_lossy(
                &output.stderr,
            )));
        }
        run_tmux(&["paste-buffer", "-t", session_name]).await
    }

    /// Hand the terminal over to a full-screen attach. Blocks until the user
    /// detaches; polling for the session must be suspended for the duration.
    pub fn attach_blocking(session_name: &str) -> Result<(), SidecarError> {
        let status = std::process::Command::new("tmux")
            .args(["attach-session", "-t", session_name])
            .status()?;
        if !status.success() {
            return Err(SidecarError::Tmux(format!(
                "attach-session exited with {status}"
            )));
        }
        Ok(())
    }
}

async fn run_tmux(args: &[&str]) -> Result<(), SidecarError> {
    let output = Command::new("tmux").args(args).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let err = SidecarError::from_tmux_stderr(&stderr);
        if !err.is_session_gone() {
            warn!(args = ?args, stderr = %stderr, "tmux command failed");
        }
        return Err(err);
    }
    Ok(())
}

async fn run_tmux_output(args: &[&str]) -> Result<String, SidecarError> {
    let output = Command::new("tmux").args(args).output().await?;
    if !output.status.success() {
        return Err(SidecarError::from_tmux_stderr(&String::from_utf8_lossy(
            &output.stderr,
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn parse_cursor_info(raw: &str) -> Option<CursorInfo> {
    let mut parts = raw.trim().split(',');
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let flag: u8 = parts.next()?.parse().ok()?;
    let pane_height = parts.next()?.parse().ok()?;
    let pane_width = parts.next()?.parse().ok()?;
    Some(CursorInfo {
        x,
        y,
        visible: flag != 0,
        pane_height,
        pane_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cursor_info() {
        let info = parse_cursor_info("12,3,1,50,200").unwrap();
        assert_eq!(info.x, 12);
        assert_eq!(info.y, 3);
        assert!(info.visible);
        assert_eq!(info.pane_height, 50);
        assert_eq!(info.pane_width, 200);
    }

    #[test]
    fn hidden_cursor_flag() {
        let info = parse_cursor_info("0,0,0,24,80").unwrap();
        assert!(!info.visible);
    }

    #[test]
    fn rejects_malformed_cursor_info() {
        assert!(parse_cursor_info("").is_none());
        assert!(parse_cursor_info("1,2,3").is_none());
        assert!(parse_cursor_info("a,b,c,d,e").is_none());
    }
}
