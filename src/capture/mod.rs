pub mod cache;

use crate::error::SidecarError;
use crate::infra::tmux::TmuxController;
use cache::PaneCache;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Scrollback lines captured per pane.
const CAPTURE_LINES: u32 = 600;
/// How long a batch result stays authoritative.
const CACHE_TTL: Duration = Duration::from_millis(300);
/// Wall-clock budget for one direct capture.
const SINGLE_TIMEOUT: Duration = Duration::from_secs(2);
/// Wall-clock budget for a whole batch.
const BATCH_TIMEOUT: Duration = Duration::from_secs(3);

const DELIMITER_PREFIX: &str = "===SIDECAR_SESSION:";
const DELIMITER_SUFFIX: &str = "===";

/// Multiplexes pane captures for all supervisor-owned sessions into one
/// subprocess. With N agents, per-session polling costs N subprocess spawns
/// per tick; one batched `bash -c` collapses that to O(1), at the price of
/// an extra shell layer.
pub struct CaptureEngine {
    cache: PaneCache,
    /// Singleflight gate: at most one batch subprocess at a time. Waiters
    /// queue on the lock and re-consult the cache once they hold it.
    batch_gate: tokio::sync::Mutex<()>,
    prefix: String,
}

impl CaptureEngine {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            cache: PaneCache::new(CACHE_TTL),
            batch_gate: tokio::sync::Mutex::new(()),
            prefix: prefix.into(),
        }
    }

    /// Last `CAPTURE_LINES` lines of the session's scrollback, ANSI styling
    /// preserved and wrapped lines joined. Served from the cache when fresh;
    /// otherwise one batch capture refreshes every supervised session at
    /// once. A session missing from the batch (or a failed batch) falls back
    /// to a direct single capture.
    pub async fn capture(&self, session: &str) -> Result<String, SidecarError> {
        if let Some(hit) = self.cache.get(session) {
            return Ok(hit);
        }

        let _permit = self.batch_gate.lock().await;
        // An earlier holder may have batched while we waited.
        if let Some(hit) = self.cache.get(session) {
            return Ok(hit);
        }

        match self.batch_capture().await {
            Ok(captures) => {
                let wanted = captures.get(session).cloned();
                self.cache.set_all(captures);
                if let Some(output) = wanted {
                    return Ok(output);
                }
                debug!(session, "session missing from batch, trying direct capture");
            }
            Err(e) => {
                warn!(error = %e, "batch capture failed, trying direct capture");
            }
        }

        self.single_capture(session).await
    }

    /// Forget a session's cached capture (used when it is stopped).
    pub fn invalidate(&self, session: &str) {
        self.cache.remove(session);
    }

    async fn batch_capture(&self) -> Result<HashMap<String, String>, SidecarError> {
        let script = batch_script(&self.prefix, CAPTURE_LINES);
        let result = timeout(
            BATCH_TIMEOUT,
            Command::new("bash").arg("-c").arg(&script).output(),
        )
        .await
        .map_err(|_| SidecarError::CaptureTimeout)?;
        let output = result?;
        if !output.status.success() {
            return Err(SidecarError::Tmux(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_batch_output(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn single_capture(&self, session: &str) -> Result<String, SidecarError> {
        let output = timeout(
            SINGLE_TIMEOUT,
            TmuxController::capture_pane(session, CAPTURE_LINES),
        )
        .await
        .map_err(|_| SidecarError::CaptureTimeout)??;
        self.cache
            .set_all(HashMap::from([(session.to_string(), output.clone())]));
        Ok(output)
    }
}

/// One shell pass over every supervised session: list names with the
/// supervisor prefix, emit a delimiter line, then the pane capture.
fn batch_script(prefix: &str, lines: u32) -> String {
    format!(
        "tmux list-sessions -F '#{{session_name}}' 2>/dev/null | while IFS= read -r s; do\n\
         case \"$s\" in {prefix}*)\n\
           printf '{DELIMITER_PREFIX}%s{DELIMITER_SUFFIX}\\n' \"$s\"\n\
           tmux capture-pane -p -e -J -S -{lines} -t \"$s\" 2>/dev/null\n\
         ;; esac\n\
         done\n\
         exit 0\n"
    )
}

/// Split batch output on the per-session delimiter lines.
fn parse_batch_output(stdout: &str) -> HashMap<String, String> {
    let mut captures = HashMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in stdout.lines() {
        let delim = line
            .strip_prefix(DELIMITER_PREFIX)
            .and_then(|rest| rest.strip_suffix(DELIMITER_SUFFIX));
        if let Some(session) = delim {
            if let Some((name, lines)) = current.take() {
                captures.insert(name, lines.join("\n"));
            }
            current = Some((session.to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((name, lines)) = current {
        captures.insert(name, lines.join("\n"));
    }
    captures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_session_batch() {
        let stdout = "===SIDECAR_SESSION:sidecar-wt-a===\n\
                      line a1\nline a2\n\
                      ===SIDECAR_SESSION:sidecar-wt-b===\n\
                      line b1\n";
        let captures = parse_batch_output(stdout);
        assert_eq!(captures.len(), 2);
        assert_eq!(captures["sidecar-wt-a"], "line a1\nline a2");
        assert_eq!(captures["sidecar-wt-b"], "line b1");
    }

    #[test]
    fn empty_capture_between_delimiters() {
        let stdout = "===SIDECAR_SESSION:sidecar-wt-a===\n\
                      ===SIDECAR_SESSION:sidecar-wt-b===\nx\n";
        let captures = parse_batch_output(stdout);
        assert_eq!(captures["sidecar-wt-a"], "");
        assert_eq!(captures["sidecar-wt-b"], "x");
    }

    #[test]
    fn output_before_first_delimiter_is_dropped() {
        let stdout = "stray noise\n===SIDECAR_SESSION:s===\nbody\n";
        let captures = parse_batch_output(stdout);
        assert_eq!(captures.len(), 1);
        assert_eq!(captures["s"], "body");
    }

    #[test]
    fn empty_stdout_is_empty_map() {
        assert!(parse_batch_output("").is_empty());
    }

    #[test]
    fn delimiter_like_body_lines_are_kept() {
        // A body line that merely contains (not equals) the prefix shape.
        let stdout = "===SIDECAR_SESSION:s===\nsee ===SIDECAR_SESSION marker docs\n";
        let captures = parse_batch_output(stdout);
        assert_eq!(captures["s"], "see ===SIDECAR_SESSION marker docs");
    }

    #[test]
    fn batch_script_embeds_prefix_and_depth() {
        let script = batch_script("sidecar-wt-", 600);
        assert!(script.contains("case \"$s\" in sidecar-wt-*)"));
        assert!(script.contains("-S -600"));
        assert!(script.contains("list-sessions -F '#{session_name}'"));
        // The while-loop pipe must not leak tmux's exit code on no-server.
        assert!(script.trim_end().ends_with("exit 0"));
    }
}
