use crate::domain::worktree::WorktreeStatus;

/// Only the last 2 KiB of a capture participate in classification; agent
/// banners and old output above that are irrelevant and often misleading.
const TAIL_BYTES: usize = 2048;

/// How many lines from the end are searched for the prompt the agent is
/// blocked on.
const PROMPT_SCAN_LINES: usize = 10;

const WAITING_MARKERS: [&str; 12] = [
    "[y/n]",
    "(y/n)",
    "allow edit",
    "allow bash",
    "waiting for",
    "press enter",
    "continue?",
    "approve",
    "confirm",
    "do you want",
    "\u{276f}",        // ❯
    "\u{2570}\u{2500}\u{276f}", // ╰─❯
];

const DONE_MARKERS: [&str; 5] = [
    "task completed",
    "all done",
    "finished",
    "exited with code 0",
    "goodbye",
];

const ERROR_MARKERS: [&str; 6] = [
    "error:",
    "failed",
    "exited with code 1",
    "panic:",
    "exception:",
    "traceback",
];

const THINKING_MARKERS: [&str; 5] = [
    "<thinking>",
    "</thinking>",
    "<internal_monologue>",
    "thinking...",
    "reasoning about",
];

/// Distill captured scrollback into a lifecycle status.
///
/// Matching is case-insensitive over the tail and first-match-wins in
/// priority order. Waiting outranks Error on purpose: an agent printing a
/// stack trace and then "Retry? [y/n]" is waiting, not dead. Thinking is
/// checked last among the positive signals so a finished or failed run is
/// not masked by a lingering thinking tag.
pub fn classify(output: &str) -> WorktreeStatus {
    let tail = utf8_tail(output, TAIL_BYTES).to_lowercase();

    if contains_any(&tail, &WAITING_MARKERS) {
        WorktreeStatus::Waiting
    } else if contains_any(&tail, &DONE_MARKERS) {
        WorktreeStatus::Done
    } else if contains_any(&tail, &ERROR_MARKERS) {
        WorktreeStatus::Error
    } else if contains_any(&tail, &THINKING_MARKERS) {
        WorktreeStatus::Thinking
    } else {
        WorktreeStatus::Active
    }
}

/// When the classifier says Waiting, pull out the prompt line itself so the
/// board can show what the agent is asking. Scans the last few lines from
/// the end backward and returns the first one containing a prompt marker.
pub fn extract_prompt(output: &str) -> Option<String> {
    let tail = utf8_tail(output, TAIL_BYTES);
    for line in tail.lines().rev().take(PROMPT_SCAN_LINES) {
        let lower = line.to_lowercase();
        if contains_any(&lower, &WAITING_MARKERS) {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Last `max` bytes of `s`, nudged forward to the next char boundary so a
/// multi-byte character is never split (at most 3 bytes are skipped).
fn utf8_tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_is_active() {
        assert_eq!(classify(""), WorktreeStatus::Active);
    }

    #[test]
    fn plain_output_is_active() {
        assert_eq!(classify("compiling crate foo v0.1.0"), WorktreeStatus::Active);
    }

    #[test]
    fn waiting_beats_error() {
        assert_eq!(
            classify("Error occurred\nRetry? [y/n]"),
            WorktreeStatus::Waiting
        );
    }

    #[test]
    fn done_beats_active_noise() {
        assert_eq!(
            classify("Processing files...\nAll done"),
            WorktreeStatus::Done
        );
    }

    #[test]
    fn error_markers_detected() {
        assert_eq!(classify("thread panicked\npanic: oh no"), WorktreeStatus::Error);
        assert_eq!(classify("build failed"), WorktreeStatus::Error);
        assert_eq!(classify("Traceback (most recent call last):"), WorktreeStatus::Error);
    }

    #[test]
    fn done_beats_thinking_residue() {
        assert_eq!(
            classify("</thinking>\ntask completed"),
            WorktreeStatus::Done
        );
    }

    #[test]
    fn thinking_detected() {
        assert_eq!(classify("<thinking>hmm"), WorktreeStatus::Thinking);
        assert_eq!(classify("reasoning about the change"), WorktreeStatus::Thinking);
    }

    #[test]
    fn prompt_glyph_is_waiting() {
        assert_eq!(classify("\u{2570}\u{2500}\u{276f} "), WorktreeStatus::Waiting);
    }

    #[test]
    fn classification_ignores_text_beyond_tail() {
        // An error marker pushed out of the 2 KiB tail must not count.
        let mut s = String::from("error: long ago\n");
        s.push_str(&"x".repeat(4096));
        assert_eq!(classify(&s), WorktreeStatus::Active);
    }

    #[test]
    fn tail_respects_utf8_boundaries() {
        // 600 four-byte chars + "ok" = 2402 bytes; the naive cut at
        // len - 2048 = 354 lands mid-char and must advance to 356.
        let mut s = "\u{1f600}".repeat(600);
        s.push_str("ok");
        assert!(!s.is_char_boundary(s.len() - TAIL_BYTES));

        let tail = utf8_tail(&s, TAIL_BYTES);
        assert!(tail.len() < TAIL_BYTES);
        assert!(tail.ends_with("ok"));
        assert!(tail.starts_with('\u{1f600}'));
    }

    #[test]
    fn extracts_prompt_line() {
        assert_eq!(
            extract_prompt("Changes:\n- foo\nApprove these changes?"),
            Some("Approve these changes?".to_string())
        );
    }

    #[test]
    fn prompt_scan_is_bounded() {
        let mut s = String::from("Approve? [y/n]\n");
        s.push_str(&"filler\n".repeat(PROMPT_SCAN_LINES + 2));
        assert_eq!(extract_prompt(&s), None);
    }

    #[test]
    fn no_prompt_in_plain_output() {
        assert_eq!(extract_prompt("just some logs\nmore logs"), None);
    }
}
