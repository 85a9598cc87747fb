use regex::Regex;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Maximum number of scrollback lines retained per agent.
const MAX_LINES: usize = 500;

/// Partial SGR mouse reports that leaked past the terminal input parser.
/// Both the ESC-prefixed form and the bare `[<b;x;yM` form occur, because a
/// split read can strip the ESC before the rest of the sequence arrives.
fn mouse_seq_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b?\[<\d+;\d+;\d+[Mm]").expect("valid regex"))
}

/// Bounded line ring over an agent's captured scrollback, with hash-based
/// change detection so unchanged captures never advance the status machine.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    last_hash: Option<u64>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the buffer contents with a fresh capture. Returns whether the
    /// capture differs from the previous one; callers must treat `false` as
    /// a no-op.
    pub fn update(&mut self, raw: &str) -> bool {
        let hash = fast_hash(raw);
        if self.last_hash == Some(hash) {
            return false;
        }
        self.last_hash = Some(hash);

        let scrubbed = scrub_mouse_sequences(raw);
        self.lines.clear();
        for line in scrubbed.lines() {
            self.lines.push_back(line.to_string());
        }
        while self.lines.len() > MAX_LINES {
            self.lines.pop_front();
        }
        true
    }

    pub fn lines(&self) -> &VecDeque<String> {
        &self.lines
    }

    /// Buffer contents re-joined for the classifier and renderers.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(line);
        }
        out
    }
}

fn fast_hash(s: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Strip partial SGR mouse sequences. Normal bracket usage (`array[0]`,
/// `[[ -f f ]]`) is untouched.
pub fn scrub_mouse_sequences(raw: &str) -> String {
    if !raw.contains("[<") {
        return raw.to_string();
    }
    mouse_seq_re().replace_all(raw, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_reports_changed_then_unchanged() {
        let mut buf = OutputBuffer::new();
        assert!(buf.update("hello\nworld"));
        assert!(!buf.update("hello\nworld"));
        assert!(buf.update("hello\nworld!"));
    }

    #[test]
    fn caps_at_max_lines_dropping_oldest() {
        let mut buf = OutputBuffer::new();
        let raw: String = (0..MAX_LINES + 50)
            .map(|i| format!("line{i}\n"))
            .collect();
        buf.update(&raw);
        assert_eq!(buf.lines().len(), MAX_LINES);
        assert_eq!(buf.lines().front().unwrap(), "line50");
        assert_eq!(buf.lines().back().unwrap(), &format!("line{}", MAX_LINES + 49));
    }

    #[test]
    fn strips_partial_mouse_sequences() {
        let mut buf = OutputBuffer::new();
        buf.update("prompt$ [<65;83;33M[<65;83;33Mls\nfile1.txt\n");
        assert_eq!(buf.text(), "prompt$ ls\nfile1.txt");
    }

    #[test]
    fn strips_esc_prefixed_mouse_sequences() {
        assert_eq!(scrub_mouse_sequences("a\x1b[<0;10;20mb"), "ab");
        assert_eq!(scrub_mouse_sequences("a[<0;10;20Mb"), "ab");
    }

    #[test]
    fn preserves_ordinary_brackets() {
        let src = "array[0] = 1; [[ -f f ]] && echo ok";
        assert_eq!(scrub_mouse_sequences(src), src);
    }

    #[test]
    fn empty_update_changes_once() {
        let mut buf = OutputBuffer::new();
        assert!(buf.update(""));
        assert!(!buf.update(""));
        assert!(buf.lines().is_empty());
    }
}
