use crate::infra::tmux::CursorInfo;
use console::measure_text_width;
use regex::Regex;
use std::sync::OnceLock;

const REVERSE_ON: &str = "\x1b[7m";
const REVERSE_OFF: &str = "\x1b[27m";
/// Rendered in the cursor cell when it sits on whitespace or past the end
/// of the line, where reverse video alone would be invisible.
const BLOCK: char = '\u{2588}';

/// CSI and two-byte escape sequences: they occupy bytes but no columns.
fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|[@-Z\\-_])").expect("valid regex"))
}

/// Re-render one scrollback line with the cursor cell in reverse video.
///
/// The line may carry escape sequences, so slicing is done by visual column,
/// not byte or char index: ANSI chunks pass through untouched and only text
/// chunks advance the column counter.
pub fn overlay_cursor_line(line: &str, cursor_col: usize) -> String {
    let mut out = String::with_capacity(line.len() + 16);
    let mut col = 0usize;
    let mut drawn = false;

    for (chunk, is_ansi) in ansi_chunks(line) {
        if is_ansi {
            out.push_str(chunk);
            continue;
        }
        for ch in chunk.chars() {
            let width = measure_text_width(ch.encode_utf8(&mut [0u8; 4]));
            if !drawn && width > 0 && (col..col + width).contains(&cursor_col) {
                let cell = if ch.is_whitespace() { BLOCK } else { ch };
                out.push_str(REVERSE_ON);
                out.push(cell);
                out.push_str(REVERSE_OFF);
                drawn = true;
            } else {
                out.push(ch);
            }
            col += width;
        }
    }

    if !drawn {
        // Cursor sits past the end of the line: pad and draw a block.
        for _ in col..cursor_col {
            out.push(' ');
        }
        out.push_str(REVERSE_ON);
        out.push(BLOCK);
        out.push_str(REVERSE_OFF);
    }

    out
}

/// Split a line into alternating text and escape-sequence chunks.
fn ansi_chunks(line: &str) -> Vec<(&str, bool)> {
    let mut chunks = Vec::new();
    let mut last = 0;
    for m in ansi_re().find_iter(line) {
        if m.start() > last {
            chunks.push((&line[last..m.start()], false));
        }
        chunks.push((m.as_str(), true));
        last = m.end();
    }
    if last < line.len() {
        chunks.push((&line[last..], false));
    }
    chunks
}

/// Apply the cursor overlay to captured scrollback. The last `pane_height`
/// lines are the visible pane; `cursor.y` indexes into those. A hidden
/// cursor leaves the capture untouched.
pub fn apply(lines: &mut [String], cursor: &CursorInfo) {
    if !cursor.visible {
        return;
    }
    let pane_height = cursor.pane_height as usize;
    let visible_start = lines.len().saturating_sub(pane_height);
    let row = visible_start + cursor.y as usize;
    if let Some(line) = lines.get_mut(row) {
        *line = overlay_cursor_line(line, cursor.x as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlays_plain_text_cell() {
        assert_eq!(
            overlay_cursor_line("hello", 1),
            format!("h{REVERSE_ON}e{REVERSE_OFF}llo")
        );
    }

    #[test]
    fn whitespace_cell_renders_a_block() {
        assert_eq!(
            overlay_cursor_line("a b", 1),
            format!("a{REVERSE_ON}{BLOCK}{REVERSE_OFF}b")
        );
    }

    #[test]
    fn cursor_past_end_pads_with_block() {
        assert_eq!(
            overlay_cursor_line("ab", 4),
            format!("ab  {REVERSE_ON}{BLOCK}{REVERSE_OFF}")
        );
    }

    #[test]
    fn ansi_codes_do_not_consume_columns() {
        let line = "\x1b[31mred\x1b[0m";
        let out = overlay_cursor_line(line, 0);
        assert_eq!(out, format!("\x1b[31m{REVERSE_ON}r{REVERSE_OFF}ed\x1b[0m"));
    }

    #[test]
    fn chunking_separates_text_and_escapes() {
        let chunks = ansi_chunks("a\x1b[1mb\x1b[0m");
        assert_eq!(
            chunks,
            vec![
                ("a", false),
                ("\x1b[1m", true),
                ("b", false),
                ("\x1b[0m", true),
            ]
        );
    }

    #[test]
    fn wide_char_counts_two_columns() {
        // '你' is two columns wide; the cursor on its second column still
        // targets that char.
        let out = overlay_cursor_line("你a", 1);
        assert_eq!(out, format!("{REVERSE_ON}你{REVERSE_OFF}a"));
        let out = overlay_cursor_line("你a", 2);
        assert_eq!(out, format!("你{REVERSE_ON}a{REVERSE_OFF}"));
    }

    #[test]
    fn apply_targets_visible_pane_row() {
        let mut lines: Vec<String> = (0..10).map(|i| format!("line{i}")).collect();
        let cursor = CursorInfo {
            x: 0,
            y: 1,
            visible: true,
            pane_height: 4,
            pane_width: 80,
        };
        apply(&mut lines, &cursor);
        // Visible pane is lines 6..10; row y=1 is lines[7].
        assert!(lines[7].contains(REVERSE_ON));
        assert!(!lines[6].contains(REVERSE_ON));
    }

    #[test]
    fn apply_skips_hidden_cursor() {
        let mut lines = vec!["abc".to_string()];
        let cursor = CursorInfo {
            x: 0,
            y: 0,
            visible: false,
            pane_height: 1,
            pane_width: 80,
        };
        apply(&mut lines, &cursor);
        assert_eq!(lines[0], "abc");
    }
}
