pub mod keymap;
pub mod overlay;

use crate::config::ExitKey;
use crate::infra::tmux::CursorInfo;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use keymap::{translate, TmuxKey};
use regex::Regex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Window in which a second Escape means "exit" rather than two Escapes.
pub const DOUBLE_ESCAPE_WINDOW: Duration = Duration::from_millis(150);
/// Rune payloads longer than this are pastes, not typing.
const PASTE_RUNE_THRESHOLD: usize = 10;
/// Minimum interval between pane resizes.
const RESIZE_INTERVAL: Duration = Duration::from_millis(500);

const BRACKETED_PASTE_START: &str = "\x1b[200~";
const BRACKETED_PASTE_END: &str = "\x1b[201~";

/// A partial SGR mouse report delivered as runes: the terminal parser split
/// the read, ate the ESC, and handed us the rest.
fn partial_mouse_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[<\d+;\d+;\d+[Mm]$").expect("valid regex"))
}

/// What the event loop should do with one piece of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Deliver these to tmux, in order.
    Forward(Vec<Delivery>),
    /// First Escape of a potential double-escape: start the 150 ms timer.
    StartEscapeTimer,
    /// Leave interactive mode.
    Exit,
    /// Leave interactive mode and hand the terminal to a full attach.
    ExitToAttach,
    /// Swallowed (mouse noise, unmappable key, duplicate timer).
    Ignored,
}

/// One unit of delivery to the pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Key(String),
    Literal(String),
    /// Multi-line payload via `load-buffer` / `paste-buffer`.
    Buffer(String),
}

/// State of one interactive-relay session. Exists only while the user is
/// driving a pane through the supervisor.
#[derive(Debug)]
pub struct InteractiveState {
    pub worktree: String,
    pub session: String,
    pub last_key_at: Instant,
    /// An Escape was seen and not yet forwarded or resolved.
    escape_pending: bool,
    /// The 150 ms escape timer is already scheduled; mashing Escape must
    /// not schedule another.
    escape_timer_pending: bool,
    /// Cursor snapshot cached by the poll handler; the render path only
    /// reads this, it never spawns subprocesses.
    pub cursor: Option<CursorInfo>,
    pub bracketed_paste_enabled: bool,
    pub mouse_reporting_enabled: bool,
    last_resize_at: Option<Instant>,
    /// Pane size as last reported by tmux.
    pub pane_size: Option<(u16, u16)>,
}

impl InteractiveState {
    pub fn new(worktree: String, session: String) -> Self {
        Self {
            worktree,
            session,
            last_key_at: Instant::now(),
            escape_pending: false,
            escape_timer_pending: false,
            cursor: None,
            bracketed_paste_enabled: false,
            mouse_reporting_enabled: false,
            last_resize_at: None,
            pane_size: None,
        }
    }

    pub fn since_last_key(&self) -> Duration {
        self.last_key_at.elapsed()
    }

    /// Handle one key event.
    ///
    /// Escape is special: the first press is queued, not forwarded, while
    /// the double-escape window runs. A second Escape inside the window
    /// exits; any other key flushes the queued Escape ahead of itself.
    pub fn handle_key(
        &mut self,
        key: &KeyEvent,
        exit_key: ExitKey,
        attach_key: ExitKey,
    ) -> KeyOutcome {
        self.last_key_at = Instant::now();

        if is_ctrl_chord(key, exit_key.0) {
            return KeyOutcome::Exit;
        }
        if is_ctrl_chord(key, attach_key.0) {
            return KeyOutcome::ExitToAttach;
        }

        if key.code == KeyCode::Esc && key.modifiers.is_empty() {
            if self.escape_pending {
                self.escape_pending = false;
                return KeyOutcome::Exit;
            }
            self.escape_pending = true;
            if self.escape_timer_pending {
                return KeyOutcome::Ignored;
            }
            self.escape_timer_pending = true;
            return KeyOutcome::StartEscapeTimer;
        }

        let mut deliveries = self.flush_pending_escape();
        match translate(key) {
            Some(TmuxKey::Named(name)) => deliveries.push(Delivery::Key(name)),
            Some(TmuxKey::Literal(text)) => deliveries.push(Delivery::Literal(text)),
            None => {
                if deliveries.is_empty() {
                    return KeyOutcome::Ignored;
                }
            }
        }
        KeyOutcome::Forward(deliveries)
    }

    /// The 150 ms timer fired. If the Escape is still pending the user
    /// really meant a single Escape; forward it now.
    pub fn handle_escape_timeout(&mut self) -> KeyOutcome {
        self.escape_timer_pending = false;
        if self.escape_pending {
            self.escape_pending = false;
            return KeyOutcome::Forward(vec![Delivery::Key("Escape".into())]);
        }
        KeyOutcome::Ignored
    }

    /// Handle multi-character rune input (typed burst or paste).
    pub fn handle_runes(&mut self, runes: &str) -> KeyOutcome {
        self.last_key_at = Instant::now();

        if is_partial_mouse_sequence(runes) {
            return KeyOutcome::Ignored;
        }

        let mut deliveries = self.flush_pending_escape();
        if is_paste(runes) {
            deliveries.push(self.paste_delivery(runes));
        } else {
            deliveries.push(Delivery::Literal(runes.to_string()));
        }
        KeyOutcome::Forward(deliveries)
    }

    /// Route a paste payload. With bracketed paste active downstream the
    /// payload is wrapped so the application sees one paste; otherwise it
    /// goes through a tmux buffer, which survives newlines that
    /// `send-keys -l` would mangle.
    pub fn paste_delivery(&self, text: &str) -> Delivery {
        if self.bracketed_paste_enabled {
            Delivery::Literal(format!(
                "{BRACKETED_PASTE_START}{text}{BRACKETED_PASTE_END}"
            ))
        } else {
            Delivery::Buffer(text.to_string())
        }
    }

    fn flush_pending_escape(&mut self) -> Vec<Delivery> {
        if self.escape_pending {
            self.escape_pending = false;
            vec![Delivery::Key("Escape".into())]
        } else {
            vec![]
        }
    }

    /// Update terminal-mode flags from a fresh capture: a mode is on when
    /// its last enable sequence appears after its last disable sequence.
    pub fn update_modes_from_capture(&mut self, capture: &str) {
        self.bracketed_paste_enabled = mode_enabled(capture, &["2004"]);
        self.mouse_reporting_enabled =
            mode_enabled(capture, &["1000", "1002", "1003", "1006"]);
    }

    /// Whether a resize to (width, height) should be issued now. Skipped
    /// when the pane already matches, and rate-limited to one per 500 ms.
    pub fn should_resize(&mut self, width: u16, height: u16) -> bool {
        if self.pane_size == Some((width, height)) {
            return false;
        }
        if let Some(last) = self.last_resize_at {
            if last.elapsed() < RESIZE_INTERVAL {
                return false;
            }
        }
        self.last_resize_at = Some(Instant::now());
        true
    }
}

fn is_ctrl_chord(key: &KeyEvent, chord_char: char) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(chord_char)
}

/// Rune input counts as a paste when it is longer than ten characters or
/// carries a newline.
pub fn is_paste(runes: &str) -> bool {
    runes.chars().count() > PASTE_RUNE_THRESHOLD || runes.contains('\n')
}

/// A lone `[<b;x;yM` rune burst is mouse-report residue, never user text.
pub fn is_partial_mouse_sequence(runes: &str) -> bool {
    runes.len() > 5 && partial_mouse_re().is_match(runes)
}

fn mode_enabled(capture: &str, params: &[&str]) -> bool {
    params.iter().any(|p| {
        let enable = format!("\x1b[?{p}h");
        let disable = format!("\x1b[?{p}l");
        match (capture.rfind(&enable), capture.rfind(&disable)) {
            (Some(on), Some(off)) => on > off,
            (Some(_), None) => true,
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> InteractiveState {
        InteractiveState::new("feat-x".into(), "sidecar-wt-feat-x".into())
    }

    fn esc() -> KeyEvent {
        KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)
    }

    const EXIT: ExitKey = ExitKey('\\');
    const ATTACH: ExitKey = ExitKey(']');

    #[test]
    fn primary_exit_key_exits_immediately() {
        let mut s = state();
        let key = KeyEvent::new(KeyCode::Char('\\'), KeyModifiers::CONTROL);
        assert_eq!(s.handle_key(&key, EXIT, ATTACH), KeyOutcome::Exit);
    }

    #[test]
    fn attach_key_exits_to_attach() {
        let mut s = state();
        let key = KeyEvent::new(KeyCode::Char(']'), KeyModifiers::CONTROL);
        assert_eq!(s.handle_key(&key, EXIT, ATTACH), KeyOutcome::ExitToAttach);
    }

    #[test]
    fn double_escape_exits_without_forwarding() {
        let mut s = state();
        assert_eq!(s.handle_key(&esc(), EXIT, ATTACH), KeyOutcome::StartEscapeTimer);
        assert_eq!(s.handle_key(&esc(), EXIT, ATTACH), KeyOutcome::Exit);
    }

    #[test]
    fn lone_escape_forwards_after_timeout() {
        let mut s = state();
        assert_eq!(s.handle_key(&esc(), EXIT, ATTACH), KeyOutcome::StartEscapeTimer);
        assert_eq!(
            s.handle_escape_timeout(),
            KeyOutcome::Forward(vec![Delivery::Key("Escape".into())])
        );
        // Resolved: a later timer tick is inert.
        assert_eq!(s.handle_escape_timeout(), KeyOutcome::Ignored);
    }

    #[test]
    fn other_key_flushes_queued_escape_first() {
        let mut s = state();
        s.handle_key(&esc(), EXIT, ATTACH);
        let outcome = s.handle_key(
            &KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE),
            EXIT,
            ATTACH,
        );
        assert_eq!(
            outcome,
            KeyOutcome::Forward(vec![
                Delivery::Key("Escape".into()),
                Delivery::Literal("a".into())
            ])
        );
        // The stale timer must not re-forward the Escape.
        assert_eq!(s.handle_escape_timeout(), KeyOutcome::Ignored);
    }

    #[test]
    fn escape_mash_schedules_one_timer() {
        let mut s = state();
        assert_eq!(s.handle_key(&esc(), EXIT, ATTACH), KeyOutcome::StartEscapeTimer);
        // Second press inside the window exits; a third press starts over
        // but the timer from the first press is still pending.
        assert_eq!(s.handle_key(&esc(), EXIT, ATTACH), KeyOutcome::Exit);
        assert_eq!(s.handle_key(&esc(), EXIT, ATTACH), KeyOutcome::Ignored);
    }

    #[test]
    fn eleven_runes_is_a_paste_ten_is_not() {
        assert!(is_paste("12345678901"));
        assert!(!is_paste("1234567890"));
        assert!(is_paste("a\nb"));
    }

    #[test]
    fn partial_mouse_runes_are_dropped() {
        let mut s = state();
        assert_eq!(s.handle_runes("[<65;83;33M"), KeyOutcome::Ignored);
        assert_eq!(s.handle_runes("[<0;10;5m"), KeyOutcome::Ignored);
    }

    #[test]
    fn ordinary_brackets_are_forwarded() {
        let mut s = state();
        assert_eq!(
            s.handle_runes("array[0]"),
            KeyOutcome::Forward(vec![Delivery::Literal("array[0]".into())])
        );
        assert_eq!(
            s.handle_runes("[["),
            KeyOutcome::Forward(vec![Delivery::Literal("[[".into())])
        );
    }

    #[test]
    fn bracketed_paste_wraps_payload() {
        let mut s = state();
        s.update_modes_from_capture("\x1b[?2004h");
        assert_eq!(
            s.handle_runes("a\nb"),
            KeyOutcome::Forward(vec![Delivery::Literal(
                "\x1b[200~a\nb\x1b[201~".into()
            )])
        );
    }

    #[test]
    fn unbracketed_paste_uses_buffer() {
        let mut s = state();
        assert_eq!(
            s.handle_runes("a\nb"),
            KeyOutcome::Forward(vec![Delivery::Buffer("a\nb".into())])
        );
    }

    #[test]
    fn mode_tracking_respects_ordering() {
        let mut s = state();
        s.update_modes_from_capture("\x1b[?2004h ... \x1b[?2004l");
        assert!(!s.bracketed_paste_enabled);
        s.update_modes_from_capture("\x1b[?2004l ... \x1b[?2004h");
        assert!(s.bracketed_paste_enabled);
        s.update_modes_from_capture("\x1b[?1002h");
        assert!(s.mouse_reporting_enabled);
    }

    #[test]
    fn resize_skips_matching_size_and_rate_limits() {
        let mut s = state();
        s.pane_size = Some((80, 24));
        assert!(!s.should_resize(80, 24));
        assert!(s.should_resize(120, 40));
        // Within the rate-limit window: suppressed.
        assert!(!s.should_resize(130, 42));
    }
}
