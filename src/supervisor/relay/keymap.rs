use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// How a key event travels to tmux.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TmuxKey {
    /// `send-keys <name>` — tmux interprets the key-name table.
    Named(String),
    /// `send-keys -l <text>` — raw bytes, no interpretation.
    Literal(String),
}

/// Translate a key event into its tmux `send-keys` argument.
///
/// Named keys go in name form. Ctrl chords use `C-<letter>`, except C-i and
/// C-m, which are byte-identical to Tab and Enter and sent as those names.
/// Modifier combinations tmux has no name for (shift+arrows and friends) go
/// as their raw xterm escape sequences. Plain characters go literally.
pub fn translate(key: &KeyEvent) -> Option<TmuxKey> {
    let mods = key.modifiers;

    if let Some(raw) = modified_special(key.code, mods) {
        return Some(TmuxKey::Literal(raw));
    }

    match key.code {
        KeyCode::Char(c) if mods.contains(KeyModifiers::CONTROL) => {
            let c = c.to_ascii_lowercase();
            match c {
                'i' => Some(TmuxKey::Named("Tab".into())),
                'm' => Some(TmuxKey::Named("Enter".into())),
                'a'..='z' => Some(TmuxKey::Named(format!("C-{c}"))),
                _ => None,
            }
        }
        KeyCode::Char(' ') => Some(TmuxKey::Named("Space".into())),
        KeyCode::Char(c) => Some(TmuxKey::Literal(c.to_string())),
        KeyCode::Enter => Some(TmuxKey::Named("Enter".into())),
        KeyCode::Backspace => Some(TmuxKey::Named("BSpace".into())),
        KeyCode::Tab => Some(TmuxKey::Named("Tab".into())),
        KeyCode::BackTab => Some(TmuxKey::Named("BTab".into())),
        KeyCode::Esc => Some(TmuxKey::Named("Escape".into())),
        KeyCode::Up => Some(TmuxKey::Named("Up".into())),
        KeyCode::Down => Some(TmuxKey::Named("Down".into())),
        KeyCode::Left => Some(TmuxKey::Named("Left".into())),
        KeyCode::Right => Some(TmuxKey::Named("Right".into())),
        KeyCode::Home => Some(TmuxKey::Named("Home".into())),
        KeyCode::End => Some(TmuxKey::Named("End".into())),
        KeyCode::PageUp => Some(TmuxKey::Named("PPage".into())),
        KeyCode::PageDown => Some(TmuxKey::Named("NPage".into())),
        KeyCode::Insert => Some(TmuxKey::Named("IC".into())),
        KeyCode::Delete => Some(TmuxKey::Named("DC".into())),
        KeyCode::F(n @ 1..=12) => Some(TmuxKey::Named(format!("F{n}"))),
        _ => None,
    }
}

/// Raw xterm escape sequence for modifier+special combinations that have no
/// tmux key name. xterm encodes modifiers as 1 + shift(1) + alt(2) +
/// ctrl(4) in `ESC[1;<m><final>`.
fn modified_special(code: KeyCode, mods: KeyModifiers) -> Option<String> {
    let final_byte = match code {
        KeyCode::Up => 'A',
        KeyCode::Down => 'B',
        KeyCode::Right => 'C',
        KeyCode::Left => 'D',
        KeyCode::Home => 'H',
        KeyCode::End => 'F',
        _ => return None,
    };

    let mut m = 1;
    if mods.contains(KeyModifiers::SHIFT) {
        m += 1;
    }
    if mods.contains(KeyModifiers::ALT) {
        m += 2;
    }
    if mods.contains(KeyModifiers::CONTROL) {
        m += 4;
    }
    if m == 1 {
        return None; // unmodified: the named form handles it
    }
    Some(format!("\x1b[1;{m}{final_byte}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn named_keys() {
        assert_eq!(
            translate(&key(KeyCode::Enter, KeyModifiers::NONE)),
            Some(TmuxKey::Named("Enter".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::PageUp, KeyModifiers::NONE)),
            Some(TmuxKey::Named("PPage".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::PageDown, KeyModifiers::NONE)),
            Some(TmuxKey::Named("NPage".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::Insert, KeyModifiers::NONE)),
            Some(TmuxKey::Named("IC".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::Delete, KeyModifiers::NONE)),
            Some(TmuxKey::Named("DC".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::F(5), KeyModifiers::NONE)),
            Some(TmuxKey::Named("F5".into()))
        );
    }

    #[test]
    fn ctrl_chords() {
        assert_eq!(
            translate(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(TmuxKey::Named("C-c".into()))
        );
        // C-i and C-m alias to Tab/Enter.
        assert_eq!(
            translate(&key(KeyCode::Char('i'), KeyModifiers::CONTROL)),
            Some(TmuxKey::Named("Tab".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::Char('m'), KeyModifiers::CONTROL)),
            Some(TmuxKey::Named("Enter".into()))
        );
    }

    #[test]
    fn plain_chars_go_literal() {
        assert_eq!(
            translate(&key(KeyCode::Char('x'), KeyModifiers::NONE)),
            Some(TmuxKey::Literal("x".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::Char('X'), KeyModifiers::SHIFT)),
            Some(TmuxKey::Literal("X".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::Char(' '), KeyModifiers::NONE)),
            Some(TmuxKey::Named("Space".into()))
        );
    }

    #[test]
    fn shift_up_is_raw_csi() {
        assert_eq!(
            translate(&key(KeyCode::Up, KeyModifiers::SHIFT)),
            Some(TmuxKey::Literal("\x1b[1;2A".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::Left, KeyModifiers::CONTROL)),
            Some(TmuxKey::Literal("\x1b[1;5D".into()))
        );
        assert_eq!(
            translate(&key(KeyCode::End, KeyModifiers::SHIFT | KeyModifiers::ALT)),
            Some(TmuxKey::Literal("\x1b[1;4F".into()))
        );
    }

    #[test]
    fn unmodified_arrows_stay_named() {
        assert_eq!(
            translate(&key(KeyCode::Up, KeyModifiers::NONE)),
            Some(TmuxKey::Named("Up".into()))
        );
    }
}
