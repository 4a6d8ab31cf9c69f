//! Input Module - crossterm events into bridge events.
//!
//! The crossterm backend reads terminal input here and hands the session
//! [`TerminalEvent`]s. Keys become [`RawKeyEvent`]s on the key stream, with a
//! backend-style name (`"a"`, `"enter"`, `"up"`, `"f5"`) and a reconstructed
//! escape sequence used for de-duplication.
//!
//! # API
//!
//! - `convert_key_event` - Convert a crossterm KeyEvent
//! - `convert_event` - Convert any crossterm Event
//! - `poll_event` - Non-blocking event check with timeout

use std::time::Duration;

use crossterm::event::{
    Event as CrosstermEvent, KeyCode, KeyEvent as CrosstermKeyEvent, KeyEventKind, KeyModifiers,
    poll, read,
};

use super::keyboard::{KeyStream, Modifiers, RawKeyEvent};
use crate::types::WidgetHandle;

// =============================================================================
// TERMINAL EVENT
// =============================================================================

/// Event delivered to [`Session::handle_terminal_event`](crate::session::Session::handle_terminal_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// A key from one of the backend's raw streams.
    Key(RawKeyEvent),
    /// Terminal resized to (columns, rows).
    Resize(u16, u16),
    /// The backend moved focus onto a widget by itself.
    Focus(WidgetHandle),
    /// The backend took focus away from a widget.
    Blur(WidgetHandle),
}

// =============================================================================
// KEY EVENT CONVERSION
// =============================================================================

/// Convert a crossterm key event. Releases are dropped.
pub fn convert_key_event(event: CrosstermKeyEvent) -> Option<RawKeyEvent> {
    if event.kind == KeyEventKind::Release {
        return None;
    }

    let mut modifiers = convert_modifiers(event.modifiers);
    let (name, sequence, ch) = match event.code {
        KeyCode::Char(' ') => ("space".to_string(), " ".to_string(), Some(' ')),
        KeyCode::Char(c) => {
            let sequence = if modifiers.contains(Modifiers::CTRL) && c.is_ascii_alphabetic() {
                ((c.to_ascii_lowercase() as u8 & 0x1f) as char).to_string()
            } else {
                c.to_string()
            };
            (c.to_lowercase().to_string(), sequence, Some(c))
        }
        KeyCode::Enter => ("enter".to_string(), "\r".to_string(), Some('\r')),
        KeyCode::Tab => ("tab".to_string(), "\t".to_string(), Some('\t')),
        KeyCode::BackTab => {
            modifiers |= Modifiers::SHIFT;
            ("tab".to_string(), "\x1b[Z".to_string(), None)
        }
        KeyCode::Backspace => ("backspace".to_string(), "\x7f".to_string(), None),
        KeyCode::Delete => ("delete".to_string(), "\x1b[3~".to_string(), None),
        KeyCode::Esc => ("escape".to_string(), "\x1b".to_string(), None),
        KeyCode::Up => ("up".to_string(), "\x1b[A".to_string(), None),
        KeyCode::Down => ("down".to_string(), "\x1b[B".to_string(), None),
        KeyCode::Right => ("right".to_string(), "\x1b[C".to_string(), None),
        KeyCode::Left => ("left".to_string(), "\x1b[D".to_string(), None),
        KeyCode::Home => ("home".to_string(), "\x1b[H".to_string(), None),
        KeyCode::End => ("end".to_string(), "\x1b[F".to_string(), None),
        KeyCode::PageUp => ("pageup".to_string(), "\x1b[5~".to_string(), None),
        KeyCode::PageDown => ("pagedown".to_string(), "\x1b[6~".to_string(), None),
        KeyCode::Insert => ("insert".to_string(), "\x1b[2~".to_string(), None),
        KeyCode::F(n) => (format!("f{n}"), format!("F{n}"), None),
        _ => return None,
    };

    if ch.is_some_and(char::is_uppercase) {
        modifiers |= Modifiers::SHIFT;
    }

    Some(RawKeyEvent {
        stream: KeyStream::Key,
        name,
        sequence,
        ch,
        modifiers,
    })
}

/// Convert crossterm KeyModifiers to our Modifiers.
fn convert_modifiers(mods: KeyModifiers) -> Modifiers {
    let mut out = Modifiers::NONE;
    if mods.contains(KeyModifiers::CONTROL) {
        out |= Modifiers::CTRL;
    }
    if mods.contains(KeyModifiers::ALT) {
        out |= Modifiers::ALT;
    }
    if mods.contains(KeyModifiers::SHIFT) {
        out |= Modifiers::SHIFT;
    }
    if mods.intersects(KeyModifiers::SUPER | KeyModifiers::META) {
        out |= Modifiers::META;
    }
    out
}

/// Convert any crossterm event. Mouse and paste events have no bridge
/// counterpart.
pub fn convert_event(event: CrosstermEvent) -> Option<TerminalEvent> {
    match event {
        CrosstermEvent::Key(key) => convert_key_event(key).map(TerminalEvent::Key),
        CrosstermEvent::Resize(w, h) => Some(TerminalEvent::Resize(w, h)),
        _ => None,
    }
}

// =============================================================================
// EVENT POLLING
// =============================================================================

/// Poll for an event with timeout.
/// Returns None if no convertible event arrived within timeout.
pub fn poll_event(timeout: Duration) -> std::io::Result<Option<TerminalEvent>> {
    if poll(timeout)? {
        Ok(convert_event(read()?))
    } else {
        Ok(None)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> CrosstermKeyEvent {
        CrosstermKeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_convert_key_char() {
        let raw = convert_key_event(key(KeyCode::Char('a'), KeyModifiers::empty())).unwrap();
        assert_eq!(raw.name, "a");
        assert_eq!(raw.ch, Some('a'));
        assert_eq!(raw.stream, KeyStream::Key);
        assert!(raw.modifiers.is_empty());
    }

    #[test]
    fn test_convert_uppercase_sets_shift() {
        let raw = convert_key_event(key(KeyCode::Char('A'), KeyModifiers::empty())).unwrap();
        assert_eq!(raw.name, "a");
        assert_eq!(raw.ch, Some('A'));
        assert!(raw.modifiers.contains(Modifiers::SHIFT));
    }

    #[test]
    fn test_convert_ctrl_c() {
        let raw = convert_key_event(key(KeyCode::Char('c'), KeyModifiers::CONTROL)).unwrap();
        assert_eq!(raw.name, "c");
        assert_eq!(raw.sequence, "\u{3}");
        assert!(raw.modifiers.contains(Modifiers::CTRL));
    }

    #[test]
    fn test_convert_special_keys() {
        let cases = [
            (KeyCode::Enter, "enter"),
            (KeyCode::Up, "up"),
            (KeyCode::Down, "down"),
            (KeyCode::Left, "left"),
            (KeyCode::Right, "right"),
            (KeyCode::Esc, "escape"),
            (KeyCode::PageDown, "pagedown"),
            (KeyCode::F(5), "f5"),
            (KeyCode::Char(' '), "space"),
        ];
        for (code, expected) in cases {
            let raw = convert_key_event(key(code, KeyModifiers::empty())).unwrap();
            assert_eq!(raw.name, expected);
        }
    }

    #[test]
    fn test_back_tab_is_shift_tab() {
        let raw = convert_key_event(key(KeyCode::BackTab, KeyModifiers::empty())).unwrap();
        assert_eq!(raw.name, "tab");
        assert!(raw.modifiers.contains(Modifiers::SHIFT));
    }

    #[test]
    fn test_release_and_unknown_dropped() {
        let mut release = key(KeyCode::Char('a'), KeyModifiers::empty());
        release.kind = KeyEventKind::Release;
        assert_eq!(convert_key_event(release), None);
        assert_eq!(convert_key_event(key(KeyCode::CapsLock, KeyModifiers::empty())), None);
    }

    #[test]
    fn test_convert_resize() {
        assert_eq!(
            convert_event(CrosstermEvent::Resize(100, 40)),
            Some(TerminalEvent::Resize(100, 40))
        );
        assert_eq!(convert_event(CrosstermEvent::FocusGained), None);
    }
}
