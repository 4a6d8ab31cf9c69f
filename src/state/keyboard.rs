//! Keyboard Bridge - terminal keys into source-tree key events.
//!
//! Raw key events arrive from the widget backend on up to two streams
//! ([`KeyStream::Keypress`] and [`KeyStream::Key`]) that may both fire for
//! one physical press. The bridge:
//!
//! - drops navigation keys on the keypress stream (the backend already
//!   scrolls/edits with them),
//! - de-duplicates the two streams with a short rolling window,
//! - translates the key into a DOM-style [`KeyInfo`],
//! - delivers it to the focused node: its imperative key handler if it has
//!   one, else `keydown` → (`beforeinput` → `input`) → `keyup`.
//!
//! # Example
//!
//! ```ignore
//! use spark_tui_bridge::state::keyboard::{translate, KeyStream, Modifiers, RawKeyEvent};
//!
//! let raw = RawKeyEvent::new(KeyStream::Key, "a").with_char('a');
//! let info = translate(&raw);
//! assert_eq!(info.code, "KeyA");
//! assert_eq!(info.key_code, 65);
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::config::BridgeConfig;
use crate::engine::{EventKind, SourceTree, SyntheticEvent};
use crate::types::NodeId;

// =============================================================================
// TYPES
// =============================================================================

bitflags::bitflags! {
    /// Keyboard modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const NONE  = 0;
        const SHIFT = 1 << 0;
        const ALT   = 1 << 1;
        const CTRL  = 1 << 2;
        const META  = 1 << 3;
    }
}

impl Modifiers {
    /// Modifiers that turn a character into a shortcut rather than text.
    pub fn blocks_text_input(self) -> bool {
        self.intersects(Modifiers::CTRL | Modifiers::ALT | Modifiers::META)
    }
}

/// Which raw backend stream a key arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStream {
    /// Character-oriented stream.
    Keypress,
    /// Key-oriented stream.
    Key,
}

/// Key as reported by the terminal backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub stream: KeyStream,
    /// Backend key name (`"a"`, `"enter"`, `"up"`, `"f5"`, ...).
    pub name: String,
    /// Raw escape sequence as read from the terminal.
    pub sequence: String,
    /// Character produced by the key, if any.
    pub ch: Option<char>,
    pub modifiers: Modifiers,
}

impl RawKeyEvent {
    pub fn new(stream: KeyStream, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            stream,
            sequence: name.clone(),
            name,
            ch: None,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn with_char(mut self, ch: char) -> Self {
        self.ch = Some(ch);
        self.sequence = ch.to_string();
        self
    }

    pub fn with_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = sequence.into();
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Single printable character with no shortcut modifier.
    pub fn text_input(&self) -> Option<char> {
        self.ch
            .filter(|c| !c.is_control())
            .filter(|_| !self.modifiers.blocks_text_input())
    }
}

/// DOM-style key description handed to listeners and key handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Logical key (`"Enter"`, `"ArrowUp"`, `"a"`).
    pub key: String,
    /// Physical key code (`"Enter"`, `"KeyA"`, `"Digit1"`).
    pub code: String,
    /// Legacy numeric key code.
    pub key_code: u32,
    pub modifiers: Modifiers,
}

// =============================================================================
// KEY TABLE
// =============================================================================

/// Static `name → (key, code, keyCode)` table for non-character keys.
pub fn lookup_key(name: &str) -> Option<(&'static str, &'static str, u32)> {
    let entry = match name {
        "return" | "enter" => ("Enter", "Enter", 13),
        "tab" => ("Tab", "Tab", 9),
        "escape" => ("Escape", "Escape", 27),
        "backspace" => ("Backspace", "Backspace", 8),
        "delete" => ("Delete", "Delete", 46),
        "up" => ("ArrowUp", "ArrowUp", 38),
        "down" => ("ArrowDown", "ArrowDown", 40),
        "left" => ("ArrowLeft", "ArrowLeft", 37),
        "right" => ("ArrowRight", "ArrowRight", 39),
        "home" => ("Home", "Home", 36),
        "end" => ("End", "End", 35),
        "pageup" => ("PageUp", "PageUp", 33),
        "pagedown" => ("PageDown", "PageDown", 34),
        "insert" => ("Insert", "Insert", 45),
        "space" => (" ", "Space", 32),
        "f1" => ("F1", "F1", 112),
        "f2" => ("F2", "F2", 113),
        "f3" => ("F3", "F3", 114),
        "f4" => ("F4", "F4", 115),
        "f5" => ("F5", "F5", 116),
        "f6" => ("F6", "F6", 117),
        "f7" => ("F7", "F7", 118),
        "f8" => ("F8", "F8", 119),
        "f9" => ("F9", "F9", 120),
        "f10" => ("F10", "F10", 121),
        "f11" => ("F11", "F11", 122),
        "f12" => ("F12", "F12", 123),
        _ => return None,
    };
    Some(entry)
}

/// Keys the backend consumes natively on the keypress stream.
pub fn is_navigation_key(name: &str) -> bool {
    matches!(
        name,
        "up" | "down" | "left" | "right" | "backspace" | "delete" | "home" | "end" | "enter" | "return"
    )
}

/// Classify a single character: letters → `Key<UPPER>`, digits →
/// `Digit<N>`, anything else `Unidentified`.
pub fn classify_char(ch: char) -> (String, u32) {
    if ch.is_ascii_alphabetic() {
        let upper = ch.to_ascii_uppercase();
        (format!("Key{upper}"), upper as u32)
    } else if ch.is_ascii_digit() {
        (format!("Digit{ch}"), ch as u32)
    } else if ch == ' ' {
        ("Space".to_string(), 32)
    } else {
        ("Unidentified".to_string(), 0)
    }
}

/// Translate a raw key into its DOM-style description.
pub fn translate(raw: &RawKeyEvent) -> KeyInfo {
    if let Some((key, code, key_code)) = lookup_key(&raw.name) {
        return KeyInfo {
            key: key.to_string(),
            code: code.to_string(),
            key_code,
            modifiers: raw.modifiers,
        };
    }

    match raw.ch.filter(|c| !c.is_control()) {
        Some(ch) => {
            let (code, key_code) = classify_char(ch);
            KeyInfo {
                key: ch.to_string(),
                code,
                key_code,
                modifiers: raw.modifiers,
            }
        }
        None => KeyInfo {
            key: raw.name.clone(),
            code: "Unidentified".to_string(),
            key_code: 0,
            modifiers: raw.modifiers,
        },
    }
}

/// Match a raw key against a binding such as `"C-c"`, `"M-x"`, `"S-tab"`
/// or `"escape"`.
pub fn matches_binding(raw: &RawKeyEvent, binding: &str) -> bool {
    let mut required = Modifiers::NONE;
    let mut rest = binding;
    loop {
        let modifier = match rest.get(..2) {
            Some("C-") => Modifiers::CTRL,
            Some("M-") => Modifiers::ALT,
            Some("S-") => Modifiers::SHIFT,
            _ => break,
        };
        if rest.len() == 2 {
            break;
        }
        required |= modifier;
        rest = &rest[2..];
    }

    let shortcut = Modifiers::CTRL | Modifiers::ALT | Modifiers::META;
    raw.name.eq_ignore_ascii_case(rest)
        && (raw.modifiers & shortcut) == (required & shortcut)
        && (!required.contains(Modifiers::SHIFT) || raw.modifiers.contains(Modifiers::SHIFT))
}

// =============================================================================
// DE-DUPLICATION
// =============================================================================

/// Rolling table that collapses the two raw streams into one press.
#[derive(Debug)]
pub struct KeyDeduper {
    window: Duration,
    capacity: usize,
    max_age: Duration,
    seen: HashMap<String, Instant>,
}

impl KeyDeduper {
    pub fn new(window: Duration, capacity: usize, max_age: Duration) -> Self {
        Self {
            window,
            capacity,
            max_age,
            seen: HashMap::new(),
        }
    }

    /// Record a press. Returns `false` if the same name+sequence was seen
    /// within the window.
    pub fn accept(&mut self, raw: &RawKeyEvent, now: Instant) -> bool {
        let key = format!("{}:{}", raw.name, raw.sequence);
        if let Some(&at) = self.seen.get(&key) {
            if now.saturating_duration_since(at) < self.window {
                return false;
            }
        }

        self.seen.insert(key, now);
        if self.seen.len() > self.capacity {
            let max_age = self.max_age;
            self.seen
                .retain(|_, at| now.saturating_duration_since(*at) <= max_age);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// What happened to one raw key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Navigation key on the keypress stream; left to the backend.
    Native,
    /// Second delivery of a press already dispatched.
    Duplicate,
    /// Nothing is focused; no event was dispatched.
    Unfocused(KeyInfo),
    /// The focused node's imperative key handler took the key.
    Handled(KeyInfo),
    /// Synthetic events were dispatched. `cancelled` is true when a
    /// `keydown` listener prevented the default.
    Dispatched { key: KeyInfo, cancelled: bool },
    /// An exit binding matched; the session is stopping.
    Exit,
}

/// Per-session keyboard listener.
#[derive(Debug)]
pub struct KeyboardBridge {
    dedupe: KeyDeduper,
}

impl KeyboardBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            dedupe: KeyDeduper::new(
                config.key_dedupe_window,
                config.key_dedupe_capacity,
                config.key_dedupe_max_age,
            ),
        }
    }

    /// Route one raw key to the focused source node.
    pub fn dispatch(
        &mut self,
        raw: &RawKeyEvent,
        now: Instant,
        source: &SourceTree,
        focused: Option<NodeId>,
    ) -> KeyOutcome {
        if raw.stream == KeyStream::Keypress && is_navigation_key(&raw.name) {
            return KeyOutcome::Native;
        }
        if !self.dedupe.accept(raw, now) {
            trace!(key = %raw.name, "duplicate key dropped");
            return KeyOutcome::Duplicate;
        }

        let info = translate(raw);
        let Some(node) = focused.filter(|&n| source.contains(n)) else {
            return KeyOutcome::Unfocused(info);
        };

        if let Some(handler) = source.key_handler(node) {
            trace!(key = %info.key, %node, "key handler");
            handler(&info);
            return KeyOutcome::Handled(info);
        }

        trace!(key = %info.key, %node, "keydown");
        let proceed = source
            .dispatch_event(&mut SyntheticEvent::new(EventKind::KeyDown, node).with_key(info.clone()));

        if proceed {
            if let Some(ch) = raw.text_input() {
                let text = ch.to_string();
                let mut before = SyntheticEvent::new(EventKind::BeforeInput, node)
                    .with_key(info.clone())
                    .with_data(text.clone());
                if source.dispatch_event(&mut before) {
                    source.dispatch_event(
                        &mut SyntheticEvent::new(EventKind::Input, node)
                            .with_key(info.clone())
                            .with_data(text),
                    );
                }
            }
        }

        source.dispatch_event(&mut SyntheticEvent::new(EventKind::KeyUp, node).with_key(info.clone()));

        KeyOutcome::Dispatched {
            key: info,
            cancelled: !proceed,
        }
    }

    pub fn reset(&mut self) {
        self.dedupe.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
