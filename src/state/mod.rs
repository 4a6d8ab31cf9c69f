//! State Module - interaction state of a session.
//!
//! - **Focus** - single-focus set, paired focus/blur events, Tab cycling
//! - **Keyboard** - key table, stream de-duplication, synthetic key events
//! - **Input** - crossterm events into bridge events

pub mod focus;
pub mod input;
pub mod keyboard;

pub use focus::FocusBridge;
pub use input::{TerminalEvent, convert_event, convert_key_event, poll_event};
pub use keyboard::{
    KeyDeduper, KeyInfo, KeyOutcome, KeyStream, KeyboardBridge, Modifiers, RawKeyEvent,
    classify_char, is_navigation_key, lookup_key, matches_binding, translate,
};
