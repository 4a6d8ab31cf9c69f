//! Text Measurement
//!
//! Utilities for measuring text dimensions in terminal cells, using
//! `unicode-width` for per-character cell widths (CJK and most emoji take
//! two cells, combining and control characters none).

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Display width of a string in terminal cells.
pub fn string_width(s: &str) -> u16 {
    u16::try_from(UnicodeWidthStr::width(s)).unwrap_or(u16::MAX)
}

fn char_width(c: char) -> u16 {
    UnicodeWidthChar::width(c).unwrap_or(0) as u16
}

/// Width of the widest line.
pub fn max_line_width(text: &str) -> u16 {
    text.lines().map(string_width).max().unwrap_or(0)
}

/// Number of lines `text` occupies when wrapped at `available_width`.
///
/// Zero for empty text, at least one otherwise.
pub fn measure_text_height(text: &str, available_width: u16) -> u16 {
    if text.is_empty() {
        return 0;
    }
    u16::try_from(wrap_text(text, available_width).len())
        .unwrap_or(u16::MAX)
        .max(1)
}

/// Character-wrap text to a given width.
///
/// Explicit newlines always break. A width of zero disables wrapping.
pub fn wrap_text(text: &str, width: u16) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    if width == 0 {
        return text.lines().map(str::to_string).collect();
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_width = 0u16;

    for c in text.chars() {
        if c == '\n' {
            lines.push(std::mem::take(&mut current_line));
            current_width = 0;
            continue;
        }

        let w = char_width(c);
        if current_width + w > width && !current_line.is_empty() {
            lines.push(std::mem::take(&mut current_line));
            current_width = 0;
        }

        current_line.push(c);
        current_width += w;
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines
}
