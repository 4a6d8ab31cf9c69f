//! Differential painter for the crossterm backend.
//!
//! The painter compares the new [`Grid`] to the previous one and only
//! writes cells that changed.
//!
//! # Algorithm
//!
//! 1. Wrap output in a synchronized update
//! 2. For each cell in the new grid:
//!    - If the previous grid has the same size and the cell is unchanged: skip
//!    - Otherwise: move there, set attributes, print
//! 3. Flush the writer (single syscall for the frame)
//! 4. Keep the grid as previous for the next comparison

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{BeginSynchronizedUpdate, EndSynchronizedUpdate};
use crossterm::queue;

bitflags::bitflags! {
    /// Cell attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attr: u8 {
        const NONE = 0;
        const BOLD = 1 << 0;
        const UNDERLINE = 1 << 1;
        const INVERSE = 1 << 2;
    }
}

/// A single terminal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub attrs: Attr,
}

impl Default for Cell {
    fn default() -> Self {
        Self { ch: ' ', attrs: Attr::NONE }
    }
}

/// Row-major grid of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    fn index(&self, x: u16, y: u16) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }

    pub fn get(&self, x: u16, y: u16) -> Option<&Cell> {
        self.index(x, y).map(|i| &self.cells[i])
    }

    /// Write a cell. Out-of-bounds writes are clipped.
    pub fn set(&mut self, x: u16, y: u16, cell: Cell) {
        if let Some(i) = self.index(x, y) {
            self.cells[i] = cell;
        }
    }

    /// Print a string starting at (x, y) without wrapping, clipped to
    /// `max_x` (exclusive).
    pub fn print(&mut self, x: u16, y: u16, max_x: u16, text: &str, attrs: Attr) {
        let mut col = x;
        for ch in text.chars() {
            let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0) as u16;
            if w == 0 {
                continue;
            }
            if col + w > max_x {
                break;
            }
            self.set(col, y, Cell { ch, attrs });
            col += w;
        }
    }

    /// Visible characters of one row, trailing blanks trimmed.
    pub fn row_text(&self, y: u16) -> String {
        (0..self.width)
            .filter_map(|x| self.get(x, y))
            .map(|c| c.ch)
            .collect::<String>()
            .trim_end()
            .to_string()
    }
}

/// Differential painter.
///
/// Keeps the previous grid so only changed cells are written.
#[derive(Debug, Default)]
pub struct DiffPainter {
    previous: Option<Grid>,
}

impl DiffPainter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paint a grid, writing only changed cells.
    ///
    /// Returns true if any cell was written.
    pub fn render(&mut self, out: &mut impl Write, grid: &Grid) -> io::Result<bool> {
        let mut has_changes = false;
        let mut current_attrs = None;

        queue!(out, BeginSynchronizedUpdate)?;

        let comparable = self
            .previous
            .as_ref()
            .filter(|prev| prev.width == grid.width && prev.height == grid.height);

        for y in 0..grid.height {
            for x in 0..grid.width {
                let Some(cell) = grid.get(x, y) else { continue };
                let changed = match comparable.and_then(|prev| prev.get(x, y)) {
                    Some(prev_cell) => prev_cell != cell,
                    None => true,
                };
                if !changed {
                    continue;
                }

                has_changes = true;
                if current_attrs != Some(cell.attrs) {
                    write_attrs(out, cell.attrs)?;
                    current_attrs = Some(cell.attrs);
                }
                queue!(out, MoveTo(x, y), Print(cell.ch))?;
            }
        }

        queue!(out, SetAttribute(Attribute::Reset), EndSynchronizedUpdate)?;
        out.flush()?;

        self.previous = Some(grid.clone());
        Ok(has_changes)
    }

    /// Invalidate the previous frame.
    ///
    /// Next render will be a full redraw.
    pub fn invalidate(&mut self) {
        self.previous = None;
    }

    /// Size of the last painted grid.
    pub fn previous_size(&self) -> Option<(u16, u16)> {
        self.previous.as_ref().map(|g| (g.width, g.height))
    }
}

fn write_attrs(out: &mut impl Write, attrs: Attr) -> io::Result<()> {
    queue!(out, SetAttribute(Attribute::Reset))?;
    if attrs.contains(Attr::BOLD) {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    if attrs.contains(Attr::UNDERLINE) {
        queue!(out, SetAttribute(Attribute::Underlined))?;
    }
    if attrs.contains(Attr::INVERSE) {
        queue!(out, SetAttribute(Attribute::Reverse))?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
