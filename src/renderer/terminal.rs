//! Crossterm backend.
//!
//! Keeps a [`WidgetStore`], lays it out with taffy on every `render` and
//! paints the result through the [`DiffPainter`], so a frame only writes the
//! cells that changed since the last one.
//!
//! Terminal modes are tracked individually and undone in reverse order by
//! [`WidgetBackend::restore`], which also runs on drop.

use std::io::{self, Stdout, Write};

use crossterm::cursor::{Hide, Show};
use crossterm::event::{DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};
use serde_json::Value;
use tracing::debug;

use crate::engine::{PropPatch, TargetProps};
use crate::error::Result;
use crate::layout::{LayoutRect, compute_layout, wrap_text};
use crate::types::{TargetKind, WidgetHandle};

use super::WidgetBackend;
use super::diff::{Attr, Cell, DiffPainter, Grid};
use super::widgets::WidgetStore;

/// Backend drawing into a real terminal (or any writer).
pub struct CrosstermBackend<W: Write> {
    out: W,
    store: WidgetStore,
    painter: DiffPainter,
    fixed_size: Option<(u16, u16)>,
    manage_tty: bool,
    raw: bool,
    mouse: bool,
    exit_keys: Vec<String>,
}

impl CrosstermBackend<Stdout> {
    /// Backend on stdout that owns the tty modes.
    pub fn stdout() -> Self {
        Self {
            out: io::stdout(),
            store: WidgetStore::new(),
            painter: DiffPainter::new(),
            fixed_size: None,
            manage_tty: true,
            raw: false,
            mouse: false,
            exit_keys: Vec::new(),
        }
    }
}

impl<W: Write> CrosstermBackend<W> {
    /// Backend writing to `out` with a fixed size.
    ///
    /// Never touches termios, so it is safe on pipes and buffers.
    pub fn with_writer(out: W, cols: u16, rows: u16) -> Self {
        Self {
            out,
            store: WidgetStore::new(),
            painter: DiffPainter::new(),
            fixed_size: Some((cols, rows)),
            manage_tty: false,
            raw: false,
            mouse: false,
            exit_keys: Vec::new(),
        }
    }

    pub fn store(&self) -> &WidgetStore {
        &self.store
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn exit_keys(&self) -> &[String] {
        &self.exit_keys
    }

    /// Lay out and rasterize the widget tree into a fresh grid.
    pub fn paint(&self) -> Result<Grid> {
        let (cols, rows) = self.size()?;
        let rects = compute_layout(&self.store, cols, rows)?;
        let mut grid = Grid::new(cols, rows);

        let mut stack: Vec<WidgetHandle> = self.store.roots().iter().rev().copied().collect();
        while let Some(handle) = stack.pop() {
            let Some(widget) = self.store.get(handle) else { continue };
            let Some(rect) = rects.get(&handle) else { continue };

            let focused = self.store.focused() == Some(handle);
            let mut inner = *rect;
            if let Some(border) = &widget.props.border {
                draw_border(&mut grid, *rect, border_style(border), focused);
                inner = shrink(*rect);
            }
            draw_content(&mut grid, inner, &widget.kind, &widget.props, focused);

            stack.extend(widget.children.iter().rev());
        }

        Ok(grid)
    }
}

// =============================================================================
// Painting
// =============================================================================

fn shrink(rect: LayoutRect) -> LayoutRect {
    LayoutRect {
        x: rect.x.saturating_add(1),
        y: rect.y.saturating_add(1),
        width: rect.width.saturating_sub(2),
        height: rect.height.saturating_sub(2),
    }
}

fn border_style(border: &serde_json::Map<String, Value>) -> &str {
    border.get("type").and_then(Value::as_str).unwrap_or("line")
}

fn draw_border(grid: &mut Grid, rect: LayoutRect, style: &str, focused: bool) {
    if rect.width < 2 || rect.height < 2 {
        return;
    }
    let [tl, tr, bl, br, h, v] = match style {
        "double" => ['╔', '╗', '╚', '╝', '═', '║'],
        "bold" | "heavy" => ['┏', '┓', '┗', '┛', '━', '┃'],
        "round" | "rounded" => ['╭', '╮', '╰', '╯', '─', '│'],
        _ => ['┌', '┐', '└', '┘', '─', '│'],
    };
    let attrs = if focused { Attr::BOLD } else { Attr::NONE };
    let cell = |ch| Cell { ch, attrs };

    let right = rect.x + rect.width - 1;
    let bottom = rect.y + rect.height - 1;
    for x in rect.x + 1..right {
        grid.set(x, rect.y, cell(h));
        grid.set(x, bottom, cell(h));
    }
    for y in rect.y + 1..bottom {
        grid.set(rect.x, y, cell(v));
        grid.set(right, y, cell(v));
    }
    grid.set(rect.x, rect.y, cell(tl));
    grid.set(right, rect.y, cell(tr));
    grid.set(rect.x, bottom, cell(bl));
    grid.set(right, bottom, cell(br));
}

fn draw_content(grid: &mut Grid, rect: LayoutRect, kind: &TargetKind, props: &TargetProps, focused: bool) {
    let Some(content) = props.content.as_deref().filter(|c| !c.is_empty()) else {
        return;
    };

    let mut attrs = match kind {
        TargetKind::Button => Attr::BOLD,
        TargetKind::Input | TargetKind::Textarea => Attr::UNDERLINE,
        _ => Attr::NONE,
    };
    if focused {
        attrs |= Attr::INVERSE;
    }

    let max_x = rect.x.saturating_add(rect.width);
    for (row, line) in wrap_text(content, rect.width).iter().enumerate() {
        let Ok(row) = u16::try_from(row) else { break };
        if row >= rect.height {
            break;
        }
        grid.print(rect.x, rect.y + row, max_x, line, attrs);
    }
}

// =============================================================================
// WidgetBackend
// =============================================================================

impl<W: Write> WidgetBackend for CrosstermBackend<W> {
    fn create(&mut self, kind: &TargetKind, props: &TargetProps) -> Result<WidgetHandle> {
        Ok(self.store.create(kind, props))
    }

    fn set_props(&mut self, handle: WidgetHandle, patch: &PropPatch, _props: &TargetProps) -> Result<()> {
        self.store.set_props(handle, patch)
    }

    fn append(&mut self, parent: Option<WidgetHandle>, child: WidgetHandle) -> Result<()> {
        self.store.append(parent, child)
    }

    fn focus(&mut self, handle: WidgetHandle) -> Result<()> {
        self.store.focus(handle)
    }

    fn show(&mut self, handle: WidgetHandle) -> Result<()> {
        self.store.show(handle)
    }

    fn destroy(&mut self, handle: WidgetHandle) -> Result<()> {
        self.store.destroy(handle)
    }

    fn render(&mut self) -> Result<()> {
        let grid = self.paint()?;
        let resized = self
            .painter
            .previous_size()
            .is_some_and(|size| size != (grid.width(), grid.height()));
        if resized {
            // Stale cells outside the new grid
            queue!(self.out, Clear(ClearType::All))?;
            self.painter.invalidate();
        }
        let changed = self.painter.render(&mut self.out, &grid)?;
        debug!(changed, "frame painted");
        Ok(())
    }

    fn size(&self) -> Result<(u16, u16)> {
        match self.fixed_size {
            Some(size) => Ok(size),
            None => Ok(terminal::size()?),
        }
    }

    fn set_raw_mode(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.raw {
            return Ok(());
        }
        if enabled {
            if self.manage_tty {
                terminal::enable_raw_mode()?;
            }
            execute!(self.out, EnterAlternateScreen, Hide, Clear(ClearType::All))?;
        } else {
            execute!(self.out, Show, LeaveAlternateScreen)?;
            if self.manage_tty {
                terminal::disable_raw_mode()?;
            }
        }
        self.raw = enabled;
        self.painter.invalidate();
        Ok(())
    }

    fn set_mouse(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.mouse {
            return Ok(());
        }
        if enabled {
            execute!(self.out, EnableMouseCapture, EnableFocusChange)?;
        } else {
            execute!(self.out, DisableFocusChange, DisableMouseCapture)?;
        }
        self.mouse = enabled;
        Ok(())
    }

    fn bind_exit_keys(&mut self, keys: &[String]) -> Result<()> {
        self.exit_keys = keys.to_vec();
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        self.set_mouse(false)?;
        self.set_raw_mode(false)?;
        Ok(())
    }
}

impl<W: Write> Drop for CrosstermBackend<W> {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            debug!(%err, "terminal restore on drop failed");
        }
    }
}
