//! Widget backends.
//!
//! The bridge never draws. It talks to a [`WidgetBackend`]: create a widget
//! for a target, patch its props, attach it, focus it, and paint the screen
//! when the scheduler says so.
//!
//! Two backends ship with the crate:
//! - [`RecordingBackend`] - headless, records every call
//! - [`CrosstermBackend`] - real terminal: raw mode, mouse capture,
//!   alternate screen, taffy layout and a differential painter

mod diff;
mod recording;
mod terminal;
mod widgets;

pub use diff::{Attr, Cell, DiffPainter, Grid};
pub use recording::{BackendCall, RecordingBackend};
pub use terminal::CrosstermBackend;
pub use widgets::{Widget, WidgetStore};

use crate::engine::{PropPatch, TargetProps};
use crate::error::Result;
use crate::types::{TargetKind, WidgetHandle};

/// Narrow interface to the terminal widget library.
pub trait WidgetBackend {
    /// Create a detached widget.
    fn create(&mut self, kind: &TargetKind, props: &TargetProps) -> Result<WidgetHandle>;

    /// Apply a field-level patch. `props` is the full state after the patch.
    fn set_props(&mut self, handle: WidgetHandle, patch: &PropPatch, props: &TargetProps) -> Result<()>;

    /// Attach `child` to `parent`, or to the screen when `parent` is `None`.
    fn append(&mut self, parent: Option<WidgetHandle>, child: WidgetHandle) -> Result<()>;

    fn focus(&mut self, handle: WidgetHandle) -> Result<()>;

    fn show(&mut self, handle: WidgetHandle) -> Result<()>;

    /// Destroy a widget with all its descendants.
    fn destroy(&mut self, handle: WidgetHandle) -> Result<()>;

    /// Paint the screen.
    fn render(&mut self) -> Result<()>;

    /// Terminal size as (columns, rows).
    fn size(&self) -> Result<(u16, u16)>;

    fn set_raw_mode(&mut self, enabled: bool) -> Result<()>;

    fn set_mouse(&mut self, enabled: bool) -> Result<()>;

    /// Keys the backend must let through to the session as exit requests.
    fn bind_exit_keys(&mut self, keys: &[String]) -> Result<()>;

    /// Put the terminal back the way it was found. Idempotent.
    fn restore(&mut self) -> Result<()>;
}
