//! Headless backend that records every call.
//!
//! Keeps a [`WidgetStore`] so the widget tree it would display can be
//! inspected, and a call log for asserting exactly what the bridge asked
//! for (how many prop patches, how many paints, in which order).

use crate::engine::{PropPatch, TargetProps};
use crate::error::{BridgeError, Result};
use crate::types::{TargetKind, WidgetHandle};

use super::WidgetBackend;
use super::widgets::WidgetStore;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Create { handle: WidgetHandle, kind: TargetKind },
    SetProps { handle: WidgetHandle, patch: PropPatch },
    Append { parent: Option<WidgetHandle>, child: WidgetHandle },
    Focus(WidgetHandle),
    Show(WidgetHandle),
    Destroy(WidgetHandle),
    Render,
    SetRawMode(bool),
    SetMouse(bool),
    BindExitKeys(Vec<String>),
    Restore,
}

/// Backend that draws nothing.
#[derive(Debug)]
pub struct RecordingBackend {
    store: WidgetStore,
    calls: Vec<BackendCall>,
    size: (u16, u16),
    render_error: Option<String>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::with_size(80, 24)
    }

    /// Report `cols × rows` from [`WidgetBackend::size`].
    pub fn with_size(cols: u16, rows: u16) -> Self {
        Self {
            store: WidgetStore::new(),
            calls: Vec::new(),
            size: (cols, rows),
            render_error: None,
        }
    }

    pub fn set_size(&mut self, cols: u16, rows: u16) {
        self.size = (cols, rows);
    }

    /// Make every following `render` fail with `message` (`None` to stop).
    pub fn fail_renders(&mut self, message: Option<&str>) {
        self.render_error = message.map(str::to_string);
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of `render` calls so far.
    pub fn render_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Render))
            .count()
    }

    /// Every prop patch sent to `handle`.
    pub fn patches_for(&self, handle: WidgetHandle) -> Vec<&PropPatch> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::SetProps { handle: h, patch } if *h == handle => Some(patch),
                _ => None,
            })
            .collect()
    }

    pub fn store(&self) -> &WidgetStore {
        &self.store
    }
}

impl WidgetBackend for RecordingBackend {
    fn create(&mut self, kind: &TargetKind, props: &TargetProps) -> Result<WidgetHandle> {
        let handle = self.store.create(kind, props);
        self.calls.push(BackendCall::Create {
            handle,
            kind: kind.clone(),
        });
        Ok(handle)
    }

    fn set_props(&mut self, handle: WidgetHandle, patch: &PropPatch, _props: &TargetProps) -> Result<()> {
        self.store.set_props(handle, patch)?;
        self.calls.push(BackendCall::SetProps {
            handle,
            patch: patch.clone(),
        });
        Ok(())
    }

    fn append(&mut self, parent: Option<WidgetHandle>, child: WidgetHandle) -> Result<()> {
        self.store.append(parent, child)?;
        self.calls.push(BackendCall::Append { parent, child });
        Ok(())
    }

    fn focus(&mut self, handle: WidgetHandle) -> Result<()> {
        self.store.focus(handle)?;
        self.calls.push(BackendCall::Focus(handle));
        Ok(())
    }

    fn show(&mut self, handle: WidgetHandle) -> Result<()> {
        self.store.show(handle)?;
        self.calls.push(BackendCall::Show(handle));
        Ok(())
    }

    fn destroy(&mut self, handle: WidgetHandle) -> Result<()> {
        self.store.destroy(handle)?;
        self.calls.push(BackendCall::Destroy(handle));
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        self.calls.push(BackendCall::Render);
        match &self.render_error {
            Some(message) => Err(BridgeError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn size(&self) -> Result<(u16, u16)> {
        Ok(self.size)
    }

    fn set_raw_mode(&mut self, enabled: bool) -> Result<()> {
        self.calls.push(BackendCall::SetRawMode(enabled));
        Ok(())
    }

    fn set_mouse(&mut self, enabled: bool) -> Result<()> {
        self.calls.push(BackendCall::SetMouse(enabled));
        Ok(())
    }

    fn bind_exit_keys(&mut self, keys: &[String]) -> Result<()> {
        self.calls.push(BackendCall::BindExitKeys(keys.to_vec()));
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        self.calls.push(BackendCall::Restore);
        Ok(())
    }
}
