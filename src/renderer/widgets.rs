//! Widget store shared by the bundled backends.
//!
//! Holds the live widgets a backend created, keyed by [`WidgetHandle`]. The
//! crossterm backend lays these out and paints them; the recording backend
//! keeps them so tests can look at what a real backend would show.

use std::collections::HashMap;

use crate::engine::{PropPatch, TargetProps};
use crate::error::{BridgeError, Result};
use crate::types::{TargetKind, WidgetHandle};

/// One live widget.
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub handle: WidgetHandle,
    pub kind: TargetKind,
    pub props: TargetProps,
    pub parent: Option<WidgetHandle>,
    pub children: Vec<WidgetHandle>,
    pub visible: bool,
}

/// Arena of widgets plus the screen's root list.
#[derive(Debug, Default)]
pub struct WidgetStore {
    widgets: HashMap<WidgetHandle, Widget>,
    roots: Vec<WidgetHandle>,
    focused: Option<WidgetHandle>,
    next_handle: u64,
}

fn unknown(handle: WidgetHandle) -> BridgeError {
    BridgeError::Backend(format!("unknown widget {handle}"))
}

impl WidgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached widget.
    pub fn create(&mut self, kind: &TargetKind, props: &TargetProps) -> WidgetHandle {
        let handle = WidgetHandle(self.next_handle);
        self.next_handle += 1;
        self.widgets.insert(
            handle,
            Widget {
                handle,
                kind: kind.clone(),
                props: props.clone(),
                parent: None,
                children: Vec::new(),
                visible: !props.flag("hidden"),
            },
        );
        handle
    }

    pub fn set_props(&mut self, handle: WidgetHandle, patch: &PropPatch) -> Result<()> {
        let widget = self.widgets.get_mut(&handle).ok_or_else(|| unknown(handle))?;
        widget.props.apply(patch);
        // Hiding is a prop; showing again goes through `show`
        if widget.props.flag("hidden") {
            widget.visible = false;
        }
        Ok(())
    }

    /// Attach `child` under `parent`, or to the screen when `parent` is `None`.
    pub fn append(&mut self, parent: Option<WidgetHandle>, child: WidgetHandle) -> Result<()> {
        if !self.widgets.contains_key(&child) {
            return Err(unknown(child));
        }
        if let Some(p) = parent {
            if !self.widgets.contains_key(&p) {
                return Err(unknown(p));
            }
        }

        self.detach(child);
        match parent {
            Some(p) => {
                if let Some(widget) = self.widgets.get_mut(&p) {
                    widget.children.push(child);
                }
            }
            None => self.roots.push(child),
        }
        if let Some(widget) = self.widgets.get_mut(&child) {
            widget.parent = parent;
        }
        Ok(())
    }

    fn detach(&mut self, handle: WidgetHandle) {
        let parent = self.widgets.get(&handle).and_then(|w| w.parent);
        match parent.and_then(|p| self.widgets.get_mut(&p)) {
            Some(widget) => widget.children.retain(|&c| c != handle),
            None => self.roots.retain(|&r| r != handle),
        }
    }

    /// Destroy a widget and every widget beneath it.
    pub fn destroy(&mut self, handle: WidgetHandle) -> Result<()> {
        if !self.widgets.contains_key(&handle) {
            return Err(unknown(handle));
        }
        self.detach(handle);

        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if let Some(widget) = self.widgets.remove(&current) {
                stack.extend(widget.children);
            }
            if self.focused == Some(current) {
                self.focused = None;
            }
        }
        Ok(())
    }

    pub fn focus(&mut self, handle: WidgetHandle) -> Result<()> {
        if !self.widgets.contains_key(&handle) {
            return Err(unknown(handle));
        }
        self.focused = Some(handle);
        Ok(())
    }

    pub fn show(&mut self, handle: WidgetHandle) -> Result<()> {
        let widget = self.widgets.get_mut(&handle).ok_or_else(|| unknown(handle))?;
        widget.visible = true;
        Ok(())
    }

    pub fn get(&self, handle: WidgetHandle) -> Option<&Widget> {
        self.widgets.get(&handle)
    }

    pub fn roots(&self) -> &[WidgetHandle] {
        &self.roots
    }

    pub fn focused(&self) -> Option<WidgetHandle> {
        self.focused
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }
}
