//! Target Tree - logical mirror of the widget tree.
//!
//! Each [`TargetNode`] has a [`TargetKind`], structured [`TargetProps`] and
//! the handle of the live widget the backend created for it. Props are never
//! merged wholesale: changes are expressed as a [`PropPatch`] (field-level
//! diff) and applied with [`TargetProps::apply`], which bumps the props
//! version only when something actually changed.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};
use crate::types::{Dimension, TargetId, TargetKind, WidgetHandle};

// =============================================================================
// Props
// =============================================================================

/// The six positional props.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Width,
    Height,
    Top,
    Left,
    Right,
    Bottom,
}

impl Position {
    pub const ALL: [Position; 6] = [
        Position::Width,
        Position::Height,
        Position::Top,
        Position::Left,
        Position::Right,
        Position::Bottom,
    ];

    /// Attribute name carrying this prop.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "width" => Some(Position::Width),
            "height" => Some(Position::Height),
            "top" => Some(Position::Top),
            "left" => Some(Position::Left),
            "right" => Some(Position::Right),
            "bottom" => Some(Position::Bottom),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Position::Width => "width",
            Position::Height => "height",
            Position::Top => "top",
            Position::Left => "left",
            Position::Right => "right",
            Position::Bottom => "bottom",
        }
    }
}

/// One field-level change. `None` clears the field.
#[derive(Debug, Clone, PartialEq)]
pub enum PropChange {
    Content(Option<String>),
    ClassName(Option<String>),
    Border(Option<Map<String, Value>>),
    Style(Option<Map<String, Value>>),
    Position(Position, Option<Dimension>),
    Extra(String, Option<Value>),
}

/// Ordered set of field changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropPatch {
    changes: Vec<PropChange>,
}

impl PropPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: PropChange) {
        self.changes.push(change);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropChange> {
        self.changes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True if the patch sets `content`.
    pub fn touches_content(&self) -> bool {
        self.changes
            .iter()
            .any(|c| matches!(c, PropChange::Content(_)))
    }
}

impl From<PropChange> for PropPatch {
    fn from(change: PropChange) -> Self {
        Self { changes: vec![change] }
    }
}

/// Structured widget props.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetProps {
    pub content: Option<String>,
    pub class_name: Option<String>,
    pub border: Option<Map<String, Value>>,
    pub style: Option<Map<String, Value>>,
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
    pub top: Option<Dimension>,
    pub left: Option<Dimension>,
    pub right: Option<Dimension>,
    pub bottom: Option<Dimension>,
    /// Every other attribute.
    pub extra: BTreeMap<String, Value>,
    version: u64,
}

impl TargetProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped once per applied non-empty patch.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn position(&self, position: Position) -> Option<&Dimension> {
        match position {
            Position::Width => self.width.as_ref(),
            Position::Height => self.height.as_ref(),
            Position::Top => self.top.as_ref(),
            Position::Left => self.left.as_ref(),
            Position::Right => self.right.as_ref(),
            Position::Bottom => self.bottom.as_ref(),
        }
    }

    fn position_mut(&mut self, position: Position) -> &mut Option<Dimension> {
        match position {
            Position::Width => &mut self.width,
            Position::Height => &mut self.height,
            Position::Top => &mut self.top,
            Position::Left => &mut self.left,
            Position::Right => &mut self.right,
            Position::Bottom => &mut self.bottom,
        }
    }

    /// Apply one change without touching the version. Returns `true` if the
    /// field changed.
    pub(crate) fn set(&mut self, change: PropChange) -> bool {
        fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
            if *slot == value {
                false
            } else {
                *slot = value;
                true
            }
        }

        match change {
            PropChange::Content(v) => replace(&mut self.content, v),
            PropChange::ClassName(v) => replace(&mut self.class_name, v),
            PropChange::Border(v) => replace(&mut self.border, v),
            PropChange::Style(v) => replace(&mut self.style, v),
            PropChange::Position(p, v) => replace(self.position_mut(p), v),
            PropChange::Extra(name, Some(v)) => {
                if self.extra.get(&name) == Some(&v) {
                    false
                } else {
                    self.extra.insert(name, v);
                    true
                }
            }
            PropChange::Extra(name, None) => self.extra.remove(&name).is_some(),
        }
    }

    /// Field-level changes that turn `self` into `next`.
    pub fn diff(&self, next: &TargetProps) -> PropPatch {
        let mut patch = PropPatch::new();

        if self.content != next.content {
            patch.push(PropChange::Content(next.content.clone()));
        }
        if self.class_name != next.class_name {
            patch.push(PropChange::ClassName(next.class_name.clone()));
        }
        if self.border != next.border {
            patch.push(PropChange::Border(next.border.clone()));
        }
        if self.style != next.style {
            patch.push(PropChange::Style(next.style.clone()));
        }
        for position in Position::ALL {
            if self.position(position) != next.position(position) {
                patch.push(PropChange::Position(position, next.position(position).cloned()));
            }
        }
        for (name, value) in &next.extra {
            if self.extra.get(name) != Some(value) {
                patch.push(PropChange::Extra(name.clone(), Some(value.clone())));
            }
        }
        for name in self.extra.keys() {
            if !next.extra.contains_key(name) {
                patch.push(PropChange::Extra(name.clone(), None));
            }
        }

        patch
    }

    /// Apply a patch. Returns `true` (and bumps the version) if any field
    /// changed.
    pub fn apply(&mut self, patch: &PropPatch) -> bool {
        let mut changed = false;
        for change in patch.iter() {
            changed |= self.set(change.clone());
        }
        if changed {
            self.version += 1;
        }
        changed
    }

    /// Boolean attribute stored in `extra` (`focused`, `hidden`).
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.extra.get(name), Some(Value::Bool(true)))
    }
}

// =============================================================================
// Target Tree
// =============================================================================

/// A node in the target tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetNode {
    pub id: TargetId,
    pub kind: TargetKind,
    pub props: TargetProps,
    pub children: Vec<TargetId>,
    pub parent: Option<TargetId>,
    pub handle: Option<WidgetHandle>,
}

/// Arena of target nodes.
#[derive(Debug, Default)]
pub struct TargetTree {
    nodes: HashMap<TargetId, TargetNode>,
    roots: Vec<TargetId>,
    next_id: u64,
}

impl TargetTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node as the last child of `parent`, or as a new root.
    pub fn insert(
        &mut self,
        kind: TargetKind,
        props: TargetProps,
        parent: Option<TargetId>,
        handle: Option<WidgetHandle>,
    ) -> Result<TargetId> {
        let id = TargetId(self.next_id);
        match parent {
            Some(p) => self
                .nodes
                .get_mut(&p)
                .ok_or(BridgeError::UnknownTarget(p))?
                .children
                .push(id),
            None => self.roots.push(id),
        }
        self.next_id += 1;

        self.nodes.insert(
            id,
            TargetNode {
                id,
                kind,
                props,
                children: Vec::new(),
                parent,
                handle,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: TargetId) -> Option<&TargetNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut TargetNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn children(&self, id: TargetId) -> &[TargetId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[TargetId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Target owning a widget handle.
    pub fn find_by_handle(&self, handle: WidgetHandle) -> Option<TargetId> {
        self.nodes
            .values()
            .find(|n| n.handle == Some(handle))
            .map(|n| n.id)
    }

    /// `id` and its descendants, parents before children.
    pub fn subtree(&self, id: TargetId) -> Vec<TargetId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Every node in tree order.
    pub fn walk(&self) -> Vec<TargetId> {
        self.roots.iter().flat_map(|&r| self.subtree(r)).collect()
    }

    /// Detach and drop `id` with its whole subtree. Returns the removed ids
    /// in tree order.
    pub fn remove_subtree(&mut self, id: TargetId) -> Result<Vec<TargetId>> {
        let parent = self.get(id).ok_or(BridgeError::UnknownTarget(id))?.parent;
        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(parent) => parent.children.retain(|&c| c != id),
            None => self.roots.retain(|&r| r != id),
        }

        let removed = self.subtree(id);
        for target in &removed {
            self.nodes.remove(target);
        }
        Ok(removed)
    }
}

// =============================================================================
// Tests
// =============================================================================
