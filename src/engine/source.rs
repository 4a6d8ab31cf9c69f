//! Source Tree - the framework's live element/text tree.
//!
//! An arena of [`SourceNode`]s keyed by [`NodeId`]. Every mutating call
//! appends a [`MutationRecord`] that the session later drains into the
//! mutation bridge, so changes are observed in the order they were made and
//! only after the synchronous batch that made them has finished.
//!
//! The tree also carries what the keyboard/focus bridge needs from the
//! framework side: per-node event listeners, an optional imperative key
//! handler, and synthetic event dispatch with bubbling.
//!
//! Removed nodes stay in the arena so they can be inserted again.
//! [`SourceTree::destroy_subtree`] releases them once the bridge has seen
//! the removal.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};
use crate::state::keyboard::KeyInfo;
use crate::types::NodeId;

// =============================================================================
// Mutation Records
// =============================================================================

/// One observed change to the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// An attribute was set or removed.
    Attribute { node: NodeId, name: String },
    /// A text node's data changed.
    CharacterData { node: NodeId },
    /// Children were added to or removed from `parent`.
    ChildList {
        parent: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    /// The inline style object or live style of a mounted node was written.
    StyleWrite { node: NodeId },
}

// =============================================================================
// Synthetic Events
// =============================================================================

/// Kinds of synthetic events the bridge dispatches into the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Focus,
    Blur,
    FocusIn,
    FocusOut,
    KeyDown,
    KeyUp,
    BeforeInput,
    Input,
}

impl EventKind {
    /// `focus` and `blur` stay on their target, everything else bubbles.
    pub fn bubbles(self) -> bool {
        !matches!(self, EventKind::Focus | EventKind::Blur)
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Focus => "focus",
            EventKind::Blur => "blur",
            EventKind::FocusIn => "focusin",
            EventKind::FocusOut => "focusout",
            EventKind::KeyDown => "keydown",
            EventKind::KeyUp => "keyup",
            EventKind::BeforeInput => "beforeinput",
            EventKind::Input => "input",
        }
    }
}

/// Event delivered to source-tree listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticEvent {
    pub kind: EventKind,
    /// Node the event was dispatched on.
    pub target: NodeId,
    /// Node whose listener is currently running.
    pub current_target: NodeId,
    /// Key description for keyboard events.
    pub key: Option<KeyInfo>,
    /// Inserted text for `beforeinput`/`input`.
    pub data: Option<String>,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl SyntheticEvent {
    pub fn new(kind: EventKind, target: NodeId) -> Self {
        Self {
            kind,
            target,
            current_target: target,
            key: None,
            data: None,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub fn with_key(mut self, key: KeyInfo) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }
}

/// Listener attached to a source node for one event kind.
///
/// Listeners run while the tree is borrowed for dispatch, so they cannot
/// mutate it directly. A listener records what should change (in state it
/// shares with the host, e.g. an `Rc<RefCell<_>>`), and the host applies it
/// through `Session::source_mut` once `Session::handle_key` returns. The
/// resulting records are flushed before the next task like any other
/// mutation.
pub type Listener = Rc<dyn Fn(&mut SyntheticEvent)>;

/// Imperative key handler; when present on the focused node it receives keys
/// instead of synthetic events.
pub type KeyHandler = Rc<dyn Fn(&KeyInfo)>;

// =============================================================================
// Nodes
// =============================================================================

/// Element payload.
pub struct Element {
    pub tag: String,
    attributes: BTreeMap<String, String>,
    /// Inline style object written directly to the node.
    style: Option<Map<String, Value>>,
    /// Framework side-channel that overrides parsed attributes.
    live_style: Option<Map<String, Value>>,
    key_handler: Option<KeyHandler>,
    listeners: HashMap<EventKind, Vec<Listener>>,
    /// Set once the node is mounted; style writes are then recorded.
    style_intercepted: bool,
}

impl Element {
    fn new(tag: String) -> Self {
        Self {
            tag,
            attributes: BTreeMap::new(),
            style: None,
            live_style: None,
            key_handler: None,
            listeners: HashMap::new(),
            style_intercepted: false,
        }
    }
}

/// Element or text payload.
pub enum NodeData {
    Element(Element),
    Text(String),
}

/// A node in the source tree.
pub struct SourceNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub data: NodeData,
}

impl SourceNode {
    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    pub fn element(&self) -> Option<&Element> {
        match &self.data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }
}

// =============================================================================
// Source Tree
// =============================================================================

/// Arena-backed live tree with explicit mutation records.
#[derive(Default)]
pub struct SourceTree {
    nodes: HashMap<NodeId, SourceNode>,
    next_id: u64,
    records: Vec<MutationRecord>,
    /// Detached subtrees to drop once their records have been applied.
    doomed: Vec<NodeId>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        let id = self.stamp();
        self.nodes.insert(
            id,
            SourceNode {
                id,
                parent: None,
                children: Vec::new(),
                data: NodeData::Element(Element::new(tag.into())),
            },
        );
        id
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        let id = self.stamp();
        self.nodes.insert(
            id,
            SourceNode {
                id,
                parent: None,
                children: Vec::new(),
                data: NodeData::Text(text.into()),
            },
        );
        id
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub fn get(&self, id: NodeId) -> Option<&SourceNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Result<&SourceNode> {
        self.nodes.get(&id).ok_or(BridgeError::UnknownNode(id))
    }

    fn element(&self, id: NodeId) -> Result<&Element> {
        self.node(id)?.element().ok_or(BridgeError::UnknownNode(id))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Element> {
        match self.nodes.get_mut(&id).map(|n| &mut n.data) {
            Some(NodeData::Element(el)) => Ok(el),
            _ => Err(BridgeError::UnknownNode(id)),
        }
    }

    /// Tag of an element, `None` for text nodes and unknown ids.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.get(id)?.element().map(|el| el.tag.as_str())
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(SourceNode::is_text)
    }

    /// Data of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.get(id)?.data {
            NodeData::Text(text) => Some(text),
            NodeData::Element(_) => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.get(id)?
            .element()?
            .attributes
            .get(name)
            .map(String::as_str)
    }

    /// All attributes of an element in name order.
    pub fn attributes(&self, id: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.get(id)
            .and_then(SourceNode::element)
            .into_iter()
            .flat_map(|el| el.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    /// True if `node` is `root` or lies beneath it.
    pub fn is_inclusive_descendant(&self, node: NodeId, root: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == root {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Concatenated data of the direct text children.
    pub fn child_text(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|&child| self.text(child))
            .collect()
    }

    pub fn style_property(&self, id: NodeId) -> Option<&Map<String, Value>> {
        self.get(id)?.element()?.style.as_ref()
    }

    pub fn live_style(&self, id: NodeId) -> Option<&Map<String, Value>> {
        self.get(id)?.element()?.live_style.as_ref()
    }

    pub fn key_handler(&self, id: NodeId) -> Option<KeyHandler> {
        self.get(id)?.element()?.key_handler.clone()
    }

    pub fn has_listener(&self, id: NodeId, kind: EventKind) -> bool {
        self.get(id)
            .and_then(SourceNode::element)
            .and_then(|el| el.listeners.get(&kind))
            .is_some_and(|list| !list.is_empty())
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    pub fn set_attribute(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.element_mut(id)?
            .attributes
            .insert(name.clone(), value.into());
        self.records.push(MutationRecord::Attribute { node: id, name });
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<()> {
        if self.element_mut(id)?.attributes.remove(name).is_some() {
            self.records.push(MutationRecord::Attribute {
                node: id,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Replace a text node's data.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<()> {
        match self.nodes.get_mut(&id).map(|n| &mut n.data) {
            Some(NodeData::Text(data)) => *data = text.into(),
            _ => return Err(BridgeError::UnknownNode(id)),
        }
        self.records.push(MutationRecord::CharacterData { node: id });
        Ok(())
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` (or at the end), detaching it first.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> Result<()> {
        self.element(parent)?;
        self.node(child)?;
        if self.is_inclusive_descendant(parent, child) {
            return Err(BridgeError::InvalidHierarchy { parent, child });
        }

        if let Some(old_parent) = self.parent(child) {
            self.remove_child(old_parent, child)?;
        }

        let node = self.nodes.get_mut(&parent).ok_or(BridgeError::UnknownNode(parent))?;
        let index = reference
            .and_then(|r| node.children.iter().position(|&c| c == r))
            .unwrap_or(node.children.len());
        node.children.insert(index, child);

        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }

        self.records.push(MutationRecord::ChildList {
            parent,
            added: vec![child],
            removed: Vec::new(),
        });
        Ok(())
    }

    /// Detach `child` from `parent`. The node stays in the arena and can be
    /// inserted again; use [`destroy_subtree`](Self::destroy_subtree) to
    /// drop it.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let node = self.nodes.get_mut(&parent).ok_or(BridgeError::UnknownNode(parent))?;
        let Some(index) = node.children.iter().position(|&c| c == child) else {
            return Err(BridgeError::UnknownNode(child));
        };
        node.children.remove(index);

        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }

        self.records.push(MutationRecord::ChildList {
            parent,
            added: Vec::new(),
            removed: vec![child],
        });
        Ok(())
    }

    /// Detach `id` and release it with all its descendants.
    ///
    /// The nodes stay readable until the pending records have been applied,
    /// so the bridge can still find what they were mounted as; the next
    /// [`sweep`](Self::sweep) drops them from the arena.
    pub fn destroy_subtree(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        if let Some(parent) = self.parent(id) {
            self.remove_child(parent, id)?;
        }
        if !self.doomed.contains(&id) {
            self.doomed.push(id);
        }
        Ok(())
    }

    /// Drop every destroyed subtree that is still detached. Returns the
    /// number of nodes released.
    pub fn sweep(&mut self) -> usize {
        let mut released = 0;
        for root in std::mem::take(&mut self.doomed) {
            // Re-inserted after destroy: keep it
            if self.parent(root).is_some() {
                continue;
            }
            let mut stack = vec![root];
            while let Some(current) = stack.pop() {
                if let Some(node) = self.nodes.remove(&current) {
                    stack.extend(node.children);
                    released += 1;
                }
            }
        }
        released
    }

    /// Write the inline style object.
    pub fn set_style_property(&mut self, id: NodeId, style: Map<String, Value>) -> Result<()> {
        let element = self.element_mut(id)?;
        element.style = Some(style);
        if element.style_intercepted {
            self.records.push(MutationRecord::StyleWrite { node: id });
        }
        Ok(())
    }

    /// Set or clear the framework's live style override.
    pub fn set_live_style(&mut self, id: NodeId, style: Option<Map<String, Value>>) -> Result<()> {
        let element = self.element_mut(id)?;
        element.live_style = style;
        if element.style_intercepted {
            self.records.push(MutationRecord::StyleWrite { node: id });
        }
        Ok(())
    }

    /// Start recording style writes on a mounted element.
    pub(crate) fn intercept_style(&mut self, id: NodeId) {
        if let Ok(element) = self.element_mut(id) {
            element.style_intercepted = true;
        }
    }

    pub fn is_style_intercepted(&self, id: NodeId) -> bool {
        self.get(id)
            .and_then(SourceNode::element)
            .is_some_and(|el| el.style_intercepted)
    }

    pub fn set_key_handler(&mut self, id: NodeId, handler: impl Fn(&KeyInfo) + 'static) -> Result<()> {
        self.element_mut(id)?.key_handler = Some(Rc::new(handler));
        Ok(())
    }

    pub fn clear_key_handler(&mut self, id: NodeId) -> Result<()> {
        self.element_mut(id)?.key_handler = None;
        Ok(())
    }

    pub fn add_listener(
        &mut self,
        id: NodeId,
        kind: EventKind,
        listener: impl Fn(&mut SyntheticEvent) + 'static,
    ) -> Result<()> {
        self.element_mut(id)?
            .listeners
            .entry(kind)
            .or_default()
            .push(Rc::new(listener));
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Records
    // -------------------------------------------------------------------------

    /// Drain every pending mutation record, oldest first.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn has_pending_records(&self) -> bool {
        !self.records.is_empty()
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Dispatch `event` on its target, bubbling to ancestors when the kind
    /// bubbles. Returns `false` if a listener called `prevent_default`.
    pub fn dispatch_event(&self, event: &mut SyntheticEvent) -> bool {
        let mut current = Some(event.target);
        while let Some(id) = current {
            let listeners: Vec<Listener> = self
                .get(id)
                .and_then(SourceNode::element)
                .and_then(|el| el.listeners.get(&event.kind))
                .cloned()
                .unwrap_or_default();

            event.current_target = id;
            for listener in listeners {
                listener(event);
            }

            if !event.kind.bubbles() || event.propagation_stopped {
                break;
            }
            current = self.parent(id);
        }
        !event.default_prevented
    }
}

// =============================================================================
// Tests
// =============================================================================
