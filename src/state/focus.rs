//! Focus Bridge - single-focus tracking across both trees.
//!
//! Holds at most one active source node and mirrors the focused target in a
//! reactive signal so hosts can derive UI from it:
//! - `focused` signal (currently focused target)
//! - Paired `focus`/`focusin` and `blur`/`focusout` dispatch
//! - Focus cycling (Tab/Shift+Tab) over registered focusables
//!
//! # Ordering
//!
//! Moving focus from A to B is clear-then-add: A leaves the focus set and
//! receives `blur` then `focusout`, and only after that B enters the set and
//! receives `focus` then `focusin`.
//!
//! # Example
//!
//! ```ignore
//! let mut focus = FocusBridge::new();
//! focus.register(target);
//! focus.focus(&source, node, target);
//! assert!(focus.is_focused(target));
//! ```

use std::collections::HashSet;

use spark_signals::{signal, Signal};
use tracing::trace;

use crate::engine::{EventKind, SourceTree, SyntheticEvent, TargetTree};
use crate::types::{NodeId, TargetId};

// =============================================================================
// FOCUS BRIDGE
// =============================================================================

/// Per-session focus set.
pub struct FocusBridge {
    active: Option<NodeId>,
    focused: Signal<Option<TargetId>>,
    focusable: HashSet<TargetId>,
}

impl Default for FocusBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusBridge {
    pub fn new() -> Self {
        Self {
            active: None,
            focused: signal(None),
            focusable: HashSet::new(),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Mark a mounted target as focusable.
    pub fn register(&mut self, target: TargetId) {
        self.focusable.insert(target);
    }

    pub fn is_focusable(&self, target: TargetId) -> bool {
        self.focusable.contains(&target)
    }

    /// Drop destroyed targets.
    ///
    /// If the focused target is among them, the signal is cleared and the
    /// still-active node is returned. The caller then either
    /// [`retarget`](Self::retarget)s it, [`blur`](Self::blur)s it or
    /// [`release`](Self::release)s it.
    pub fn forget(&mut self, targets: &[TargetId]) -> Option<NodeId> {
        for target in targets {
            self.focusable.remove(target);
        }
        if self.focused.get().is_some_and(|t| targets.contains(&t)) {
            trace!("focused target destroyed");
            self.focused.set(None);
            return self.active;
        }
        None
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Currently focused target.
    pub fn focused_target(&self) -> Option<TargetId> {
        self.focused.get()
    }

    /// Source node holding focus.
    pub fn focused_node(&self) -> Option<NodeId> {
        self.active
    }

    pub fn has_focus(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_focused(&self, target: TargetId) -> bool {
        self.focused.get() == Some(target)
    }

    /// Reactive handle on the focused target.
    pub fn focus_signal(&self) -> Signal<Option<TargetId>> {
        self.focused.clone()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Move focus to `node` (mounted as `target`). Returns `false` if it was
    /// already focused.
    pub fn focus(&mut self, source: &SourceTree, node: NodeId, target: TargetId) -> bool {
        if self.active == Some(node) {
            return false;
        }

        if let Some(previous) = self.active.take() {
            self.focused.set(None);
            dispatch_pair(source, previous, EventKind::Blur, EventKind::FocusOut);
        }

        self.active = Some(node);
        self.focused.set(Some(target));
        trace!(%node, %target, "focus");
        dispatch_pair(source, node, EventKind::Focus, EventKind::FocusIn);
        true
    }

    /// Clear focus. Returns `false` if nothing was focused.
    pub fn blur(&mut self, source: &SourceTree) -> bool {
        let Some(previous) = self.active.take() else {
            return false;
        };
        self.focused.set(None);
        trace!(node = %previous, "blur");
        dispatch_pair(source, previous, EventKind::Blur, EventKind::FocusOut);
        true
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Focusable targets in tree order, skipping hidden ones.
    pub fn cycle_order(&self, targets: &TargetTree) -> Vec<TargetId> {
        targets
            .walk()
            .into_iter()
            .filter(|t| self.focusable.contains(t))
            .filter(|&t| targets.get(t).is_some_and(|n| !n.props.flag("hidden")))
            .collect()
    }

    /// Next target in `order` after the focused one, wrapping. Without a
    /// current focus, forward starts at the first and backward at the last.
    pub fn next_in(&self, order: &[TargetId], forward: bool) -> Option<TargetId> {
        if order.is_empty() {
            return None;
        }

        let current = self
            .focused
            .get()
            .and_then(|t| order.iter().position(|&o| o == t));

        let next = match current {
            None if forward => 0,
            None => order.len() - 1,
            Some(pos) if forward => (pos + 1) % order.len(),
            Some(pos) => (pos + order.len() - 1) % order.len(),
        };
        Some(order[next])
    }

    // =========================================================================
    // Target churn
    // =========================================================================

    /// Point the focused node at a freshly mounted target. No events fire:
    /// the node never lost focus.
    pub fn retarget(&mut self, target: TargetId) {
        if self.active.is_some() {
            trace!(%target, "focus retargeted");
            self.focused.set(Some(target));
        }
    }

    /// Drop focus without events, for a node no longer in the source tree.
    pub fn release(&mut self) {
        self.active = None;
        self.focused.set(None);
    }
}

/// Non-bubbling event then its bubbling twin.
fn dispatch_pair(source: &SourceTree, node: NodeId, first: EventKind, second: EventKind) {
    source.dispatch_event(&mut SyntheticEvent::new(first, node));
    source.dispatch_event(&mut SyntheticEvent::new(second, node));
}

// =============================================================================
// TESTS
// =============================================================================
