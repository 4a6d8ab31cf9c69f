//! Reconciliation state shared by the mounter and the mutation bridge.
//!
//! [`Bridge`] owns the target tree, the association table, the per-target
//! text cache and the list of observed source roots. Mounting lives in
//! `mount.rs`, incremental sync in `observe.rs`; both extend this type.
//!
//! Nothing here touches focus or the scheduler. Every operation reports
//! what it did through [`SyncOutcome`] and the session reacts to that.

use std::collections::HashMap;

use tracing::trace;

use crate::engine::{Associations, PropPatch, SourceTree, TargetTree};
use crate::error::{BridgeError, Result};
use crate::renderer::WidgetBackend;
use crate::types::{NodeId, TargetId};

/// Everything one mount or sync pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Top-level targets created by a mount.
    pub roots: Vec<TargetId>,
    /// Every target created, in tree order.
    pub created: Vec<TargetId>,
    /// Created targets that can take focus.
    pub focusable: Vec<TargetId>,
    /// Created or patched targets whose node asked for focus.
    pub autofocus: Vec<TargetId>,
    /// Existing targets whose props changed.
    pub patched: Vec<TargetId>,
    /// Targets destroyed, descendants included.
    pub destroyed: Vec<TargetId>,
}

impl SyncOutcome {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.patched.is_empty() && self.destroyed.is_empty()
    }

    /// Targets that need a repaint: patched ones and new roots.
    pub fn dirty(&self) -> Vec<TargetId> {
        let mut dirty = self.patched.clone();
        for root in &self.roots {
            if !dirty.contains(root) {
                dirty.push(*root);
            }
        }
        dirty.retain(|t| !self.destroyed.contains(t));
        dirty
    }

    pub(crate) fn merge(&mut self, other: SyncOutcome) {
        self.roots.extend(other.roots);
        self.created.extend(other.created);
        self.focusable.extend(other.focusable);
        self.autofocus.extend(other.autofocus);
        for target in other.patched {
            self.mark_patched(target);
        }
        self.destroyed.extend(other.destroyed);
    }

    pub(crate) fn mark_patched(&mut self, target: TargetId) {
        if !self.patched.contains(&target) {
            self.patched.push(target);
        }
    }
}

/// Target tree plus everything needed to keep it in step with the source.
#[derive(Debug, Default)]
pub struct Bridge {
    pub(crate) targets: TargetTree,
    pub(crate) links: Associations,
    pub(crate) text_cache: HashMap<TargetId, String>,
    observed: Vec<NodeId>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> &TargetTree {
        &self.targets
    }

    pub fn links(&self) -> &Associations {
        &self.links
    }

    pub fn target_of(&self, node: NodeId) -> Option<TargetId> {
        self.links.target_of(node)
    }

    pub fn source_of(&self, target: TargetId) -> Option<NodeId> {
        self.links.source_of(target)
    }

    /// Text last written to a text-bearing target.
    pub fn cached_text(&self, target: TargetId) -> Option<&str> {
        self.text_cache.get(&target).map(String::as_str)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Start reconciling mutations under `root`.
    pub fn observe(&mut self, root: NodeId) {
        if !self.observed.contains(&root) {
            self.observed.push(root);
        }
    }

    pub fn is_observed(&self, source: &SourceTree, node: NodeId) -> bool {
        self.observed
            .iter()
            .any(|&root| source.is_inclusive_descendant(node, root))
    }

    // =========================================================================
    // Shared operations
    // =========================================================================

    /// Apply a patch to a target and forward it to its widget.
    ///
    /// No-op patches reach neither the props version nor the backend. A
    /// patch that clears `hidden` also shows the widget.
    pub(crate) fn patch(
        &mut self,
        target: TargetId,
        patch: &PropPatch,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        let node = self
            .targets
            .get_mut(target)
            .ok_or(BridgeError::UnknownTarget(target))?;
        let was_hidden = node.props.flag("hidden");
        if !node.props.apply(patch) {
            return Ok(());
        }
        trace!(%target, changes = patch.len(), "patched");
        if let Some(handle) = node.handle {
            backend.set_props(handle, patch, &node.props)?;
            if was_hidden && !node.props.flag("hidden") {
                backend.show(handle)?;
            }
        }
        out.mark_patched(target);
        Ok(())
    }

    /// Destroy `target` with its subtree: widget, associations and cache.
    pub(crate) fn destroy_target(
        &mut self,
        target: TargetId,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        let handle = self
            .targets
            .get(target)
            .ok_or(BridgeError::UnknownTarget(target))?
            .handle;
        let removed = self.targets.remove_subtree(target)?;
        for id in &removed {
            self.links.unlink_target(*id);
            self.text_cache.remove(id);
        }
        if let Some(handle) = handle {
            backend.destroy(handle)?;
        }
        trace!(%target, count = removed.len(), "destroyed");
        out.destroyed.extend(removed);
        Ok(())
    }
}
