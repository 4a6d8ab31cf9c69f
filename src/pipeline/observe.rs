//! Mutation Bridge - re-syncs mounted targets when the source mutates.
//!
//! Records are applied in the order they were made:
//!
//! - `Attribute`: translate that one attribute and apply it as a patch.
//!   `style`/`border` recompute the full props since inline and live style
//!   layer over them. `content` on a text-bearing target goes through the
//!   text fast path.
//! - `CharacterData` / `ChildList` on a text-bearing parent: text fast path.
//!   The effective text is compared with the last value written; only a
//!   changed string produces a `content` patch, and children are never
//!   destroyed.
//! - `ChildList` anywhere else: destroy the target's children and mount the
//!   current source children again. Each target is rebuilt at most once per
//!   batch, and targets created in the same batch are already current.
//! - `StyleWrite`: recompute the full props and apply the diff.
//!
//! Only records under an observed root are processed (style writes are
//! always processed, they only exist for mounted nodes). Records for nodes
//! without a target are skipped.

use std::collections::HashSet;

use tracing::trace;

use crate::engine::{MutationRecord, PropChange, SourceTree};
use crate::error::{BridgeError, Result};
use crate::renderer::WidgetBackend;
use crate::types::{NodeId, TargetId};

use super::attributes::{compute_props, effective_text, translate_attribute};
use super::bridge::{Bridge, SyncOutcome};
use super::mount::is_wrapper_tag;

/// Per-batch bookkeeping.
#[derive(Default)]
struct Batch {
    rebuilt: HashSet<TargetId>,
    /// Unmounted tops whose screen roots were already rebuilt.
    rebuilt_tops: HashSet<NodeId>,
}

impl Bridge {
    /// Apply a batch of mutation records.
    pub fn apply_records(
        &mut self,
        source: &mut SourceTree,
        records: Vec<MutationRecord>,
        backend: &mut dyn WidgetBackend,
    ) -> Result<SyncOutcome> {
        let mut out = SyncOutcome::default();
        let mut batch = Batch::default();

        for record in records {
            match record {
                MutationRecord::StyleWrite { node } => {
                    self.on_style_write(source, node, backend, &mut out)?;
                }
                MutationRecord::Attribute { node, name } => {
                    if self.is_observed(source, node) {
                        self.on_attribute(source, node, &name, backend, &mut out)?;
                    }
                }
                MutationRecord::CharacterData { node } => {
                    if self.is_observed(source, node) {
                        self.on_character_data(source, node, backend, &mut out, &mut batch)?;
                    }
                }
                MutationRecord::ChildList { parent, added, removed } => {
                    if self.is_observed(source, parent) {
                        self.on_child_list(source, parent, &added, &removed, backend, &mut out, &mut batch)?;
                    }
                }
            }
        }

        Ok(out)
    }

    // =========================================================================
    // Attribute / style
    // =========================================================================

    fn on_attribute(
        &mut self,
        source: &SourceTree,
        node: NodeId,
        name: &str,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        let Some(target) = self.links.target_of(node) else {
            trace!(%node, name, "attribute on unmounted node");
            return Ok(());
        };
        let kind = self
            .targets
            .get(target)
            .ok_or(BridgeError::UnknownTarget(target))?
            .kind
            .clone();
        let value = source.attribute(node, name);

        if name == "focused" && value == Some("true") {
            out.autofocus.push(target);
        }

        if name == "content" && kind.is_text_bearing() {
            return self.sync_text(source, node, target, backend, out);
        }

        let Some(change) = translate_attribute(name, value) else {
            trace!(%node, name, "attribute value dropped");
            return Ok(());
        };

        if matches!(change, PropChange::Style(_) | PropChange::Border(_)) {
            return self.recompute(source, node, target, backend, out);
        }
        self.patch(target, &change.into(), backend, out)
    }

    fn on_style_write(
        &mut self,
        source: &SourceTree,
        node: NodeId,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        match self.links.target_of(node) {
            Some(target) => self.recompute(source, node, target, backend, out),
            None => {
                trace!(%node, "style write on unmounted node");
                Ok(())
            }
        }
    }

    /// Recompute the whole props of `target` and apply the difference.
    fn recompute(
        &mut self,
        source: &SourceTree,
        node: NodeId,
        target: TargetId,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        let current = self
            .targets
            .get(target)
            .ok_or(BridgeError::UnknownTarget(target))?;
        let kind = current.kind.clone();
        let next = compute_props(source, node, &kind);
        let patch = current.props.diff(&next);
        if patch.is_empty() {
            return Ok(());
        }
        self.patch(target, &patch, backend, out)?;
        if kind.is_text_bearing() {
            self.text_cache.insert(target, effective_text(source, node));
        }
        Ok(())
    }

    // =========================================================================
    // Text fast path
    // =========================================================================

    /// Patch only `content` if the effective text changed.
    fn sync_text(
        &mut self,
        source: &SourceTree,
        node: NodeId,
        target: TargetId,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        let text = effective_text(source, node);
        if self.text_cache.get(&target) == Some(&text) {
            trace!(%target, "text unchanged");
            return Ok(());
        }
        let content = (!text.is_empty()).then(|| text.clone());
        self.patch(target, &PropChange::Content(content).into(), backend, out)?;
        self.text_cache.insert(target, text);
        Ok(())
    }

    fn text_bearing_target(&self, node: NodeId) -> Option<TargetId> {
        let target = self.links.target_of(node)?;
        self.targets
            .get(target)
            .filter(|t| t.kind.is_text_bearing())
            .map(|t| t.id)
    }

    fn on_character_data(
        &mut self,
        source: &mut SourceTree,
        node: NodeId,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
        batch: &mut Batch,
    ) -> Result<()> {
        let parent = source.parent(node);

        if let Some((parent, target)) = parent.and_then(|p| Some((p, self.text_bearing_target(p)?))) {
            return self.sync_text(source, parent, target, backend, out);
        }

        // Anonymous text target of its own
        if let Some(target) = self.links.target_of(node) {
            let text = source.text(node).unwrap_or_default().trim().to_string();
            if self.text_cache.get(&target) == Some(&text) {
                return Ok(());
            }
            let content = (!text.is_empty()).then(|| text.clone());
            self.patch(target, &PropChange::Content(content).into(), backend, out)?;
            self.text_cache.insert(target, text);
            return Ok(());
        }

        // Was blank when mounted; the parent decides whether it shows now
        match parent {
            Some(parent) => self.on_child_list(source, parent, &[], &[], backend, out, batch),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Structure
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    fn on_child_list(
        &mut self,
        source: &mut SourceTree,
        parent: NodeId,
        added: &[NodeId],
        removed: &[NodeId],
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
        batch: &mut Batch,
    ) -> Result<()> {
        let Some(target) = self.links.target_of(parent) else {
            return self.on_unmounted_parent(source, parent, added, removed, backend, out, batch);
        };

        if out.created.contains(&target) || batch.rebuilt.contains(&target) {
            trace!(%target, "already current this batch");
            return Ok(());
        }

        let kind = self
            .targets
            .get(target)
            .ok_or(BridgeError::UnknownTarget(target))?
            .kind
            .clone();
        if kind.is_text_bearing() {
            self.sync_text(source, parent, target, backend, out)?;
            // Element children of a text-bearing target still get rebuilt
            let elements_changed = added.iter().chain(removed).any(|&n| !source.is_text(n));
            if !elements_changed {
                return Ok(());
            }
        }

        self.rebuild_children(source, parent, target, backend, out)?;
        batch.rebuilt.insert(target);
        Ok(())
    }

    /// Destroy every child target of `target` and mount the current source
    /// children in their place.
    fn rebuild_children(
        &mut self,
        source: &mut SourceTree,
        parent: NodeId,
        target: TargetId,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        trace!(%parent, %target, "rebuilding children");
        for child in self.targets.children(target).to_vec() {
            self.destroy_target(child, backend, out)?;
        }

        let mut mounted = SyncOutcome::default();
        for child in source.children(parent).to_vec() {
            self.mount_subtree(source, child, Some(target), backend, &mut mounted)?;
        }
        // New children are repainted through their parent
        mounted.roots.clear();
        out.merge(mounted);
        out.mark_patched(target);
        Ok(())
    }

    /// Children changed under a node with no target of its own (a wrapper,
    /// usually the app root).
    ///
    /// The wrapper's children belong to the nearest mounted ancestor, which
    /// is rebuilt like any other child list so sibling order follows the
    /// source. With no mounted ancestor the screen roots under the topmost
    /// wrapper are rebuilt instead.
    #[allow(clippy::too_many_arguments)]
    fn on_unmounted_parent(
        &mut self,
        source: &mut SourceTree,
        parent: NodeId,
        added: &[NodeId],
        removed: &[NodeId],
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
        batch: &mut Batch,
    ) -> Result<()> {
        let is_wrapper = source.tag(parent).is_some_and(is_wrapper_tag);
        if !is_wrapper {
            trace!(%parent, "child list on unmounted node");
            return Ok(());
        }

        for &node in removed {
            for target in self.mounted_tops(source, node) {
                if self.targets.contains(target) {
                    self.destroy_target(target, backend, out)?;
                }
            }
        }

        if let Some(anchor) = self.nearest_target(source, parent) {
            let anchor_node = self
                .links
                .source_of(anchor)
                .ok_or(BridgeError::UnknownTarget(anchor))?;
            return self.on_child_list(source, anchor_node, added, removed, backend, out, batch);
        }

        // Removals alone leave the remaining roots in order
        if !removed.is_empty() && added.is_empty() {
            return Ok(());
        }
        let top = topmost(source, parent);
        if !source.tag(top).is_some_and(is_wrapper_tag) || !batch.rebuilt_tops.insert(top) {
            return Ok(());
        }
        trace!(%top, "rebuilding screen roots");
        for target in self.mounted_tops(source, top) {
            if self.targets.contains(target) {
                self.destroy_target(target, backend, out)?;
            }
        }
        self.mount_subtree(source, top, None, backend, out)
    }

    /// Topmost targets at or below `node`.
    fn mounted_tops(&self, source: &SourceTree, node: NodeId) -> Vec<TargetId> {
        if let Some(target) = self.links.target_of(node) {
            return vec![target];
        }
        source
            .children(node)
            .iter()
            .flat_map(|&child| self.mounted_tops(source, child))
            .collect()
    }

    fn nearest_target(&self, source: &SourceTree, node: NodeId) -> Option<TargetId> {
        let mut current = source.parent(node);
        while let Some(id) = current {
            if let Some(target) = self.links.target_of(id) {
                return Some(target);
            }
            current = source.parent(id);
        }
        None
    }
}

/// Root of the tree `node` is attached to.
fn topmost(source: &SourceTree, node: NodeId) -> NodeId {
    let mut current = node;
    while let Some(parent) = source.parent(current) {
        current = parent;
    }
    current
}

// =============================================================================
// TESTS
// =============================================================================
