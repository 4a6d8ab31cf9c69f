//! Tree Mounter - builds a target subtree from a source subtree.
//!
//! For every element under the mounted node:
//!
//! 1. Compute its props (attributes, inline style, live style)
//! 2. Create the widget and attach it to the parent's widget (or the screen)
//! 3. Record the target and the source ↔ target association
//! 4. Start intercepting its style writes
//! 5. Recurse into children
//!
//! Wrapper tags (`#document`, `#fragment`, `html`, `body`, `root`) produce no
//! target; their children mount directly under the enclosing parent. Text
//! children of `Text`/`Button` targets collapse into `content`; non-blank
//! text anywhere else becomes an anonymous `Text` target.
//!
//! # Example
//!
//! ```ignore
//! let mut out = SyncOutcome::default();
//! bridge.mount_subtree(&mut source, app_root, None, &mut backend, &mut out)?;
//! for target in out.focusable {
//!     focus.register(target);
//! }
//! ```

use tracing::{debug, trace};

use crate::engine::{SourceTree, TargetProps};
use crate::error::{BridgeError, Result};
use crate::renderer::WidgetBackend;
use crate::types::{NodeId, TargetId, TargetKind};

use super::attributes::{compute_props, effective_text};
use super::bridge::{Bridge, SyncOutcome};

/// Tags that never become targets.
const WRAPPER_TAGS: [&str; 5] = ["#document", "#fragment", "html", "body", "root"];

/// Tags focusable without any attribute.
const FOCUSABLE_TAGS: [&str; 3] = ["input", "button", "box"];

/// Attributes that make any element focusable.
const FOCUS_ATTRIBUTES: [&str; 5] = ["tabindex", "focused", "onkeydown", "onkeypress", "onkeyup"];

pub fn is_wrapper_tag(tag: &str) -> bool {
    WRAPPER_TAGS.contains(&tag)
}

/// True if the element should join focus cycling.
pub fn is_focusable(source: &SourceTree, node: NodeId) -> bool {
    let Some(tag) = source.tag(node) else {
        return false;
    };
    FOCUSABLE_TAGS.contains(&tag.to_ascii_lowercase().as_str())
        || FOCUS_ATTRIBUTES
            .iter()
            .any(|name| source.attribute(node, name).is_some())
        || source.key_handler(node).is_some()
}

impl Bridge {
    /// Mount `node` and everything beneath it under `parent` (`None` for the
    /// screen).
    ///
    /// A node that is already mounted is destroyed and rebuilt.
    pub fn mount_subtree(
        &mut self,
        source: &mut SourceTree,
        node: NodeId,
        parent: Option<TargetId>,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        if !source.contains(node) {
            return Err(BridgeError::UnknownNode(node));
        }
        if let Some(p) = parent {
            if !self.targets.contains(p) {
                return Err(BridgeError::UnknownTarget(p));
            }
        }

        let before = out.created.len();
        let collapses_text = parent
            .and_then(|p| self.targets.get(p))
            .is_some_and(|t| t.kind.is_text_bearing());
        self.mount_node(source, node, parent, collapses_text, backend, out)?;

        let new_roots: Vec<TargetId> = out.created[before..]
            .iter()
            .copied()
            .filter(|&t| self.targets.get(t).is_some_and(|n| n.parent == parent))
            .collect();
        debug!(%node, created = out.created.len() - before, "mounted subtree");
        out.roots.extend(new_roots);
        Ok(())
    }

    fn mount_node(
        &mut self,
        source: &mut SourceTree,
        node: NodeId,
        parent: Option<TargetId>,
        collapses_text: bool,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        if let Some(old) = self.links.target_of(node) {
            if self.targets.contains(old) {
                self.destroy_target(old, backend, out)?;
            }
        }

        if source.is_text(node) {
            if collapses_text {
                return Ok(());
            }
            return self.mount_text(source, node, parent, backend, out);
        }

        let Some(tag) = source.tag(node).map(str::to_string) else {
            return Err(BridgeError::UnknownNode(node));
        };

        if is_wrapper_tag(&tag) {
            trace!(%node, tag, "wrapper skipped");
            for child in source.children(node).to_vec() {
                self.mount_node(source, child, parent, collapses_text, backend, out)?;
            }
            return Ok(());
        }

        let kind = TargetKind::from_tag(&tag);
        let props = compute_props(source, node, &kind);
        let target = self.create(kind.clone(), props, parent, backend)?;
        self.links.link(node, target);
        source.intercept_style(node);
        out.created.push(target);
        trace!(%node, %target, kind = kind.name(), "created");

        if kind.is_text_bearing() {
            self.text_cache.insert(target, effective_text(source, node));
        }
        if is_focusable(source, node) {
            out.focusable.push(target);
        }
        if source.attribute(node, "focused") == Some("true") {
            out.autofocus.push(target);
        }

        let text_bearing = kind.is_text_bearing();
        for child in source.children(node).to_vec() {
            self.mount_node(source, child, Some(target), text_bearing, backend, out)?;
        }
        Ok(())
    }

    fn mount_text(
        &mut self,
        source: &SourceTree,
        node: NodeId,
        parent: Option<TargetId>,
        backend: &mut dyn WidgetBackend,
        out: &mut SyncOutcome,
    ) -> Result<()> {
        let text = source.text(node).unwrap_or_default().trim().to_string();
        if text.is_empty() {
            return Ok(());
        }

        let mut props = TargetProps::new();
        props.content = Some(text.clone());
        let target = self.create(TargetKind::Text, props, parent, backend)?;
        self.links.link(node, target);
        self.text_cache.insert(target, text);
        out.created.push(target);
        trace!(%node, %target, "anonymous text");
        Ok(())
    }

    /// Create the widget, attach it, and record the target.
    fn create(
        &mut self,
        kind: TargetKind,
        props: TargetProps,
        parent: Option<TargetId>,
        backend: &mut dyn WidgetBackend,
    ) -> Result<TargetId> {
        let handle = backend.create(&kind, &props)?;
        let parent_handle = parent.and_then(|p| self.targets.get(p)).and_then(|t| t.handle);
        backend.append(parent_handle, handle)?;
        self.targets.insert(kind, props, parent, Some(handle))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{BackendCall, RecordingBackend};

    fn setup() -> (SourceTree, Bridge, RecordingBackend) {
        (SourceTree::new(), Bridge::new(), RecordingBackend::new())
    }

    #[test]
    fn test_wrappers_are_skipped() {
        let (mut source, mut bridge, mut backend) = setup();
        let doc = source.create_element("#document");
        let body = source.create_element("body");
        let panel = source.create_element("box");
        source.append_child(doc, body).unwrap();
        source.append_child(body, panel).unwrap();

        let mut out = SyncOutcome::default();
        bridge
            .mount_subtree(&mut source, doc, None, &mut backend, &mut out)
            .unwrap();

        assert_eq!(out.created.len(), 1);
        assert_eq!(out.roots, out.created);
        assert_eq!(bridge.target_of(panel), Some(out.roots[0]));
        assert_eq!(bridge.target_of(body), None);
        assert!(source.is_style_intercepted(panel));
    }

    #[test]
    fn test_text_collapses_into_content() {
        let (mut source, mut bridge, mut backend) = setup();
        let label = source.create_element("text");
        let t1 = source.create_text(" Hello ");
        let t2 = source.create_text("there ");
        source.append_child(label, t1).unwrap();
        source.append_child(label, t2).unwrap();

        let mut out = SyncOutcome::default();
        bridge
            .mount_subtree(&mut source, label, None, &mut backend, &mut out)
            .unwrap();

        let target = out.roots[0];
        assert_eq!(out.created, vec![target]);
        let node = bridge.targets().get(target).unwrap();
        assert_eq!(node.props.content.as_deref(), Some("Hello there"));
        assert_eq!(bridge.cached_text(target), Some("Hello there"));
        assert_eq!(bridge.target_of(t1), None);
    }

    #[test]
    fn test_anonymous_text_and_nesting() {
        let (mut source, mut bridge, mut backend) = setup();
        let panel = source.create_element("box");
        let blank = source.create_text("   ");
        let words = source.create_text(" loose words ");
        let input = source.create_element("input");
        for child in [blank, words, input] {
            source.append_child(panel, child).unwrap();
        }

        let mut out = SyncOutcome::default();
        bridge
            .mount_subtree(&mut source, panel, None, &mut backend, &mut out)
            .unwrap();

        assert_eq!(out.created.len(), 3);
        let root = out.roots[0];
        assert_eq!(bridge.targets().children(root).len(), 2);
        let anon = bridge.target_of(words).unwrap();
        assert_eq!(bridge.targets().get(anon).unwrap().kind, TargetKind::Text);
        assert_eq!(bridge.target_of(blank), None);

        let root_handle = bridge.targets().get(root).unwrap().handle;
        let attached_under_root = backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Append { parent, .. } if *parent == root_handle))
            .count();
        assert_eq!(attached_under_root, 2);
    }

    #[test]
    fn test_focusable_and_autofocus() {
        let (mut source, mut bridge, mut backend) = setup();
        let list = source.create_element("list");
        let plain = source.create_element("text");
        let tabbable = source.create_element("text");
        let field = source.create_element("input");
        source.set_attribute(tabbable, "tabindex", "0").unwrap();
        source.set_attribute(field, "focused", "true").unwrap();
        for child in [plain, tabbable, field] {
            source.append_child(list, child).unwrap();
        }

        let mut out = SyncOutcome::default();
        bridge
            .mount_subtree(&mut source, list, None, &mut backend, &mut out)
            .unwrap();

        let tab_t = bridge.target_of(tabbable).unwrap();
        let field_t = bridge.target_of(field).unwrap();
        assert_eq!(out.focusable, vec![tab_t, field_t]);
        assert_eq!(out.autofocus, vec![field_t]);
    }

    #[test]
    fn test_remount_replaces_old_target() {
        let (mut source, mut bridge, mut backend) = setup();
        let panel = source.create_element("box");

        let mut first = SyncOutcome::default();
        bridge
            .mount_subtree(&mut source, panel, None, &mut backend, &mut first)
            .unwrap();
        let mut second = SyncOutcome::default();
        bridge
            .mount_subtree(&mut source, panel, None, &mut backend, &mut second)
            .unwrap();

        assert_eq!(second.destroyed, first.created);
        assert_eq!(bridge.targets().len(), 1);
        assert_eq!(bridge.target_of(panel), second.roots.first().copied());
    }

    #[test]
    fn test_unknown_node_is_an_error() {
        let (mut source, mut bridge, mut backend) = setup();
        let ghost = {
            let mut other = SourceTree::new();
            for _ in 0..5 {
                other.create_element("box");
            }
            other.create_element("box")
        };
        let mut out = SyncOutcome::default();
        assert!(matches!(
            bridge.mount_subtree(&mut source, ghost, None, &mut backend, &mut out),
            Err(BridgeError::UnknownNode(_))
        ));
    }
}
