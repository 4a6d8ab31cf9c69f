//! Association Registry - bidirectional source ↔ target mapping.
//!
//! Two owned maps keyed by the ids stamped on each node at creation:
//! - `NodeId → TargetId`
//! - `TargetId → NodeId`
//!
//! The pairing is strictly 1:1. Linking either side again first drops its
//! previous partner, and entries go away as soon as either side is
//! destroyed.

use std::collections::HashMap;

use crate::types::{NodeId, TargetId};

// =============================================================================
// Registry State
// =============================================================================

/// Source ↔ target association table.
#[derive(Debug, Default)]
pub struct Associations {
    /// Map source node to its target.
    source_to_target: HashMap<NodeId, TargetId>,

    /// Map target node back to its source.
    target_to_source: HashMap<TargetId, NodeId>,
}

impl Associations {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Linking
    // =========================================================================

    /// Pair `source` with `target`, dropping any previous partner of either.
    pub fn link(&mut self, source: NodeId, target: TargetId) {
        self.unlink_source(source);
        self.unlink_target(target);
        self.source_to_target.insert(source, target);
        self.target_to_source.insert(target, source);
    }

    /// Remove the pairing of a source node. Returns its former target.
    pub fn unlink_source(&mut self, source: NodeId) -> Option<TargetId> {
        let target = self.source_to_target.remove(&source)?;
        self.target_to_source.remove(&target);
        Some(target)
    }

    /// Remove the pairing of a target node. Returns its former source.
    pub fn unlink_target(&mut self, target: TargetId) -> Option<NodeId> {
        let source = self.target_to_source.remove(&target)?;
        self.source_to_target.remove(&source);
        Some(source)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Target mounted for a source node.
    pub fn target_of(&self, source: NodeId) -> Option<TargetId> {
        self.source_to_target.get(&source).copied()
    }

    /// Source node a target was mounted from.
    pub fn source_of(&self, target: TargetId) -> Option<NodeId> {
        self.target_to_source.get(&target).copied()
    }

    pub fn len(&self) -> usize {
        self.source_to_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_to_target.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_both_directions() {
        let mut assoc = Associations::new();
        assoc.link(NodeId(1), TargetId(10));

        assert_eq!(assoc.target_of(NodeId(1)), Some(TargetId(10)));
        assert_eq!(assoc.source_of(TargetId(10)), Some(NodeId(1)));
        assert_eq!(assoc.len(), 1);
    }

    #[test]
    fn test_relink_keeps_one_to_one() {
        let mut assoc = Associations::new();
        assoc.link(NodeId(1), TargetId(10));

        // New target for the same source
        assoc.link(NodeId(1), TargetId(11));
        assert_eq!(assoc.source_of(TargetId(10)), None);
        assert_eq!(assoc.target_of(NodeId(1)), Some(TargetId(11)));

        // Same target claimed by another source
        assoc.link(NodeId(2), TargetId(11));
        assert_eq!(assoc.target_of(NodeId(1)), None);
        assert_eq!(assoc.source_of(TargetId(11)), Some(NodeId(2)));
        assert_eq!(assoc.len(), 1);
    }

    #[test]
    fn test_unlink_either_side() {
        let mut assoc = Associations::new();
        assoc.link(NodeId(1), TargetId(10));
        assoc.link(NodeId(2), TargetId(20));

        assert_eq!(assoc.unlink_target(TargetId(10)), Some(NodeId(1)));
        assert_eq!(assoc.target_of(NodeId(1)), None);

        assert_eq!(assoc.unlink_source(NodeId(2)), Some(TargetId(20)));
        assert_eq!(assoc.source_of(TargetId(20)), None);
        assert!(assoc.is_empty());

        assert_eq!(assoc.unlink_source(NodeId(3)), None);
    }
}
