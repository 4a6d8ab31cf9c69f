//! Bridge Engine - the two trees and the table that pairs them.
//!
//! - Source: the framework's live element/text tree, recording mutations
//! - Target: the logical widget tree with structured, versioned props
//! - Registry: 1:1 source ↔ target associations
//!
//! # Architecture
//!
//! Nodes on both sides live in arenas keyed by monotonic ids. Nothing holds
//! a reference into another arena; cross-tree links go through the
//! registry:
//!
//! ```text
//! SourceTree           Associations          TargetTree
//! n0 <box>             n0 ↔ t0               t0 Box   (widget #1)
//!   n1 <text>          n1 ↔ t1               t1 Text  content="hello"
//!     n2 "hello"       (collapsed into t1)
//! ```

mod registry;
pub mod source;
pub mod target;

pub use registry::Associations;
pub use source::{
    Element, EventKind, KeyHandler, Listener, MutationRecord, NodeData, SourceNode, SourceTree,
    SyntheticEvent,
};
pub use target::{Position, PropChange, PropPatch, TargetNode, TargetProps, TargetTree};
