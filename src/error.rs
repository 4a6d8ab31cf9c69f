//! Error types.
//!
//! Malformed attribute or style values never reach this type; they degrade
//! to documented defaults where they are parsed. What remains are I/O
//! failures, backend failures and integration bugs (acting on a node that
//! has no counterpart).

use std::io;

use thiserror::Error;

use crate::types::{NodeId, TargetId};

/// Errors surfaced by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("source node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("target node {0} does not exist")]
    UnknownTarget(TargetId),

    #[error("cannot insert {child} under {parent}: it is an ancestor")]
    InvalidHierarchy { parent: NodeId, child: NodeId },

    #[error("widget backend error: {0}")]
    Backend(String),

    #[error("render callback failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
