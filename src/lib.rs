//! # spark-tui-bridge
//!
//! Reconciliation bridge between a live element tree and terminal widgets.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for the
//! reactive focus state and the pre-frame flush.
//!
//! ## Architecture
//!
//! A reactive framework mounts its output into a [`SourceTree`]. The bridge
//! mirrors it as a tree of stateful widgets and keeps the two consistent as
//! the source mutates, while a paced scheduler bounds how often the terminal
//! actually redraws:
//! ```text
//! SourceTree mutations → Bridge (mount / patch / rebuild) → RenderQueue → RenderScheduler → Screen
//!         ▲                                                                                   │
//!         └──────────── synthetic focus / key events ◄── Keyboard/Focus bridge ◄── terminal ──┘
//! ```
//!
//! Everything runs on one thread. A [`Session`] owns all per-app state; there
//! are no globals.
//!
//! ## Modules
//!
//! - [`types`] - Ids, priorities, widget kinds, dimensions
//! - [`engine`] - Source tree, target tree, associations
//! - [`pipeline`] - Mounting, mutation sync, render queue and scheduler, screen
//! - [`state`] - Focus, keyboard translation, terminal input
//! - [`renderer`] - Widget backend trait, recording and crossterm backends
//! - [`layout`] - Taffy layout and text measurement for the crossterm backend
//! - [`session`] - The per-app context tying it all together

pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod renderer;
pub mod session;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};

pub use engine::{
    EventKind, MutationRecord, PropChange, PropPatch, SourceTree, SyntheticEvent, TargetNode,
    TargetProps, TargetTree,
};

pub use pipeline::{
    Bridge, Clock, EventLoop, ManualClock, RenderQueue, RenderScheduler, SchedulerStats, Screen,
    SyncOutcome, SystemClock,
};

pub use renderer::{BackendCall, CrosstermBackend, RecordingBackend, WidgetBackend};

pub use session::Session;

pub use state::{KeyInfo, KeyOutcome, KeyStream, Modifiers, RawKeyEvent, TerminalEvent};
