//! Reconciliation Pipeline
//!
//! Everything between a source mutation and a terminal paint.
//!
//! # Pipeline Architecture
//!
//! ```text
//! SourceTree records → Bridge (mount / observe) → RenderScheduler → Screen → backend.render()
//! ```
//!
//! ## Data Flow
//!
//! 1. **Bridge** - applies mutation records to the target tree, creating,
//!    patching or destroying widgets through the backend
//! 2. **RenderScheduler** - collects dirty targets in a [`RenderQueue`] and
//!    drains them on paced frames driven by the [`EventLoop`]
//! 3. **Screen** - turns each drained frame into one backend paint
//!
//! ## Key Design Principles
//!
//! - **Batched**: a synchronous run of mutations is fully applied before any
//!   frame drains
//! - **Paced**: at most one frame per interval, priority order within it
//! - **Minimal**: props change by field-level patches, text by a cached
//!   fast path

pub mod attributes;
pub mod bridge;
pub mod event_loop;
pub mod mount;
mod observe;
pub mod queue;
pub mod scheduler;
pub mod screen;

// Re-exports
pub use attributes::{compute_props, effective_text, translate_attribute};
pub use bridge::{Bridge, SyncOutcome};
pub use event_loop::{Clock, EventLoop, ManualClock, SystemClock, Task, TimerId};
pub use mount::{is_focusable, is_wrapper_tag};
pub use queue::{QueueStats, RenderQueue, RenderRequest};
pub use scheduler::{FlushHook, RenderCallback, RenderScheduler, SchedulerState, SchedulerStats};
pub use screen::{Screen, ScreenPerf, SharedBackend};
