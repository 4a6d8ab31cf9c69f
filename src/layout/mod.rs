//! Layout for the crossterm backend.
//!
//! Flexbox layout computation for terminal widgets using Taffy.
//!
//! # Architecture
//!
//! The layout module uses [Taffy](https://github.com/DioxusLabs/taffy) for
//! W3C-compliant flexbox computation. The bridge:
//!
//! 1. Converts widget props → Taffy styles
//! 2. Builds the Taffy tree from the widget store's parent relationships
//! 3. Provides measure functions for text intrinsic sizing
//! 4. Extracts absolute rectangles keyed by widget handle

mod taffy_bridge;
mod text_measure;

pub use taffy_bridge::{ComputedLayout, LayoutRect, compute_layout};
pub use text_measure::{max_line_width, measure_text_height, string_width, wrap_text};
