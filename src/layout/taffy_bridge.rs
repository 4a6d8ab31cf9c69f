//! Taffy Bridge - Integration with Taffy layout engine
//!
//! Converts widget props to Taffy styles, runs layout computation, and
//! extracts absolute screen rectangles keyed by [`WidgetHandle`].
//!
//! Positional props map onto Taffy like this:
//! - `width` / `height`: cells become lengths, `"N%"` becomes a percentage,
//!   anything else is auto
//! - any of `top` / `left` / `right` / `bottom` set: absolute positioning
//!   with those insets
//! - a `border` prop reserves one cell on every side
//!
//! Flex properties come from the `style` map (`flexDirection`, `flexGrow`,
//! `padding`, `gap`). Hidden widgets and their subtrees are left out.

use std::collections::HashMap;

use serde_json::{Map, Value};
use taffy::{
    AvailableSpace, Dimension as TaffyDimension, FlexDirection, LengthPercentage,
    LengthPercentageAuto, NodeId, Position as TaffyPosition, Rect, Size, Style, TaffyTree,
};

use crate::engine::TargetProps;
use crate::error::{BridgeError, Result};
use crate::renderer::WidgetStore;
use crate::types::{Dimension, TargetKind, WidgetHandle};

use super::text_measure::{max_line_width, measure_text_height};

/// Absolute screen rectangle of one widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutRect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// Computed rectangles for every visible widget.
pub type ComputedLayout = HashMap<WidgetHandle, LayoutRect>;

// =============================================================================
// DIMENSION CONVERSION
// =============================================================================

fn percent(raw: &str) -> Option<f32> {
    raw.strip_suffix('%')?.trim().parse::<f32>().ok()
}

fn to_taffy_dimension(dim: Option<&Dimension>) -> TaffyDimension {
    match dim {
        Some(Dimension::Cells(n)) => TaffyDimension::Length(*n as f32),
        Some(Dimension::Raw(raw)) => match percent(raw) {
            Some(p) => TaffyDimension::Percent(p / 100.0),
            None => TaffyDimension::Auto,
        },
        None => TaffyDimension::Auto,
    }
}

fn to_taffy_lpa(dim: Option<&Dimension>) -> LengthPercentageAuto {
    match dim {
        Some(Dimension::Cells(n)) => LengthPercentageAuto::Length(*n as f32),
        Some(Dimension::Raw(raw)) => match percent(raw) {
            Some(p) => LengthPercentageAuto::Percent(p / 100.0),
            None => LengthPercentageAuto::Auto,
        },
        None => LengthPercentageAuto::Auto,
    }
}

fn style_number(style: Option<&Map<String, Value>>, keys: &[&str]) -> Option<f32> {
    let style = style?;
    keys.iter()
        .find_map(|k| style.get(*k))
        .and_then(Value::as_f64)
        .map(|n| n as f32)
}

fn style_str<'a>(style: Option<&'a Map<String, Value>>, keys: &[&str]) -> Option<&'a str> {
    let style = style?;
    keys.iter().find_map(|k| style.get(*k)).and_then(Value::as_str)
}

// =============================================================================
// STYLE BUILDING
// =============================================================================

/// Build a Taffy Style from widget props.
fn build_style(kind: &TargetKind, props: &TargetProps) -> Style {
    let style_map = props.style.as_ref();

    let flex_direction = match style_str(style_map, &["flexDirection", "flex-direction"]) {
        Some("row") => FlexDirection::Row,
        Some("row-reverse") => FlexDirection::RowReverse,
        Some("column-reverse") => FlexDirection::ColumnReverse,
        _ => FlexDirection::Column,
    };

    let border = if props.border.is_some() { 1.0 } else { 0.0 };
    let padding = style_number(style_map, &["padding"]).unwrap_or(0.0);
    let gap = style_number(style_map, &["gap"]).unwrap_or(0.0);

    let absolute = props.top.is_some()
        || props.left.is_some()
        || props.right.is_some()
        || props.bottom.is_some();

    let mut style = Style {
        flex_direction,
        flex_grow: style_number(style_map, &["flexGrow", "flex-grow"]).unwrap_or(0.0),
        flex_shrink: 1.0,
        size: Size {
            width: to_taffy_dimension(props.width.as_ref()),
            height: to_taffy_dimension(props.height.as_ref()),
        },
        padding: Rect {
            top: LengthPercentage::Length(padding),
            right: LengthPercentage::Length(padding),
            bottom: LengthPercentage::Length(padding),
            left: LengthPercentage::Length(padding),
        },
        border: Rect {
            top: LengthPercentage::Length(border),
            right: LengthPercentage::Length(border),
            bottom: LengthPercentage::Length(border),
            left: LengthPercentage::Length(border),
        },
        gap: Size {
            width: LengthPercentage::Length(gap),
            height: LengthPercentage::Length(gap),
        },
        ..Default::default()
    };

    if absolute {
        style.position = TaffyPosition::Absolute;
        style.inset = Rect {
            top: to_taffy_lpa(props.top.as_ref()),
            left: to_taffy_lpa(props.left.as_ref()),
            right: to_taffy_lpa(props.right.as_ref()),
            bottom: to_taffy_lpa(props.bottom.as_ref()),
        };
    }

    // Single-line inputs never grow taller than one row plus border
    if matches!(kind, TargetKind::Input) && props.height.is_none() {
        style.size.height = TaffyDimension::Length(1.0 + border * 2.0);
    }

    style
}

// =============================================================================
// TEXT MEASUREMENT
// =============================================================================

/// What a leaf needs to be measured.
struct MeasureContext {
    content: String,
    single_line: bool,
}

fn measure_content(
    ctx: &MeasureContext,
    known_dimensions: Size<Option<f32>>,
    available_space: Size<AvailableSpace>,
) -> Size<f32> {
    if ctx.single_line {
        let width = max_line_width(&ctx.content).max(1);
        return Size {
            width: known_dimensions.width.unwrap_or(width as f32),
            height: known_dimensions.height.unwrap_or(1.0),
        };
    }

    if ctx.content.is_empty() {
        return Size::ZERO;
    }

    let text_width = max_line_width(&ctx.content);
    let avail_width = match available_space.width {
        AvailableSpace::Definite(w) => w.max(0.0) as u16,
        AvailableSpace::MinContent => text_width,
        AvailableSpace::MaxContent => u16::MAX,
    };
    let width = known_dimensions
        .width
        .map(|w| w as u16)
        .unwrap_or_else(|| text_width.min(avail_width.max(1)));
    let height = measure_text_height(&ctx.content, width.max(1));

    Size {
        width: known_dimensions.width.unwrap_or(width as f32),
        height: known_dimensions.height.unwrap_or(height as f32),
    }
}

fn layout_error(err: taffy::TaffyError) -> BridgeError {
    BridgeError::Render(format!("layout: {err}"))
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Compute absolute rectangles for every visible widget in `store`.
///
/// Roots are laid out in a column inside a `width × height` screen node.
pub fn compute_layout(store: &WidgetStore, width: u16, height: u16) -> Result<ComputedLayout> {
    let mut tree: TaffyTree<MeasureContext> = TaffyTree::new();
    let mut handle_to_node: Vec<(WidgetHandle, NodeId)> = Vec::new();

    let screen = tree
        .new_leaf(Style {
            flex_direction: FlexDirection::Column,
            size: Size {
                width: TaffyDimension::Length(width as f32),
                height: TaffyDimension::Length(height as f32),
            },
            ..Default::default()
        })
        .map_err(layout_error)?;

    // Depth-first build, parents before children
    let mut stack: Vec<(WidgetHandle, NodeId)> = store
        .roots()
        .iter()
        .rev()
        .map(|&h| (h, screen))
        .collect();

    while let Some((handle, parent)) = stack.pop() {
        let Some(widget) = store.get(handle) else { continue };
        if !widget.visible {
            continue;
        }

        let style = build_style(&widget.kind, &widget.props);
        let node = if widget.kind.is_text_bearing() || matches!(widget.kind, TargetKind::Input) {
            let ctx = MeasureContext {
                content: widget.props.content.clone().unwrap_or_default(),
                single_line: matches!(widget.kind, TargetKind::Input),
            };
            tree.new_leaf_with_context(style, ctx)
        } else {
            tree.new_leaf(style)
        }
        .map_err(layout_error)?;

        tree.add_child(parent, node).map_err(layout_error)?;
        handle_to_node.push((handle, node));

        for &child in widget.children.iter().rev() {
            stack.push((child, node));
        }
    }

    let available = Size {
        width: AvailableSpace::Definite(width as f32),
        height: AvailableSpace::Definite(height as f32),
    };

    tree.compute_layout_with_measure(
        screen,
        available,
        |known_dimensions, available_space, _node_id, context, _style| match context {
            Some(ctx) => measure_content(ctx, known_dimensions, available_space),
            None => Size::ZERO,
        },
    )
    .map_err(layout_error)?;

    // Locations are parent-relative; accumulate down the tree
    let mut origins: HashMap<NodeId, (f32, f32)> = HashMap::new();
    origins.insert(screen, (0.0, 0.0));
    let mut result = ComputedLayout::new();

    for (handle, node) in handle_to_node {
        let layout = tree.layout(node).map_err(layout_error)?;
        let parent_origin = tree
            .parent(node)
            .and_then(|p| origins.get(&p).copied())
            .unwrap_or((0.0, 0.0));
        let x = parent_origin.0 + layout.location.x;
        let y = parent_origin.1 + layout.location.y;
        origins.insert(node, (x, y));

        result.insert(
            handle,
            LayoutRect {
                x: x.round().max(0.0) as u16,
                y: y.round().max(0.0) as u16,
                width: layout.size.width.round().max(0.0) as u16,
                height: layout.size.height.round().max(0.0) as u16,
            },
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PropChange;

    fn boxed(store: &mut WidgetStore, parent: Option<WidgetHandle>, w: i64, h: i64) -> WidgetHandle {
        let mut props = TargetProps::new();
        props.width = Some(Dimension::Cells(w));
        props.height = Some(Dimension::Cells(h));
        let handle = store.create(&TargetKind::Box, &props);
        store.append(parent, handle).unwrap();
        handle
    }

    #[test]
    fn test_compute_layout_empty() {
        let store = WidgetStore::new();
        let layout = compute_layout(&store, 80, 24).unwrap();
        assert!(layout.is_empty());
    }

    #[test]
    fn test_parent_child_absolute_coordinates() {
        let mut store = WidgetStore::new();
        let top = boxed(&mut store, None, 80, 2);
        let parent = boxed(&mut store, None, 40, 10);
        let child = boxed(&mut store, Some(parent), 20, 5);

        let layout = compute_layout(&store, 80, 24).unwrap();
        assert_eq!(layout[&top], LayoutRect { x: 0, y: 0, width: 80, height: 2 });
        assert_eq!(layout[&parent].y, 2);
        assert_eq!(layout[&child], LayoutRect { x: 0, y: 2, width: 20, height: 5 });
    }

    #[test]
    fn test_percent_and_inset() {
        let mut store = WidgetStore::new();
        let mut props = TargetProps::new();
        props.width = Some(Dimension::Raw("50%".into()));
        props.height = Some(Dimension::Cells(3));
        props.top = Some(Dimension::Cells(4));
        props.left = Some(Dimension::Cells(6));
        let handle = store.create(&TargetKind::Box, &props);
        store.append(None, handle).unwrap();

        let layout = compute_layout(&store, 80, 24).unwrap();
        assert_eq!(layout[&handle], LayoutRect { x: 6, y: 4, width: 40, height: 3 });
    }

    #[test]
    fn test_border_insets_children() {
        let mut store = WidgetStore::new();
        let mut props = TargetProps::new();
        props.width = Some(Dimension::Cells(20));
        props.height = Some(Dimension::Cells(5));
        props.border = Some(Map::new());
        let frame = store.create(&TargetKind::Box, &props);
        store.append(None, frame).unwrap();

        let mut text = TargetProps::new();
        text.content = Some("hi".into());
        let label = store.create(&TargetKind::Text, &text);
        store.append(Some(frame), label).unwrap();

        let layout = compute_layout(&store, 80, 24).unwrap();
        let rect = layout[&label];
        assert_eq!((rect.x, rect.y, rect.height), (1, 1, 1));
    }

    #[test]
    fn test_hidden_subtree_skipped() {
        let mut store = WidgetStore::new();
        let parent = boxed(&mut store, None, 10, 10);
        let child = boxed(&mut store, Some(parent), 5, 5);
        store
            .set_props(parent, &PropChange::Extra("hidden".into(), Some(true.into())).into())
            .unwrap();

        let layout = compute_layout(&store, 80, 24).unwrap();
        assert!(!layout.contains_key(&parent));
        assert!(!layout.contains_key(&child));
    }
}
