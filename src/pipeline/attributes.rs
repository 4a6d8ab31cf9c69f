//! Attribute translation.
//!
//! Source attributes are strings. Target props are typed. This module is the
//! only place that converts one into the other:
//!
//! | attribute            | prop                                         |
//! |----------------------|----------------------------------------------|
//! | `class`, `className` | `class_name`                                 |
//! | `content`            | `content`                                    |
//! | `border`             | JSON object, `{"type": s}` for a bare string  |
//! | `style`              | JSON object, dropped when not an object      |
//! | positional           | [`Dimension::parse`] (exact integer → cells) |
//! | `focused`, `hidden`  | boolean in `extra`                           |
//! | anything else        | string in `extra`                            |
//!
//! Malformed values never fail: they fall back to a default and log at
//! debug level.

use serde_json::{Map, Value};
use tracing::debug;

use crate::engine::{Position, PropChange, SourceTree, TargetProps};
use crate::types::{Dimension, NodeId, TargetKind};

/// What a stringified host object looks like.
const OBJECT_PLACEHOLDER: &str = "[object Object]";

/// Attributes stored as booleans.
const BOOLEAN_ATTRIBUTES: [&str; 2] = ["focused", "hidden"];

fn default_border() -> Map<String, Value> {
    let mut border = Map::new();
    border.insert("type".into(), Value::from("line"));
    border
}

fn looks_like_json(value: &str) -> bool {
    let trimmed = value.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn parse_object(value: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(value) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(err) => {
            debug!(%err, "malformed JSON attribute");
            None
        }
    }
}

fn translate_border(value: &str) -> Map<String, Value> {
    if value == OBJECT_PLACEHOLDER {
        return default_border();
    }
    if looks_like_json(value) {
        return parse_object(value).unwrap_or_else(default_border);
    }
    let mut border = Map::new();
    border.insert("type".into(), Value::from(value));
    border
}

fn translate_boolean(value: &str) -> Value {
    match value {
        "true" | "" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::from(other),
    }
}

/// Translate one attribute into a prop change.
///
/// `value` is `None` when the attribute was removed; the change then clears
/// the field. Returns `None` when the value must be ignored (a `style` that
/// is not a JSON object).
pub fn translate_attribute(name: &str, value: Option<&str>) -> Option<PropChange> {
    if let Some(position) = Position::from_name(name) {
        return Some(PropChange::Position(position, value.map(Dimension::parse)));
    }

    let change = match name {
        "class" | "className" => PropChange::ClassName(value.map(str::to_string)),
        "content" => PropChange::Content(value.map(str::to_string)),
        "border" => PropChange::Border(value.map(translate_border)),
        "style" => match value {
            None => PropChange::Style(None),
            Some(OBJECT_PLACEHOLDER) => return None,
            Some(v) if looks_like_json(v) => PropChange::Style(Some(parse_object(v)?)),
            Some(v) => {
                debug!(value = v, "non-object style attribute dropped");
                return None;
            }
        },
        _ if BOOLEAN_ATTRIBUTES.contains(&name) => {
            PropChange::Extra(name.to_string(), value.map(translate_boolean))
        }
        _ => PropChange::Extra(name.to_string(), value.map(Value::from)),
    };
    Some(change)
}

/// Merge a live style override over computed props.
///
/// `border` is shallow-merged into the existing border (live fields win);
/// every other key lands in the `style` map.
pub fn merge_live_style(props: &mut TargetProps, live: &Map<String, Value>) {
    for (key, value) in live {
        if key == "border" {
            match value {
                Value::Object(fields) => {
                    let border = props.border.get_or_insert_with(Map::new);
                    for (k, v) in fields {
                        border.insert(k.clone(), v.clone());
                    }
                }
                Value::String(s) => props.border = Some(translate_border(s)),
                _ => debug!("ignored live border value"),
            }
            continue;
        }
        props
            .style
            .get_or_insert_with(Map::new)
            .insert(key.clone(), value.clone());
    }
}

/// Text a text-bearing target shows: the `content` attribute if present,
/// else the trimmed concatenation of its text children.
pub fn effective_text(source: &SourceTree, node: NodeId) -> String {
    match source.attribute(node, "content") {
        Some(content) => content.to_string(),
        None => source.child_text(node).trim().to_string(),
    }
}

/// Full props of an element: attributes, then the inline style property,
/// then the live style.
pub fn compute_props(source: &SourceTree, node: NodeId, kind: &TargetKind) -> TargetProps {
    let mut props = TargetProps::new();

    for (name, value) in source.attributes(node) {
        if let Some(change) = translate_attribute(name, Some(value)) {
            props.set(change);
        }
    }

    if let Some(inline) = source.style_property(node) {
        let style = props.style.get_or_insert_with(Map::new);
        for (k, v) in inline {
            style.insert(k.clone(), v.clone());
        }
    }

    if let Some(live) = source.live_style(node) {
        merge_live_style(&mut props, live);
    }

    if kind.is_text_bearing() {
        let text = effective_text(source, node);
        props.content = (!text.is_empty()).then_some(text);
    }

    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_class_and_content() {
        assert_eq!(
            translate_attribute("class", Some("panel")),
            Some(PropChange::ClassName(Some("panel".into())))
        );
        assert_eq!(translate_attribute("className", None), Some(PropChange::ClassName(None)));
        assert_eq!(
            translate_attribute("content", Some("hi")),
            Some(PropChange::Content(Some("hi".into())))
        );
    }

    #[test]
    fn test_positional_coercion() {
        assert_eq!(
            translate_attribute("width", Some("42")),
            Some(PropChange::Position(Position::Width, Some(Dimension::Cells(42))))
        );
        for raw in ["42.0", "10.5", "007", "50%"] {
            assert_eq!(
                translate_attribute("left", Some(raw)),
                Some(PropChange::Position(Position::Left, Some(Dimension::Raw(raw.into()))))
            );
        }
        assert_eq!(
            translate_attribute("top", None),
            Some(PropChange::Position(Position::Top, None))
        );
    }

    #[test]
    fn test_border_values() {
        let line = json!({"type": "line"}).as_object().cloned();
        assert_eq!(
            translate_attribute("border", Some("[object Object]")),
            Some(PropChange::Border(line.clone()))
        );
        assert_eq!(
            translate_attribute("border", Some("{broken")),
            Some(PropChange::Border(line))
        );
        assert_eq!(
            translate_attribute("border", Some(r#"{"type":"double","fg":"red"}"#)),
            Some(PropChange::Border(json!({"type": "double", "fg": "red"}).as_object().cloned()))
        );
        assert_eq!(
            translate_attribute("border", Some("bg")),
            Some(PropChange::Border(json!({"type": "bg"}).as_object().cloned()))
        );
    }

    #[test]
    fn test_style_values() {
        assert_eq!(translate_attribute("style", Some("[object Object]")), None);
        assert_eq!(translate_attribute("style", Some("color: red")), None);
        assert_eq!(translate_attribute("style", Some("{nope")), None);
        assert_eq!(
            translate_attribute("style", Some(r#"{"fg":"red"}"#)),
            Some(PropChange::Style(json!({"fg": "red"}).as_object().cloned()))
        );
    }

    #[test]
    fn test_booleans_and_extra() {
        assert_eq!(
            translate_attribute("focused", Some("true")),
            Some(PropChange::Extra("focused".into(), Some(Value::Bool(true))))
        );
        assert_eq!(
            translate_attribute("hidden", Some("false")),
            Some(PropChange::Extra("hidden".into(), Some(Value::Bool(false))))
        );
        assert_eq!(
            translate_attribute("tabindex", Some("0")),
            Some(PropChange::Extra("tabindex".into(), Some(Value::from("0"))))
        );
    }

    #[test]
    fn test_compute_props_merge_order() {
        let mut source = SourceTree::new();
        let node = source.create_element("box");
        source.set_attribute(node, "style", r#"{"fg":"red","bg":"blue"}"#).unwrap();
        source.set_attribute(node, "border", "line").unwrap();
        source
            .set_style_property(node, json!({"bg": "green"}).as_object().cloned().unwrap_or_default())
            .unwrap();
        source
            .set_live_style(
                node,
                json!({"fg": "white", "border": {"fg": "yellow"}}).as_object().cloned(),
            )
            .unwrap();

        let props = compute_props(&source, node, &TargetKind::Box);
        assert_eq!(
            props.style,
            json!({"fg": "white", "bg": "green"}).as_object().cloned()
        );
        assert_eq!(
            props.border,
            json!({"type": "line", "fg": "yellow"}).as_object().cloned()
        );
        assert_eq!(props.content, None);
    }

    #[test]
    fn test_live_border_without_attribute_border() {
        let mut source = SourceTree::new();
        let node = source.create_element("box");
        source
            .set_live_style(node, json!({"border": {"type": "round", "fg": "cyan"}}).as_object().cloned())
            .unwrap();

        let props = compute_props(&source, node, &TargetKind::Box);
        assert_eq!(
            props.border,
            json!({"type": "round", "fg": "cyan"}).as_object().cloned()
        );
        assert_eq!(props.style, None);

        source
            .set_live_style(node, json!({"border": "double"}).as_object().cloned())
            .unwrap();
        let props = compute_props(&source, node, &TargetKind::Box);
        assert_eq!(props.border, json!({"type": "double"}).as_object().cloned());
    }

    #[test]
    fn test_compute_props_text_content() {
        let mut source = SourceTree::new();
        let label = source.create_element("text");
        let a = source.create_text("  Hello, ");
        let b = source.create_text("world  ");
        source.append_child(label, a).unwrap();
        source.append_child(label, b).unwrap();

        let props = compute_props(&source, label, &TargetKind::Text);
        assert_eq!(props.content.as_deref(), Some("Hello, world"));

        source.set_attribute(label, "content", "explicit").unwrap();
        let props = compute_props(&source, label, &TargetKind::Text);
        assert_eq!(props.content.as_deref(), Some("explicit"));
    }
}
