//! Core types for spark-tui-bridge.
//!
//! Identifiers for both trees, render priorities, target widget kinds and
//! the dimension value carried by positional props. Everything else builds
//! on these.

use std::fmt;

use serde_json::Value;

// =============================================================================
// Identifiers
// =============================================================================

/// Identity of a node in the source tree.
///
/// Stamped from a monotonic counter when the node is created and never
/// reused, so a stale id can only miss, never alias another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    /// Raw counter value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identity of a node in the target (widget) tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u64);

impl TargetId {
    /// Raw counter value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Opaque handle to a live widget owned by a [`WidgetBackend`](crate::renderer::WidgetBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetHandle(pub u64);

impl fmt::Display for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Key under which render work is queued.
///
/// Usually the string form of a [`TargetId`], but hosts may queue work under
/// any name (`"screen"`, `"clock"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<TargetId> for ElementId {
    fn from(value: TargetId) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// Render Priority
// =============================================================================

/// Render urgency tier. Declaration order is drain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Priority {
    Immediate = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl Priority {
    /// All tiers, most urgent first.
    pub const ALL: [Priority; 4] = [
        Priority::Immediate,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Tier slot in a 4-element array.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// True when `self` drains before `other`.
    #[inline]
    pub fn is_more_urgent_than(self, other: Priority) -> bool {
        (self as u8) < (other as u8)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::Immediate => "immediate",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Target Kinds
// =============================================================================

/// Kind of widget a target node maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Box,
    Text,
    Button,
    Input,
    Textarea,
    List,
    /// Any tag without a dedicated widget. Drawn as a plain container.
    Element(String),
}

impl TargetKind {
    /// Map a source tag name to a widget kind.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "box" | "div" | "section" | "main" => TargetKind::Box,
            "text" | "span" | "p" | "label" => TargetKind::Text,
            "button" => TargetKind::Button,
            "input" => TargetKind::Input,
            "textarea" => TargetKind::Textarea,
            "list" | "ul" | "ol" => TargetKind::List,
            _ => TargetKind::Element(tag.to_string()),
        }
    }

    /// Kinds whose text children collapse into a single `content` prop.
    #[inline]
    pub fn is_text_bearing(&self) -> bool {
        matches!(self, TargetKind::Text | TargetKind::Button)
    }

    pub fn name(&self) -> &str {
        match self {
            TargetKind::Box => "box",
            TargetKind::Text => "text",
            TargetKind::Button => "button",
            TargetKind::Input => "input",
            TargetKind::Textarea => "textarea",
            TargetKind::List => "list",
            TargetKind::Element(tag) => tag,
        }
    }
}

// =============================================================================
// Dimension
// =============================================================================

/// Value of a positional prop (`width`, `height`, `top`, `left`, `right`, `bottom`).
///
/// A string only becomes [`Dimension::Cells`] when it is the exact textual
/// form of an integer: `"42"` is cells, `"42.0"`, `"+42"` and `"042"` stay raw
/// strings for the backend to interpret (percentages, `"shrink"`, ...).
///
/// ```
/// use spark_tui_bridge::types::Dimension;
///
/// assert_eq!(Dimension::parse("42"), Dimension::Cells(42));
/// assert_eq!(Dimension::parse("42.0"), Dimension::Raw("42.0".into()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Dimension {
    /// Absolute size or offset in terminal cells.
    Cells(i64),
    /// Anything else, passed through untouched.
    Raw(String),
}

impl Dimension {
    /// Parse an attribute string with exact integer round-trip.
    pub fn parse(value: &str) -> Self {
        match value.parse::<i64>() {
            Ok(n) if n.to_string() == value => Dimension::Cells(n),
            _ => Dimension::Raw(value.to_string()),
        }
    }

    /// Cell count, if this is a numeric dimension.
    pub fn cells(&self) -> Option<i64> {
        match self {
            Dimension::Cells(n) => Some(*n),
            Dimension::Raw(_) => None,
        }
    }

    /// Build from a JSON value (live style overrides arrive as JSON).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Dimension::Cells),
            Value::String(s) => Some(Dimension::parse(s)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Dimension::Cells(n) => Value::from(*n),
            Dimension::Raw(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for Dimension {
    fn from(value: i64) -> Self {
        Dimension::Cells(value)
    }
}
