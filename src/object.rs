//! Drawable objects: the shapes a whiteboard holds and their partial edits.
//!
//! This module defines what is on the board (`DrawableObject`, `Shape`), the
//! open field map used for incremental edits (`ObjectPatch`), and the small
//! amount of geometry the gesture layer needs (size thresholds, translation,
//! hit testing).
//!
//! `Shape` serializes with a `type` discriminator and camelCase fields so the
//! JSON form is exactly what peers and the backend exchange.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ObjectError;

/// Sparse edit for an object. Present keys are merged over the object's JSON form.
pub type ObjectPatch = Map<String, Value>;

/// Keys a patch may never change.
const IMMUTABLE_KEYS: [&str; 2] = ["id", "type"];

/// Extra slack, in world units, when hit testing thin strokes.
const LINE_HIT_SLOP: f64 = 4.0;

/// A point in world coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Discriminant of a [`Shape`], used for ID prefixes and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Line,
    Text,
    StickyNote,
}

impl ShapeKind {
    /// Wire name of the kind, also used as the ID prefix.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Circle => "circle",
            Self::Line => "line",
            Self::Text => "text",
            Self::StickyNote => "sticky_note",
        }
    }
}

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry and style of a drawable object, one variant per shape kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    #[serde(rename_all = "camelCase")]
    Rectangle { x: f64, y: f64, width: f64, height: f64, stroke: String, stroke_width: f64, fill: String },
    #[serde(rename_all = "camelCase")]
    Circle { x: f64, y: f64, radius: f64, stroke: String, stroke_width: f64, fill: String },
    #[serde(rename_all = "camelCase")]
    Line { points: Vec<Point>, stroke: String, stroke_width: f64 },
    #[serde(rename_all = "camelCase")]
    Text { x: f64, y: f64, text: String, font_size: f64, font_family: String, fill: String },
    #[serde(rename_all = "camelCase")]
    StickyNote { x: f64, y: f64, width: f64, height: f64, text: String, fill: String, stroke: String },
}

impl Shape {
    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Rectangle { .. } => ShapeKind::Rectangle,
            Self::Circle { .. } => ShapeKind::Circle,
            Self::Line { .. } => ShapeKind::Line,
            Self::Text { .. } => ShapeKind::Text,
            Self::StickyNote { .. } => ShapeKind::StickyNote,
        }
    }
}

/// A single object on the board.
///
/// An object deserialized without an `id` gets an empty one; the store's
/// deduplication pass assigns a recovered ID before it is ever rendered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawableObject {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub shape: Shape,
}

impl DrawableObject {
    #[must_use]
    pub fn new(id: impl Into<String>, shape: Shape) -> Self {
        Self { id: id.into(), shape }
    }

    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        self.shape.kind()
    }

    /// Returns `true` if the object carries a usable identifier.
    #[must_use]
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Merge `patch` into this object.
    ///
    /// The merge goes through the JSON form, so a patch may touch any field of
    /// the variant. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::ImmutableField`] if the patch names `id` or
    /// `type`, and [`ObjectError::InvalidPatch`] if a value does not fit the
    /// variant's field types. The object is unchanged on error.
    pub fn apply_patch(&mut self, patch: &ObjectPatch) -> Result<(), ObjectError> {
        if let Some(key) = IMMUTABLE_KEYS.iter().find(|k| patch.contains_key(**k)) {
            return Err(ObjectError::ImmutableField { id: self.id.clone(), field: *key });
        }
        if patch.is_empty() {
            return Ok(());
        }

        let invalid = |e: serde_json::Error| ObjectError::InvalidPatch { id: self.id.clone(), reason: e.to_string() };
        let mut value = serde_json::to_value(&*self).map_err(invalid)?;
        if let Value::Object(fields) = &mut value {
            for (key, v) in patch {
                fields.insert(key.clone(), v.clone());
            }
        }
        let patched: DrawableObject = serde_json::from_value(value).map_err(invalid)?;
        *self = patched;
        Ok(())
    }

    /// Whether a freshly drawn shape is large enough to keep.
    ///
    /// Rectangles and sticky notes pass when either side exceeds `threshold`,
    /// circles when the radius does. Lines need two distinct points. Text is
    /// always kept.
    #[must_use]
    pub fn exceeds_min_size(&self, threshold: f64) -> bool {
        match &self.shape {
            Shape::Rectangle { width, height, .. } | Shape::StickyNote { width, height, .. } => {
                width.abs() > threshold || height.abs() > threshold
            }
            Shape::Circle { radius, .. } => *radius > threshold,
            Shape::Line { points, .. } => points
                .first()
                .is_some_and(|first| points.iter().any(|p| p != first)),
            Shape::Text { .. } => true,
        }
    }

    /// Flip negative rectangle extents so `x`/`y` name the top-left corner.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if let Shape::Rectangle { x, y, width, height, .. } | Shape::StickyNote { x, y, width, height, .. } =
            &mut self.shape
        {
            if *width < 0.0 {
                *x += *width;
                *width = -*width;
            }
            if *height < 0.0 {
                *y += *height;
                *height = -*height;
            }
        }
        if let Shape::Circle { radius, .. } = &mut self.shape {
            *radius = radius.abs();
        }
        self
    }

    /// Move the object by `(dx, dy)`.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        match &mut self.shape {
            Shape::Rectangle { x, y, .. }
            | Shape::Circle { x, y, .. }
            | Shape::Text { x, y, .. }
            | Shape::StickyNote { x, y, .. } => {
                *x += dx;
                *y += dy;
            }
            Shape::Line { points, .. } => {
                for p in points {
                    p.x += dx;
                    p.y += dy;
                }
            }
        }
    }

    /// Patch carrying only the object's position fields.
    #[must_use]
    pub fn position_patch(&self) -> ObjectPatch {
        let mut patch = ObjectPatch::new();
        match &self.shape {
            Shape::Rectangle { x, y, .. }
            | Shape::Circle { x, y, .. }
            | Shape::Text { x, y, .. }
            | Shape::StickyNote { x, y, .. } => {
                patch.insert("x".into(), Value::from(*x));
                patch.insert("y".into(), Value::from(*y));
            }
            Shape::Line { points, .. } => {
                patch.insert("points".into(), serde_json::to_value(points).unwrap_or(Value::Null));
            }
        }
        patch
    }

    /// Hit test in world coordinates. Text uses an approximate glyph box.
    #[must_use]
    pub fn contains_point(&self, p: Point) -> bool {
        match &self.shape {
            Shape::Rectangle { x, y, width, height, .. } | Shape::StickyNote { x, y, width, height, .. } => {
                in_box(p, *x, *y, *width, *height)
            }
            Shape::Circle { x, y, radius, .. } => p.distance_to(Point::new(*x, *y)) <= radius.abs(),
            Shape::Text { x, y, text, font_size, .. } => {
                #[allow(clippy::cast_precision_loss)]
                let width = text.chars().count() as f64 * font_size * 0.6;
                in_box(p, *x, *y, width, *font_size)
            }
            Shape::Line { points, stroke_width, .. } => {
                let reach = stroke_width / 2.0 + LINE_HIT_SLOP;
                match points.as_slice() {
                    [] => false,
                    [only] => p.distance_to(*only) <= reach,
                    _ => points
                        .windows(2)
                        .any(|seg| distance_to_segment(p, seg[0], seg[1]) <= reach),
                }
            }
        }
    }
}

fn in_box(p: Point, x: f64, y: f64, width: f64, height: f64) -> bool {
    let (left, right) = if width < 0.0 { (x + width, x) } else { (x, x + width) };
    let (top, bottom) = if height < 0.0 { (y + height, y) } else { (y, y + height) };
    p.x >= left && p.x <= right && p.y >= top && p.y <= bottom
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(Point::new(a.x + t * dx, a.y + t * dy))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "object_test.rs"]
mod tests;
