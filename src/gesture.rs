//! Pointer gestures: turning down/move/up sequences into objects.
//!
//! DESIGN
//! ======
//! Drag-out shapes (rectangle, circle) and freehand lines live in a local
//! draft while the pointer is down: every move reshapes the draft, nothing
//! is broadcast or persisted. On release the draft is normalized and handed
//! back for creation, or discarded if it is too small to be intentional.
//!
//! Text and sticky notes are placed on pointer-down. The select tool drags an
//! existing object in the store locally and reports one move on release; a
//! cancelled drag puts the object back.
//!
//! This module owns no I/O; the session decides what to do with each
//! [`GestureEvent`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::object::{DrawableObject, ObjectPatch, Point, Shape, ShapeKind};
use crate::store::ObjectStore;

const STICKY_NOTE_SIZE: f64 = 150.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Select,
    Rectangle,
    Circle,
    Line,
    Text,
    StickyNote,
}

/// Style applied to newly drawn objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawStyle {
    pub stroke: String,
    pub stroke_width: f64,
    pub fill: String,
    pub font_size: f64,
    pub font_family: String,
    pub sticky_fill: String,
    pub sticky_stroke: String,
    /// Initial content of text and sticky-note objects.
    pub default_text: String,
}

impl Default for DrawStyle {
    fn default() -> Self {
        Self {
            stroke: "#000000".into(),
            stroke_width: 2.0,
            fill: "transparent".into(),
            font_size: 16.0,
            font_family: "Arial".into(),
            sticky_fill: "#FFEB3B".into(),
            sticky_stroke: "#F57F17".into(),
            default_text: "Text".into(),
        }
    }
}

/// What a gesture step asks the session to do.
#[derive(Clone, Debug, PartialEq)]
pub enum GestureEvent {
    /// Nothing to persist.
    None,
    /// A finished object to create.
    Create(DrawableObject),
    /// An existing object finished moving.
    Move { id: String, patch: ObjectPatch },
}

#[derive(Debug, Default)]
enum Gesture {
    #[default]
    Idle,
    Drawing {
        origin: Point,
        draft: DrawableObject,
    },
    Dragging {
        id: String,
        origin: Point,
        last: Point,
        moved: bool,
    },
}

#[derive(Debug, Default)]
pub struct GestureState {
    gesture: Gesture,
}

impl GestureState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True between pointer-down and pointer-up of a draw or drag.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self.gesture, Gesture::Idle)
    }

    /// The in-progress shape, for rendering.
    #[must_use]
    pub fn draft(&self) -> Option<&DrawableObject> {
        match &self.gesture {
            Gesture::Drawing { draft, .. } => Some(draft),
            _ => None,
        }
    }

    /// Start a gesture. `id` names the object a drawing tool would create.
    ///
    /// A new pointer-down while a gesture is active abandons the old one,
    /// putting a dragged object back where it started.
    pub fn pointer_down(
        &mut self,
        tool: Tool,
        at: Point,
        style: &DrawStyle,
        id: String,
        store: &mut ObjectStore,
    ) -> GestureEvent {
        if self.is_active() {
            debug!("pointer down during active gesture, abandoning it");
        }
        self.cancel(store);

        match tool {
            Tool::Select => {
                if let Some(hit) = store.hit(at) {
                    self.gesture = Gesture::Dragging { id: hit.id.clone(), origin: at, last: at, moved: false };
                }
                GestureEvent::None
            }
            Tool::Rectangle | Tool::Circle | Tool::Line => {
                self.gesture = Gesture::Drawing { origin: at, draft: new_draft(tool, at, style, id) };
                GestureEvent::None
            }
            Tool::Text => GestureEvent::Create(DrawableObject::new(
                id,
                Shape::Text {
                    x: at.x,
                    y: at.y,
                    text: style.default_text.clone(),
                    font_size: style.font_size,
                    font_family: style.font_family.clone(),
                    fill: style.stroke.clone(),
                },
            )),
            Tool::StickyNote => GestureEvent::Create(DrawableObject::new(
                id,
                Shape::StickyNote {
                    x: at.x,
                    y: at.y,
                    width: STICKY_NOTE_SIZE,
                    height: STICKY_NOTE_SIZE,
                    text: style.default_text.clone(),
                    fill: style.sticky_fill.clone(),
                    stroke: style.sticky_stroke.clone(),
                },
            )),
        }
    }

    /// Advance the gesture. Drags move the store object in place.
    pub fn pointer_move(&mut self, at: Point, store: &mut ObjectStore) {
        match &mut self.gesture {
            Gesture::Idle => {}
            Gesture::Drawing { origin, draft } => reshape(draft, *origin, at),
            Gesture::Dragging { id, last, moved, .. } => {
                let (dx, dy) = (at.x - last.x, at.y - last.y);
                *last = at;
                if dx == 0.0 && dy == 0.0 {
                    return;
                }
                let Some(mut obj) = store.get(id).cloned() else {
                    // Deleted under us by a peer.
                    self.gesture = Gesture::Idle;
                    return;
                };
                obj.translate(dx, dy);
                store.replace(obj);
                *moved = true;
            }
        }
    }

    /// Finish the gesture.
    pub fn pointer_up(&mut self, min_size: f64, store: &ObjectStore) -> GestureEvent {
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => GestureEvent::None,
            Gesture::Drawing { draft, .. } => {
                let draft = draft.normalized();
                if draft.exceeds_min_size(min_size) {
                    GestureEvent::Create(draft)
                } else {
                    debug!(kind = %draft.kind(), "discarding undersized shape");
                    GestureEvent::None
                }
            }
            Gesture::Dragging { id, moved, .. } => {
                if !moved {
                    return GestureEvent::None;
                }
                match store.get(&id) {
                    Some(obj) => GestureEvent::Move { patch: obj.position_patch(), id },
                    None => GestureEvent::None,
                }
            }
        }
    }

    /// Drop any draft without persisting. A dragged object is moved back to
    /// where the drag started.
    pub fn cancel(&mut self, store: &mut ObjectStore) {
        if let Gesture::Dragging { id, origin, last, moved: true } = std::mem::take(&mut self.gesture)
            && let Some(mut obj) = store.get(&id).cloned()
        {
            obj.translate(origin.x - last.x, origin.y - last.y);
            store.replace(obj);
            debug!(%id, "drag cancelled, object restored");
        }
    }
}

/// Shape kind a drawing tool produces.
#[must_use]
pub fn tool_kind(tool: Tool) -> Option<ShapeKind> {
    match tool {
        Tool::Select => None,
        Tool::Rectangle => Some(ShapeKind::Rectangle),
        Tool::Circle => Some(ShapeKind::Circle),
        Tool::Line => Some(ShapeKind::Line),
        Tool::Text => Some(ShapeKind::Text),
        Tool::StickyNote => Some(ShapeKind::StickyNote),
    }
}

fn new_draft(tool: Tool, at: Point, style: &DrawStyle, id: String) -> DrawableObject {
    let shape = match tool {
        Tool::Circle => Shape::Circle {
            x: at.x,
            y: at.y,
            radius: 0.0,
            stroke: style.stroke.clone(),
            stroke_width: style.stroke_width,
            fill: style.fill.clone(),
        },
        Tool::Line => Shape::Line { points: vec![at], stroke: style.stroke.clone(), stroke_width: style.stroke_width },
        _ => Shape::Rectangle {
            x: at.x,
            y: at.y,
            width: 0.0,
            height: 0.0,
            stroke: style.stroke.clone(),
            stroke_width: style.stroke_width,
            fill: style.fill.clone(),
        },
    };
    DrawableObject::new(id, shape)
}

fn reshape(draft: &mut DrawableObject, origin: Point, at: Point) {
    match &mut draft.shape {
        Shape::Rectangle { width, height, .. } => {
            *width = at.x - origin.x;
            *height = at.y - origin.y;
        }
        Shape::Circle { radius, .. } => {
            *radius = origin.distance_to(at);
        }
        Shape::Line { points, .. } => {
            if points.last() != Some(&at) {
                points.push(at);
            }
        }
        Shape::Text { .. } | Shape::StickyNote { .. } => {}
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "gesture_test.rs"]
mod tests;
