#![allow(clippy::float_cmp)]

use serde_json::json;

use super::*;

fn rect(id: &str, width: f64, height: f64) -> DrawableObject {
    DrawableObject::new(
        id,
        Shape::Rectangle {
            x: 10.0,
            y: 20.0,
            width,
            height,
            stroke: "#000000".into(),
            stroke_width: 2.0,
            fill: "transparent".into(),
        },
    )
}

fn patch(value: serde_json::Value) -> ObjectPatch {
    value.as_object().cloned().unwrap()
}

// =============================================================
// serde
// =============================================================

#[test]
fn rectangle_serializes_with_type_tag() {
    let value = serde_json::to_value(rect("r1", 30.0, 40.0)).unwrap();
    assert_eq!(value["id"], "r1");
    assert_eq!(value["type"], "rectangle");
    assert_eq!(value["strokeWidth"], 2.0);
    assert_eq!(value["width"], 30.0);
}

#[test]
fn sticky_note_parses_from_wire() {
    let obj: DrawableObject = serde_json::from_value(json!({
        "id": "s1",
        "type": "sticky_note",
        "x": 1.0, "y": 2.0, "width": 150.0, "height": 150.0,
        "text": "todo", "fill": "#FFEB3B", "stroke": "#F57F17"
    }))
    .unwrap();
    assert_eq!(obj.kind(), ShapeKind::StickyNote);
    assert!(matches!(obj.shape, Shape::StickyNote { ref text, .. } if text == "todo"));
}

#[test]
fn line_points_parse_in_order() {
    let obj: DrawableObject = serde_json::from_value(json!({
        "id": "l1", "type": "line",
        "points": [{"x": 0.0, "y": 0.0}, {"x": 5.0, "y": 5.0}, {"x": 9.0, "y": 1.0}],
        "stroke": "#333", "strokeWidth": 3.0
    }))
    .unwrap();
    let Shape::Line { points, .. } = obj.shape else { panic!("expected line") };
    assert_eq!(points, vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0), Point::new(9.0, 1.0)]);
}

#[test]
fn missing_id_deserializes_empty() {
    let obj: DrawableObject = serde_json::from_value(json!({
        "type": "circle", "x": 0.0, "y": 0.0, "radius": 4.0,
        "stroke": "#000", "strokeWidth": 1.0, "fill": "none"
    }))
    .unwrap();
    assert!(!obj.has_id());
}

#[test]
fn unknown_type_is_rejected() {
    let result = serde_json::from_value::<DrawableObject>(json!({"id": "x", "type": "hexagon", "x": 0.0}));
    assert!(result.is_err());
}

#[test]
fn shape_kind_display_matches_wire_name() {
    assert_eq!(ShapeKind::StickyNote.to_string(), "sticky_note");
    assert_eq!(serde_json::to_value(ShapeKind::StickyNote).unwrap(), "sticky_note");
}

// =============================================================
// apply_patch
// =============================================================

#[test]
fn patch_merges_partial_fields() {
    let mut obj = rect("r1", 30.0, 40.0);
    obj.apply_patch(&patch(json!({"x": 99.0, "fill": "#FF0000"}))).unwrap();
    let Shape::Rectangle { x, y, fill, width, .. } = &obj.shape else { panic!("expected rectangle") };
    assert_eq!(*x, 99.0);
    assert_eq!(*y, 20.0);
    assert_eq!(fill, "#FF0000");
    assert_eq!(*width, 30.0);
}

#[test]
fn patch_rejects_id_change() {
    let mut obj = rect("r1", 30.0, 40.0);
    let err = obj.apply_patch(&patch(json!({"id": "r2"}))).unwrap_err();
    assert!(matches!(err, ObjectError::ImmutableField { field: "id", .. }));
    assert_eq!(obj.id, "r1");
}

#[test]
fn patch_rejects_type_change() {
    let mut obj = rect("r1", 30.0, 40.0);
    let err = obj.apply_patch(&patch(json!({"type": "circle"}))).unwrap_err();
    assert!(matches!(err, ObjectError::ImmutableField { field: "type", .. }));
}

#[test]
fn ill_typed_patch_leaves_object_unchanged() {
    let mut obj = rect("r1", 30.0, 40.0);
    let before = obj.clone();
    let err = obj.apply_patch(&patch(json!({"width": "wide"}))).unwrap_err();
    assert!(matches!(err, ObjectError::InvalidPatch { .. }));
    assert_eq!(obj, before);
}

#[test]
fn unknown_patch_keys_are_ignored() {
    let mut obj = rect("r1", 30.0, 40.0);
    let before = obj.clone();
    obj.apply_patch(&patch(json!({"rotation": 45.0}))).unwrap();
    assert_eq!(obj, before);
}

// =============================================================
// geometry
// =============================================================

#[test]
fn size_threshold_rejects_small_rectangle() {
    assert!(!rect("r", 3.0, 2.0).exceeds_min_size(5.0));
    assert!(!rect("r", -5.0, 5.0).exceeds_min_size(5.0));
    assert!(rect("r", 6.0, 0.0).exceeds_min_size(5.0));
    assert!(rect("r", 1.0, -8.0).exceeds_min_size(5.0));
}

#[test]
fn size_threshold_on_circle_radius() {
    let small = DrawableObject::new(
        "c",
        Shape::Circle { x: 0.0, y: 0.0, radius: 5.0, stroke: String::new(), stroke_width: 1.0, fill: String::new() },
    );
    assert!(!small.exceeds_min_size(5.0));
    let mut big = small.clone();
    big.apply_patch(&patch(json!({"radius": 5.5}))).unwrap();
    assert!(big.exceeds_min_size(5.0));
}

#[test]
fn line_needs_two_distinct_points() {
    let line = |points: Vec<Point>| {
        DrawableObject::new("l", Shape::Line { points, stroke: String::new(), stroke_width: 1.0 })
    };
    assert!(!line(vec![]).exceeds_min_size(5.0));
    assert!(!line(vec![Point::new(1.0, 1.0), Point::new(1.0, 1.0)]).exceeds_min_size(5.0));
    assert!(line(vec![Point::new(1.0, 1.0), Point::new(2.0, 1.0)]).exceeds_min_size(5.0));
}

#[test]
fn normalized_flips_negative_extents() {
    let obj = rect("r", -30.0, -40.0).normalized();
    let Shape::Rectangle { x, y, width, height, .. } = obj.shape else { panic!("expected rectangle") };
    assert_eq!((x, y, width, height), (-20.0, -20.0, 30.0, 40.0));
}

#[test]
fn translate_moves_line_points() {
    let mut obj = DrawableObject::new(
        "l",
        Shape::Line { points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)], stroke: String::new(), stroke_width: 2.0 },
    );
    obj.translate(5.0, -1.0);
    let patch = obj.position_patch();
    assert_eq!(patch["points"], json!([{"x": 5.0, "y": -1.0}, {"x": 15.0, "y": -1.0}]));
}

#[test]
fn position_patch_for_boxed_shapes() {
    let mut obj = rect("r", 30.0, 40.0);
    obj.translate(1.0, 2.0);
    let patch = obj.position_patch();
    assert_eq!(patch.len(), 2);
    assert_eq!(patch["x"], 11.0);
    assert_eq!(patch["y"], 22.0);
}

#[test]
fn hit_testing() {
    let r = rect("r", 30.0, 40.0);
    assert!(r.contains_point(Point::new(15.0, 25.0)));
    assert!(!r.contains_point(Point::new(45.0, 25.0)));

    let c = DrawableObject::new(
        "c",
        Shape::Circle { x: 0.0, y: 0.0, radius: 10.0, stroke: String::new(), stroke_width: 1.0, fill: String::new() },
    );
    assert!(c.contains_point(Point::new(6.0, 6.0)));
    assert!(!c.contains_point(Point::new(8.0, 8.0)));

    let l = DrawableObject::new(
        "l",
        Shape::Line { points: vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)], stroke: String::new(), stroke_width: 2.0 },
    );
    assert!(l.contains_point(Point::new(50.0, 4.0)));
    assert!(!l.contains_point(Point::new(50.0, 10.0)));
}
