#![allow(clippy::float_cmp)]

use super::*;

const MIN: f64 = 5.0;

fn down(state: &mut GestureState, tool: Tool, x: f64, y: f64, store: &mut ObjectStore) -> GestureEvent {
    state.pointer_down(tool, Point::new(x, y), &DrawStyle::default(), "new_1".into(), store)
}

fn rect_store() -> ObjectStore {
    let mut store = ObjectStore::new();
    store.add(DrawableObject::new(
        "r1",
        Shape::Rectangle {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 50.0,
            stroke: "#000".into(),
            stroke_width: 1.0,
            fill: "none".into(),
        },
    ));
    store
}

#[test]
fn rectangle_drag_commits_normalized_shape() {
    let mut store = ObjectStore::new();
    let mut state = GestureState::new();
    assert_eq!(down(&mut state, Tool::Rectangle, 100.0, 100.0, &mut store), GestureEvent::None);
    state.pointer_move(Point::new(80.0, 90.0), &mut store);
    state.pointer_move(Point::new(60.0, 70.0), &mut store);
    assert!(state.draft().is_some());
    assert!(store.is_empty());

    let GestureEvent::Create(obj) = state.pointer_up(MIN, &store) else { panic!("expected create") };
    assert_eq!(obj.id, "new_1");
    let Shape::Rectangle { x, y, width, height, .. } = obj.shape else { panic!("expected rectangle") };
    assert_eq!((x, y, width, height), (60.0, 70.0, 40.0, 30.0));
    assert!(!state.is_active());
}

#[test]
fn tiny_rectangle_is_discarded() {
    let mut store = ObjectStore::new();
    let mut state = GestureState::new();
    down(&mut state, Tool::Rectangle, 10.0, 10.0, &mut store);
    state.pointer_move(Point::new(13.0, 14.0), &mut store);
    assert_eq!(state.pointer_up(MIN, &store), GestureEvent::None);
}

#[test]
fn thin_rectangle_passes_on_one_side() {
    let mut store = ObjectStore::new();
    let mut state = GestureState::new();
    down(&mut state, Tool::Rectangle, 0.0, 0.0, &mut store);
    state.pointer_move(Point::new(50.0, 2.0), &mut store);
    assert!(matches!(state.pointer_up(MIN, &store), GestureEvent::Create(_)));
}

#[test]
fn circle_radius_follows_pointer() {
    let mut store = ObjectStore::new();
    let mut state = GestureState::new();
    down(&mut state, Tool::Circle, 0.0, 0.0, &mut store);
    state.pointer_move(Point::new(30.0, 40.0), &mut store);
    let GestureEvent::Create(obj) = state.pointer_up(MIN, &store) else { panic!("expected create") };
    let Shape::Circle { x, y, radius, .. } = obj.shape else { panic!("expected circle") };
    assert_eq!((x, y, radius), (0.0, 0.0, 50.0));
}

#[test]
fn line_collects_distinct_points() {
    let mut store = ObjectStore::new();
    let mut state = GestureState::new();
    down(&mut state, Tool::Line, 0.0, 0.0, &mut store);
    state.pointer_move(Point::new(0.0, 0.0), &mut store);
    state.pointer_move(Point::new(10.0, 0.0), &mut store);
    state.pointer_move(Point::new(10.0, 10.0), &mut store);
    let GestureEvent::Create(obj) = state.pointer_up(MIN, &store) else { panic!("expected create") };
    let Shape::Line { points, .. } = obj.shape else { panic!("expected line") };
    assert_eq!(points.len(), 3);
}

#[test]
fn click_with_line_tool_is_discarded() {
    let mut store = ObjectStore::new();
    let mut state = GestureState::new();
    down(&mut state, Tool::Line, 5.0, 5.0, &mut store);
    assert_eq!(state.pointer_up(MIN, &store), GestureEvent::None);
}

#[test]
fn text_and_sticky_create_on_pointer_down() {
    let mut store = ObjectStore::new();
    let mut state = GestureState::new();
    let GestureEvent::Create(text) = down(&mut state, Tool::Text, 1.0, 2.0, &mut store) else {
        panic!("expected text create")
    };
    assert_eq!(text.kind(), ShapeKind::Text);
    assert!(!state.is_active());

    let GestureEvent::Create(note) = down(&mut state, Tool::StickyNote, 1.0, 2.0, &mut store) else {
        panic!("expected sticky create")
    };
    let Shape::StickyNote { width, fill, .. } = note.shape else { panic!("expected sticky note") };
    assert_eq!(width, STICKY_NOTE_SIZE);
    assert_eq!(fill, DrawStyle::default().sticky_fill);
}

#[test]
fn select_drag_moves_locally_and_reports_once() {
    let mut store = rect_store();
    let mut state = GestureState::new();
    down(&mut state, Tool::Select, 10.0, 10.0, &mut store);
    assert!(state.is_active());
    state.pointer_move(Point::new(15.0, 10.0), &mut store);
    state.pointer_move(Point::new(20.0, 30.0), &mut store);

    let Shape::Rectangle { x, y, .. } = store.get("r1").unwrap().shape.clone() else { panic!("expected rectangle") };
    assert_eq!((x, y), (10.0, 20.0));

    let GestureEvent::Move { id, patch } = state.pointer_up(MIN, &store) else { panic!("expected move") };
    assert_eq!(id, "r1");
    assert_eq!(patch["x"], 10.0);
    assert_eq!(patch["y"], 20.0);
}

#[test]
fn select_click_without_motion_reports_nothing() {
    let mut store = rect_store();
    let mut state = GestureState::new();
    down(&mut state, Tool::Select, 10.0, 10.0, &mut store);
    state.pointer_move(Point::new(10.0, 10.0), &mut store);
    assert_eq!(state.pointer_up(MIN, &store), GestureEvent::None);
}

#[test]
fn select_on_empty_canvas_is_idle() {
    let mut store = rect_store();
    let mut state = GestureState::new();
    down(&mut state, Tool::Select, 500.0, 500.0, &mut store);
    assert!(!state.is_active());
}

#[test]
fn drag_of_deleted_object_ends_quietly() {
    let mut store = rect_store();
    let mut state = GestureState::new();
    down(&mut state, Tool::Select, 10.0, 10.0, &mut store);
    store.remove("r1");
    state.pointer_move(Point::new(40.0, 40.0), &mut store);
    assert!(!state.is_active());
    assert_eq!(state.pointer_up(MIN, &store), GestureEvent::None);
}

#[test]
fn cancel_drops_draft() {
    let mut store = ObjectStore::new();
    let mut state = GestureState::new();
    down(&mut state, Tool::Rectangle, 0.0, 0.0, &mut store);
    state.pointer_move(Point::new(100.0, 100.0), &mut store);
    state.cancel(&mut store);
    assert!(state.draft().is_none());
    assert_eq!(state.pointer_up(MIN, &store), GestureEvent::None);
}

fn rect_position(store: &ObjectStore) -> (f64, f64) {
    let Shape::Rectangle { x, y, .. } = store.get("r1").unwrap().shape.clone() else { panic!("expected rectangle") };
    (x, y)
}

#[test]
fn cancelled_drag_restores_position() {
    let mut store = rect_store();
    let mut state = GestureState::new();
    down(&mut state, Tool::Select, 10.0, 10.0, &mut store);
    state.pointer_move(Point::new(30.0, 20.0), &mut store);
    state.pointer_move(Point::new(60.0, 60.0), &mut store);
    assert_eq!(rect_position(&store), (50.0, 50.0));

    state.cancel(&mut store);
    assert_eq!(rect_position(&store), (0.0, 0.0));
    assert!(!state.is_active());
    assert_eq!(state.pointer_up(MIN, &store), GestureEvent::None);
}

#[test]
fn new_pointer_down_abandons_drag_in_place() {
    let mut store = rect_store();
    let mut state = GestureState::new();
    down(&mut state, Tool::Select, 10.0, 10.0, &mut store);
    state.pointer_move(Point::new(20.0, 25.0), &mut store);
    assert_eq!(rect_position(&store), (10.0, 15.0));

    down(&mut state, Tool::Rectangle, 300.0, 300.0, &mut store);
    assert_eq!(rect_position(&store), (0.0, 0.0));
    assert!(state.draft().is_some());
}

#[test]
fn tool_kinds() {
    assert_eq!(tool_kind(Tool::Select), None);
    assert_eq!(tool_kind(Tool::StickyNote), Some(ShapeKind::StickyNote));
}
