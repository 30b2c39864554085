use std::collections::HashSet;
use std::sync::Mutex;

use rand::Rng;
use serde_json::json;

use super::*;
use crate::ident::TimestampIds;
use crate::object::{Point, Shape};

fn circle(id: &str) -> DrawableObject {
    DrawableObject::new(
        id,
        Shape::Circle { x: 0.0, y: 0.0, radius: 10.0, stroke: "#000".into(), stroke_width: 1.0, fill: "none".into() },
    )
}

fn text(id: &str, body: &str) -> DrawableObject {
    DrawableObject::new(
        id,
        Shape::Text {
            x: 0.0,
            y: 0.0,
            text: body.into(),
            font_size: 16.0,
            font_family: "Arial".into(),
            fill: "#000".into(),
        },
    )
}

fn ids_of(objects: &[DrawableObject]) -> Vec<String> {
    objects.iter().map(|o| o.id.clone()).collect()
}

fn assert_unique(objects: &[DrawableObject]) {
    let unique: HashSet<&str> = objects.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(unique.len(), objects.len(), "duplicate ids in {:?}", ids_of(objects));
}

// =============================================================
// add / update / remove
// =============================================================

#[test]
fn add_inserts_new_object() {
    let mut store = ObjectStore::new();
    assert!(store.add(circle("c1")));
    assert_eq!(store.len(), 1);
    assert!(store.contains("c1"));
    assert_eq!(store.revision(), 1);
}

#[test]
fn add_duplicate_is_noop() {
    let mut store = ObjectStore::new();
    store.add(circle("c1"));
    let revision = store.revision();
    assert!(!store.add(text("c1", "other")));
    assert_eq!(store.len(), 1);
    assert_eq!(store.revision(), revision);
    assert_eq!(store.get("c1").unwrap().kind(), crate::object::ShapeKind::Circle);
}

#[test]
fn add_without_id_is_refused() {
    let mut store = ObjectStore::new();
    assert!(!store.add(circle("")));
    assert!(store.is_empty());
}

#[test]
fn update_merges_fields() {
    let mut store = ObjectStore::new();
    store.add(text("t1", "old"));
    let patch = json!({"text": "new"}).as_object().cloned().unwrap();
    assert!(store.update("t1", &patch).unwrap());
    assert!(matches!(&store.get("t1").unwrap().shape, Shape::Text { text, .. } if text == "new"));
}

#[test]
fn update_missing_is_noop() {
    let mut store = ObjectStore::new();
    let patch = json!({"x": 1.0}).as_object().cloned().unwrap();
    assert!(!store.update("nope", &patch).unwrap());
    assert_eq!(store.revision(), 0);
}

#[test]
fn remove_deletes_object() {
    let mut store = ObjectStore::new();
    store.add(circle("c1"));
    store.add(circle("c2"));
    let removed = store.remove("c1").unwrap();
    assert_eq!(removed.id, "c1");
    assert_eq!(ids_of(&store.to_vec()), vec!["c2"]);
    assert!(store.remove("c1").is_none());
    // Removed ids may be reused.
    assert!(store.add(circle("c1")));
}

#[test]
fn replace_keeps_draw_position() {
    let mut store = ObjectStore::new();
    store.add(circle("a"));
    store.add(circle("b"));
    assert!(store.replace(text("a", "now text")));
    assert_eq!(ids_of(&store.to_vec()), vec!["a", "b"]);
    assert!(!store.replace(text("zzz", "absent")));
}

#[test]
fn clear_empties_store() {
    let mut store = ObjectStore::new();
    store.add(circle("a"));
    store.add(circle("b"));
    assert_eq!(store.clear(), 2);
    assert!(store.is_empty());
    assert!(!store.contains("a"));
}

#[test]
fn hit_returns_topmost() {
    let mut store = ObjectStore::new();
    store.add(circle("bottom"));
    store.add(circle("top"));
    assert_eq!(store.hit(Point::new(1.0, 1.0)).unwrap().id, "top");
    assert!(store.hit(Point::new(50.0, 50.0)).is_none());
}

// =============================================================
// deduplicate
// =============================================================

#[test]
fn deduplicate_keeps_first_seen() {
    let ids = TimestampIds::new();
    let input = vec![text("a", "first"), circle("b"), text("a", "second"), circle("b")];
    let (out, report) = deduplicate(input, &ids);
    assert_eq!(ids_of(&out), vec!["a", "b"]);
    assert!(matches!(&out[0].shape, Shape::Text { text, .. } if text == "first"));
    assert_eq!(report.dropped, 2);
    assert!(report.recovered.is_empty());
}

#[test]
fn deduplicate_recovers_missing_ids() {
    let ids = TimestampIds::new();
    let (out, report) = deduplicate(vec![circle(""), circle(""), text("", "x")], &ids);
    assert_eq!(out.len(), 3);
    assert_unique(&out);
    assert!(out[0].id.starts_with("circle_recovered_"));
    assert!(out[2].id.starts_with("text_recovered_"));
    assert_eq!(report.recovered.len(), 3);
    assert_eq!(report.dropped, 0);
}

/// Hands out a fixed sequence of IDs.
struct ScriptedIds(Mutex<Vec<&'static str>>);

impl IdGenerator for ScriptedIds {
    fn generate(&self, _prefix: &str, _acting_user: Option<&str>) -> String {
        self.0.lock().unwrap().remove(0).to_owned()
    }
}

#[test]
fn recovered_id_never_shadows_a_later_object() {
    let ids = ScriptedIds(Mutex::new(vec!["b", "fresh"]));
    let (out, report) = deduplicate(vec![circle(""), text("b", "keep me")], &ids);
    assert_eq!(ids_of(&out), vec!["fresh", "b"]);
    assert!(matches!(&out[1].shape, Shape::Text { text, .. } if text == "keep me"));
    assert_eq!(report.recovered, vec!["fresh".to_owned()]);
    assert_eq!(report.dropped, 0);
}

#[test]
fn deduplicate_is_idempotent() {
    let ids = TimestampIds::new();
    let input = vec![circle("a"), circle(""), circle("a"), text("b", "x"), circle(""), text("b", "y")];
    let (once, _) = deduplicate(input, &ids);
    let (twice, report) = deduplicate(once.clone(), &ids);
    assert_eq!(once, twice);
    assert!(report.is_clean());
}

#[test]
fn store_dedupe_sweeps_in_place() {
    let ids = TimestampIds::new();
    let (mut store, report) = ObjectStore::from_objects(vec![circle("a"), circle("a"), circle("")], &ids);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.recovered.len(), 1);
    assert_eq!(store.len(), 2);

    let revision = store.revision();
    assert!(store.dedupe(&ids).is_clean());
    assert_eq!(store.revision(), revision);
}

#[test]
fn random_add_and_dedupe_sequences_stay_unique() {
    let ids = TimestampIds::new();
    let mut rng = rand::rng();
    let mut store = ObjectStore::new();

    for _ in 0..500 {
        match rng.random_range(0..4) {
            0 | 1 => {
                let id = format!("o{}", rng.random_range(0..20));
                store.add(circle(&id));
            }
            2 => {
                let id = format!("o{}", rng.random_range(0..20));
                store.remove(&id);
            }
            _ => {
                let mut batch = store.to_vec();
                batch.push(circle(&format!("o{}", rng.random_range(0..20))));
                batch.push(circle(""));
                store.replace_all(batch, &ids);
            }
        }
        assert_unique(&store.to_vec());
        assert_eq!(store.iter().count(), store.len());
    }
}
