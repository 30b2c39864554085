//! Object store: the client-local source of truth for what is drawn.
//!
//! DESIGN
//! ======
//! Objects live in a `Vec` so draw order is insertion order, with a
//! `HashSet` of IDs alongside for constant-time duplicate checks. The store
//! is owned by exactly one session task; nothing here is synchronized.
//!
//! Every mutation bumps `revision`, which the session uses to decide when a
//! new snapshot must be published for rendering.
//!
//! `deduplicate` is also exposed as a free function because the load path
//! repairs collections before they ever become a store.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::ObjectError;
use crate::ident::IdGenerator;
use crate::object::{DrawableObject, ObjectPatch};

/// What a deduplication sweep changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DedupeReport {
    /// IDs synthesized for objects that arrived without one.
    pub recovered: Vec<String>,
    /// Number of objects dropped because their ID repeated an earlier one.
    pub dropped: usize,
}

impl DedupeReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.recovered.is_empty() && self.dropped == 0
    }
}

#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: Vec<DrawableObject>,
    ids: HashSet<String>,
    revision: u64,
}

impl ObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a loaded collection, repairing it first.
    #[must_use]
    pub fn from_objects(objects: Vec<DrawableObject>, ids: &dyn IdGenerator) -> (Self, DedupeReport) {
        let mut store = Self::new();
        let report = store.replace_all(objects, ids);
        (store, report)
    }

    /// Insert `object` unless its ID is already present.
    ///
    /// Returns `false` for duplicates and for objects without an ID; neither
    /// changes the store.
    pub fn add(&mut self, object: DrawableObject) -> bool {
        if !object.has_id() {
            warn!(kind = %object.kind(), "refusing object without id");
            return false;
        }
        if self.ids.contains(&object.id) {
            debug!(id = %object.id, "duplicate add ignored");
            return false;
        }
        self.ids.insert(object.id.clone());
        self.objects.push(object);
        self.bump();
        true
    }

    /// Replace the object with the same ID, keeping its draw position.
    /// Returns `false` if no such object exists.
    pub fn replace(&mut self, object: DrawableObject) -> bool {
        let Some(slot) = self.objects.iter_mut().find(|o| o.id == object.id) else {
            return false;
        };
        if *slot != object {
            *slot = object;
            self.bump();
        }
        true
    }

    /// Merge `patch` into the object with `id`.
    ///
    /// Returns `Ok(false)` if no such object exists.
    ///
    /// # Errors
    ///
    /// Propagates [`ObjectError`] from [`DrawableObject::apply_patch`]; the
    /// object is left unchanged.
    pub fn update(&mut self, id: &str, patch: &ObjectPatch) -> Result<bool, ObjectError> {
        let Some(obj) = self.objects.iter_mut().find(|o| o.id == id) else {
            return Ok(false);
        };
        obj.apply_patch(patch)?;
        self.bump();
        Ok(true)
    }

    /// Remove the object with `id`, returning it if present.
    pub fn remove(&mut self, id: &str) -> Option<DrawableObject> {
        if !self.ids.remove(id) {
            return None;
        }
        let pos = self.objects.iter().position(|o| o.id == id)?;
        self.bump();
        Some(self.objects.remove(pos))
    }

    /// Remove every object. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.objects.len();
        self.objects.clear();
        self.ids.clear();
        self.bump();
        removed
    }

    /// Replace the whole collection with a repaired copy of `objects`.
    pub fn replace_all(&mut self, objects: Vec<DrawableObject>, ids: &dyn IdGenerator) -> DedupeReport {
        let (objects, report) = deduplicate(objects, ids);
        self.ids = objects.iter().map(|o| o.id.clone()).collect();
        self.objects = objects;
        self.bump();
        report
    }

    /// Self-healing sweep: repair missing IDs and drop repeated ones in place.
    pub fn dedupe(&mut self, ids: &dyn IdGenerator) -> DedupeReport {
        let (objects, report) = deduplicate(std::mem::take(&mut self.objects), ids);
        self.objects = objects;
        if !report.is_clean() {
            self.ids = self.objects.iter().map(|o| o.id.clone()).collect();
            self.bump();
        }
        report
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&DrawableObject> {
        if !self.ids.contains(id) {
            return None;
        }
        self.objects.iter().find(|o| o.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Topmost object under `point`, if any.
    #[must_use]
    pub fn hit(&self, point: crate::object::Point) -> Option<&DrawableObject> {
        self.objects.iter().rev().find(|o| o.contains_point(point))
    }

    /// Objects in draw order.
    pub fn iter(&self) -> impl Iterator<Item = &DrawableObject> {
        self.objects.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<DrawableObject> {
        self.objects.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Monotonic change counter.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Append without the duplicate check, to seed corrupted state.
    #[cfg(test)]
    pub(crate) fn push_unchecked(&mut self, object: DrawableObject) {
        self.ids.insert(object.id.clone());
        self.objects.push(object);
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

/// Filtered copy of `objects` in first-seen order with unique IDs.
///
/// Objects without an ID first receive `{type}_recovered_...` from `ids`, so
/// no two objects in the result ever share an identity. Applying this to its
/// own output changes nothing.
#[must_use]
pub fn deduplicate(objects: Vec<DrawableObject>, ids: &dyn IdGenerator) -> (Vec<DrawableObject>, DedupeReport) {
    let mut report = DedupeReport::default();
    let present: HashSet<String> = objects.iter().filter(|o| o.has_id()).map(|o| o.id.clone()).collect();
    let mut seen = HashSet::with_capacity(objects.len());
    let mut kept = Vec::with_capacity(objects.len());

    for mut obj in objects {
        if !obj.has_id() {
            // A generated ID must not shadow any ID in the input, including
            // ones not reached yet.
            loop {
                let id = ids.generate(&format!("{}_recovered", obj.kind()), None);
                if !seen.contains(&id) && !present.contains(&id) {
                    obj.id = id;
                    break;
                }
            }
            warn!(id = %obj.id, kind = %obj.kind(), "recovered object without id");
            report.recovered.push(obj.id.clone());
        }
        if seen.insert(obj.id.clone()) {
            kept.push(obj);
        } else {
            debug!(id = %obj.id, "dropping duplicate object");
            report.dropped += 1;
        }
    }

    (kept, report)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
