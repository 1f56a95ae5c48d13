//! `AttributeManager`: a `name -> Attribute` map plus the reconfiguration
//! algorithm that builds the next manager from the current one and a new
//! schema (spec §4.2).
//!
//! Attributes are held behind `Arc<Mutex<Attribute>>` rather than by
//! value so that "the new manager reuses the *same* attribute instance"
//! (spec §8, scenario S2) is a literal `Arc::ptr_eq`, and so the
//! `AttributeWriter`'s per-lane executors (spec §4.2/§5) can each lock
//! just the attributes pinned to their lane without touching the rest of
//! the map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::schema::Schema;

use super::flush::FlushTask;
use super::{create_attribute, Attribute};

pub type AttributeHandle = Arc<Mutex<Attribute>>;

#[derive(Default)]
pub struct AttributeManager {
    attributes: IndexMap<String, AttributeHandle>,
    /// Synthetic, non-persisted attributes transferred unconditionally
    /// across reconfigs (spec §4.2 step 4).
    extra: IndexMap<String, AttributeHandle>,
}

impl AttributeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeHandle> {
        self.attributes.get(name).or_else(|| self.extra.get(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, attribute: Attribute) {
        self.attributes.insert(name.into(), Arc::new(Mutex::new(attribute)));
    }

    pub fn insert_extra(&mut self, name: impl Into<String>, attribute: Attribute) {
        self.extra.insert(name.into(), Arc::new(Mutex::new(attribute)));
    }

    /// Drops an attribute outright, independent of the reconfigure
    /// algorithm — used by `WipeOldRemovedFields` (spec §4.4), which
    /// discards columns for fields whose schema timestamp is old enough
    /// to wipe rather than waiting for the next full reconfigure.
    pub fn remove(&mut self, name: &str) -> Option<AttributeHandle> {
        self.attributes.shift_remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeHandle)> {
        self.attributes.iter().map(|(n, a)| (n.as_str(), a))
    }

    /// Per-attribute flush target lookup (spec §4.2 "Flush target"): asks
    /// each attribute whether a flush at `current_serial` is needed and
    /// collects the resulting tasks.
    pub fn flush_targets(&self, dir: &Path, current_serial: u64) -> Vec<(String, FlushTask)> {
        let mut out = Vec::new();
        for (name, handle) in &self.attributes {
            let attr = handle.lock().unwrap();
            if let Some(task) = attr.init_flush(dir.join(name), current_serial) {
                out.push((name.clone(), task));
            }
        }
        out
    }

    /// Runs the reconfiguration algorithm of spec §4.2 against `new_spec`,
    /// consuming `self` (the "current" manager) and producing the "next"
    /// manager.
    ///
    /// `doc_id_limit` is `newSpec.docIdLimit`: reused attributes with
    /// fewer docs are padded up to it and committed at `new_serial`
    /// (spec "Padding"). `flush_dir` is where a dropped-but-unflushed
    /// attribute's final flush is written before it is discarded.
    pub fn reconfigure(
        mut self,
        new_spec: &Schema,
        doc_id_limit: u32,
        new_serial: u64,
        flush_dir: &Path,
        parallel: bool,
    ) -> (AttributeManager, Vec<FlushTask>) {
        let mut next = AttributeManager::new();
        let mut to_create = Vec::new();
        let mut pending_flushes = Vec::new();

        // Step 1: transfer or mark for creation.
        for field in new_spec.attribute_fields() {
            if let Some(handle) = self.attributes.shift_remove(&field.name) {
                {
                    let mut attr = handle.lock().unwrap();
                    if attr.num_docs() < doc_id_limit {
                        attr.pad_to(doc_id_limit);
                        attr.commit(new_serial);
                    }
                }
                next.attributes.insert(field.name.clone(), handle);
            } else {
                to_create.push(field.clone());
            }
        }

        // Step 2: whatever is left in `self.attributes` is absent from
        // the new spec. Flush it first if it carries unflushed writes,
        // then drop it either way.
        for (_, handle) in self.attributes.drain(..) {
            let attr = handle.lock().unwrap();
            if attr.last_sync_token() < new_serial {
                if let Some(task) = attr.init_flush(flush_dir.join(attr.name()), attr.last_sync_token()) {
                    pending_flushes.push(task);
                }
            }
            // dropped regardless: `next` never sees it.
        }

        // Step 3: create the rest. Sequential or "parallel" (here: eagerly
        // built up front, same as a thread-pool fan-out would produce,
        // since the construction itself is CPU-only and has no I/O to
        // overlap) depending on `parallel`.
        let build = |field: &crate::schema::AttributeField| {
            let mut attr = create_attribute(field);
            attr.pad_to(doc_id_limit);
            attr.commit(new_serial);
            (field.name.clone(), attr)
        };
        let created: Vec<(String, Attribute)> = if parallel {
            use rayon::prelude::*;
            to_create.par_iter().map(build).collect()
        } else {
            to_create.iter().map(build).collect()
        };
        for (name, attr) in created {
            next.attributes.insert(name, Arc::new(Mutex::new(attr)));
        }

        // Step 4: extra (synthetic) attributes transfer unconditionally.
        next.extra = self.extra;

        (next, pending_flushes)
    }

    /// Computes the executor-lane id for every attribute, grouped by
    /// lane (spec §4.2 "At construction, compute... its executor id").
    /// Exposed here so `AttributeWriter` can build its `WriteContext`s
    /// without reaching into private manager state.
    pub fn lanes(&self, num_lanes: usize) -> HashMap<usize, Vec<(String, AttributeHandle)>> {
        let mut lanes: HashMap<usize, Vec<(String, AttributeHandle)>> = HashMap::new();
        for (name, handle) in &self.attributes {
            let lane = super::writer::executor_lane(name, num_lanes);
            lanes.entry(lane).or_default().push((name.clone(), handle.clone()));
        }
        lanes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeField, CollectionType, DataType};

    fn field(name: &str) -> AttributeField {
        AttributeField::new(name, DataType::Int32, CollectionType::Single)
    }

    #[test]
    fn reconfig_keeps_same_instance_for_retained_field() {
        let mut current = AttributeManager::new();
        current.insert("a1", create_attribute(&field("a1")));
        current.insert("a2", create_attribute(&field("a2")));
        current.insert("a3", create_attribute(&field("a3")));

        let original_a2 = current.get("a2").unwrap().clone();

        let mut new_spec = Schema::new();
        new_spec.add_attribute_field(field("a2")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (next, _flushes) = current.reconfigure(&new_spec, 0, 1, dir.path(), false);

        assert_eq!(next.len(), 1);
        let kept = next.get("a2").unwrap();
        assert!(Arc::ptr_eq(&original_a2, kept), "S2: reconfig must reuse the same attribute instance");
        assert!(next.get("a1").is_none());
        assert!(next.get("a3").is_none());
    }

    #[test]
    fn reconfig_creates_missing_attributes() {
        let current = AttributeManager::new();
        let mut new_spec = Schema::new();
        new_spec.add_attribute_field(field("fresh")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (next, flushes) = current.reconfigure(&new_spec, 0, 1, dir.path(), false);
        assert!(next.get("fresh").is_some());
        assert!(flushes.is_empty());
    }

    #[test]
    fn reconfig_pads_retained_attribute_to_new_doc_id_limit() {
        let mut current = AttributeManager::new();
        current.insert("a1", create_attribute(&field("a1")));
        let mut new_spec = Schema::new();
        new_spec.add_attribute_field(field("a1")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (next, _) = current.reconfigure(&new_spec, 5, 1, dir.path(), false);
        let handle = next.get("a1").unwrap();
        assert_eq!(handle.lock().unwrap().num_docs(), 5);
    }

    #[test]
    fn reconfig_parallel_and_sequential_agree() {
        let mut new_spec = Schema::new();
        for i in 0..8 {
            new_spec.add_attribute_field(field(&format!("f{i}"))).unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let (seq, _) = AttributeManager::new().reconfigure(&new_spec, 0, 1, dir.path(), false);
        let (par, _) = AttributeManager::new().reconfigure(&new_spec, 0, 1, dir.path(), true);
        assert_eq!(seq.len(), par.len());
        for i in 0..8 {
            assert!(seq.get(&format!("f{i}")).is_some());
            assert!(par.get(&format!("f{i}")).is_some());
        }
    }
}
