//! The `Ready` / `Removed` / `NotReady` sub-database triad (spec §2, §4.4).
//!
//! Grounded on the teacher's per-index isolation (`milli::Index` bundles
//! its own LMDB env, field maps, and documents DB; nothing is shared
//! across indexes) — here the same isolation applies one level down:
//! each sub-database owns its own [`AttributeManager`] and
//! [`DocumentMetaStore`], so a document physically moves between
//! sub-databases by copying its attribute values across, not by
//! re-pointing a shared store.

use std::collections::HashMap;
use std::path::Path;

use crate::attribute::{create_attribute, AttributeValue};
use crate::docmeta::{BucketId, DocumentMetaStore, Gid, Lid, Timestamp};
use crate::error::{Error, Result};
use crate::schema::Schema;

use crate::attribute::manager::AttributeManager;
use crate::attribute::writer::AttributeWriter;

/// Lane count every `SubDatabase` builds its `AttributeWriter` with (spec
/// §4.2/§5). Fixed rather than configurable: the spec ties lane stability
/// to the executor-lane hash alone, not to a runtime-tunable pool size.
const ATTRIBUTE_WRITER_LANES: usize = 4;

/// Which of the three sub-databases a document currently lives in (spec
/// §2 "SubDatabase triad").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubDbKind {
    Ready,
    Removed,
    NotReady,
}

/// One leg of the triad: an attribute manager plus a meta store, kept in
/// lockstep so that `meta.num_docs() == ` every attribute's `num_docs()`
/// once a document has been fully fed (spec §3 "for every lid <
/// committedDocIdLimit, a value exists").
pub struct SubDatabase {
    kind: SubDbKind,
    attributes: AttributeManager,
    meta: DocumentMetaStore,
    writer: AttributeWriter,
}

impl SubDatabase {
    pub fn new(kind: SubDbKind) -> Self {
        let attributes = AttributeManager::new();
        let writer = AttributeWriter::new(&attributes, ATTRIBUTE_WRITER_LANES);
        SubDatabase { kind, attributes, meta: DocumentMetaStore::new(), writer }
    }

    pub fn kind(&self) -> SubDbKind {
        self.kind
    }

    pub fn attributes(&self) -> &AttributeManager {
        &self.attributes
    }

    /// The write-routing front door for this sub-database's attributes
    /// (spec §4.2/§4.3): every put/update/remove/commit that needs to
    /// honor per-field lane ordering and the `lastSyncToken` guard goes
    /// through here rather than locking an attribute directly.
    pub fn attribute_writer(&self) -> &AttributeWriter {
        &self.writer
    }

    /// Rebuilds the writer's `WriteContext`s from the current attribute
    /// set. Must run after any structural change to `self.attributes`
    /// (insert, remove, or a full reconfigure) so the writer never holds
    /// a stale or missing lane assignment.
    fn rebuild_writer(&mut self) {
        self.writer = AttributeWriter::new(&self.attributes, ATTRIBUTE_WRITER_LANES);
    }

    /// Builds a fresh attribute for `field` and inserts it, rebuilding the
    /// attribute writer so the new column is immediately reachable
    /// through [`SubDatabase::attribute_writer`]. Mirrors
    /// `AttributeManager::reconfigure`'s creation step for sub-databases
    /// built up field-by-field rather than through a whole-schema
    /// reconfigure (used by tests and by initial schema load).
    pub fn add_attribute(&mut self, field: &crate::schema::field::AttributeField) {
        self.attributes.insert(field.name.clone(), create_attribute(field));
        self.rebuild_writer();
    }

    /// Drops an attribute column outright (spec §4.4
    /// `WipeOldRemovedFields`) and rebuilds the writer so it stops
    /// routing to the now-discarded handle.
    pub fn remove_attribute(&mut self, name: &str) {
        self.attributes.remove(name);
        self.rebuild_writer();
    }

    pub fn meta(&self) -> &DocumentMetaStore {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut DocumentMetaStore {
        &mut self.meta
    }

    pub fn num_docs(&self) -> usize {
        self.meta.num_docs()
    }

    /// Documents actually live in this sub-database (excludes tombstones
    /// awaiting reclamation); see [`DocumentMetaStore::live_count`].
    pub fn live_count(&self) -> usize {
        self.meta.live_count()
    }

    /// Allocates a lid for `gid` in the meta store, then pads every
    /// attribute's column up to that lid so the dense-lid invariant holds
    /// immediately, before any field value has actually been `put`.
    pub fn add_doc(&mut self, gid: Gid, bucket_id: BucketId, timestamp: Timestamp) -> Lid {
        let lid = self.meta.add_doc(gid, bucket_id, timestamp);
        for (_, handle) in self.attributes.iter() {
            handle.lock().unwrap().pad_to(lid + 1);
        }
        lid
    }

    /// Tombstones `lid` in the meta store. Clearing attribute values is
    /// the `AttributeWriter`'s job (spec §4.2 `remove`), kept separate so
    /// that attribute clears stay on their executor lanes rather than
    /// blocking on the meta store's lock.
    pub fn remove(&mut self, lid: Lid) -> Result<()> {
        self.meta.remove(lid)
    }

    /// Reads every attribute's value at `lid` into a type-erased map, used
    /// by the bucket-move path to carry a document's full attribute state
    /// from one sub-database to another (spec §4.4 BucketMover).
    pub fn read_document(&self, lid: Lid) -> HashMap<String, AttributeValue> {
        let mut out = HashMap::new();
        for (name, handle) in self.attributes.iter() {
            let attr = handle.lock().unwrap();
            if let Some(value) = attr.get(lid) {
                out.insert(name.to_string(), value);
            }
        }
        out
    }

    pub fn iter_bucket(&self, bucket_id: BucketId) -> impl Iterator<Item = Lid> + '_ {
        self.meta.iter_bucket(bucket_id)
    }

    pub fn compact_lid_space(&mut self, wanted_limit: Lid) {
        self.meta.compact_lid_space(wanted_limit);
        for (_, handle) in self.attributes.iter() {
            handle.lock().unwrap().compact_lid_space(wanted_limit);
        }
    }

    pub fn shrink_lid_space(&mut self) {
        self.meta.shrink_lid_space();
        for (_, handle) in self.attributes.iter() {
            handle.lock().unwrap().shrink_lid_space();
        }
    }

    /// Runs the attribute-manager reconfiguration algorithm (spec §4.2)
    /// against this sub-database's attributes in place.
    pub fn reconfigure(&mut self, new_spec: &Schema, new_serial: u64, flush_dir: &Path, parallel: bool) {
        let doc_id_limit = self.meta.num_docs() as u32;
        let current = std::mem::take(&mut self.attributes);
        let (next, pending_flushes) = current.reconfigure(new_spec, doc_id_limit, new_serial, flush_dir, parallel);
        for flush in pending_flushes {
            if let Err(e) = flush.run() {
                tracing::warn!(error = %e, "dropped-attribute flush failed during reconfigure");
            }
        }
        self.attributes = next;
        self.rebuild_writer();
    }
}

/// Transfers one document's attribute values and meta entry from `from`'s
/// `bucket_id` lid space into `to`, used by the maintenance crate's
/// `BucketMover` job. The caller is expected to have already obtained the
/// relevant feed-writer serialization (subdb moves are not internally
/// synchronized).
pub fn move_doc(from: &mut SubDatabase, to: &mut SubDatabase, lid: Lid) -> Result<Lid> {
    let entry = from.meta().entry(lid).cloned().ok_or_else(|| Error::LidNotAllocated("subdb".into(), lid))?;
    let values = from.read_document(lid);
    from.remove(lid)?;

    let new_lid = to.add_doc(entry.gid, entry.bucket_id, entry.timestamp);
    for (name, handle) in to.attributes.iter() {
        if let Some(value) = values.get(name) {
            let mut attr = handle.lock().unwrap();
            if attr.num_docs() <= new_lid {
                attr.pad_to(new_lid + 1);
            }
            attr.put(new_lid, value.clone())?;
        }
    }
    Ok(new_lid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::AttributeField;
    use crate::schema::{CollectionType, DataType};

    fn gid(n: u8) -> Gid {
        Gid::from_bytes([n; 16])
    }

    #[test]
    fn add_doc_pads_every_attribute_to_the_new_lid() {
        let mut ready = SubDatabase::new(SubDbKind::Ready);
        ready.add_attribute(&AttributeField::new("score", DataType::Int32, CollectionType::Single));

        let bucket = BucketId::from_gid(&gid(1));
        ready.add_doc(gid(1), bucket, 1);
        ready.add_doc(gid(2), bucket, 2);

        let handle = ready.attributes().get("score").unwrap();
        assert_eq!(handle.lock().unwrap().num_docs(), 2);
    }

    #[test]
    fn move_doc_carries_attribute_values_to_the_destination() {
        let mut ready = SubDatabase::new(SubDbKind::Ready);
        let mut not_ready = SubDatabase::new(SubDbKind::NotReady);
        let field = AttributeField::new("score", DataType::Int32, CollectionType::Single);
        ready.add_attribute(&field);
        not_ready.add_attribute(&field);

        let bucket = BucketId::from_gid(&gid(7));
        let lid = ready.add_doc(gid(7), bucket, 10);
        {
            let handle = ready.attributes().get("score").unwrap();
            handle.lock().unwrap().put(lid, AttributeValue::Numeric(99.0)).unwrap();
        }

        let new_lid = move_doc(&mut ready, &mut not_ready, lid).unwrap();

        assert!(ready.meta().entry(lid).unwrap().removed);
        assert_eq!(not_ready.num_docs(), 1);
        let handle = not_ready.attributes().get("score").unwrap();
        assert_eq!(handle.lock().unwrap().get(new_lid), Some(AttributeValue::Numeric(99.0)));
    }
}
