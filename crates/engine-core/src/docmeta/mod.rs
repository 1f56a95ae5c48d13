//! Global document identity and the GID → LID mapping.
//!
//! Grounded on `milli/src/external_documents_ids.rs` (a name → internal id
//! map backed by an FST) and `milli/src/update/available_ids.rs` (dense id
//! reuse via a `RoaringBitmap` complement). The spec's `DocumentMetaStore`
//! plays the same role as `ExternalDocumentsIds` but additionally tracks
//! bucket id, timestamp and tombstone state per §3/§4 of the spec, which
//! the teacher's single-node design doesn't need.

mod gid;

pub use gid::{BucketId, Gid};

use std::collections::HashMap;

use roaring::RoaringBitmap;

use crate::error::{Error, Result};

pub type Lid = u32;
pub type Timestamp = u64;

/// One entry of the meta store: everything known about a document that
/// is not itself an attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaEntry {
    pub gid: Gid,
    pub bucket_id: BucketId,
    pub timestamp: Timestamp,
    pub removed: bool,
}

/// Maps [`Gid`] → [`Lid`] and holds per-lid bucket/timestamp/tombstone
/// state (spec §2 "DocumentMetaStore").
///
/// Lid allocation is append-only with tombstone reuse, mirroring
/// `AvailableIds`: once a lid is freed by `remove`, a later `add_doc` may
/// reuse it. Unlike `AvailableIds` (which treats the whole `u32` space as
/// available), this store only ever grows `num_docs` when no freed lid is
/// available, since every lid below `num_docs` must hold a `MetaEntry`
/// (spec invariant: every lid `< committedDocIdLimit` has a defined
/// value).
#[derive(Default)]
pub struct DocumentMetaStore {
    by_gid: HashMap<Gid, Lid>,
    entries: Vec<Option<MetaEntry>>,
    free_lids: RoaringBitmap,
    committed_doc_id_limit: Lid,
}

impl DocumentMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_docs(&self) -> usize {
        self.entries.len()
    }

    /// Count of entries that are allocated and not tombstoned — the
    /// "how many documents does this sub-database actually hold" figure
    /// scenario S5 asserts on, as opposed to [`DocumentMetaStore::num_docs`]
    /// which counts dense array slots (including tombstones awaiting
    /// reclamation).
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| matches!(e, Some(entry) if !entry.removed)).count()
    }

    pub fn committed_doc_id_limit(&self) -> Lid {
        self.committed_doc_id_limit
    }

    pub fn lookup(&self, gid: &Gid) -> Option<Lid> {
        self.by_gid.get(gid).copied()
    }

    pub fn entry(&self, lid: Lid) -> Option<&MetaEntry> {
        self.entries.get(lid as usize).and_then(|e| e.as_ref())
    }

    /// Allocates a lid for `gid`, reusing a tombstoned lid when one is
    /// free. Must be called serially, same as `Attribute::addDoc`.
    pub fn add_doc(&mut self, gid: Gid, bucket_id: BucketId, timestamp: Timestamp) -> Lid {
        let lid = match self.free_lids.iter().next() {
            Some(lid) => {
                self.free_lids.remove(lid);
                lid
            }
            None => {
                let lid = self.entries.len() as Lid;
                self.entries.push(None);
                lid
            }
        };
        self.entries[lid as usize] = Some(MetaEntry { gid, bucket_id, timestamp, removed: false });
        self.by_gid.insert(gid, lid);
        lid
    }

    /// Marks `lid` as a tombstone without reclaiming it; reclamation
    /// happens via [`DocumentMetaStore::compact_lid_space`] once the
    /// engine promises no reader can observe the old limit (spec §3).
    pub fn remove(&mut self, lid: Lid) -> Result<()> {
        let entry = self
            .entries
            .get_mut(lid as usize)
            .and_then(|e| e.as_mut())
            .ok_or_else(|| Error::LidNotAllocated("meta-store".into(), lid))?;
        entry.removed = true;
        self.by_gid.remove(&entry.gid);
        self.free_lids.insert(lid);
        Ok(())
    }

    /// Permanently forgets `lid`, beyond the soft tombstone `remove`
    /// leaves behind. Used by the removed-document pruning job once a
    /// tombstone has aged past its retention window (spec §4.4
    /// PruneRemovedDocuments): unlike `remove`, this is idempotent and
    /// does not require the lid to currently hold an entry.
    pub fn forget(&mut self, lid: Lid) {
        if let Some(slot) = self.entries.get_mut(lid as usize) {
            *slot = None;
        }
        self.free_lids.insert(lid);
    }

    pub fn set_committed_doc_id_limit(&mut self, limit: Lid) {
        debug_assert!(limit as usize <= self.entries.len());
        self.committed_doc_id_limit = limit;
    }

    /// Promises that lids ≥ `wanted_limit` are unreachable from here on;
    /// physically truncating still requires [`shrink_lid_space`].
    pub fn compact_lid_space(&mut self, wanted_limit: Lid) {
        self.free_lids.remove_range(wanted_limit..u32::MAX);
    }

    /// Physically drops entries beyond the highest still-used lid,
    /// mirroring the attribute-level operation of the same name.
    pub fn shrink_lid_space(&mut self) {
        while let Some(None) = self.entries.last() {
            self.entries.pop();
        }
        while matches!(self.entries.last(), Some(Some(e)) if e.removed) {
            let lid = (self.entries.len() - 1) as Lid;
            self.entries.pop();
            self.free_lids.remove(lid);
        }
    }

    pub fn iter_bucket(&self, bucket_id: BucketId) -> impl Iterator<Item = Lid> + '_ {
        self.entries.iter().enumerate().filter_map(move |(lid, e)| match e {
            Some(e) if e.bucket_id == bucket_id && !e.removed => Some(lid as Lid),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gid(n: u8) -> Gid {
        Gid::from_bytes([n; 16])
    }

    #[test]
    fn add_doc_reuses_tombstoned_lid() {
        let mut store = DocumentMetaStore::new();
        let bucket = BucketId::from_gid(&gid(1));
        let l0 = store.add_doc(gid(1), bucket, 100);
        let l1 = store.add_doc(gid(2), bucket, 101);
        assert_eq!((l0, l1), (0, 1));

        store.remove(l0).unwrap();
        let l2 = store.add_doc(gid(3), bucket, 102);
        assert_eq!(l2, l0, "tombstoned lid must be reused before growing num_docs");
        assert_eq!(store.num_docs(), 2);
    }

    #[test]
    fn lookup_reflects_removal() {
        let mut store = DocumentMetaStore::new();
        let bucket = BucketId::from_gid(&gid(5));
        let g = gid(5);
        let lid = store.add_doc(g, bucket, 1);
        assert_eq!(store.lookup(&g), Some(lid));
        store.remove(lid).unwrap();
        assert_eq!(store.lookup(&g), None);
        assert!(store.entry(lid).unwrap().removed);
    }

    #[test]
    fn shrink_reclaims_trailing_tombstones() {
        let mut store = DocumentMetaStore::new();
        let bucket = BucketId::from_gid(&gid(9));
        let l0 = store.add_doc(gid(1), bucket, 1);
        let l1 = store.add_doc(gid(2), bucket, 2);
        store.remove(l1).unwrap();
        store.compact_lid_space(l1);
        store.shrink_lid_space();
        assert_eq!(store.num_docs(), (l0 + 1) as usize);
    }
}
