//! `FeedView`: the interface `FeedHandler` dispatches prepared operations
//! to (spec §4.3), and [`SubDbFeedView`], the default implementation
//! wired to the `Ready`/`Removed`/`NotReady` triad.

use std::collections::HashMap;
use std::sync::Arc;

use crate::attribute::AttributeValue;
use crate::docmeta::{BucketId, Gid, Lid, Timestamp};
use crate::error::{Error, Result};
use crate::subdb::{move_doc, SubDatabase, SubDbKind};

/// Consulted by `FeedHandler` before assigning a serial, to find an
/// existing document's lid/timestamp (spec's `preparePut`/`prepareUpdate`/
/// `prepareMove`, which "set prev-db-doc-id by looking up the meta
/// store"). Folded into one trait method here since Rust doesn't need a
/// separate prepare step to stage that lookup across a thread boundary.
pub trait FeedView: Send {
    fn lookup(&self, gid: &Gid) -> Option<(Lid, Timestamp)>;

    fn handle_put(
        &mut self,
        serial: u64,
        gid: Gid,
        bucket_id: BucketId,
        timestamp: Timestamp,
        fields: HashMap<String, AttributeValue>,
    ) -> Result<()>;

    fn handle_update(&mut self, serial: u64, gid: Gid, timestamp: Timestamp, fields: HashMap<String, AttributeValue>) -> Result<()>;

    fn handle_remove(&mut self, serial: u64, gid: Gid) -> Result<()>;

    /// Moves `gid` between `Ready` and `NotReady`. A no-op if the document
    /// isn't in the source sub-database implied by `to_not_ready`.
    fn handle_move(&mut self, serial: u64, gid: Gid, to_not_ready: bool) -> Result<()>;

    /// Permanently forgets tombstones in the `Removed` sub-database
    /// (spec §4.4 PruneRemovedDocuments).
    fn handle_prune_removed_documents(&mut self, serial: u64, lids: &[Lid]) -> Result<()>;

    /// Commits every attribute at `serial`, keeping `lastSyncToken`
    /// advancing during idle periods (spec §4.4 HeartBeat).
    fn heart_beat(&mut self, serial: u64);

    /// Drops the named attribute columns from every sub-database (spec
    /// §4.4 "WipeOldRemovedFields"). Not assigned a serial and never
    /// logged to the transaction log — spec §4.3 calls out that
    /// wipe-history bypasses TLS persistence, since it only discards
    /// already-unreachable history rather than changing document state.
    fn wipe_fields(&mut self, names: &[String]);
}

/// The production `FeedView`: owns all three sub-databases and routes
/// newly-fed documents into `Ready` by default (bucket placement beyond
/// that is the maintenance crate's `BucketMover`'s job).
pub struct SubDbFeedView {
    pub ready: SubDatabase,
    pub removed: SubDatabase,
    pub not_ready: SubDatabase,
}

impl SubDbFeedView {
    pub fn new() -> Self {
        SubDbFeedView {
            ready: SubDatabase::new(SubDbKind::Ready),
            removed: SubDatabase::new(SubDbKind::Removed),
            not_ready: SubDatabase::new(SubDbKind::NotReady),
        }
    }

    fn locate(&self, gid: &Gid) -> Option<(SubDbKind, Lid, Timestamp)> {
        if let Some(lid) = self.ready.meta().lookup(gid) {
            return Some((SubDbKind::Ready, lid, self.ready.meta().entry(lid).unwrap().timestamp));
        }
        if let Some(lid) = self.not_ready.meta().lookup(gid) {
            return Some((SubDbKind::NotReady, lid, self.not_ready.meta().entry(lid).unwrap().timestamp));
        }
        None
    }

    fn subdb_mut(&mut self, kind: SubDbKind) -> &mut SubDatabase {
        match kind {
            SubDbKind::Ready => &mut self.ready,
            SubDbKind::Removed => &mut self.removed,
            SubDbKind::NotReady => &mut self.not_ready,
        }
    }

    /// Routes `fields` through `subdb`'s `AttributeWriter` (spec §4.2,
    /// §4.3: FeedView → AttributeWriter) instead of locking each
    /// attribute directly, so the writer's per-lane ordering and
    /// `lastSyncToken` guard apply to every document feed, not just to
    /// the writer's own unit tests. `commit` is left to `heart_beat`
    /// (spec §4.3's visibility-delay window), so this always submits with
    /// `commit = false` and waits for the lane jobs to drain before
    /// returning, keeping `FeedView` call/return semantics synchronous.
    fn apply_fields(subdb: &SubDatabase, serial: u64, lid: Lid, fields: HashMap<String, AttributeValue>) -> Result<()> {
        subdb.attribute_writer().put(serial, lid, Arc::new(fields), false);
        subdb.attribute_writer().wait_idle();
        Ok(())
    }
}

impl Default for SubDbFeedView {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedView for SubDbFeedView {
    fn lookup(&self, gid: &Gid) -> Option<(Lid, Timestamp)> {
        self.locate(gid).map(|(_, lid, ts)| (lid, ts))
    }

    fn handle_put(
        &mut self,
        serial: u64,
        gid: Gid,
        bucket_id: BucketId,
        timestamp: Timestamp,
        fields: HashMap<String, AttributeValue>,
    ) -> Result<()> {
        // A put to a gid that already exists anywhere is a full
        // replace: drop the old copy first so there's exactly one
        // live lid per gid, mirroring the `prevDbDocId` handling spec
        // §4.3 describes.
        if let Some((kind, lid, _)) = self.locate(&gid) {
            self.subdb_mut(kind).remove(lid)?;
        }
        let lid = self.ready.add_doc(gid, bucket_id, timestamp);
        Self::apply_fields(&self.ready, serial, lid, fields)
    }

    fn handle_update(&mut self, serial: u64, gid: Gid, _timestamp: Timestamp, fields: HashMap<String, AttributeValue>) -> Result<()> {
        let (kind, lid, _) = self.locate(&gid).ok_or_else(|| Error::UnknownField(format!("{gid:?}")))?;
        let subdb = self.subdb_mut(kind);
        Self::apply_fields(subdb, serial, lid, fields)
    }

    fn handle_remove(&mut self, _serial: u64, gid: Gid) -> Result<()> {
        let Some((kind, lid, _)) = self.locate(&gid) else {
            return Ok(());
        };
        let source = self.subdb_mut(kind);
        move_doc(source, &mut self.removed, lid)?;
        Ok(())
    }

    fn handle_move(&mut self, _serial: u64, gid: Gid, to_not_ready: bool) -> Result<()> {
        let target_kind = if to_not_ready { SubDbKind::NotReady } else { SubDbKind::Ready };
        let Some((kind, lid, _)) = self.locate(&gid) else {
            return Ok(());
        };
        if kind == target_kind {
            return Ok(());
        }
        let (source, target) = if to_not_ready { (&mut self.ready, &mut self.not_ready) } else { (&mut self.not_ready, &mut self.ready) };
        move_doc(source, target, lid)?;
        Ok(())
    }

    fn handle_prune_removed_documents(&mut self, serial: u64, lids: &[Lid]) -> Result<()> {
        for &lid in lids {
            self.removed.attribute_writer().remove(serial, lid, false);
            self.removed.attribute_writer().wait_idle();
            self.removed.meta_mut().forget(lid);
        }
        Ok(())
    }

    fn heart_beat(&mut self, serial: u64) {
        for subdb in [&self.ready, &self.removed, &self.not_ready] {
            subdb.attribute_writer().force_commit(serial, || {});
        }
    }

    fn wipe_fields(&mut self, names: &[String]) {
        for subdb in [&mut self.ready, &mut self.removed, &mut self.not_ready] {
            for name in names {
                subdb.remove_attribute(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::AttributeField;
    use crate::schema::{CollectionType, DataType};

    fn gid(n: u8) -> Gid {
        Gid::from_bytes([n; 16])
    }

    fn view_with_score_attribute() -> SubDbFeedView {
        let mut view = SubDbFeedView::new();
        let field = AttributeField::new("score", DataType::Int32, CollectionType::Single);
        view.ready.add_attribute(&field);
        view.not_ready.add_attribute(&field);
        view.removed.add_attribute(&field);
        view
    }

    #[test]
    fn put_then_remove_relocates_the_document_into_removed() {
        let mut view = view_with_score_attribute();
        let bucket = BucketId::new(0);
        let mut fields = HashMap::new();
        fields.insert("score".to_string(), AttributeValue::Numeric(5.0));
        view.handle_put(1, gid(1), bucket, 100, fields).unwrap();
        assert_eq!(view.ready.live_count(), 1);

        view.handle_remove(2, gid(1)).unwrap();
        assert_eq!(view.ready.meta().entry(0).unwrap().removed, true);
        assert_eq!(view.removed.live_count(), 1);
    }

    #[test]
    fn handle_put_applies_field_values_through_the_attribute_writer() {
        // Proof that the production path (not just `AttributeWriter`'s own
        // unit tests) actually routes through the writer: a value put at
        // a given serial is readable immediately after `handle_put`
        // returns, and a later `handle_update` at a lower serial than an
        // already-applied one is rejected by the `lastSyncToken` guard.
        let mut view = view_with_score_attribute();
        let bucket = BucketId::new(0);
        let mut fields = HashMap::new();
        fields.insert("score".to_string(), AttributeValue::Numeric(5.0));
        view.handle_put(10, gid(9), bucket, 100, fields).unwrap();

        let handle = view.ready.attributes().get("score").unwrap().clone();
        assert_eq!(handle.lock().unwrap().get(0), Some(AttributeValue::Numeric(5.0)));

        // A stale serial (lower than one already committed) must not
        // clobber the live value once the attribute has been committed
        // past it.
        view.heart_beat(10);
        let mut stale_fields = HashMap::new();
        stale_fields.insert("score".to_string(), AttributeValue::Numeric(999.0));
        view.handle_update(5, gid(9), 100, stale_fields).unwrap();
        assert_eq!(handle.lock().unwrap().get(0), Some(AttributeValue::Numeric(5.0)));
    }

    #[test]
    fn handle_move_relocates_between_ready_and_not_ready() {
        let mut view = view_with_score_attribute();
        let bucket = BucketId::new(0);
        view.handle_put(1, gid(2), bucket, 1, HashMap::new()).unwrap();

        view.handle_move(2, gid(2), true).unwrap();
        assert_eq!(view.ready.live_count(), 0);
        assert_eq!(view.not_ready.live_count(), 1);

        view.handle_move(3, gid(2), false).unwrap();
        assert_eq!(view.not_ready.live_count(), 0);
        assert_eq!(view.ready.live_count(), 1);
    }
}
