//! Generation-counted backing store shared by every attribute variant.
//!
//! Spec §9 asks for "arenas + generation counters" in place of the
//! source implementation's shared/weak pointer graph between an
//! attribute, its guard, and its dictionary. `ColumnStore<T>` is the
//! concrete version of that idea used here: writers mutate `working`
//! directly (writes to one attribute are already serialized by its lane,
//! spec §5), and `commit` publishes an immutable `Arc<Vec<T>>` snapshot
//! that readers pin via [`AttributeGuard`]. Dropping the last guard for a
//! generation simply drops the `Arc`'s last strong reference — no
//! explicit sweep is needed because `Arc` already *is* the reference
//! count spec §9 describes.

use std::sync::{Arc, RwLock};

/// RAII read-side handle (spec §4.2 `getAttributeGuard`): holds the
/// published snapshot alive for as long as the guard lives, regardless
/// of how many further commits happen on the writer side.
pub struct AttributeGuard<T> {
    snapshot: Arc<Vec<T>>,
}

impl<T> AttributeGuard<T> {
    pub fn values(&self) -> &[T] {
        &self.snapshot
    }

    pub fn get(&self, lid: u32) -> Option<&T> {
        self.snapshot.get(lid as usize)
    }
}

pub struct ColumnStore<T: Clone> {
    working: Vec<T>,
    published: RwLock<Arc<Vec<T>>>,
    undefined: T,
    committed_doc_id_limit: u32,
    last_sync_token: u64,
    compacted_limit: Option<u32>,
}

impl<T: Clone> ColumnStore<T> {
    pub fn new(undefined: T) -> Self {
        ColumnStore {
            working: Vec::new(),
            published: RwLock::new(Arc::new(Vec::new())),
            undefined,
            committed_doc_id_limit: 0,
            last_sync_token: 0,
            compacted_limit: None,
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.working.len() as u32
    }

    pub fn committed_doc_id_limit(&self) -> u32 {
        self.committed_doc_id_limit
    }

    pub fn last_sync_token(&self) -> u64 {
        self.last_sync_token
    }

    /// Allocates the next lid, filling it with the undefined sentinel.
    /// Must be called serially (spec §4.2).
    pub fn add_doc(&mut self) -> u32 {
        self.working.push(self.undefined.clone());
        (self.working.len() - 1) as u32
    }

    pub fn put(&mut self, lid: u32, value: T) -> Option<()> {
        let slot = self.working.get_mut(lid as usize)?;
        *slot = value;
        Some(())
    }

    pub fn get_working(&self, lid: u32) -> Option<&T> {
        self.working.get(lid as usize)
    }

    pub fn clear_doc(&mut self, lid: u32) -> Option<()> {
        let slot = self.working.get_mut(lid as usize)?;
        *slot = self.undefined.clone();
        Some(())
    }

    /// Grows `working` with undefined values up to `limit`, used when a
    /// reused attribute has fewer docs than the new spec's
    /// `docIdLimit` during `AttributeManager` reconfig (spec §4.2
    /// "Padding").
    pub fn pad_to(&mut self, limit: u32) {
        while self.working.len() < limit as usize {
            self.working.push(self.undefined.clone());
        }
    }

    /// Publishes a new generation and advances `lastSyncToken` if
    /// `serial` exceeds it (monotone, spec §3/§4.2).
    pub fn commit(&mut self, serial: u64) {
        let snapshot = Arc::new(self.working.clone());
        *self.published.write().unwrap() = snapshot;
        self.committed_doc_id_limit = self.working.len() as u32;
        if serial > self.last_sync_token {
            self.last_sync_token = serial;
        }
    }

    pub fn guard(&self) -> AttributeGuard<T> {
        AttributeGuard { snapshot: self.published.read().unwrap().clone() }
    }

    /// Promises lids ≥ `wanted_limit` are unreachable; physical release
    /// happens at [`ColumnStore::shrink_lid_space`].
    pub fn compact_lid_space(&mut self, wanted_limit: u32) {
        self.compacted_limit = Some(self.compacted_limit.map_or(wanted_limit, |l| l.min(wanted_limit)));
    }

    /// Physically releases lids beyond the last `compact_lid_space`
    /// target. Requires no guard to still reference an older generation
    /// if the caller wants the memory to actually shrink — this call
    /// itself is always safe (readers holding an old `Arc` keep their
    /// own full-length copy alive regardless).
    pub fn shrink_lid_space(&mut self) {
        if let Some(limit) = self.compacted_limit.take() {
            self.working.truncate(limit as usize);
            let snapshot = Arc::new(self.working.clone());
            *self.published.write().unwrap() = snapshot;
            self.committed_doc_id_limit = self.committed_doc_id_limit.min(limit);
        }
    }

    pub fn working_slice(&self) -> &[T] {
        &self.working
    }

    pub fn replace_working(&mut self, values: Vec<T>) {
        self.working = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_advances_sync_token_monotonically() {
        let mut store = ColumnStore::new(0i32);
        let lid = store.add_doc();
        store.put(lid, 10).unwrap();
        store.commit(10);
        assert_eq!(store.last_sync_token(), 10);
        store.commit(5);
        assert_eq!(store.last_sync_token(), 10, "lastSyncToken must never decrease");
        store.commit(20);
        assert_eq!(store.last_sync_token(), 20);
    }

    #[test]
    fn guard_outlives_further_commits() {
        let mut store = ColumnStore::new(0i32);
        let lid = store.add_doc();
        store.put(lid, 1).unwrap();
        store.commit(1);
        let guard = store.guard();
        store.put(lid, 2).unwrap();
        store.commit(2);
        assert_eq!(guard.get(lid), Some(&1), "guard must observe the generation at acquire time");
        assert_eq!(store.guard().get(lid), Some(&2));
    }

    #[test]
    fn pad_to_fills_with_undefined() {
        let mut store = ColumnStore::new(-1i32);
        store.add_doc();
        store.pad_to(4);
        assert_eq!(store.num_docs(), 4);
        assert_eq!(store.get_working(3), Some(&-1));
    }

    #[test]
    fn shrink_requires_prior_compact() {
        let mut store = ColumnStore::new(0i32);
        for _ in 0..5 {
            store.add_doc();
        }
        store.commit(1);
        store.shrink_lid_space();
        assert_eq!(store.num_docs(), 5, "shrink without compact must be a no-op");

        store.compact_lid_space(2);
        store.shrink_lid_space();
        assert_eq!(store.num_docs(), 2);
    }
}
