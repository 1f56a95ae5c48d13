//! `FeedHandler`: single-writer serialization of mutating operations,
//! monotonic serial assignment, transaction-log-before-apply ordering,
//! and the `Load → ReplayTransactionLog → Normal` state machine (spec
//! §4.3).
//!
//! Grounded on `index-scheduler`'s own single-writer discipline (one
//! `IndexScheduler::tick` at a time processes a batch and commits it)
//! and on its `Error`/`Status` split for the reply taxonomy. Where the
//! teacher dedicates an OS thread to its tick loop, this module uses one
//! `Mutex` guarding serial assignment, TLS write, and view dispatch as a
//! single critical section: the mutual-exclusion guarantee is identical
//! to a dedicated writer thread (exactly one mutation in flight at a
//! time, total order of serials), and a synchronous call/return API is
//! easier to embed and to test (see DESIGN.md).

pub mod ops;
pub mod tls;
pub mod view;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::attribute::AttributeValue;
use crate::docmeta::{BucketId, Gid, Lid, Timestamp};
use crate::error::Code;

pub use ops::{FeedReply, Operation};
pub use tls::TransactionLog;
pub use view::FeedView;

/// `Load → ReplayTransactionLog → Normal` (spec §4.3), plus
/// `RejectedConfig`, entered when the node's configuration is rejected
/// by its distributor and left only by a fresh, accepted configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedState {
    Load,
    ReplayTransactionLog,
    Normal,
    RejectedConfig,
}

/// Config passed into [`FeedHandler::new`] (SPEC_FULL.md §B: typed
/// option structs rather than a global config singleton, mirroring
/// `IndexSchedulerOptions`).
#[derive(Clone, Copy, Debug)]
pub struct FeedHandlerOptions {
    /// Serial-number window writes may be buffered for before a global
    /// commit, in `Normal` state. Zero means every op commits
    /// immediately, same as `ReplayTransactionLog`'s fixed behavior.
    pub visibility_delay_serials: u64,
}

impl Default for FeedHandlerOptions {
    fn default() -> Self {
        FeedHandlerOptions { visibility_delay_serials: 0 }
    }
}

/// Rejects Put/Update while set (spec §4.3, §7 "resource exhausted");
/// Remove is never subject to it.
#[derive(Default)]
pub struct WriteFilter(Mutex<Option<String>>);

impl WriteFilter {
    pub fn reject(&self, reason: impl Into<String>) {
        *self.0.lock().unwrap() = Some(reason.into());
    }

    pub fn clear(&self) {
        *self.0.lock().unwrap() = None;
    }

    pub fn check(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

struct Inner<V> {
    next_serial: u64,
    state: FeedState,
    view: V,
}

pub struct FeedHandler<V: FeedView> {
    inner: Mutex<Inner<V>>,
    tls: Arc<dyn TransactionLog>,
    write_filter: WriteFilter,
    pruned_upto: AtomicU64,
    options: FeedHandlerOptions,
}

impl<V: FeedView> FeedHandler<V> {
    pub fn new(view: V, tls: Arc<dyn TransactionLog>, options: FeedHandlerOptions) -> Self {
        FeedHandler {
            inner: Mutex::new(Inner { next_serial: 1, state: FeedState::Load, view }),
            tls,
            write_filter: WriteFilter::default(),
            pruned_upto: AtomicU64::new(0),
            options,
        }
    }

    pub fn write_filter(&self) -> &WriteFilter {
        &self.write_filter
    }

    pub fn state(&self) -> FeedState {
        self.inner.lock().unwrap().state
    }

    /// Read-only access to the view's current state under the writer
    /// lock, used by maintenance jobs (e.g. `BucketMover` comparing
    /// configured vs. current bucket placement) without duplicating
    /// `FeedHandler`'s own serialization.
    pub fn with_view<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        let inner = self.inner.lock().unwrap();
        f(&inner.view)
    }

    /// Mutable counterpart of [`FeedHandler::with_view`], used by
    /// maintenance jobs that need direct sub-database access beyond the
    /// `FeedView` trait's mutation vocabulary (`LidSpaceCompaction`'s
    /// `compact_lid_space`/`shrink_lid_space`, spec §4.4).
    pub fn with_view_mut<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner.view)
    }

    /// Performed only on the writer thread's behalf in spec prose; here,
    /// entering the mutex plays that role. Transitions happen in the
    /// order `Load → ReplayTransactionLog → Normal` (spec §4.3).
    pub fn change_to_normal_feed_state(&self) {
        self.inner.lock().unwrap().state = FeedState::Normal;
    }

    pub fn enter_replay_state(&self) {
        self.inner.lock().unwrap().state = FeedState::ReplayTransactionLog;
    }

    pub fn reject_config(&self, _reason: impl Into<String>) {
        self.inner.lock().unwrap().state = FeedState::RejectedConfig;
    }

    /// Whether writes in the current state commit immediately: true in
    /// `Load`/`ReplayTransactionLog` (visibility delay is fixed at 0),
    /// and in `Normal` only when configured with a zero visibility delay
    /// (spec §4.3).
    fn commits_immediately(&self, state: FeedState) -> bool {
        !matches!(state, FeedState::Normal) || self.options.visibility_delay_serials == 0
    }

    pub fn perform_put(
        &self,
        gid: Gid,
        bucket_id: BucketId,
        timestamp: Timestamp,
        fields: HashMap<String, AttributeValue>,
        prev_timestamp: Option<Timestamp>,
    ) -> FeedReply {
        if let Some(reason) = self.write_filter.check() {
            return FeedReply::error(Code::ResourceExhausted, reason);
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.state == FeedState::RejectedConfig {
            return FeedReply::error(Code::PermanentError, "node configuration rejected");
        }
        if let Some(prev_ts) = prev_timestamp {
            if let Some((_, existing_ts)) = inner.view.lookup(&gid) {
                if existing_ts > prev_ts {
                    // Outdated op: silently ignored, not logged (spec §4.3).
                    return FeedReply::ok();
                }
            }
        }
        let serial = inner.next_serial;
        inner.next_serial += 1;
        let op = Operation::Put { gid, bucket_id, timestamp, fields: fields.clone() };
        if let Err(e) = self.tls.store(serial, op) {
            return FeedReply::error(Code::TransientError, e.to_string());
        }
        let _ = self.tls.sync();
        match inner.view.handle_put(serial, gid, bucket_id, timestamp, fields) {
            Ok(()) => {
                if self.commits_immediately(inner.state) {
                    inner.view.heart_beat(serial);
                }
                FeedReply::ok()
            }
            Err(e) => FeedReply::error(Code::PermanentError, e.to_string()),
        }
    }

    pub fn perform_update(
        &self,
        gid: Gid,
        bucket_id: BucketId,
        timestamp: Timestamp,
        fields: HashMap<String, AttributeValue>,
        prev_timestamp: Option<Timestamp>,
        create_if_non_existent: bool,
    ) -> FeedReply {
        if let Some(reason) = self.write_filter.check() {
            return FeedReply::error(Code::ResourceExhausted, reason);
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.state == FeedState::RejectedConfig {
            return FeedReply::error(Code::PermanentError, "node configuration rejected");
        }
        let existing = inner.view.lookup(&gid);
        if let (Some(prev_ts), Some((_, existing_ts))) = (prev_timestamp, existing) {
            if existing_ts > prev_ts {
                return FeedReply::ok();
            }
        }
        if existing.is_none() {
            if !create_if_non_existent {
                return FeedReply { code: Code::None, message: None, existing_timestamp: 0 };
            }
            // Upgrade to a Put; the synthesized op consumes the next
            // serial exactly as a direct Put would (spec §4.3).
            drop(inner);
            return self.perform_put(gid, bucket_id, timestamp, fields, None);
        }

        let serial = inner.next_serial;
        inner.next_serial += 1;
        let op = Operation::Update { gid, timestamp, fields: fields.clone(), create_if_non_existent };
        if let Err(e) = self.tls.store(serial, op) {
            return FeedReply::error(Code::TransientError, e.to_string());
        }
        let _ = self.tls.sync();
        match inner.view.handle_update(serial, gid, timestamp, fields) {
            Ok(()) => {
                if self.commits_immediately(inner.state) {
                    inner.view.heart_beat(serial);
                }
                FeedReply::ok()
            }
            Err(e) => FeedReply::error(Code::PermanentError, e.to_string()),
        }
    }

    /// Remove is never rejected by the write filter or by resource
    /// exhaustion (spec §4.3, §7, and scenario S4).
    pub fn perform_remove(&self, gid: Gid, timestamp: Timestamp, prev_timestamp: Option<Timestamp>) -> FeedReply {
        let mut inner = self.inner.lock().unwrap();
        if let Some(prev_ts) = prev_timestamp {
            if let Some((_, existing_ts)) = inner.view.lookup(&gid) {
                if existing_ts > prev_ts {
                    return FeedReply::ok();
                }
            }
        }
        let serial = inner.next_serial;
        inner.next_serial += 1;
        if inner.state != FeedState::RejectedConfig {
            let _ = self.tls.store(serial, Operation::Remove { gid, timestamp });
            let _ = self.tls.sync();
        }
        match inner.view.handle_remove(serial, gid) {
            Ok(()) => {
                if self.commits_immediately(inner.state) {
                    inner.view.heart_beat(serial);
                }
                FeedReply::ok()
            }
            Err(e) => FeedReply::error(Code::PermanentError, e.to_string()),
        }
    }

    pub fn handle_move(&self, gid: Gid, to_not_ready: bool) -> FeedReply {
        let mut inner = self.inner.lock().unwrap();
        let serial = inner.next_serial;
        inner.next_serial += 1;
        let _ = self.tls.store(serial, Operation::Move { gid, to_not_ready });
        match inner.view.handle_move(serial, gid, to_not_ready) {
            Ok(()) => {
                inner.view.heart_beat(serial);
                FeedReply::ok()
            }
            Err(e) => FeedReply::error(Code::PermanentError, e.to_string()),
        }
    }

    pub fn prune_removed_documents(&self, lids: Vec<Lid>) -> FeedReply {
        let mut inner = self.inner.lock().unwrap();
        let serial = inner.next_serial;
        inner.next_serial += 1;
        let _ = self.tls.store(serial, Operation::PruneRemovedDocuments { lids: lids.clone() });
        match inner.view.handle_prune_removed_documents(serial, &lids) {
            Ok(()) => {
                inner.view.heart_beat(serial);
                FeedReply::ok()
            }
            Err(e) => FeedReply::error(Code::PermanentError, e.to_string()),
        }
    }

    /// `WipeOldRemovedFields` entry point (spec §4.4): drops the named
    /// attribute columns from every sub-database. Bypasses the TLS
    /// entirely — it is never written to the transaction log and runs
    /// regardless of feed state, since it only discards history that
    /// is already unreachable rather than asserting new document state
    /// (spec §4.3).
    pub fn wipe_history(&self, field_names: &[String]) {
        let mut inner = self.inner.lock().unwrap();
        inner.view.wipe_fields(field_names);
    }

    /// Heartbeats become no-ops in `RejectedConfig` (spec §4.3).
    pub fn heart_beat(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == FeedState::RejectedConfig {
            return;
        }
        let serial = inner.next_serial;
        inner.next_serial += 1;
        inner.view.heart_beat(serial);
    }

    /// `flushDone(tok)`: never reduces the pruned serial (spec §4.3).
    pub fn flush_done(&self, token: u64) {
        self.pruned_upto.fetch_max(token, Ordering::SeqCst);
    }

    /// `tlsPrune(tok)`: fatal if the TLS rejects the prune.
    pub fn tls_prune(&self, token: u64) -> Result<(), String> {
        if self.tls.prune(token) {
            Ok(())
        } else {
            Err(format!("transaction log rejected prune to {token}"))
        }
    }

    pub fn pruned_upto(&self) -> u64 {
        self.pruned_upto.load(Ordering::SeqCst)
    }

    /// Replays every logged op with `serial` greater than `from` against
    /// the view, in `ReplayTransactionLog` semantics (visibility delay
    /// 0, immediate commits: each op is followed by a `heart_beat` at its
    /// own serial). `tls.replay`'s `serial > from` filter is what keeps
    /// already-applied ops out of this call in the first place; within
    /// the ops it does hand over, `apply_logged` routes through
    /// `SubDbFeedView`'s `AttributeWriter`, whose `lastSyncToken` guard
    /// additionally makes re-applying a serial at or below what's already
    /// committed a no-op (spec §8 S3) — belt-and-braces against a
    /// transaction log that redelivers a serial it already handed out.
    pub fn replay(&self, from: u64) {
        self.enter_replay_state();
        let tls = self.tls.clone();
        let mut inner = self.inner.lock().unwrap();
        let mut max_serial = from;
        tls.replay(from, &mut |serial, op| {
            max_serial = max_serial.max(serial);
            let _ = apply_logged(&mut inner.view, serial, op);
            inner.view.heart_beat(serial);
        });
        inner.next_serial = max_serial + 1;
    }
}

fn apply_logged<V: FeedView>(view: &mut V, serial: u64, op: &Operation) -> crate::error::Result<()> {
    match op.clone() {
        Operation::Put { gid, bucket_id, timestamp, fields } => view.handle_put(serial, gid, bucket_id, timestamp, fields),
        Operation::Update { gid, timestamp, fields, .. } => view.handle_update(serial, gid, timestamp, fields),
        Operation::Remove { gid, .. } => view.handle_remove(serial, gid),
        Operation::Move { gid, to_not_ready } => view.handle_move(serial, gid, to_not_ready),
        Operation::PruneRemovedDocuments { lids } => view.handle_prune_removed_documents(serial, &lids),
        // Never logged (see `FeedHandler::wipe_history`), so replay
        // never actually observes this variant; kept exhaustive for
        // forward-compatibility with a future TLS format.
        Operation::RemoveLocation { .. } | Operation::WipeHistory { .. } => Ok(()),
    }
}
