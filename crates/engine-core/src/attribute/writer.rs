//! `AttributeWriter`: routes document puts/updates/removes/commits to
//! attribute-write executors bucketed by field name (spec §4.2, §5).
//!
//! Grounded on the teacher's sequenced-executor idiom for write
//! parallelism bounded by lane count (`milli`'s
//! `ThreadPoolNoAbort`/`thread_pool_no_abort.rs` bounds *read-side*
//! parallelism the same way this bounds *write-side* parallelism: a
//! fixed pool, tasks submitted by reference to a specific lane). Each
//! lane here is backed by one OS thread draining a `crossbeam_channel`
//! in FIFO order, which is what gives "two tasks on the same lane run in
//! strict submission order" (spec §5) without an explicit lock — the
//! channel *is* the lock.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Sender;
use fxhash::FxHasher;
use std::hash::{Hash, Hasher};

use super::manager::{AttributeHandle, AttributeManager};
use super::value::AttributeValue;

/// Deterministic, non-randomized hash of `name` into one of `num_lanes`
/// lanes. Stability across process restarts matters: the spec's
/// per-attribute ordering invariant depends on a field never migrating
/// lanes mid-run (see SPEC_FULL.md §C).
pub fn executor_lane(name: &str, num_lanes: usize) -> usize {
    if num_lanes == 0 {
        return 0;
    }
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    (hasher.finish() as usize) % num_lanes
}

type Job = Box<dyn FnOnce() + Send>;

struct Lane {
    sender: Sender<Job>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Drop for Lane {
    fn drop(&mut self) {
        // Dropping the sender closes the channel; the worker thread's
        // receive loop then returns and the thread exits.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct SequencedExecutor {
    lanes: Vec<Lane>,
}

impl SequencedExecutor {
    fn new(num_lanes: usize) -> Self {
        let lanes = (0..num_lanes.max(1))
            .map(|i| {
                let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
                let handle = std::thread::Builder::new()
                    .name(format!("attribute-writer-{i}"))
                    .spawn(move || {
                        for job in receiver {
                            job();
                        }
                    })
                    .expect("failed to spawn attribute writer lane");
                Lane { sender, handle: Some(handle) }
            })
            .collect();
        SequencedExecutor { lanes }
    }

    fn submit(&self, lane: usize, job: Job) {
        let lane = lane % self.lanes.len().max(1);
        let _ = self.lanes[lane].sender.send(job);
    }

    /// Blocks until every previously submitted job on every lane has run,
    /// by round-tripping a barrier job through each lane.
    fn barrier(&self) {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(self.lanes.len());
        for lane in &self.lanes {
            let tx = done_tx.clone();
            let _ = lane.sender.send(Box::new(move || {
                let _ = tx.send(());
            }));
        }
        drop(done_tx);
        for _ in 0..self.lanes.len() {
            let _ = done_rx.recv();
        }
    }
}

/// One lane's worth of attributes, grouped by shared executor id (spec
/// §4.2 "WriteContext").
pub struct WriteContext {
    pub lane: usize,
    pub attributes: Vec<(String, AttributeHandle)>,
    pub has_struct_field_attribute: bool,
}

pub struct AttributeWriter {
    contexts: Vec<WriteContext>,
    executor: SequencedExecutor,
}

impl AttributeWriter {
    pub fn new(manager: &AttributeManager, num_lanes: usize) -> Self {
        let lanes = manager.lanes(num_lanes);
        let contexts = lanes
            .into_iter()
            .map(|(lane, attributes)| WriteContext { lane, attributes, has_struct_field_attribute: false })
            .collect();
        AttributeWriter { contexts, executor: SequencedExecutor::new(num_lanes) }
    }

    pub fn contexts(&self) -> &[WriteContext] {
        &self.contexts
    }

    /// Applies `fields` (a full document for `put`, or just the touched
    /// subset for `update`) to `lid`, one `PutTask` per `WriteContext`
    /// that has at least one matching field. Each task is guarded by
    /// `lastSyncToken < serial` so replaying an already-applied op is a
    /// no-op (spec §4.2, §8 invariant).
    pub fn put(&self, serial: u64, lid: u32, fields: Arc<HashMap<String, AttributeValue>>, commit: bool) {
        for ctx in &self.contexts {
            let relevant: Vec<_> =
                ctx.attributes.iter().filter(|(name, _)| fields.contains_key(name)).cloned().collect();
            if relevant.is_empty() {
                continue;
            }
            let fields = fields.clone();
            self.executor.submit(
                ctx.lane,
                Box::new(move || {
                    for (name, handle) in &relevant {
                        let mut attr = handle.lock().unwrap();
                        if attr.last_sync_token() < serial {
                            if let Some(value) = fields.get(name) {
                                if let Err(e) = attr.put(lid, value.clone()) {
                                    tracing::warn!(attribute = %name, error = %e, "attribute put failed");
                                }
                            }
                        }
                        if commit && attr.last_sync_token() <= serial {
                            attr.commit(serial);
                        }
                    }
                }),
            );
        }
    }

    /// Same guard/shape as [`AttributeWriter::put`]; kept as a distinct
    /// method because spec §4.2 names `update` separately even though
    /// the routing logic is identical for this core (full
    /// partial-update diff semantics are a field-value-parser concern,
    /// out of scope per §1).
    pub fn update(&self, serial: u64, lid: u32, fields: Arc<HashMap<String, AttributeValue>>, commit: bool) {
        self.put(serial, lid, fields, commit)
    }

    /// Applies `clearDoc` to every attribute in every context, guarded by
    /// `lastSyncToken ≤ serial` (not `<`) — the spec calls out that the
    /// looser bound is required to survive the document-move idiom,
    /// which re-asserts the same serial the document already had.
    pub fn remove(&self, serial: u64, lid: u32, commit: bool) {
        for ctx in &self.contexts {
            let attrs = ctx.attributes.clone();
            self.executor.submit(
                ctx.lane,
                Box::new(move || {
                    for (name, handle) in &attrs {
                        let mut attr = handle.lock().unwrap();
                        if attr.last_sync_token() <= serial {
                            if let Err(e) = attr.clear_doc(lid) {
                                tracing::warn!(attribute = %name, error = %e, "attribute clearDoc failed");
                            }
                        }
                        if commit && attr.last_sync_token() <= serial {
                            attr.commit(serial);
                        }
                    }
                }),
            );
        }
    }

    /// Schedules a commit task on every executor; a no-op per-attribute
    /// when `lastSyncToken > serial` (spec §4.2).
    pub fn force_commit(&self, serial: u64, on_done: impl FnOnce() + Send + 'static) {
        for ctx in &self.contexts {
            let attrs = ctx.attributes.clone();
            self.executor.submit(
                ctx.lane,
                Box::new(move || {
                    for (_, handle) in &attrs {
                        let mut attr = handle.lock().unwrap();
                        if attr.last_sync_token() <= serial {
                            attr.commit(serial);
                        }
                    }
                }),
            );
        }
        self.executor.barrier();
        on_done();
    }

    /// Compacts every attribute, first forcing a commit so an attribute
    /// emptied by a later reconfig doesn't look smaller than expected
    /// during replay (spec §4.2).
    pub fn compact_lid_space(&self, wanted_limit: u32, serial: u64) {
        for ctx in &self.contexts {
            let attrs = ctx.attributes.clone();
            self.executor.submit(
                ctx.lane,
                Box::new(move || {
                    for (_, handle) in &attrs {
                        let mut attr = handle.lock().unwrap();
                        if attr.last_sync_token() < serial {
                            attr.commit(serial);
                            attr.compact_lid_space(wanted_limit);
                        }
                    }
                }),
            );
        }
        self.executor.barrier();
    }

    /// Pads, compacts, and shrinks every attribute (spec §4.2
    /// `onReplayDone`), run synchronously since replay completion is
    /// itself a barrier point.
    pub fn on_replay_done(&self, limit: u32) {
        for ctx in &self.contexts {
            let attrs = ctx.attributes.clone();
            self.executor.submit(
                ctx.lane,
                Box::new(move || {
                    for (_, handle) in &attrs {
                        let mut attr = handle.lock().unwrap();
                        attr.pad_to(limit);
                        attr.compact_lid_space(limit);
                        attr.shrink_lid_space();
                    }
                }),
            );
        }
        self.executor.barrier();
    }

    pub fn wait_idle(&self) {
        self.executor.barrier();
    }
}
