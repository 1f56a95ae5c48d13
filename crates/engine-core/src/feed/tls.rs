//! Transaction log boundary (spec §9 "Transaction-log coupling"): a
//! durable append-only log the core writes to before applying a
//! mutation and replays from on startup. The TLS server itself is out
//! of scope (spec §1); this module defines the trait `FeedHandler`
//! programs against and one in-process implementation used by tests
//! and by any deployment that doesn't need cross-process durability.
//!
//! Grounded on the teacher's treatment of its own durability boundary
//! (`index-scheduler` drives an LMDB env it doesn't implement itself);
//! here the analogous externally-supplied durability mechanism is
//! modeled as a trait rather than a concrete store.

use std::sync::Mutex;

use super::ops::Operation;

/// `store`/`sync`/`prune`/`replay`, exactly as named in spec §9.
pub trait TransactionLog: Send + Sync {
    fn store(&self, serial: u64, op: Operation) -> std::io::Result<()>;
    fn sync(&self) -> std::io::Result<()>;
    /// Prunes entries up to and including `upto`. Returns `false` if the
    /// log rejects the prune (spec §4.3 `tlsPrune`: "if the TLS rejects
    /// prune, throw — the caller treats it as fatal").
    fn prune(&self, upto: u64) -> bool;
    /// Replays every stored op with `serial > from`, in serial order.
    fn replay(&self, from: u64, visitor: &mut dyn FnMut(u64, &Operation));
}

/// An in-memory transaction log, durable only for the lifetime of the
/// process. Good enough for replay-idempotence tests (spec §8 S3) and
/// for embedding in a single-process deployment that accepts in-memory
/// durability.
#[derive(Default)]
pub struct InMemoryTransactionLog {
    entries: Mutex<Vec<(u64, Operation)>>,
    pruned_upto: Mutex<u64>,
    reject_prune: Mutex<bool>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/ops hook: makes the next `prune` call fail, exercising the
    /// fatal `tlsPrune` path (spec §4.3).
    pub fn set_reject_prune(&self, reject: bool) {
        *self.reject_prune.lock().unwrap() = reject;
    }

    pub fn pruned_upto(&self) -> u64 {
        *self.pruned_upto.lock().unwrap()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransactionLog for InMemoryTransactionLog {
    fn store(&self, serial: u64, op: Operation) -> std::io::Result<()> {
        self.entries.lock().unwrap().push((serial, op));
        Ok(())
    }

    fn sync(&self) -> std::io::Result<()> {
        Ok(())
    }

    fn prune(&self, upto: u64) -> bool {
        if *self.reject_prune.lock().unwrap() {
            return false;
        }
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|(serial, _)| *serial > upto);
        let mut pruned = self.pruned_upto.lock().unwrap();
        *pruned = (*pruned).max(upto);
        true
    }

    fn replay(&self, from: u64, visitor: &mut dyn FnMut(u64, &Operation)) {
        let entries = self.entries.lock().unwrap();
        for (serial, op) in entries.iter() {
            if *serial > from {
                visitor(*serial, op);
            }
        }
    }
}
