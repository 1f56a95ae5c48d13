//! Computes a cutoff time = `now - ageLimit` and wipes attribute columns
//! whose schema timestamp is older than it (spec §4.4
//! "WipeOldRemovedFields").
//!
//! The set of candidate fields is whatever schema diff the owning
//! component hands this job when a field is dropped from the live
//! schema (spec §3: "a prior schema can be reconstructed... permitting
//! history wipe on removal") — this job only decides *when* each
//! candidate is old enough, not which fields were removed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use engine_core::docmeta::Timestamp;
use engine_core::feed::view::SubDbFeedView;
use engine_core::feed::FeedHandler;
use engine_core::schema::field::FieldTimestamp;
use engine_core::schema::Schema;

use crate::clock::Clock;
use crate::job::Job;

pub struct WipeOldRemovedFields {
    handler: Arc<FeedHandler<SubDbFeedView>>,
    clock: Arc<dyn Clock>,
    /// Fields once present in the live schema, now removed from it and
    /// awaiting history wipe, keyed by their original creation
    /// timestamp (spec §4.1 `getOldFields`).
    candidates: Mutex<Schema>,
    age_limit: Timestamp,
    delay: Duration,
    interval: Duration,
    blocked: AtomicBool,
}

impl WipeOldRemovedFields {
    pub fn new(handler: Arc<FeedHandler<SubDbFeedView>>, clock: Arc<dyn Clock>, age_limit: Timestamp, delay: Duration, interval: Duration) -> Self {
        WipeOldRemovedFields { handler, clock, candidates: Mutex::new(Schema::new()), age_limit, delay, interval, blocked: AtomicBool::new(false) }
    }

    /// Registers a field removed from the live schema as a wipe
    /// candidate; it is actually wiped once `field.timestamp` falls more
    /// than `age_limit` behind the clock.
    pub fn register_removed(&self, field: engine_core::schema::field::AttributeField) {
        let mut candidates = self.candidates.lock().unwrap();
        let _ = candidates.add_attribute_field(field);
    }

    pub fn pending_count(&self) -> usize {
        self.candidates.lock().unwrap().attribute_fields().count()
    }
}

impl Job for WipeOldRemovedFields {
    fn name(&self) -> &str {
        "wipe-old-removed-fields"
    }

    fn delay(&self) -> Duration {
        self.delay
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    fn run(&self) -> bool {
        let cutoff = self.clock.now().saturating_sub(self.age_limit) as FieldTimestamp;
        let mut candidates = self.candidates.lock().unwrap();
        let due = candidates.get_old_fields(cutoff);
        let names: Vec<String> = due.attribute_fields().map(|f| f.name.clone()).collect();
        if !names.is_empty() {
            self.handler.wipe_history(&names);
            *candidates = Schema::set_difference(&candidates, &due);
        }
        true
    }
}
