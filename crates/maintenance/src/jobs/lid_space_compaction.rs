//! Per sub-database: if lid density (`live_count / num_docs`) falls
//! below a configured threshold, issues `compact_lid_space` followed by
//! `shrink_lid_space` through the `FeedHandler` (spec §4.4
//! "LidSpaceCompaction").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_core::docmeta::Lid;
use engine_core::feed::view::SubDbFeedView;
use engine_core::feed::FeedHandler;
use engine_core::subdb::SubDatabase;

use crate::job::Job;

pub struct LidSpaceCompaction {
    handler: Arc<FeedHandler<SubDbFeedView>>,
    /// Compact when `live_count as f64 / num_docs as f64` drops below
    /// this fraction (spec §4.4 "if lid density below threshold").
    density_threshold: f64,
    delay: Duration,
    interval: Duration,
    blocked: AtomicBool,
}

impl LidSpaceCompaction {
    pub fn new(handler: Arc<FeedHandler<SubDbFeedView>>, density_threshold: f64, delay: Duration, interval: Duration) -> Self {
        LidSpaceCompaction { handler, density_threshold, delay, interval, blocked: AtomicBool::new(false) }
    }

    fn maybe_compact(&self, subdb: &mut SubDatabase) {
        let num_docs = subdb.num_docs();
        if num_docs == 0 {
            return;
        }
        let density = subdb.live_count() as f64 / num_docs as f64;
        if density < self.density_threshold {
            // `compact_lid_space` only promises lids at or beyond the
            // limit are unreachable; the limit must be one past the
            // highest lid still actually live, not merely the live
            // count (tombstones needn't be contiguous).
            let highest_live = (0..num_docs as Lid).rev().find(|&lid| subdb.meta().entry(lid).map_or(false, |e| !e.removed));
            let wanted_limit = highest_live.map(|l| l + 1).unwrap_or(0);
            subdb.compact_lid_space(wanted_limit);
            subdb.shrink_lid_space();
        }
    }
}

impl Job for LidSpaceCompaction {
    fn name(&self) -> &str {
        "lid-space-compaction"
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
        self.handler.with_view_mut(|view| {
            self.maybe_compact(&mut view.ready);
            self.maybe_compact(&mut view.not_ready);
            self.maybe_compact(&mut view.removed);
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::attribute::AttributeValue;
    use engine_core::docmeta::{BucketId, Gid};
    use engine_core::feed::{tls::InMemoryTransactionLog, FeedHandlerOptions};
    use engine_core::schema::field::AttributeField;
    use engine_core::schema::{CollectionType, DataType};
    use std::collections::HashMap;

    fn gid(n: u8) -> Gid {
        Gid::from_bytes([n; 16])
    }

    #[test]
    fn compacts_when_density_drops_below_threshold() {
        let mut view = SubDbFeedView::new();
        let field = AttributeField::new("score", DataType::Int32, CollectionType::Single);
        view.ready.add_attribute(&field);
        view.not_ready.add_attribute(&field);
        view.removed.add_attribute(&field);
        let handler = Arc::new(FeedHandler::new(view, Arc::new(InMemoryTransactionLog::new()), FeedHandlerOptions::default()));
        handler.change_to_normal_feed_state();

        let bucket = BucketId::new(0);
        for n in 0..4u8 {
            let mut fields = HashMap::new();
            fields.insert("score".to_string(), AttributeValue::Numeric(n as f64));
            handler.perform_put(gid(n + 1), bucket, n as u64, fields, None);
        }
        // Remove the last 3 of 4 (leaving only the lowest lid live) so
        // shrinking actually truncates the trailing tombstones: density
        // drops to 0.25, below a 0.5 threshold.
        for n in 1..4u8 {
            handler.perform_remove(gid(n + 1), 100, None);
        }

        let job = LidSpaceCompaction::new(handler.clone(), 0.5, Duration::ZERO, Duration::ZERO);
        job.run();

        let ready_docs = handler.with_view(|v| v.ready.num_docs());
        assert_eq!(ready_docs, 1, "compaction should truncate trailing tombstones past the highest live lid");
    }

    #[test]
    fn leaves_dense_sub_databases_untouched() {
        let mut view = SubDbFeedView::new();
        let field = AttributeField::new("score", DataType::Int32, CollectionType::Single);
        view.ready.add_attribute(&field);
        view.not_ready.add_attribute(&field);
        view.removed.add_attribute(&field);
        let handler = Arc::new(FeedHandler::new(view, Arc::new(InMemoryTransactionLog::new()), FeedHandlerOptions::default()));
        handler.change_to_normal_feed_state();

        let bucket = BucketId::new(0);
        let mut fields = HashMap::new();
        fields.insert("score".to_string(), AttributeValue::Numeric(1.0));
        handler.perform_put(gid(1), bucket, 1, fields, None);

        let job = LidSpaceCompaction::new(handler.clone(), 0.5, Duration::ZERO, Duration::ZERO);
        job.run();

        assert_eq!(handler.with_view(|v| v.ready.num_docs()), 1);
    }
}
