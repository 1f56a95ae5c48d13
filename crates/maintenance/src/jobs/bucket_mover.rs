//! Compares configured bucket readiness against the sub-database that
//! currently holds each bucket's documents, and moves the mismatched
//! ones between `Ready` and `NotReady` (spec §4.4 "BucketMover").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use engine_core::docmeta::{BucketId, Gid};
use engine_core::feed::view::SubDbFeedView;
use engine_core::feed::FeedHandler;

use crate::freeze::BucketFreezer;
use crate::job::Job;

/// `readiness(bucket)` is the cluster-state calculator's current verdict
/// ("should this bucket be served", i.e. live in `Ready`);
/// `active(bucket)` reports whether the bucket is exempt from moves
/// until deactivated (spec §4.4 "active buckets are exempt until
/// deactivated").
pub struct BucketMover {
    handler: Arc<FeedHandler<SubDbFeedView>>,
    freezer: Arc<BucketFreezer>,
    buckets: Vec<BucketId>,
    readiness: Box<dyn Fn(BucketId) -> bool + Send + Sync>,
    active: Box<dyn Fn(BucketId) -> bool + Send + Sync>,
    delay: Duration,
    interval: Duration,
    blocked: AtomicBool,
    self_handle: OnceLock<Arc<dyn Job>>,
}

impl BucketMover {
    pub fn new(
        handler: Arc<FeedHandler<SubDbFeedView>>,
        freezer: Arc<BucketFreezer>,
        buckets: Vec<BucketId>,
        readiness: impl Fn(BucketId) -> bool + Send + Sync + 'static,
        active: impl Fn(BucketId) -> bool + Send + Sync + 'static,
        delay: Duration,
        interval: Duration,
    ) -> Arc<Self> {
        let job = Arc::new(BucketMover {
            handler,
            freezer,
            buckets,
            readiness: Box::new(readiness),
            active: Box::new(active),
            delay,
            interval,
            blocked: AtomicBool::new(false),
            self_handle: OnceLock::new(),
        });
        let as_job: Arc<dyn Job> = job.clone();
        let _ = job.self_handle.set(as_job);
        job
    }

    fn gids_in_bucket(&self, bucket: BucketId, from_ready: bool) -> Vec<Gid> {
        self.handler.with_view(|view| {
            let subdb = if from_ready { &view.ready } else { &view.not_ready };
            subdb.iter_bucket(bucket).filter_map(|lid| subdb.meta().entry(lid).map(|e| e.gid)).collect()
        })
    }
}

impl Job for BucketMover {
    fn name(&self) -> &str {
        "bucket-mover"
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
        let self_job = self.self_handle.get().expect("BucketMover must be constructed through BucketMover::new").clone();
        for &bucket in &self.buckets {
            if (self.active)(bucket) {
                continue;
            }
            let desired_ready = (self.readiness)(bucket);
            let Some(_guard) = self.freezer.acquire_exclusive(bucket, &self_job) else { continue };
            // Moving docs out of the sub-database that disagrees with
            // `desired_ready`; `to_not_ready` is always the negation of
            // the desired state regardless of which side is mismatched.
            let mismatched = self.gids_in_bucket(bucket, !desired_ready);
            for gid in mismatched {
                self.handler.handle_move(gid, !desired_ready);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::attribute::AttributeValue;
    use engine_core::docmeta::Timestamp;
    use engine_core::feed::{FeedHandlerOptions, TransactionLog};
    use engine_core::schema::field::AttributeField;
    use engine_core::schema::{CollectionType, DataType};
    use std::collections::HashMap;

    fn gid(n: u8) -> Gid {
        Gid::from_bytes([n; 16])
    }

    fn handler_with_docs(bucket: BucketId, count: u8) -> Arc<FeedHandler<SubDbFeedView>> {
        let mut view = SubDbFeedView::new();
        let field = AttributeField::new("score", DataType::Int32, CollectionType::Single);
        view.ready.add_attribute(&field);
        view.not_ready.add_attribute(&field);
        view.removed.add_attribute(&field);
        let handler = Arc::new(FeedHandler::new(view, Arc::new(engine_core::feed::tls::InMemoryTransactionLog::new()), FeedHandlerOptions::default()));
        handler.change_to_normal_feed_state();
        for n in 0..count {
            let mut fields = HashMap::new();
            fields.insert("score".to_string(), AttributeValue::Numeric(n as f64));
            handler.perform_put(gid(n + 1), bucket, n as Timestamp, fields, None);
        }
        handler
    }

    /// Scenario S5 (spec §8): ready bucket B with 3 docs, marked active;
    /// cluster state demotes B; while active, nothing moves; once
    /// deactivated, all 3 move to not-ready.
    #[test]
    fn active_bucket_is_exempt_until_deactivated() {
        let bucket = BucketId::new(1);
        let handler = handler_with_docs(bucket, 3);
        let freezer = Arc::new(BucketFreezer::new());
        let active = Arc::new(AtomicBool::new(true));
        let active_clone = active.clone();

        let mover = BucketMover::new(
            handler.clone(),
            freezer,
            vec![bucket],
            |_| false, // cluster state now says: not ready
            move |_| active_clone.load(Ordering::SeqCst),
            Duration::ZERO,
            Duration::ZERO,
        );

        mover.run();
        let ready_count = handler.with_view(|v| v.ready.live_count());
        assert_eq!(ready_count, 3, "active bucket must not be moved");

        active.store(false, Ordering::SeqCst);
        mover.run();
        let ready_count = handler.with_view(|v| v.ready.live_count());
        let not_ready_count = handler.with_view(|v| v.not_ready.live_count());
        assert_eq!(ready_count, 0);
        assert_eq!(not_ready_count, 3);
    }

    #[test]
    fn frozen_bucket_is_skipped() {
        let bucket = BucketId::new(2);
        let handler = handler_with_docs(bucket, 1);
        let freezer = Arc::new(BucketFreezer::new());
        freezer.freeze_bucket(bucket);

        let mover = BucketMover::new(handler.clone(), freezer.clone(), vec![bucket], |_| false, |_| false, Duration::ZERO, Duration::ZERO);
        mover.run();
        assert_eq!(handler.with_view(|v| v.ready.live_count()), 1, "frozen bucket must not move");

        freezer.thaw_bucket(bucket);
        mover.run();
        assert_eq!(handler.with_view(|v| v.not_ready.live_count()), 1);
    }
}
