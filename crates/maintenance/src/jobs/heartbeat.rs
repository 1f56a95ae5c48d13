//! Periodically calls `FeedHandler::heart_beat`, keeping `lastSyncToken`
//! advancing on every attribute even during idle periods (spec §4.4
//! "HeartBeat").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_core::feed::view::SubDbFeedView;
use engine_core::feed::FeedHandler;

use crate::job::Job;

pub struct HeartBeat {
    handler: Arc<FeedHandler<SubDbFeedView>>,
    delay: Duration,
    interval: Duration,
    blocked: AtomicBool,
}

impl HeartBeat {
    pub fn new(handler: Arc<FeedHandler<SubDbFeedView>>, delay: Duration, interval: Duration) -> Self {
        HeartBeat { handler, delay, interval, blocked: AtomicBool::new(false) }
    }
}

impl Job for HeartBeat {
    fn name(&self) -> &str {
        "heartbeat"
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
        self.handler.heart_beat();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::feed::tls::InMemoryTransactionLog;
    use engine_core::feed::FeedHandlerOptions;
    use engine_core::schema::field::AttributeField;
    use engine_core::schema::{CollectionType, DataType};

    #[test]
    fn heartbeat_advances_last_sync_token_on_every_attribute() {
        let mut view = SubDbFeedView::new();
        let field = AttributeField::new("score", DataType::Int32, CollectionType::Single);
        view.ready.add_attribute(&field);
        let handler = Arc::new(FeedHandler::new(view, Arc::new(InMemoryTransactionLog::new()), FeedHandlerOptions::default()));
        handler.change_to_normal_feed_state();

        let job = HeartBeat::new(handler.clone(), Duration::ZERO, Duration::ZERO);
        job.run();
        job.run();

        let before = handler.with_view(|v| v.ready.attributes().get("score").unwrap().lock().unwrap().last_sync_token());
        job.run();
        let after = handler.with_view(|v| v.ready.attributes().get("score").unwrap().lock().unwrap().last_sync_token());
        assert!(after >= before);
    }
}
