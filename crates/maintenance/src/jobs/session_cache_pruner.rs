//! Drops expired grouping/search sessions from the matching engine's
//! [`SessionCache`] (spec §4.4 "SessionCachePruner").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_core::docmeta::Timestamp;
use engine_core::matching::SessionCache;

use crate::clock::Clock;
use crate::job::Job;

pub struct SessionCachePruner {
    cache: Arc<SessionCache>,
    clock: Arc<dyn Clock>,
    ttl: Timestamp,
    delay: Duration,
    interval: Duration,
    blocked: AtomicBool,
}

impl SessionCachePruner {
    pub fn new(cache: Arc<SessionCache>, clock: Arc<dyn Clock>, ttl: Timestamp, delay: Duration, interval: Duration) -> Self {
        SessionCachePruner { cache, clock, ttl, delay, interval, blocked: AtomicBool::new(false) }
    }
}

impl Job for SessionCachePruner {
    fn name(&self) -> &str {
        "session-cache-pruner"
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
        self.cache.prune_expired(self.clock.now(), self.ttl);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use engine_core::matching::query::QueryNode;
    use engine_core::matching::rank::IdentityRank;
    use engine_core::matching::{MatchToolsFactory, RankSetup};

    fn factory() -> MatchToolsFactory {
        let rank_setup = RankSetup { first_phase: Arc::new(IdentityRank), second_phase: None, rank_drop_limit: f32::NEG_INFINITY };
        MatchToolsFactory::new(QueryNode::term("f", "t"), rank_setup, None)
    }

    #[test]
    fn expired_sessions_are_gone_after_a_run() {
        let cache = Arc::new(SessionCache::new());
        cache.insert("stale", factory(), 0);
        let clock = Arc::new(FixedClock::new(1_000));
        let job = SessionCachePruner::new(cache.clone(), clock, 100, Duration::ZERO, Duration::ZERO);

        job.run();
        assert!(cache.is_empty());
    }
}
