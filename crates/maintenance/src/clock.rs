//! Injectable wall-clock source (spec §9 "avoid global mutable state...
//! model it as an explicit dependency"), used by age-based jobs
//! (`PruneRemovedDocuments`, `WipeOldRemovedFields`) instead of calling
//! the system clock directly so tests can drive them deterministically.

use std::sync::atomic::{AtomicU64, Ordering};

use engine_core::docmeta::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Real wall-clock time, seconds since the Unix epoch.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        time::OffsetDateTime::now_utc().unix_timestamp() as Timestamp
    }
}

/// A clock tests can set directly.
pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn new(initial: Timestamp) -> Self {
        FixedClock(AtomicU64::new(initial))
    }

    pub fn set(&self, value: Timestamp) {
        self.0.store(value, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Timestamp) {
        self.0.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_by_the_requested_amount() {
        let clock = FixedClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now(), 150);
    }
}
