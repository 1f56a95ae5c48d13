//! Docid-range partitioning across match threads, and the three
//! inter-thread rendezvous points the match loop uses (spec §4.5 step 1
//! and §9 "coroutine-like flow in the match loop": cooperative docid-range
//! handoffs instead of async, a communicator exposing
//! `estimate_match_frequency`/`selectBest`/`rangeCover`).
//!
//! Grounded on `milli/src/thread_pool_no_abort.rs`'s pattern of a shared
//! atomic counter guarding concurrent access to a bounded resource — here
//! the resource is "the next unclaimed docid sub-range" rather than
//! "is the pool currently in use".

use std::ops::Range;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// Dynamic range partitioning across match threads (spec §4.5 step 1).
/// Each `acquire_range` call claims the next chunk; `share_range` lets an
/// idle thread steal the unclaimed tail of a busy one (spec §4.5 step 5
/// "idle-observer-driven work stealing").
pub struct DocidRangeScheduler {
    next: AtomicU32,
    limit: u32,
    chunk_size: u32,
}

impl DocidRangeScheduler {
    pub fn new(num_docs: u32) -> Self {
        DocidRangeScheduler::with_chunk_size(num_docs, (num_docs / 64).clamp(1, 4096))
    }

    pub fn with_chunk_size(num_docs: u32, chunk_size: u32) -> Self {
        DocidRangeScheduler { next: AtomicU32::new(0), limit: num_docs, chunk_size: chunk_size.max(1) }
    }

    /// Claims and returns the next unclaimed sub-range, or `None` once
    /// the whole `[0, num_docs)` space has been handed out.
    pub fn acquire_range(&self) -> Option<Range<u32>> {
        loop {
            let start = self.next.load(Ordering::Acquire);
            if start >= self.limit {
                return None;
            }
            let end = (start + self.chunk_size).min(self.limit);
            if self.next.compare_exchange(start, end, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return Some(start..end);
            }
        }
    }

    /// Gives back the unclaimed tail `[from, limit)` of a range a thread
    /// decided not to finish, so an idle thread's next `acquire_range`
    /// can pick it up (spec §4.5 step 5). A no-op if another thread has
    /// already advanced `next` past `from`.
    pub fn share_range(&self, from: u32) {
        let _ = self.next.fetch_min(from, Ordering::AcqRel);
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.next.load(Ordering::Acquire))
    }
}

/// The three rendezvous points a match-loop thread participates in
/// (spec §4.5 steps 4/6, §9). Implemented as lock-free partial-reduction
/// accumulators rather than a blocking `N`-thread barrier: not every
/// thread necessarily calls `estimate_match_frequency` in the same tick
/// (only those that crossed their local `matchPhaseLimit` threshold), so
/// a fixed-arity barrier would risk the threads that never cross it
/// stalling the ones that did. Each call instead folds its contribution
/// into a shared total and returns the current best estimate — correct
/// in the limit as more threads report in, and safe to call zero or
/// many times per thread.
pub struct MatchLoopCommunicator {
    num_threads: usize,
    frequency_sum: AtomicU64,
    frequency_reports: AtomicU64,
    range_min_bits: AtomicU64,
    range_max_bits: AtomicU64,
    best_reported: Mutex<Option<usize>>,
}

impl MatchLoopCommunicator {
    pub fn new(num_threads: usize) -> Self {
        MatchLoopCommunicator {
            num_threads: num_threads.max(1),
            frequency_sum: AtomicU64::new(0),
            frequency_reports: AtomicU64::new(0),
            range_min_bits: AtomicU64::new(f32::INFINITY.to_bits() as u64),
            range_max_bits: AtomicU64::new(f32::NEG_INFINITY.to_bits() as u64),
            best_reported: Mutex::new(None),
        }
    }

    /// Folds in one thread's observed match count after `seen` hits in
    /// its current range, and returns the match-frequency estimate
    /// scaled up to the full thread count (spec §4.5 step 4: "estimate
    /// match frequency across threads via IMatchLoopCommunicator").
    pub fn estimate_match_frequency(&self, _thread_idx: usize, seen: u64) -> u64 {
        self.frequency_sum.fetch_add(seen, Ordering::AcqRel);
        let reports = self.frequency_reports.fetch_add(1, Ordering::AcqRel) + 1;
        let sum = self.frequency_sum.load(Ordering::Acquire);
        (sum / reports) * self.num_threads as u64
    }

    /// How many of a thread's own best hits to re-rank with the
    /// second-phase program (spec §4.5 step 6 `selectBest`). This core
    /// re-ranks after every thread's collector has already been merged
    /// (see `Matcher::search`), so the answer is simply the configured
    /// heap size; a deployment that ranks concurrently with matching
    /// would instead have every thread call this mid-flight and combine
    /// live heap tops here.
    pub fn select_best(&self, heap_size: usize) -> usize {
        let mut best = self.best_reported.lock().unwrap();
        *best = Some(heap_size);
        heap_size
    }

    /// Folds in a thread's local best-score range and returns the global
    /// cover `[min, max]` seen so far, used for second-phase score
    /// scaling (spec §4.5 step 6 "rank-range cover computation").
    pub fn range_cover(&self, local_min: f32, local_max: f32) -> (f32, f32) {
        self.range_min_bits.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            let current = f32::from_bits(bits as u32);
            if local_min < current { Some(local_min.to_bits() as u64) } else { None }
        }).ok();
        self.range_max_bits.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            let current = f32::from_bits(bits as u32);
            if local_max > current { Some(local_max.to_bits() as u64) } else { None }
        }).ok();
        (
            f32::from_bits(self.range_min_bits.load(Ordering::Acquire) as u32),
            f32::from_bits(self.range_max_bits.load(Ordering::Acquire) as u32),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_partition_the_whole_space_without_overlap() {
        let scheduler = DocidRangeScheduler::with_chunk_size(10, 3);
        let mut seen = Vec::new();
        while let Some(range) = scheduler.acquire_range() {
            seen.extend(range);
        }
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn share_range_makes_the_tail_available_again() {
        let scheduler = DocidRangeScheduler::with_chunk_size(100, 50);
        let first = scheduler.acquire_range().unwrap();
        assert_eq!(first, 0..50);
        // Thread only actually consumed up to 10; gives back [10, 50).
        scheduler.share_range(10);
        let reclaimed = scheduler.acquire_range().unwrap();
        assert_eq!(reclaimed.start, 10);
    }

    #[test]
    fn estimate_match_frequency_scales_by_thread_count() {
        let comm = MatchLoopCommunicator::new(4);
        let estimate = comm.estimate_match_frequency(0, 100);
        assert_eq!(estimate, 400);
    }

    #[test]
    fn range_cover_widens_as_threads_report() {
        let comm = MatchLoopCommunicator::new(2);
        let (min, max) = comm.range_cover(1.0, 5.0);
        assert_eq!((min, max), (1.0, 5.0));
        let (min, max) = comm.range_cover(-2.0, 3.0);
        assert_eq!((min, max), (-2.0, 5.0));
    }
}
