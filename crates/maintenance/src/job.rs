//! The background-job contract (spec §3 "Maintenance job", §4.4): name,
//! schedule, cooperative-yield `run()`, and a blocked flag the bucket
//! freezer can set/clear.
//!
//! Grounded on the teacher's `index-scheduler`, where `IndexScheduler::tick`
//! is the single driving loop over a queue of batched work; here each
//! `Job` is its own independently-scheduled unit instead of one shared
//! batch, matching spec §4.4's `JobList` of named, independently-timed
//! jobs.

use std::time::Duration;

/// One registered background job. `run` returns `true` when its work is
/// complete for this tick (wait `interval` before running again) and
/// `false` to be re-queued immediately — the cooperative split spec §3
/// describes for jobs with more work than fits in one tick.
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// How long after registration the job's first run is scheduled.
    fn delay(&self) -> Duration;

    /// Steady-state period between a completed run and the next one.
    fn interval(&self) -> Duration;

    /// Whether the job is currently prevented from running (e.g. bucket
    /// freeze contention, spec §4.4). A blocked job is skipped by the
    /// controller even when its interval fires.
    fn blocked(&self) -> bool;

    fn set_blocked(&self, blocked: bool);

    /// Executes one unit of work. `true` means this tick's work is done;
    /// `false` means the job should be invoked again immediately without
    /// waiting for `interval`.
    fn run(&self) -> bool;
}
