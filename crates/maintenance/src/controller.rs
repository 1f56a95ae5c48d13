//! `MaintenanceController`: owns the maintenance executor and the
//! `JobList`, scheduling every registered job according to its
//! `(delay, interval)` and respecting `blocked` (spec §4.4, §5
//! "Maintenance executor").
//!
//! Grounded on the `AttributeWriter`'s `SequencedExecutor`
//! (`engine_core::attribute::writer`) for the "dedicated thread(s)
//! draining work" shape; here there's one scheduler thread tracking due
//! times plus a bounded `rayon` pool jobs actually run on, so "different
//! jobs may run in parallel only to the extent permitted by the
//! executor's thread count" (spec §5) is the pool's size, not the
//! scheduler thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::job::Job;

#[derive(Clone, Copy, Debug)]
pub struct MaintenanceOptions {
    /// Bounds how many jobs may run concurrently (spec §5).
    pub num_threads: usize,
    /// How often the scheduler thread re-checks due times; purely an
    /// implementation granularity knob, not part of the spec's
    /// contract.
    pub tick: Duration,
}

impl Default for MaintenanceOptions {
    fn default() -> Self {
        MaintenanceOptions { num_threads: 4, tick: Duration::from_millis(20) }
    }
}

struct Scheduled {
    job: Arc<dyn Job>,
    next_fire: Instant,
}

pub struct MaintenanceController {
    pool: rayon::ThreadPool,
    jobs: Mutex<Vec<Arc<dyn Job>>>,
    stop: Arc<AtomicBool>,
    tick: Duration,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceController {
    pub fn new(options: MaintenanceOptions) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.num_threads.max(1))
            .thread_name(|i| format!("maintenance-{i}"))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        Ok(MaintenanceController { pool, jobs: Mutex::new(Vec::new()), stop: Arc::new(AtomicBool::new(false)), tick: options.tick, scheduler: Mutex::new(None) })
    }

    /// Appends a job to the `JobList` (spec §4.4 `registerJob`). Has no
    /// effect on an already-running scheduler until the next `start`.
    pub fn register_job(&self, job: Arc<dyn Job>) {
        self.jobs.lock().unwrap().push(job);
    }

    pub fn jobs(&self) -> Vec<Arc<dyn Job>> {
        self.jobs.lock().unwrap().clone()
    }

    /// Runs every registered, unblocked job's `run()` once, draining its
    /// cooperative split (looping while it returns `false`) before
    /// moving to the next job. Synchronous and timer-free — the
    /// escape hatch this crate's tests drive directly instead of
    /// waiting on `start`'s real-time loop; `start` itself is what a
    /// running node actually uses.
    pub fn run_pending_once(&self) {
        for job in self.jobs() {
            if job.blocked() {
                continue;
            }
            while !job.run() {}
        }
    }

    /// Starts the real-time scheduler: one dedicated thread tracks each
    /// registered job's next due time and submits due, unblocked jobs
    /// onto the shared pool (spec §4.4 `start(cfg)`).
    pub fn start(self: &Arc<Self>) {
        self.stop.store(false, Ordering::SeqCst);
        let controller = Arc::clone(self);
        let stop = Arc::clone(&self.stop);
        let handle = std::thread::Builder::new()
            .name("maintenance-scheduler".into())
            .spawn(move || {
                let mut schedule: Vec<Scheduled> = controller
                    .jobs()
                    .into_iter()
                    .map(|job| {
                        let next_fire = Instant::now() + job.delay();
                        Scheduled { job, next_fire }
                    })
                    .collect();
                while !stop.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    for entry in &mut schedule {
                        if entry.next_fire > now {
                            continue;
                        }
                        if entry.job.blocked() {
                            // Stays due; re-checked next tick instead of
                            // advancing past its interval (spec §4.4: "a
                            // blocked job remains un-dispatched even
                            // when its interval fires").
                            continue;
                        }
                        let job = entry.job.clone();
                        controller.pool.spawn(move || {
                            while !job.run() {}
                        });
                        entry.next_fire = now + entry.job.interval();
                    }
                    std::thread::sleep(controller.tick);
                }
            })
            .expect("failed to spawn maintenance scheduler thread");
        *self.scheduler.lock().unwrap() = Some(handle);
    }

    /// Stops pending scheduling and drops every registered job (spec
    /// §4.4 "used by reconfig"). Jobs already submitted to the pool
    /// before the stop flag was observed still run to completion; this
    /// only prevents new dispatches.
    pub fn kill_jobs(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.scheduler.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.jobs.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingJob {
        runs: AtomicUsize,
        splits: usize,
        blocked: AtomicBool,
    }

    impl Job for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }
        fn delay(&self) -> Duration {
            Duration::ZERO
        }
        fn interval(&self) -> Duration {
            Duration::ZERO
        }
        fn blocked(&self) -> bool {
            self.blocked.load(Ordering::SeqCst)
        }
        fn set_blocked(&self, blocked: bool) {
            self.blocked.store(blocked, Ordering::SeqCst);
        }
        fn run(&self) -> bool {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            n >= self.splits
        }
    }

    #[test]
    fn run_pending_once_drains_a_cooperative_split_job() {
        let controller = MaintenanceController::new(MaintenanceOptions::default()).unwrap();
        let job = Arc::new(CountingJob { runs: AtomicUsize::new(0), splits: 3, blocked: AtomicBool::new(false) });
        controller.register_job(job.clone());

        controller.run_pending_once();
        assert_eq!(job.runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn blocked_jobs_are_skipped() {
        let controller = MaintenanceController::new(MaintenanceOptions::default()).unwrap();
        let job = Arc::new(CountingJob { runs: AtomicUsize::new(0), splits: 1, blocked: AtomicBool::new(true) });
        controller.register_job(job.clone());

        controller.run_pending_once();
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn kill_jobs_clears_the_registered_list() {
        let controller = Arc::new(MaintenanceController::new(MaintenanceOptions::default()).unwrap());
        let job = Arc::new(CountingJob { runs: AtomicUsize::new(0), splits: 1, blocked: AtomicBool::new(false) });
        controller.register_job(job);
        assert_eq!(controller.jobs().len(), 1);

        controller.start();
        std::thread::sleep(Duration::from_millis(50));
        controller.kill_jobs();
        assert_eq!(controller.jobs().len(), 0);
    }
}
