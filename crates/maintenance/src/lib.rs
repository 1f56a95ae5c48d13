//! Background maintenance for one document database: the
//! `MaintenanceController` scheduler, bucket freezing for mutual
//! exclusion with the feed path, and the default jobs spec §4.4
//! registers (`BucketMover`, `PruneRemovedDocuments`, `HeartBeat`,
//! `WipeOldRemovedFields`, `SessionCachePruner`, `LidSpaceCompaction`).
//!
//! Analogous to the teacher's `index-scheduler` relative to `milli`:
//! this crate consumes `engine-core` the way `index-scheduler` consumes
//! `milli`, rather than folding scheduling concerns into the storage
//! crate itself.

pub mod clock;
pub mod controller;
pub mod error;
pub mod freeze;
pub mod job;
pub mod jobs;

pub use clock::{Clock, FixedClock, SystemClock};
pub use controller::{MaintenanceController, MaintenanceOptions};
pub use error::{Error, Result};
pub use freeze::{BucketFreezer, ExclusiveBucketGuard};
pub use job::Job;
