//! The default jobs spec §4.4 injects into every `MaintenanceController`:
//! bucket moves, tombstone pruning, heartbeats, field-history wipes,
//! session-cache pruning, and lid-space compaction.

pub mod bucket_mover;
pub mod heartbeat;
pub mod lid_space_compaction;
pub mod prune_removed_documents;
pub mod session_cache_pruner;
pub mod wipe_old_removed_fields;

pub use bucket_mover::BucketMover;
pub use heartbeat::HeartBeat;
pub use lid_space_compaction::LidSpaceCompaction;
pub use prune_removed_documents::PruneRemovedDocuments;
pub use session_cache_pruner::SessionCachePruner;
pub use wipe_old_removed_fields::WipeOldRemovedFields;
