//! Errors the maintenance crate can produce on top of `engine-core`'s own
//! taxonomy (spec §7 propagation policy: "inconsistent on-disk state is
//! fatal" — jobs surface everything else as a retry-eligible error and
//! let the controller log and keep scheduling).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] engine_core::Error),

    #[error("bucket {0:?} is frozen, bucket-mover defers it")]
    BucketFrozen(engine_core::docmeta::BucketId),

    #[error("failed to build maintenance thread pool: {0}")]
    ThreadPool(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
