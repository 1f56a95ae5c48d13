//! Wire-level feed operation kinds and reply codes (spec §6).
//!
//! Grounded on `index-scheduler`'s `Task`/`KindWithContent` split (a
//! flat enum of operation kinds carrying just the data each needs) and
//! on its `Status`/error taxonomy for the reply side.

use std::collections::HashMap;

use crate::attribute::AttributeValue;
use crate::docmeta::{BucketId, Gid, Lid, Timestamp};
use crate::error::Code;

/// One mutating feed operation, always carrying the serial number it was
/// assigned by the writer thread once logged (spec §6).
#[derive(Clone, Debug)]
pub enum Operation {
    Put { gid: Gid, bucket_id: BucketId, timestamp: Timestamp, fields: HashMap<String, AttributeValue> },
    Update { gid: Gid, timestamp: Timestamp, fields: HashMap<String, AttributeValue>, create_if_non_existent: bool },
    Remove { gid: Gid, timestamp: Timestamp },
    RemoveLocation { bucket_id: BucketId },
    Move { gid: Gid, to_not_ready: bool },
    PruneRemovedDocuments { lids: Vec<Lid> },
    WipeHistory { cutoff: Timestamp },
}

/// The reply to a feed operation (spec §6: "Reply kinds carry a result
/// code with a stable taxonomy").
#[derive(Clone, Debug, PartialEq)]
pub struct FeedReply {
    pub code: Code,
    pub message: Option<String>,
    /// For partial-update-to-missing-doc replies (spec §4.3): 0 when no
    /// prior document existed and `createIfNonExistent` was unset.
    pub existing_timestamp: Timestamp,
}

impl FeedReply {
    pub fn ok() -> Self {
        FeedReply { code: Code::None, message: None, existing_timestamp: 0 }
    }

    pub fn error(code: Code, message: impl Into<String>) -> Self {
        FeedReply { code, message: Some(message.into()), existing_timestamp: 0 }
    }

    pub fn missing_doc() -> Self {
        FeedReply { code: Code::None, message: None, existing_timestamp: 0 }
    }
}
