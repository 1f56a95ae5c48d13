use thiserror::Error;

/// The stable result-code taxonomy described in spec §7 and §6 ("Reply
/// kinds carry a result code with a stable taxonomy"). Every [`Error`]
/// maps to exactly one of these through [`Error::code`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Code {
    None,
    TransientError,
    PermanentError,
    ResourceExhausted,
    StaleTimestamp,
    Busy,
    WrongDistribution,
}

/// Errors produced anywhere in the attribute, feed, or matching
/// subsystems.
///
/// Propagation policy (spec §7): an attribute-level exception is caught at
/// the `FeedHandler` boundary and surfaced as [`Code::PermanentError`];
/// a per-thread match exception fails the query. Fatal conditions (corrupt
/// attribute file, rejected TLS prune, serial regression) are not
/// represented here — callers are expected to log and exit on those
/// rather than unwind through this enum.
#[derive(Error, Debug)]
pub enum Error {
    #[error("attribute `{0}` has no doc at lid {1}, addDoc must be called first")]
    LidNotAllocated(String, u32),

    #[error("attribute `{0}`: serial regression, saw {observed} after {last_sync_token}")]
    SerialRegression { name: String, observed: u64, last_sync_token: u64 },

    #[error("attribute `{name}` rejected write: {message}")]
    AttributeWrite { name: String, message: String },

    #[error("schema field `{0}` already exists")]
    DuplicateField(String),

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("io error while {context}: {source}")]
    Io { context: String, #[source] source: std::io::Error },

    #[error("transaction log prune to {0} was rejected")]
    TlsPruneRejected(u64),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("stale timestamp for doc, existing timestamp is newer")]
    StaleTimestamp,

    #[error("bucket {0:?} is busy, ownership transitioning")]
    Busy(crate::docmeta::BucketId),

    #[error("wrong distribution for bucket {0:?}")]
    WrongDistribution(crate::docmeta::BucketId),

    #[error("rejected config: {0}")]
    RejectedConfig(String),

    #[error("query parse error: {0}")]
    QueryParse(String),
}

impl Error {
    pub fn code(&self) -> Code {
        match self {
            Error::Io { .. } => Code::TransientError,
            Error::ResourceExhausted(_) => Code::ResourceExhausted,
            Error::StaleTimestamp => Code::StaleTimestamp,
            Error::Busy(_) => Code::Busy,
            Error::WrongDistribution(_) => Code::WrongDistribution,
            Error::LidNotAllocated(..)
            | Error::SerialRegression { .. }
            | Error::AttributeWrite { .. }
            | Error::DuplicateField(_)
            | Error::UnknownField(_)
            | Error::TlsPruneRejected(_)
            | Error::RejectedConfig(_)
            | Error::QueryParse(_) => Code::PermanentError,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
