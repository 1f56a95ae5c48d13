//! Per-node search/indexing engine core: attribute storage, the feed
//! pipeline that writes to it, and the matching engine that reads it
//! back out at query time.
//!
//! Module map mirrors the three layers the spec separates (§2):
//! [`schema`] declares what fields exist, [`attribute`] stores their
//! values in generation-counted columns, [`docmeta`] maps external
//! document identity onto the dense local ids attributes are keyed by,
//! [`subdb`] groups those three into the `Ready`/`Removed`/`NotReady`
//! triad, [`feed`] is the single-writer mutation path in front of it,
//! and [`matching`] is the read path.

pub mod attribute;
pub mod docmeta;
pub mod error;
pub mod feed;
pub mod matching;
pub mod schema;
pub mod subdb;

pub use error::{Code, Error, Result};
