//! Per-query session cache (spec §4.5): "If an active search session is
//! cached (`sessionId` + 'query' cache token), reuse its
//! `MatchToolsFactory` instead of rebuilding." Also backs the summary
//! feature extraction path's "prefer an active session's
//! `MatchToolsFactory`" rule.
//!
//! Grounded on `milli`'s preference for an explicit, keyed cache over ad
//! hoc interior caching: skip rebuilding something expensive by keying
//! reuse off a handle the caller already has (here, the session key)
//! rather than memoizing implicitly. Pruned by the maintenance crate's
//! `SessionCachePruner` job (spec §4.4).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::docmeta::Timestamp;

use super::MatchToolsFactory;

struct Entry {
    factory: MatchToolsFactory,
    last_touched: Timestamp,
}

/// Keyed by whatever string the caller derives from `sessionId` plus the
/// "query" cache token (spec §4.5); the token scheme itself is a
/// wire-protocol detail out of this core's scope (§1).
#[derive(Default)]
pub struct SessionCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl SessionCache {
    pub fn new() -> Self {
        SessionCache::default()
    }

    pub fn insert(&self, key: impl Into<String>, factory: MatchToolsFactory, now: Timestamp) {
        self.entries.lock().unwrap().insert(key.into(), Entry { factory, last_touched: now });
    }

    /// Returns the cached factory and refreshes its last-touched time, so
    /// a session under continuous use is never pruned mid-stream.
    pub fn get(&self, key: &str, now: Timestamp) -> Option<MatchToolsFactory> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(key)?;
        entry.last_touched = now;
        Some(entry.factory.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Drops every session last touched before `now - ttl` (spec §4.4
    /// "SessionCachePruner"); returns the number of sessions dropped.
    pub fn prune_expired(&self, now: Timestamp, ttl: Timestamp) -> usize {
        let cutoff = now.saturating_sub(ttl);
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.last_touched >= cutoff);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::query::QueryNode;
    use crate::matching::rank::IdentityRank;
    use crate::matching::RankSetup;
    use std::sync::Arc;

    fn factory() -> MatchToolsFactory {
        let rank_setup = RankSetup { first_phase: Arc::new(IdentityRank), second_phase: None, rank_drop_limit: f32::NEG_INFINITY };
        MatchToolsFactory::new(QueryNode::term("f", "t"), rank_setup, None)
    }

    #[test]
    fn expired_sessions_are_pruned_but_fresh_ones_survive() {
        let cache = SessionCache::new();
        cache.insert("old", factory(), 0);
        cache.insert("fresh", factory(), 100);

        let pruned = cache.prune_expired(150, 50);
        assert_eq!(pruned, 1);
        assert!(cache.get("old", 150).is_none());
        assert!(cache.get("fresh", 150).is_some());
    }

    #[test]
    fn get_refreshes_last_touched_so_continuous_use_survives_pruning() {
        let cache = SessionCache::new();
        cache.insert("s", factory(), 0);
        cache.get("s", 40); // touch before the first would-be cutoff
        let pruned = cache.prune_expired(90, 50);
        assert_eq!(pruned, 0);
        assert!(cache.get("s", 90).is_some());
    }
}
