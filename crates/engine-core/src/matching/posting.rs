//! Attribute-value posting lists and the range-query/diversity/cost-model
//! machinery of spec §4.8.
//!
//! The actual on-disk posting-list codec is out of scope (spec §1,
//! non-goal) — `PostingListSource` is the trait boundary a deployment's
//! codec implements; `range_query` and the cost model here only depend
//! on its dictionary-ordering and cardinality-estimate contract, mirrored
//! on `milli/src/update/available_ids.rs`'s use of a `RoaringBitmap` as
//! the in-memory stand-in for a real postings structure, and on
//! `milli/src/facet/facet_sort_recursive.rs`'s recursive descent over a
//! sorted facet-value dictionary for range iteration.

use std::collections::HashMap;

use crate::docmeta::Lid;

/// One dictionary entry: a sort key (the attribute value, already
/// encoded so that byte/numeric order matches logical order, spec §6)
/// and the lids whose attribute holds that value.
#[derive(Clone, Debug, PartialEq)]
pub struct PostingListRef<K> {
    pub key: K,
    pub lids: Vec<Lid>,
}

/// The read-side boundary onto a real postings structure (spec §4.8's
/// "attribute dictionary"). `K` is the attribute's sort-key type —
/// typically the decoded numeric or string value.
pub trait PostingListSource<K: Ord + Clone> {
    /// All dictionary entries with `key` in `[low, high]`, in ascending
    /// key order.
    fn dictionary_range(&self, low: &K, high: &K) -> Vec<PostingListRef<K>>;

    /// A cheap, possibly inexact, count of documents a term/range would
    /// match, used only to pick a strategy, never to decide correctness.
    fn approximate_hits(&self, low: &K, high: &K) -> u64;
}

/// In-memory reference implementation used by tests and small
/// deployments without a standalone postings engine: a flat, pre-sorted
/// dictionary.
pub struct InMemoryPostingList<K: Ord + Clone> {
    entries: Vec<PostingListRef<K>>,
}

impl<K: Ord + Clone> InMemoryPostingList<K> {
    pub fn new(mut entries: Vec<PostingListRef<K>>) -> Self {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        InMemoryPostingList { entries }
    }
}

impl<K: Ord + Clone> PostingListSource<K> for InMemoryPostingList<K> {
    fn dictionary_range(&self, low: &K, high: &K) -> Vec<PostingListRef<K>> {
        self.entries.iter().filter(|e| &e.key >= low && &e.key <= high).cloned().collect()
    }

    fn approximate_hits(&self, low: &K, high: &K) -> u64 {
        self.dictionary_range(low, high).iter().map(|e| e.lids.len() as u64).sum()
    }
}

/// Caps applied to a range query's result (spec §4.8): `range_limit`
/// truncates from one end of the dictionary order (positive: keep the
/// first N from the low side; negative: keep the last N from the high
/// side), independent of how many total hits the range actually has.
#[derive(Clone, Copy, Debug, Default)]
pub struct RangeLimit {
    pub range_limit: Option<i64>,
}

/// Diversity constraint (spec §4.8): group hits by another attribute's
/// value and cap how many survive per group, preserving dictionary order
/// within and across groups.
pub struct Diversity<'a, D> {
    /// Maps a matched lid to its diversity-attribute value.
    pub group_of: &'a dyn Fn(Lid) -> D,
    pub max_per_group: usize,
}

/// Runs a bounded range query against `source` (spec §4.8). Applies
/// `range_limit` first (it bounds which dictionary entries are even
/// considered), then `diversity` (it thins the lids drawn from those
/// entries).
pub fn range_query<K, D, S>(source: &S, low: &K, high: &K, limit: RangeLimit, diversity: Option<Diversity<D>>) -> Vec<Lid>
where
    K: Ord + Clone,
    D: Eq + std::hash::Hash,
    S: PostingListSource<K>,
{
    let mut entries = source.dictionary_range(low, high);
    if let Some(range_limit) = limit.range_limit {
        entries = apply_range_limit(entries, range_limit);
    }
    let lids: Vec<Lid> = entries.into_iter().flat_map(|e| e.lids).collect();
    match diversity {
        Some(diversity) => apply_diversity(lids, &diversity),
        None => lids,
    }
}

/// `rangeLimit` semantics (spec §4.8): positive N keeps the first N
/// lids encountered scanning the dictionary low-to-high; negative N
/// keeps the last N scanning high-to-low (i.e. the N entries/lids
/// closest to the high end), preserving overall ascending order either
/// way.
fn apply_range_limit<K: Clone>(entries: Vec<PostingListRef<K>>, range_limit: i64) -> Vec<PostingListRef<K>> {
    if range_limit == 0 {
        return Vec::new();
    }
    let take = range_limit.unsigned_abs() as usize;
    let mut out = Vec::new();
    let mut taken = 0usize;
    if range_limit > 0 {
        for entry in entries {
            if taken >= take {
                break;
            }
            let remaining = take - taken;
            if entry.lids.len() <= remaining {
                taken += entry.lids.len();
                out.push(entry);
            } else {
                taken = take;
                out.push(PostingListRef { key: entry.key, lids: entry.lids[..remaining].to_vec() });
            }
        }
        out
    } else {
        let mut rev: Vec<PostingListRef<K>> = Vec::new();
        for entry in entries.into_iter().rev() {
            if taken >= take {
                break;
            }
            let remaining = take - taken;
            if entry.lids.len() <= remaining {
                taken += entry.lids.len();
                rev.push(entry);
            } else {
                taken = take;
                let start = entry.lids.len() - remaining;
                rev.push(PostingListRef { key: entry.key, lids: entry.lids[start..].to_vec() });
            }
        }
        rev.reverse();
        rev
    }
}

fn apply_diversity<D: Eq + std::hash::Hash>(lids: Vec<Lid>, diversity: &Diversity<D>) -> Vec<Lid> {
    let mut counts: HashMap<D, usize> = HashMap::new();
    lids.into_iter()
        .filter(|&lid| {
            let group = (diversity.group_of)(lid);
            let count = counts.entry(group).or_insert(0);
            if *count < diversity.max_per_group {
                *count += 1;
                true
            } else {
                false
            }
        })
        .collect()
}

/// Strategy choice between a direct filter scan and a posting-list
/// lookup (spec §4.8 "cost model"): `filterCost ≈ F · numValues` against
/// `postingCost ≈ P · approxHits`, picking whichever is cheaper. `F` and
/// `P` are per-deployment calibration constants (relative per-candidate
/// cost of a filter probe vs. a posting-list read), not derived here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Filter,
    PostingList,
}

pub fn choose_strategy(num_values: u64, approx_hits: u64, filter_unit_cost: f64, posting_unit_cost: f64) -> Strategy {
    let filter_cost = filter_unit_cost * num_values as f64;
    let posting_cost = posting_unit_cost * approx_hits as f64;
    if posting_cost <= filter_cost { Strategy::PostingList } else { Strategy::Filter }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> InMemoryPostingList<u32> {
        InMemoryPostingList::new(vec![
            PostingListRef { key: 7, lids: vec![1] },
            PostingListRef { key: 17, lids: vec![2, 3] },
            PostingListRef { key: 27, lids: vec![4, 5, 6] },
            PostingListRef { key: 37, lids: vec![7] },
        ])
    }

    /// Scenario S6 (spec §8): dictionary {7:[d1], 17:[d2,d3], 27:[d4,d5,d6],
    /// 37:[d7]}, range [7,37], rangeLimit=+3 must return exactly the
    /// first three hits scanning from the low end: d1, d2, d3.
    #[test]
    fn range_limit_plus_three_keeps_the_first_three_hits_from_the_low_side() {
        let dictionary = dictionary();
        let hits = range_query(&dictionary, &7u32, &37u32, RangeLimit { range_limit: Some(3) }, None);
        assert_eq!(hits, vec![1, 2, 3]);
    }

    #[test]
    fn range_limit_minus_three_keeps_the_last_three_hits_from_the_high_side() {
        let dictionary = dictionary();
        let hits = range_query(&dictionary, &7u32, &37u32, RangeLimit { range_limit: Some(-3) }, None);
        assert_eq!(hits, vec![5, 6, 7]);
    }

    #[test]
    fn no_range_limit_returns_everything_in_range() {
        let dictionary = dictionary();
        let hits = range_query(&dictionary, &7u32, &37u32, RangeLimit::default(), None);
        assert_eq!(hits, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn diversity_caps_hits_per_group_preserving_order() {
        let dictionary = dictionary();
        // lids 1,2,4 in group "x", the rest in group "y"; cap 1 per group.
        let group_of = |lid: Lid| if matches!(lid, 1 | 2 | 4) { "x" } else { "y" };
        let diversity = Diversity { group_of: &group_of, max_per_group: 1 };
        let hits = range_query(&dictionary, &7u32, &37u32, RangeLimit::default(), Some(diversity));
        assert_eq!(hits, vec![1, 3]);
    }

    #[test]
    fn cost_model_prefers_posting_list_when_approx_hits_are_few() {
        let strategy = choose_strategy(1_000_000, 5, 1.0, 1.0);
        assert_eq!(strategy, Strategy::PostingList);
    }

    #[test]
    fn cost_model_prefers_filter_when_range_covers_nearly_everything() {
        let strategy = choose_strategy(10, 1_000_000, 1.0, 1.0);
        assert_eq!(strategy, Strategy::Filter);
    }
}
