//! Result grouping (spec §4.7): a stack of grouping levels, each bucketing
//! hits by a selector and feeding per-group aggregators, with a final
//! order-by + precision truncation pass over each level's groups.
//!
//! Grounded on `milli/src/facet/facet_sort_recursive.rs`'s recursive
//! descent over nested facet levels, adapted from "sort documents within
//! one facet value" to "aggregate and order groups at one nesting level".

use std::collections::HashMap;

use crate::docmeta::Lid;

/// One hit flowing into the grouping tree: the document and whatever
/// ranking score it carries, since order-by expressions may reference it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupInput {
    pub lid: Lid,
    pub score: f32,
}

/// Running aggregate maintained per group (spec §4.7 "aggregators").
/// Deployments needing sum/avg/xor/etc. implement this; `Count` below
/// covers the common case and the literal grouping test.
pub trait Aggregator: Send {
    fn update(&mut self, input: &GroupInput);
    fn value(&self) -> f64;
    fn box_clone(&self) -> Box<dyn Aggregator>;
}

#[derive(Clone, Default)]
pub struct Count(u64);

impl Aggregator for Count {
    fn update(&mut self, _input: &GroupInput) {
        self.0 += 1;
    }
    fn value(&self) -> f64 {
        self.0 as f64
    }
    fn box_clone(&self) -> Box<dyn Aggregator> {
        Box::new(self.clone())
    }
}

/// One expression in an order-by clause: `by` selects the aggregator
/// index within a group (spec "small fixed vector of +/- expr-index"),
/// `ascending` its direction.
#[derive(Clone, Copy, Debug)]
pub struct OrderExpr {
    pub aggregator_index: usize,
    pub ascending: bool,
}

/// One level of the grouping stack (spec §4.7): `selector` buckets an
/// input into a group key at this level, `aggregators` is the template
/// cloned into each new group, `order_by` and `precision` govern
/// `post_merge`'s pass over this level's groups.
pub struct GroupingLevel {
    pub selector: Box<dyn Fn(&GroupInput) -> String + Send>,
    pub aggregator_template: Vec<Box<dyn Aggregator>>,
    pub order_by: Vec<OrderExpr>,
    pub precision: Option<usize>,
}

/// One materialized group: its aggregators, its children (if this isn't
/// the bottom level), and first-seen order for stable tie-breaking.
pub struct Group {
    pub key: String,
    pub aggregators: Vec<Box<dyn Aggregator>>,
    pub children: Option<GroupTree>,
    first_seen: usize,
}

/// A flat map of sibling groups at one nesting level, plus the insertion
/// counter that makes tie-breaking deterministic (SPEC_FULL.md §C
/// "stable first-seen-order ties").
#[derive(Default)]
pub struct GroupTree {
    groups: HashMap<String, Group>,
    order: Vec<String>,
    counter: usize,
}

impl GroupTree {
    pub fn new() -> Self {
        GroupTree::default()
    }

    /// Routes `input` into this level's group (creating it on first
    /// sight), updates its aggregators, and recurses into the next
    /// level's tree if there is one (spec §4.7 "collect").
    pub fn collect(&mut self, levels: &[GroupingLevel], depth: usize, input: &GroupInput) {
        let level = &levels[depth];
        let key = (level.selector)(input);
        let counter = self.counter;
        let has_more = depth + 1 < levels.len();
        let group = self.groups.entry(key.clone()).or_insert_with(|| {
            self.order.push(key.clone());
            let first_seen = counter;
            Group {
                key,
                aggregators: level.aggregator_template.iter().map(|a| a.box_clone()).collect(),
                children: if has_more { Some(GroupTree::new()) } else { None },
                first_seen,
            }
        });
        self.counter += 1;
        for aggregator in &mut group.aggregators {
            aggregator.update(input);
        }
        if let Some(children) = &mut group.children {
            children.collect(levels, depth + 1, input);
        }
    }

    /// Orders this level's groups by `order_by`, breaking ties by
    /// first-seen order (never by key, which would make result order
    /// depend on hash/string ordering instead of input order), then
    /// truncates to `precision` (spec §4.7 "postMerge").
    pub fn post_merge(&mut self, level: &GroupingLevel) -> Vec<&Group> {
        let mut ordered: Vec<&Group> = self.order.iter().map(|k| &self.groups[k]).collect();
        ordered.sort_by(|a, b| {
            for expr in &level.order_by {
                let av = a.aggregators[expr.aggregator_index].value();
                let bv = b.aggregators[expr.aggregator_index].value();
                let cmp = av.partial_cmp(&bv).unwrap_or(std::cmp::Ordering::Equal);
                let cmp = if expr.ascending { cmp } else { cmp.reverse() };
                if cmp != std::cmp::Ordering::Equal {
                    return cmp;
                }
            }
            a.first_seen.cmp(&b.first_seen)
        });
        if let Some(precision) = level.precision {
            ordered.truncate(precision);
        }
        ordered
    }
}

/// The full grouping spec: an ordered stack of levels applied top to
/// bottom (spec §4.7).
pub struct GroupingSpec {
    pub levels: Vec<GroupingLevel>,
}

impl GroupingSpec {
    pub fn run(&self, inputs: &[GroupInput]) -> GroupTree {
        let mut root = GroupTree::new();
        for input in inputs {
            root.collect(&self.levels, 0, input);
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(precision: Option<usize>) -> GroupingLevel {
        GroupingLevel {
            selector: Box::new(|input: &GroupInput| if input.lid % 2 == 0 { "even".to_string() } else { "odd".to_string() }),
            aggregator_template: vec![Box::new(Count::default())],
            order_by: vec![OrderExpr { aggregator_index: 0, ascending: false }],
            precision,
        }
    }

    #[test]
    fn collect_buckets_inputs_by_selector_and_counts_them() {
        let spec = GroupingSpec { levels: vec![level(None)] };
        let inputs = vec![
            GroupInput { lid: 1, score: 0.0 },
            GroupInput { lid: 2, score: 0.0 },
            GroupInput { lid: 3, score: 0.0 },
            GroupInput { lid: 4, score: 0.0 },
            GroupInput { lid: 5, score: 0.0 },
        ];
        let mut tree = spec.run(&inputs);
        let ordered = tree.post_merge(&spec.levels[0]);
        let odd = ordered.iter().find(|g| g.key == "odd").unwrap();
        let even = ordered.iter().find(|g| g.key == "even").unwrap();
        assert_eq!(odd.aggregators[0].value(), 3.0);
        assert_eq!(even.aggregators[0].value(), 2.0);
    }

    #[test]
    fn post_merge_breaks_ties_by_first_seen_order_not_key() {
        // "b" is seen before "a" but both have count 1; "b" must sort
        // first since precision truncation must not silently reorder by
        // an incidental key/hash order.
        let spec = GroupingSpec {
            levels: vec![GroupingLevel {
                selector: Box::new(|input: &GroupInput| if input.lid == 1 { "b".to_string() } else { "a".to_string() }),
                aggregator_template: vec![Box::new(Count::default())],
                order_by: vec![OrderExpr { aggregator_index: 0, ascending: false }],
                precision: None,
            }],
        };
        let inputs = vec![GroupInput { lid: 1, score: 0.0 }, GroupInput { lid: 2, score: 0.0 }];
        let mut tree = spec.run(&inputs);
        let ordered = tree.post_merge(&spec.levels[0]);
        assert_eq!(ordered[0].key, "b");
        assert_eq!(ordered[1].key, "a");
    }

    #[test]
    fn precision_truncates_after_ordering() {
        let spec = GroupingSpec { levels: vec![level(Some(1))] };
        let inputs = vec![
            GroupInput { lid: 1, score: 0.0 },
            GroupInput { lid: 2, score: 0.0 },
            GroupInput { lid: 3, score: 0.0 },
        ];
        let mut tree = spec.run(&inputs);
        let ordered = tree.post_merge(&spec.levels[0]);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].key, "odd");
    }
}
