//! Boolean query tree and its flattening rules (spec §4.6).
//!
//! Grounded on `milli/src/search/new/query_graph.rs`'s `Operation` tree
//! (an `And`/`Or`/`Phrase` graph built by parsing query text) for the
//! node shape, simplified here since tokenization and query-text parsing
//! are out of scope (spec §1) — this tree is built directly by the
//! caller from an already-decoded `STACK` representation (spec §6).

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::docmeta::Lid;

/// Per-term position list. Most matches carry only a handful of
/// positions per document, so this stays inline rather than
/// heap-allocating like a `Vec` would (mirrors `milli`'s own use of
/// `smallvec` for small per-document collections).
pub type Positions = SmallVec<[u32; 4]>;

/// One node of the query tree (spec §4.6). Hit lists (docid + positions)
/// live only at `Term` leaves; every other node is a pure boolean
/// combinator evaluated over its children's results.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryNode {
    And(Vec<QueryNode>),
    /// `a[0] ∧ ¬a[1] ∧ …`
    AndNot(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
    /// Ordered, distance-1 positions.
    Phrase(Vec<QueryNode>),
    /// Unordered within `distance`.
    Near { terms: Vec<QueryNode>, distance: u32 },
    /// Ordered within `distance`.
    ONear { terms: Vec<QueryNode>, distance: u32 },
    Equiv(Vec<QueryNode>),
    True,
    Term { field: String, term: String },
}

impl QueryNode {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        QueryNode::Term { field: field.into(), term: term.into() }
    }

    /// Recursively flattens absorbable combinators (spec §4.6):
    /// `AND` absorbs nested `AND`s; `OR` absorbs `OR`, weighted-set,
    /// `DOT_PRODUCT`, `WAND` (modeled here as any nested `Or`, since
    /// those weighted forms all reduce to an `Or` of their terms once
    /// weights are stripped — weighting itself is a ranking concern,
    /// §4.5, not a boolean-evaluation one); `EQUIV` absorbs weighted-set
    /// (modeled the same way, as nested `Equiv`/`Or`).
    pub fn flatten(self) -> QueryNode {
        match self {
            QueryNode::And(children) => {
                let mut out = Vec::with_capacity(children.len());
                for child in children {
                    match child.flatten() {
                        QueryNode::And(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                QueryNode::And(out)
            }
            QueryNode::Or(children) => {
                let mut out = Vec::with_capacity(children.len());
                for child in children {
                    match child.flatten() {
                        QueryNode::Or(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                QueryNode::Or(out)
            }
            QueryNode::Equiv(children) => {
                let mut out = Vec::with_capacity(children.len());
                for child in children {
                    match child.flatten() {
                        QueryNode::Equiv(inner) | QueryNode::Or(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                QueryNode::Equiv(out)
            }
            QueryNode::AndNot(children) => QueryNode::AndNot(children.into_iter().map(QueryNode::flatten).collect()),
            QueryNode::Not(inner) => QueryNode::Not(Box::new(inner.flatten())),
            QueryNode::Phrase(terms) => QueryNode::Phrase(terms),
            QueryNode::Near { terms, distance } => QueryNode::Near { terms, distance },
            QueryNode::ONear { terms, distance } => QueryNode::ONear { terms, distance },
            QueryNode::True | QueryNode::Term { .. } => self,
        }
    }
}

/// Per-document positions a query leaf matched at, keyed by lid. The
/// evaluation result spec §4.6 calls "boolean with hit-lists attached to
/// leaves".
pub type HitList = HashMap<Lid, Positions>;

/// Evaluates `node` against `lookup` (a term → docid/positions resolver
/// standing in for the out-of-scope posting-list codec, spec §1),
/// producing the positions that survive every boolean constraint. For
/// non-phrase/near combinators only membership matters for downstream
/// ranking (spec §4.5 reads positions off the *original* leaf hit list,
/// not the combinator's), so `And`/`Or`/`Not` pass through whichever
/// child's positions first produced the match while still recomputing
/// correct docid membership.
pub fn evaluate(node: &QueryNode, lookup: &dyn Fn(&str, &str) -> Vec<(Lid, Positions)>) -> HitList {
    match node {
        QueryNode::True => HitList::new(),
        QueryNode::Term { field, term } => lookup(field, term).into_iter().collect(),
        QueryNode::And(children) => {
            let evaluated: Vec<HitList> = children.iter().map(|c| evaluate(c, lookup)).collect();
            intersect_all(&evaluated)
        }
        QueryNode::Or(children) | QueryNode::Equiv(children) => {
            let mut out = HitList::new();
            for child in children {
                for (lid, positions) in evaluate(child, lookup) {
                    out.entry(lid).or_insert(positions);
                }
            }
            out
        }
        QueryNode::AndNot(children) => {
            let Some((first, rest)) = children.split_first() else { return HitList::new() };
            let mut out = evaluate(first, lookup);
            for child in rest {
                let excluded = evaluate(child, lookup);
                out.retain(|lid, _| !excluded.contains_key(lid));
            }
            out
        }
        QueryNode::Not(inner) => {
            // A bare NOT has no universe to complement against without
            // an enclosing AND; treated as "matches nothing on its own",
            // consistent with it only ever appearing as an AndNot
            // operand in a well-formed tree (spec §4.6).
            let _ = evaluate(inner, lookup);
            HitList::new()
        }
        QueryNode::Phrase(terms) => evaluate_phrase(terms, lookup, 1, true),
        QueryNode::Near { terms, distance } => evaluate_phrase(terms, lookup, *distance, false),
        QueryNode::ONear { terms, distance } => evaluate_phrase(terms, lookup, *distance, true),
    }
}

fn intersect_all(lists: &[HitList]) -> HitList {
    let Some((first, rest)) = lists.split_first() else { return HitList::new() };
    let mut out = first.clone();
    for list in rest {
        out.retain(|lid, _| list.contains_key(lid));
    }
    out
}

/// Shared implementation for `PHRASE`/`NEAR`/`ONEAR`: a document matches
/// only if every term matched and there exists an assignment of one
/// position per term satisfying the ordering/distance constraint (spec
/// §4.6 "PHRASE validates ordering and distance=1 on positions").
fn evaluate_phrase(terms: &[QueryNode], lookup: &dyn Fn(&str, &str) -> Vec<(Lid, Positions)>, distance: u32, ordered: bool) -> HitList {
    let evaluated: Vec<HitList> = terms.iter().map(|t| evaluate(t, lookup)).collect();
    let mut out = HitList::new();
    let Some((first, rest)) = evaluated.split_first() else { return out };
    'doc: for (lid, first_positions) in first {
        for other in rest {
            if !other.contains_key(lid) {
                continue 'doc;
            }
        }
        for &start in first_positions {
            if let Some(matched) = try_sequence(&evaluated, *lid, start, distance, ordered) {
                out.insert(*lid, matched);
                continue 'doc;
            }
        }
    }
    out
}

/// Tries to build a run of positions, one per term in `evaluated`,
/// starting from `evaluated[0]`'s `start` position, such that each
/// subsequent term has a position within `distance` of the previous
/// one (and, if `ordered`, strictly after it).
fn try_sequence(evaluated: &[HitList], lid: Lid, start: u32, distance: u32, ordered: bool) -> Option<Positions> {
    let mut chosen: Positions = smallvec::smallvec![start];
    let mut prev = start;
    for term_hits in &evaluated[1..] {
        let positions = term_hits.get(&lid)?;
        let next = positions.iter().copied().find(|&p| {
            if ordered {
                p > prev && p - prev <= distance
            } else {
                p != prev && p.abs_diff(prev) <= distance
            }
        })?;
        chosen.push(next);
        prev = next;
    }
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(u8, &[u32])]) -> Vec<(Lid, Positions)> {
        entries.iter().map(|(lid, positions)| (*lid as Lid, positions.iter().copied().collect())).collect()
    }

    #[test]
    fn and_flattens_nested_ands() {
        let tree = QueryNode::And(vec![
            QueryNode::term("f", "a"),
            QueryNode::And(vec![QueryNode::term("f", "b"), QueryNode::term("f", "c")]),
        ]);
        let QueryNode::And(children) = tree.flatten() else { panic!("expected And") };
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn or_absorbs_nested_or() {
        let tree = QueryNode::Or(vec![QueryNode::term("f", "a"), QueryNode::Or(vec![QueryNode::term("f", "b")])]);
        let QueryNode::Or(children) = tree.flatten() else { panic!("expected Or") };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn and_evaluates_to_intersection() {
        let lookup = |_field: &str, term: &str| match term {
            "a" => table(&[(1, &[0]), (2, &[0])]),
            "b" => table(&[(2, &[0]), (3, &[0])]),
            _ => vec![],
        };
        let tree = QueryNode::And(vec![QueryNode::term("f", "a"), QueryNode::term("f", "b")]);
        let result = evaluate(&tree, &lookup);
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn andnot_excludes_later_operands() {
        let lookup = |_field: &str, term: &str| match term {
            "a" => table(&[(1, &[0]), (2, &[0])]),
            "b" => table(&[(2, &[0])]),
            _ => vec![],
        };
        let tree = QueryNode::AndNot(vec![QueryNode::term("f", "a"), QueryNode::term("f", "b")]);
        let result = evaluate(&tree, &lookup);
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn phrase_requires_ordered_adjacent_positions() {
        let lookup = |_field: &str, term: &str| match term {
            "quick" => table(&[(1, &[0, 5]), (2, &[3])]),
            "fox" => table(&[(1, &[1]), (2, &[10])]),
            _ => vec![],
        };
        let tree = QueryNode::Phrase(vec![QueryNode::term("f", "quick"), QueryNode::term("f", "fox")]);
        let result = evaluate(&tree, &lookup);
        // doc 1: position 0 followed immediately by 1 -> matches.
        // doc 2: position 3 then 10 is not adjacent -> no match.
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn near_allows_unordered_within_distance() {
        let lookup = |_field: &str, term: &str| match term {
            "a" => table(&[(1, &[10])]),
            "b" => table(&[(1, &[7])]),
            _ => vec![],
        };
        let tree = QueryNode::Near { terms: vec![QueryNode::term("f", "a"), QueryNode::term("f", "b")], distance: 3 };
        let result = evaluate(&tree, &lookup);
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![1]);
    }
}
