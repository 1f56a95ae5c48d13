//! End-to-end scenario tests exercising the public API across module
//! boundaries (spec §8), as opposed to the per-module unit tests
//! co-located with each subsystem.

use std::collections::HashMap;

use engine_core::attribute::AttributeValue;
use engine_core::docmeta::{BucketId, Gid};
use engine_core::error::Code;
use engine_core::feed::tls::InMemoryTransactionLog;
use engine_core::feed::view::SubDbFeedView;
use engine_core::feed::{FeedHandler, FeedHandlerOptions};
use engine_core::schema::field::{AttributeField, FieldSet, IndexField};
use engine_core::schema::{io, CollectionType, DataType, Schema};
use std::sync::Arc;

fn gid(n: u8) -> Gid {
    Gid::from_bytes([n; 16])
}

fn handler_with_score_attribute() -> FeedHandler<SubDbFeedView> {
    let mut view = SubDbFeedView::new();
    let field = AttributeField::new("score", DataType::Int32, CollectionType::Single);
    view.ready.add_attribute(&field);
    view.removed.add_attribute(&field);
    view.not_ready.add_attribute(&field);
    let handler = FeedHandler::new(view, Arc::new(InMemoryTransactionLog::new()), FeedHandlerOptions::default());
    handler.change_to_normal_feed_state();
    handler
}

/// S1 — Schema round-trip: build the exact schema the scenario names,
/// save it, load it back, and compare.
#[test]
fn s1_schema_round_trips_through_disk() {
    let mut schema = Schema::new();
    schema.add_index_field(IndexField::new("ia", DataType::String, CollectionType::Single)).unwrap();
    schema.add_attribute_field(AttributeField::new("aa", DataType::Int32, CollectionType::Single)).unwrap();
    schema.add_attribute_field(AttributeField::new("aaa", DataType::Int32, CollectionType::Array)).unwrap();
    schema.add_attribute_field(AttributeField::new("aaw", DataType::Int32, CollectionType::WeightedSet)).unwrap();
    schema.add_field_set(FieldSet::new("default", vec!["ia".to_string()])).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s");
    assert!(io::save(&schema, &path));

    let loaded = io::load(&path).expect("schema file must load back");
    assert_eq!(loaded, schema);
}

/// S4 — Feed reject under resource pressure: Put is rejected with the
/// write filter's message, Remove always goes through.
#[test]
fn s4_write_filter_rejects_puts_but_never_removes() {
    let handler = handler_with_score_attribute();
    handler.write_filter().reject("Disk is full");

    let put_reply = handler.perform_put(gid(1), BucketId::new(0), 1, HashMap::new(), None);
    assert_eq!(put_reply.code, Code::ResourceExhausted);
    assert_eq!(put_reply.message.as_deref(), Some("Disk is full"));

    let remove_reply = handler.perform_remove(gid(1), 2, None);
    assert_eq!(remove_reply.code, Code::None);
}

/// S4 continued — Remove relocates the document out of `Ready` even
/// while the write filter is rejecting puts, and a document fed before
/// the filter was armed remains queryable by its attribute value.
#[test]
fn s4_put_accepted_before_rejection_is_unaffected_by_a_later_filter() {
    let handler = handler_with_score_attribute();

    let mut fields = HashMap::new();
    fields.insert("score".to_string(), AttributeValue::Numeric(42.0));
    let reply = handler.perform_put(gid(2), BucketId::new(0), 1, fields, None);
    assert_eq!(reply.code, Code::None);

    handler.write_filter().reject("Disk is full");
    let rejected = handler.perform_put(gid(3), BucketId::new(0), 2, HashMap::new(), None);
    assert_eq!(rejected.code, Code::ResourceExhausted);

    assert_eq!(handler.with_view(|v| v.ready.live_count()), 1, "the pre-filter put must still be live");
}
