//! Per-field column store (spec §2, §4.2).
//!
//! Module shape: [`column_store`] and [`enumstore`] hold the
//! generation-counted primitives; [`variants`] wires them into the eight
//! concrete attribute kinds behind one [`Attribute`] enum;
//! [`flush`] is the on-disk layout; [`manager`] and [`writer`] are the
//! two pieces that coordinate many attributes at once
//! (`AttributeManager` for the schema/lifecycle view, `AttributeWriter`
//! for the executor-lane write path).

pub mod column_store;
pub mod enumstore;
pub mod flush;
pub mod manager;
pub mod value;
pub mod variants;
pub mod writer;

pub use column_store::AttributeGuard;
pub use enumstore::{AttributeEnumGuard, EnumId};
pub use value::{AttributeValue, PredicateValue};
pub use variants::{
    Attribute, MultiNumericAttribute, MultiStringAttribute, PredicateAttribute, SingleNumericAttribute,
    SingleStringAttribute, TensorAttribute, WeightedNumericAttribute, WeightedStringAttribute,
};

use crate::schema::{AttributeField, CollectionType, DataType};

/// Builds a fresh, empty [`Attribute`] matching `field`'s declared type.
/// Mirrors `Attribute::create(name, cfg, initialSerial)` from spec §4.2;
/// the initial serial itself is applied by the caller via the first
/// `commit`, since an empty attribute has nothing to commit yet.
pub fn create_attribute(field: &AttributeField) -> Attribute {
    match (field.data_type, field.collection_type) {
        (DataType::String, CollectionType::Single) => Attribute::SingleString(SingleStringAttribute::new(&field.name)),
        (DataType::String, CollectionType::Array) => Attribute::MultiString(MultiStringAttribute::new(&field.name)),
        (DataType::String, CollectionType::WeightedSet) => {
            Attribute::WeightedString(WeightedStringAttribute::new(&field.name))
        }
        (DataType::Tensor, _) => Attribute::Tensor(TensorAttribute::new(&field.name)),
        (DataType::BooleanTree, _) => Attribute::Predicate(PredicateAttribute::new(&field.name)),
        (_, CollectionType::Single) => Attribute::SingleNumeric(SingleNumericAttribute::new(&field.name)),
        (_, CollectionType::Array) => Attribute::MultiNumeric(MultiNumericAttribute::new(&field.name)),
        (_, CollectionType::WeightedSet) => Attribute::WeightedNumeric(WeightedNumericAttribute::new(&field.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_attribute_picks_matching_variant() {
        let field = AttributeField::new("tags", DataType::String, CollectionType::Array);
        let attr = create_attribute(&field);
        assert!(matches!(attr, Attribute::MultiString(_)));
        assert_eq!(attr.name(), "tags");
    }
}
