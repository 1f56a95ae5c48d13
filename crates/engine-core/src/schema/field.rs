//! Field declarations shared by index, attribute, and summary fields.
//!
//! The three field kinds look almost identical (name + type + timestamp)
//! but are kept as distinct structs rather than one generic `Field<Kind>`,
//! the way the teacher keeps `IndexField`/`FilterableAttributesRule`/etc.
//! as separate small types instead of one parameterized type — it reads
//! better at the call site and each kind grows independent knobs over
//! time (e.g. `prefix`/`phrases`/`positions` only make sense for index
//! fields).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DataType {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    BooleanTree,
    Tensor,
    Raw,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum CollectionType {
    Single,
    Array,
    WeightedSet,
}

/// Seconds since epoch at which the field was introduced into the
/// schema. Used by [`super::Schema::get_old_fields`] to recover a prior
/// schema and by `WipeOldRemovedFields` (maintenance) to compute what to
/// wipe after a field is removed.
pub type FieldTimestamp = i64;

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    pub data_type: DataType,
    pub collection_type: CollectionType,
    pub prefix: bool,
    pub phrases: bool,
    pub positions: bool,
    pub average_element_len: i32,
    pub timestamp: FieldTimestamp,
}

impl IndexField {
    pub fn new(name: impl Into<String>, data_type: DataType, collection_type: CollectionType) -> Self {
        IndexField {
            name: name.into(),
            data_type,
            collection_type,
            prefix: false,
            phrases: false,
            positions: false,
            average_element_len: 0,
            timestamp: 0,
        }
    }

    /// Matches on name + data type + collection type; used by
    /// [`super::Schema::intersect`], which requires "both name and full
    /// type match".
    pub fn same_type_as(&self, other: &IndexField) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.collection_type == other.collection_type
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct AttributeField {
    pub name: String,
    pub data_type: DataType,
    pub collection_type: CollectionType,
    pub timestamp: FieldTimestamp,
}

impl AttributeField {
    pub fn new(name: impl Into<String>, data_type: DataType, collection_type: CollectionType) -> Self {
        AttributeField { name: name.into(), data_type, collection_type, timestamp: 0 }
    }

    pub fn same_type_as(&self, other: &AttributeField) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.collection_type == other.collection_type
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SummaryField {
    pub name: String,
    pub data_type: DataType,
    pub timestamp: FieldTimestamp,
}

impl SummaryField {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        SummaryField { name: name.into(), data_type, timestamp: 0 }
    }

    pub fn same_type_as(&self, other: &SummaryField) -> bool {
        self.name == other.name && self.data_type == other.data_type
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct FieldSet {
    pub name: String,
    pub fields: Vec<String>,
    pub timestamp: FieldTimestamp,
}

impl FieldSet {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        FieldSet { name: name.into(), fields, timestamp: 0 }
    }
}
