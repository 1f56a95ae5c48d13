//! The schema: a declarative, immutable-once-built description of a
//! document database's fields (spec §2, §4.1).
//!
//! Grounded on `milli/src/fields_ids_map.rs` (name-ordered field
//! collections with stable ids) for the ordered-map shape, and on
//! `milli/src/update/settings.rs`'s diff/apply pattern for the set
//! algebra (`intersect`/`make_union`/`set_difference`). Persistence is
//! its own submodule, [`io`], mirroring how the teacher keeps the on-disk
//! `main`-database key list (`index.rs`'s `main_key` module) separate
//! from the in-memory structure.

pub mod field;
pub mod io;

use indexmap::IndexMap;

pub use field::{AttributeField, CollectionType, DataType, FieldSet, FieldTimestamp, IndexField, SummaryField};

use crate::error::{Error, Result};

/// Immutable once constructed: every mutator in this module takes
/// `&mut self` but is only ever called while the schema is being built up
/// (e.g. by [`io::load`] or by a reconfiguration step assembling a new
/// schema); once handed out as a `&Schema` it is treated as a read-only
/// snapshot shared by every other component (spec §2).
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Schema {
    index_fields: IndexMap<String, IndexField>,
    attribute_fields: IndexMap<String, AttributeField>,
    summary_fields: IndexMap<String, SummaryField>,
    field_sets: IndexMap<String, FieldSet>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_fields(&self) -> impl Iterator<Item = &IndexField> {
        self.index_fields.values()
    }

    pub fn attribute_fields(&self) -> impl Iterator<Item = &AttributeField> {
        self.attribute_fields.values()
    }

    pub fn summary_fields(&self) -> impl Iterator<Item = &SummaryField> {
        self.summary_fields.values()
    }

    pub fn field_sets(&self) -> impl Iterator<Item = &FieldSet> {
        self.field_sets.values()
    }

    pub fn get_index_field(&self, name: &str) -> Option<&IndexField> {
        self.index_fields.get(name)
    }

    pub fn get_attribute_field(&self, name: &str) -> Option<&AttributeField> {
        self.attribute_fields.get(name)
    }

    pub fn get_summary_field(&self, name: &str) -> Option<&SummaryField> {
        self.summary_fields.get(name)
    }

    pub fn get_field_set(&self, name: &str) -> Option<&FieldSet> {
        self.field_sets.get(name)
    }

    /// Appends an index field; fails if the name already exists among
    /// index fields (name uniqueness is scoped per-kind, spec §4.1).
    pub fn add_index_field(&mut self, field: IndexField) -> Result<&mut Self> {
        if self.index_fields.contains_key(&field.name) {
            return Err(Error::DuplicateField(field.name));
        }
        self.index_fields.insert(field.name.clone(), field);
        Ok(self)
    }

    pub fn add_attribute_field(&mut self, field: AttributeField) -> Result<&mut Self> {
        if self.attribute_fields.contains_key(&field.name) {
            return Err(Error::DuplicateField(field.name));
        }
        self.attribute_fields.insert(field.name.clone(), field);
        Ok(self)
    }

    pub fn add_summary_field(&mut self, field: SummaryField) -> Result<&mut Self> {
        if self.summary_fields.contains_key(&field.name) {
            return Err(Error::DuplicateField(field.name));
        }
        self.summary_fields.insert(field.name.clone(), field);
        Ok(self)
    }

    pub fn add_field_set(&mut self, field_set: FieldSet) -> Result<&mut Self> {
        if self.field_sets.contains_key(&field_set.name) {
            return Err(Error::DuplicateField(field_set.name));
        }
        self.field_sets.insert(field_set.name.clone(), field_set);
        Ok(self)
    }

    /// Entries where both name and full type match in `a` and `b`; field
    /// sets additionally require every constituent field to exist in the
    /// resulting index-field set (spec §4.1).
    pub fn intersect(a: &Schema, b: &Schema) -> Schema {
        let mut out = Schema::new();

        for (name, fa) in &a.index_fields {
            if let Some(fb) = b.index_fields.get(name) {
                if fa.same_type_as(fb) {
                    out.index_fields.insert(name.clone(), fa.clone());
                }
            }
        }
        for (name, fa) in &a.attribute_fields {
            if let Some(fb) = b.attribute_fields.get(name) {
                if fa.same_type_as(fb) {
                    out.attribute_fields.insert(name.clone(), fa.clone());
                }
            }
        }
        for (name, fa) in &a.summary_fields {
            if let Some(fb) = b.summary_fields.get(name) {
                if fa.same_type_as(fb) {
                    out.summary_fields.insert(name.clone(), fa.clone());
                }
            }
        }
        for (name, fa) in &a.field_sets {
            if let Some(fb) = b.field_sets.get(name) {
                if fa.fields == fb.fields
                    && fa.fields.iter().all(|f| out.index_fields.contains_key(f))
                {
                    out.field_sets.insert(name.clone(), fa.clone());
                }
            }
        }
        out
    }

    /// Entries from `a` followed by entries from `b` not already named;
    /// ties (same name in both) resolve to the `a` side (spec §4.1).
    pub fn make_union(a: &Schema, b: &Schema) -> Schema {
        let mut out = a.clone();
        for (name, fb) in &b.index_fields {
            out.index_fields.entry(name.clone()).or_insert_with(|| fb.clone());
        }
        for (name, fb) in &b.attribute_fields {
            out.attribute_fields.entry(name.clone()).or_insert_with(|| fb.clone());
        }
        for (name, fb) in &b.summary_fields {
            out.summary_fields.entry(name.clone()).or_insert_with(|| fb.clone());
        }
        for (name, fb) in &b.field_sets {
            out.field_sets.entry(name.clone()).or_insert_with(|| fb.clone());
        }
        out
    }

    /// Entries in `a` whose name is absent from `b` (spec §4.1).
    pub fn set_difference(a: &Schema, b: &Schema) -> Schema {
        let mut out = Schema::new();
        for (name, fa) in &a.index_fields {
            if !b.index_fields.contains_key(name) {
                out.index_fields.insert(name.clone(), fa.clone());
            }
        }
        for (name, fa) in &a.attribute_fields {
            if !b.attribute_fields.contains_key(name) {
                out.attribute_fields.insert(name.clone(), fa.clone());
            }
        }
        for (name, fa) in &a.summary_fields {
            if !b.summary_fields.contains_key(name) {
                out.summary_fields.insert(name.clone(), fa.clone());
            }
        }
        for (name, fa) in &a.field_sets {
            if !b.field_sets.contains_key(name) {
                out.field_sets.insert(name.clone(), fa.clone());
            }
        }
        out
    }

    /// Fields whose `timestamp < t`; used to recover a prior schema so
    /// `WipeOldRemovedFields` knows what to wipe after a field removal
    /// (spec §3, §4.4).
    pub fn get_old_fields(&self, t: FieldTimestamp) -> Schema {
        let mut out = Schema::new();
        out.index_fields.extend(self.index_fields.iter().filter(|(_, f)| f.timestamp < t).map(|(n, f)| (n.clone(), f.clone())));
        out.attribute_fields.extend(
            self.attribute_fields.iter().filter(|(_, f)| f.timestamp < t).map(|(n, f)| (n.clone(), f.clone())),
        );
        out.summary_fields.extend(
            self.summary_fields.iter().filter(|(_, f)| f.timestamp < t).map(|(n, f)| (n.clone(), f.clone())),
        );
        out.field_sets.extend(self.field_sets.iter().filter(|(_, f)| f.timestamp < t).map(|(n, f)| (n.clone(), f.clone())));
        out
    }
}
