//! Concrete attribute variants and the tagged `Attribute` enum that
//! presents them behind one capability interface (spec §9 "Polymorphism
//! over attribute variants": `{SingleNumeric<T>, MultiNumeric<T>,
//! String{Single|Array|WSet}, Predicate, Tensor}` instead of deep
//! inheritance).
//!
//! Every variant stores `Option<V>` per lid rather than a magic sentinel
//! value — `None` *is* the "undefined sentinel" the spec's invariants
//! talk about, which reads better in Rust than picking a magic `f64` or
//! empty string to mean the same thing.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::schema::{CollectionType, DataType};

use super::column_store::{AttributeGuard, ColumnStore};
use super::enumstore::{AttributeEnumGuard, EnumId, EnumStore};
use super::flush::{self, AttrFileHeader, FlushTask};
use super::value::{AttributeValue, PredicateValue};

macro_rules! define_numeric_attribute {
    ($struct_name:ident, $elem:ty, $basic_type:expr, $collection_type:expr) => {
        pub struct $struct_name {
            name: String,
            store: ColumnStore<Option<$elem>>,
            flushed_serial_num: u64,
        }

        impl $struct_name {
            pub fn new(name: impl Into<String>) -> Self {
                $struct_name { name: name.into(), store: ColumnStore::new(None), flushed_serial_num: 0 }
            }

            pub fn get(&self, lid: u32) -> Option<$elem> {
                self.store.get_working(lid).and_then(|v| v.clone())
            }

            pub fn guard(&self) -> AttributeGuard<Option<$elem>> {
                self.store.guard()
            }

            fn header(&self) -> AttrFileHeader {
                AttrFileHeader {
                    basic_type: $basic_type,
                    collection_type: $collection_type,
                    doc_id_limit: self.store.committed_doc_id_limit(),
                    enumerated: false,
                }
            }
        }
    };
}

define_numeric_attribute!(SingleNumericAttribute, f64, DataType::Double, CollectionType::Single);
define_numeric_attribute!(MultiNumericAttribute, Vec<f64>, DataType::Double, CollectionType::Array);
define_numeric_attribute!(WeightedNumericAttribute, Vec<(f64, i32)>, DataType::Double, CollectionType::WeightedSet);
define_numeric_attribute!(TensorAttribute, Vec<f32>, DataType::Tensor, CollectionType::Single);
define_numeric_attribute!(PredicateAttribute, PredicateValue, DataType::BooleanTree, CollectionType::Single);

pub struct SingleStringAttribute {
    name: String,
    store: ColumnStore<Option<EnumId>>,
    enums: EnumStore,
    flushed_serial_num: u64,
}

pub struct MultiStringAttribute {
    name: String,
    store: ColumnStore<Vec<EnumId>>,
    enums: EnumStore,
    flushed_serial_num: u64,
}

pub struct WeightedStringAttribute {
    name: String,
    store: ColumnStore<Vec<(EnumId, i32)>>,
    enums: EnumStore,
    flushed_serial_num: u64,
}

impl SingleStringAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        SingleStringAttribute { name: name.into(), store: ColumnStore::new(None), enums: EnumStore::new(), flushed_serial_num: 0 }
    }

    pub fn get(&self, lid: u32) -> Option<String> {
        let id = self.store.get_working(lid)?.as_ref()?;
        self.enums.resolve(*id)
    }

    pub fn enum_guard(&self) -> AttributeEnumGuard {
        self.enums.guard()
    }
}

impl MultiStringAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        MultiStringAttribute { name: name.into(), store: ColumnStore::new(Vec::new()), enums: EnumStore::new(), flushed_serial_num: 0 }
    }

    pub fn get(&self, lid: u32) -> Vec<String> {
        self.store
            .get_working(lid)
            .map(|ids| ids.iter().filter_map(|id| self.enums.resolve(*id)).collect())
            .unwrap_or_default()
    }
}

impl WeightedStringAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        WeightedStringAttribute { name: name.into(), store: ColumnStore::new(Vec::new()), enums: EnumStore::new(), flushed_serial_num: 0 }
    }

    pub fn get(&self, lid: u32) -> Vec<(String, i32)> {
        self.store
            .get_working(lid)
            .map(|ids| ids.iter().filter_map(|(id, w)| self.enums.resolve(*id).map(|s| (s, *w))).collect())
            .unwrap_or_default()
    }
}

/// Tagged union of every supported attribute kind, sharing one
/// `put/clearDoc/commit/compact/shrink/flush/lastSyncToken` interface
/// (spec §4.2, §9).
pub enum Attribute {
    SingleNumeric(SingleNumericAttribute),
    MultiNumeric(MultiNumericAttribute),
    WeightedNumeric(WeightedNumericAttribute),
    SingleString(SingleStringAttribute),
    MultiString(MultiStringAttribute),
    WeightedString(WeightedStringAttribute),
    Predicate(PredicateAttribute),
    Tensor(TensorAttribute),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::SingleNumeric(a) => &a.name,
            Attribute::MultiNumeric(a) => &a.name,
            Attribute::WeightedNumeric(a) => &a.name,
            Attribute::SingleString(a) => &a.name,
            Attribute::MultiString(a) => &a.name,
            Attribute::WeightedString(a) => &a.name,
            Attribute::Predicate(a) => &a.name,
            Attribute::Tensor(a) => &a.name,
        }
    }

    pub fn num_docs(&self) -> u32 {
        match self {
            Attribute::SingleNumeric(a) => a.store.num_docs(),
            Attribute::MultiNumeric(a) => a.store.num_docs(),
            Attribute::WeightedNumeric(a) => a.store.num_docs(),
            Attribute::SingleString(a) => a.store.num_docs(),
            Attribute::MultiString(a) => a.store.num_docs(),
            Attribute::WeightedString(a) => a.store.num_docs(),
            Attribute::Predicate(a) => a.store.num_docs(),
            Attribute::Tensor(a) => a.store.num_docs(),
        }
    }

    pub fn committed_doc_id_limit(&self) -> u32 {
        match self {
            Attribute::SingleNumeric(a) => a.store.committed_doc_id_limit(),
            Attribute::MultiNumeric(a) => a.store.committed_doc_id_limit(),
            Attribute::WeightedNumeric(a) => a.store.committed_doc_id_limit(),
            Attribute::SingleString(a) => a.store.committed_doc_id_limit(),
            Attribute::MultiString(a) => a.store.committed_doc_id_limit(),
            Attribute::WeightedString(a) => a.store.committed_doc_id_limit(),
            Attribute::Predicate(a) => a.store.committed_doc_id_limit(),
            Attribute::Tensor(a) => a.store.committed_doc_id_limit(),
        }
    }

    pub fn last_sync_token(&self) -> u64 {
        match self {
            Attribute::SingleNumeric(a) => a.store.last_sync_token(),
            Attribute::MultiNumeric(a) => a.store.last_sync_token(),
            Attribute::WeightedNumeric(a) => a.store.last_sync_token(),
            Attribute::SingleString(a) => a.store.last_sync_token(),
            Attribute::MultiString(a) => a.store.last_sync_token(),
            Attribute::WeightedString(a) => a.store.last_sync_token(),
            Attribute::Predicate(a) => a.store.last_sync_token(),
            Attribute::Tensor(a) => a.store.last_sync_token(),
        }
    }

    pub fn flushed_serial_num(&self) -> u64 {
        match self {
            Attribute::SingleNumeric(a) => a.flushed_serial_num,
            Attribute::MultiNumeric(a) => a.flushed_serial_num,
            Attribute::WeightedNumeric(a) => a.flushed_serial_num,
            Attribute::SingleString(a) => a.flushed_serial_num,
            Attribute::MultiString(a) => a.flushed_serial_num,
            Attribute::WeightedString(a) => a.flushed_serial_num,
            Attribute::Predicate(a) => a.flushed_serial_num,
            Attribute::Tensor(a) => a.flushed_serial_num,
        }
    }

    /// Allocates the next lid (spec `addDoc`). Must be called serially
    /// per attribute.
    pub fn add_doc(&mut self) -> u32 {
        match self {
            Attribute::SingleNumeric(a) => a.store.add_doc(),
            Attribute::MultiNumeric(a) => a.store.add_doc(),
            Attribute::WeightedNumeric(a) => a.store.add_doc(),
            Attribute::SingleString(a) => a.store.add_doc(),
            Attribute::MultiString(a) => a.store.add_doc(),
            Attribute::WeightedString(a) => a.store.add_doc(),
            Attribute::Predicate(a) => a.store.add_doc(),
            Attribute::Tensor(a) => a.store.add_doc(),
        }
    }

    /// Applies a typed value at `lid`. Fails with
    /// [`Error::LidNotAllocated`] if `lid >= numDocs`, and with a type
    /// mismatch message if `value`'s shape doesn't match this variant.
    pub fn put(&mut self, lid: u32, value: AttributeValue) -> Result<()> {
        let name = self.name().to_string();
        macro_rules! apply {
            ($store:expr, $pat:pat => $expr:expr) => {
                match value {
                    $pat => $store.put(lid, $expr).ok_or_else(|| Error::LidNotAllocated(name.clone(), lid)),
                    _ => Err(Error::AttributeWrite { name: name.clone(), message: "value type mismatch".into() }),
                }
            };
        }
        match self {
            Attribute::SingleNumeric(a) => apply!(a.store, AttributeValue::Numeric(v) => Some(v)),
            Attribute::MultiNumeric(a) => apply!(a.store, AttributeValue::MultiNumeric(v) => Some(v)),
            Attribute::WeightedNumeric(a) => apply!(a.store, AttributeValue::WeightedNumeric(v) => Some(v)),
            Attribute::Predicate(a) => apply!(a.store, AttributeValue::Predicate(v) => Some(v)),
            Attribute::Tensor(a) => apply!(a.store, AttributeValue::Tensor(v) => Some(v)),
            Attribute::SingleString(a) => match value {
                AttributeValue::Str(s) => {
                    let id = a.enums.intern(&s);
                    a.store.put(lid, Some(id)).ok_or_else(|| Error::LidNotAllocated(name, lid))
                }
                _ => Err(Error::AttributeWrite { name, message: "value type mismatch".into() }),
            },
            Attribute::MultiString(a) => match value {
                AttributeValue::MultiStr(values) => {
                    let ids = values.iter().map(|s| a.enums.intern(s)).collect();
                    a.store.put(lid, ids).ok_or_else(|| Error::LidNotAllocated(name, lid))
                }
                _ => Err(Error::AttributeWrite { name, message: "value type mismatch".into() }),
            },
            Attribute::WeightedString(a) => match value {
                AttributeValue::WeightedStr(values) => {
                    let ids = values.iter().map(|(s, w)| (a.enums.intern(s), *w)).collect();
                    a.store.put(lid, ids).ok_or_else(|| Error::LidNotAllocated(name, lid))
                }
                _ => Err(Error::AttributeWrite { name, message: "value type mismatch".into() }),
            },
        }
    }

    /// Reads `lid` back out as a type-erased [`AttributeValue`], the
    /// inverse of [`Attribute::put`]. Used by the sub-database bucket-move
    /// path (spec §4.4 BucketMover), which copies a whole document's
    /// attribute values from one sub-database's manager to another's
    /// without knowing each attribute's concrete variant.
    pub fn get(&self, lid: u32) -> Option<AttributeValue> {
        match self {
            Attribute::SingleNumeric(a) => a.get(lid).map(AttributeValue::Numeric),
            Attribute::MultiNumeric(a) => a.get(lid).map(AttributeValue::MultiNumeric),
            Attribute::WeightedNumeric(a) => a.get(lid).map(AttributeValue::WeightedNumeric),
            Attribute::Predicate(a) => a.get(lid).map(AttributeValue::Predicate),
            Attribute::Tensor(a) => a.get(lid).map(AttributeValue::Tensor),
            Attribute::SingleString(a) => a.get(lid).map(|s| AttributeValue::Str(s.into())),
            Attribute::MultiString(a) => {
                let v = a.get(lid);
                if v.is_empty() { None } else { Some(AttributeValue::MultiStr(v)) }
            }
            Attribute::WeightedString(a) => {
                let v = a.get(lid);
                if v.is_empty() { None } else { Some(AttributeValue::WeightedStr(v)) }
            }
        }
    }

    pub fn clear_doc(&mut self, lid: u32) -> Result<()> {
        let name = self.name().to_string();
        let ok = match self {
            Attribute::SingleNumeric(a) => a.store.clear_doc(lid),
            Attribute::MultiNumeric(a) => a.store.clear_doc(lid),
            Attribute::WeightedNumeric(a) => a.store.clear_doc(lid),
            Attribute::Predicate(a) => a.store.clear_doc(lid),
            Attribute::Tensor(a) => a.store.clear_doc(lid),
            Attribute::SingleString(a) => a.store.clear_doc(lid),
            Attribute::MultiString(a) => a.store.clear_doc(lid),
            Attribute::WeightedString(a) => a.store.clear_doc(lid),
        };
        ok.ok_or(Error::LidNotAllocated(name, lid))
    }

    pub fn commit(&mut self, serial: u64) {
        match self {
            Attribute::SingleNumeric(a) => a.store.commit(serial),
            Attribute::MultiNumeric(a) => a.store.commit(serial),
            Attribute::WeightedNumeric(a) => a.store.commit(serial),
            Attribute::Predicate(a) => a.store.commit(serial),
            Attribute::Tensor(a) => a.store.commit(serial),
            Attribute::SingleString(a) => a.store.commit(serial),
            Attribute::MultiString(a) => a.store.commit(serial),
            Attribute::WeightedString(a) => a.store.commit(serial),
        }
    }

    pub fn compact_lid_space(&mut self, wanted_limit: u32) {
        match self {
            Attribute::SingleNumeric(a) => a.store.compact_lid_space(wanted_limit),
            Attribute::MultiNumeric(a) => a.store.compact_lid_space(wanted_limit),
            Attribute::WeightedNumeric(a) => a.store.compact_lid_space(wanted_limit),
            Attribute::Predicate(a) => a.store.compact_lid_space(wanted_limit),
            Attribute::Tensor(a) => a.store.compact_lid_space(wanted_limit),
            Attribute::SingleString(a) => a.store.compact_lid_space(wanted_limit),
            Attribute::MultiString(a) => a.store.compact_lid_space(wanted_limit),
            Attribute::WeightedString(a) => a.store.compact_lid_space(wanted_limit),
        }
    }

    pub fn shrink_lid_space(&mut self) {
        match self {
            Attribute::SingleNumeric(a) => a.store.shrink_lid_space(),
            Attribute::MultiNumeric(a) => a.store.shrink_lid_space(),
            Attribute::WeightedNumeric(a) => a.store.shrink_lid_space(),
            Attribute::Predicate(a) => a.store.shrink_lid_space(),
            Attribute::Tensor(a) => a.store.shrink_lid_space(),
            Attribute::SingleString(a) => a.store.shrink_lid_space(),
            Attribute::MultiString(a) => a.store.shrink_lid_space(),
            Attribute::WeightedString(a) => a.store.shrink_lid_space(),
        }
    }

    pub fn pad_to(&mut self, limit: u32) {
        match self {
            Attribute::SingleNumeric(a) => a.store.pad_to(limit),
            Attribute::MultiNumeric(a) => a.store.pad_to(limit),
            Attribute::WeightedNumeric(a) => a.store.pad_to(limit),
            Attribute::Predicate(a) => a.store.pad_to(limit),
            Attribute::Tensor(a) => a.store.pad_to(limit),
            Attribute::SingleString(a) => a.store.pad_to(limit),
            Attribute::MultiString(a) => a.store.pad_to(limit),
            Attribute::WeightedString(a) => a.store.pad_to(limit),
        }
    }

    /// Returns a flush task if a flush at `current_serial` is warranted.
    /// Idempotent: a flush already on disk at `current_serial` is
    /// reported as already successful by returning `None` (spec §4.2).
    pub fn init_flush(&self, dir: PathBuf, current_serial: u64) -> Option<FlushTask> {
        if self.flushed_serial_num() >= current_serial && flush::dat_exists(&dir, self.name()) {
            return None;
        }
        let name = self.name().to_string();
        macro_rules! task {
            ($a:expr, $header:expr, $enumerated:expr) => {{
                let values: Vec<_> = $a.store.working_slice().to_vec();
                let header = $header;
                Some(FlushTask::new(current_serial, move || flush::write_dat(&dir, &name, &header, &values)))
            }};
        }
        match self {
            Attribute::SingleNumeric(a) => task!(a, a.header(), false),
            Attribute::MultiNumeric(a) => task!(a, a.header(), false),
            Attribute::WeightedNumeric(a) => task!(a, a.header(), false),
            Attribute::Predicate(a) => task!(a, a.header(), false),
            Attribute::Tensor(a) => task!(a, a.header(), false),
            Attribute::SingleString(a) => {
                let values = a.store.working_slice().to_vec();
                let header = AttrFileHeader {
                    basic_type: DataType::String,
                    collection_type: CollectionType::Single,
                    doc_id_limit: a.store.committed_doc_id_limit(),
                    enumerated: true,
                };
                let dict = (0..a.enums.len() as EnumId).filter_map(|id| a.enums.resolve(id)).collect::<Vec<_>>();
                Some(FlushTask::new(current_serial, move || {
                    flush::write_dat(&dir, &name, &header, &values)?;
                    flush::write_udat(&dir, &name, &dict)
                }))
            }
            Attribute::MultiString(a) => {
                let values = a.store.working_slice().to_vec();
                let header = AttrFileHeader {
                    basic_type: DataType::String,
                    collection_type: CollectionType::Array,
                    doc_id_limit: a.store.committed_doc_id_limit(),
                    enumerated: true,
                };
                let dict = (0..a.enums.len() as EnumId).filter_map(|id| a.enums.resolve(id)).collect::<Vec<_>>();
                Some(FlushTask::new(current_serial, move || {
                    flush::write_dat(&dir, &name, &header, &values)?;
                    flush::write_udat(&dir, &name, &dict)
                }))
            }
            Attribute::WeightedString(a) => {
                let values = a.store.working_slice().to_vec();
                let header = AttrFileHeader {
                    basic_type: DataType::String,
                    collection_type: CollectionType::WeightedSet,
                    doc_id_limit: a.store.committed_doc_id_limit(),
                    enumerated: true,
                };
                let dict = (0..a.enums.len() as EnumId).filter_map(|id| a.enums.resolve(id)).collect::<Vec<_>>();
                Some(FlushTask::new(current_serial, move || {
                    flush::write_dat(&dir, &name, &header, &values)?;
                    flush::write_udat(&dir, &name, &dict)
                }))
            }
        }
    }

    pub fn mark_flushed(&mut self, serial: u64) {
        match self {
            Attribute::SingleNumeric(a) => a.flushed_serial_num = serial,
            Attribute::MultiNumeric(a) => a.flushed_serial_num = serial,
            Attribute::WeightedNumeric(a) => a.flushed_serial_num = serial,
            Attribute::Predicate(a) => a.flushed_serial_num = serial,
            Attribute::Tensor(a) => a.flushed_serial_num = serial,
            Attribute::SingleString(a) => a.flushed_serial_num = serial,
            Attribute::MultiString(a) => a.flushed_serial_num = serial,
            Attribute::WeightedString(a) => a.flushed_serial_num = serial,
        }
    }

    /// Loads on-disk state written by a prior flush. Used during
    /// `Attribute::create` + `load` (spec §4.2 lifecycle).
    pub fn load(&mut self, dir: &Path) -> io::Result<()> {
        let name = self.name().to_string();
        match self {
            Attribute::SingleNumeric(a) => {
                let (header, values): (AttrFileHeader, Vec<Option<f64>>) = flush::read_dat(dir, &name)?;
                a.store.replace_working(values);
                a.store.commit(0);
                a.flushed_serial_num = 0;
                let _ = header;
            }
            Attribute::MultiNumeric(a) => {
                let (_, values) = flush::read_dat(dir, &name)?;
                a.store.replace_working(values);
                a.store.commit(0);
            }
            Attribute::WeightedNumeric(a) => {
                let (_, values) = flush::read_dat(dir, &name)?;
                a.store.replace_working(values);
                a.store.commit(0);
            }
            Attribute::Predicate(a) => {
                let (_, values) = flush::read_dat(dir, &name)?;
                a.store.replace_working(values);
                a.store.commit(0);
            }
            Attribute::Tensor(a) => {
                let (_, values) = flush::read_dat(dir, &name)?;
                a.store.replace_working(values);
                a.store.commit(0);
            }
            Attribute::SingleString(a) => {
                let (_, values): (AttrFileHeader, Vec<Option<EnumId>>) = flush::read_dat(dir, &name)?;
                let dict = flush::read_udat(dir, &name)?;
                for value in &dict {
                    a.enums.intern(value);
                }
                a.store.replace_working(values);
                a.store.commit(0);
            }
            Attribute::MultiString(a) => {
                let (_, values): (AttrFileHeader, Vec<Vec<EnumId>>) = flush::read_dat(dir, &name)?;
                let dict = flush::read_udat(dir, &name)?;
                for value in &dict {
                    a.enums.intern(value);
                }
                a.store.replace_working(values);
                a.store.commit(0);
            }
            Attribute::WeightedString(a) => {
                let (_, values): (AttrFileHeader, Vec<Vec<(EnumId, i32)>>) = flush::read_dat(dir, &name)?;
                let dict = flush::read_udat(dir, &name)?;
                for value in &dict {
                    a.enums.intern(value);
                }
                a.store.replace_working(values);
                a.store.commit(0);
            }
        }
        Ok(())
    }
}
