//! Line-oriented schema text format (spec §6).
//!
//! `save` is modeled after how config snapshots are durably written
//! elsewhere in the teacher corpus (`file-store`'s "write then fsync then
//! persist" idiom): write to a temp file in the destination directory,
//! `fsync` it, then atomically rename into place, then `fsync` the
//! directory so the rename itself survives a crash.
//!
//! `parse` silently ignores unknown keys (forward compatibility, spec
//! §4.1) and falls back to field defaults on a malformed declaration
//! rather than failing the whole load, since one bad field should not
//! strand every other field in the file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use super::field::{AttributeField, CollectionType, DataType, FieldSet, IndexField, SummaryField};
use super::Schema;

fn data_type_to_str(t: DataType) -> &'static str {
    match t {
        DataType::String => "STRING",
        DataType::Int8 => "INT8",
        DataType::Int16 => "INT16",
        DataType::Int32 => "INT32",
        DataType::Int64 => "INT64",
        DataType::Float => "FLOAT",
        DataType::Double => "DOUBLE",
        DataType::BooleanTree => "BOOLEANTREE",
        DataType::Tensor => "TENSOR",
        DataType::Raw => "RAW",
    }
}

fn data_type_from_str(s: &str) -> Option<DataType> {
    Some(match s {
        "STRING" => DataType::String,
        "INT8" => DataType::Int8,
        "INT16" => DataType::Int16,
        "INT32" => DataType::Int32,
        "INT64" => DataType::Int64,
        "FLOAT" => DataType::Float,
        "DOUBLE" => DataType::Double,
        "BOOLEANTREE" => DataType::BooleanTree,
        "TENSOR" => DataType::Tensor,
        "RAW" => DataType::Raw,
        _ => return None,
    })
}

fn collection_type_to_str(t: CollectionType) -> &'static str {
    match t {
        CollectionType::Single => "SINGLE",
        CollectionType::Array => "ARRAY",
        CollectionType::WeightedSet => "WEIGHTEDSET",
    }
}

fn collection_type_from_str(s: &str) -> Option<CollectionType> {
    Some(match s {
        "SINGLE" => CollectionType::Single,
        "ARRAY" => CollectionType::Array,
        "WEIGHTEDSET" => CollectionType::WeightedSet,
        _ => return None,
    })
}

/// Writes `schema` to `path`, fsyncing both the file and its parent
/// directory. Returns `false` on any I/O error instead of propagating
/// one, matching the spec's "load/save returns false" failure contract.
pub fn save(schema: &Schema, path: &Path) -> bool {
    match try_save(schema, path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "failed to save schema");
            false
        }
    }
}

fn try_save(schema: &Schema, path: &Path) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("schema")
    ));

    {
        let mut f = File::create(&tmp_path)?;
        write_text(schema, &mut f)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}

fn write_text(schema: &Schema, w: &mut impl Write) -> std::io::Result<()> {
    let index_fields: Vec<_> = schema.index_fields().collect();
    writeln!(w, "indexfield[{}]", index_fields.len())?;
    for (i, f) in index_fields.iter().enumerate() {
        writeln!(w, "indexfield[{i}].name {}", f.name)?;
        writeln!(w, "indexfield[{i}].datatype {}", data_type_to_str(f.data_type))?;
        writeln!(w, "indexfield[{i}].collectiontype {}", collection_type_to_str(f.collection_type))?;
        writeln!(w, "indexfield[{i}].prefix {}", f.prefix)?;
        writeln!(w, "indexfield[{i}].phrases {}", f.phrases)?;
        writeln!(w, "indexfield[{i}].positions {}", f.positions)?;
        writeln!(w, "indexfield[{i}].averageelementlen {}", f.average_element_len)?;
        writeln!(w, "indexfield[{i}].timestamp {}", f.timestamp)?;
    }

    let attribute_fields: Vec<_> = schema.attribute_fields().collect();
    writeln!(w, "attributefield[{}]", attribute_fields.len())?;
    for (i, f) in attribute_fields.iter().enumerate() {
        writeln!(w, "attributefield[{i}].name {}", f.name)?;
        writeln!(w, "attributefield[{i}].datatype {}", data_type_to_str(f.data_type))?;
        writeln!(w, "attributefield[{i}].collectiontype {}", collection_type_to_str(f.collection_type))?;
        writeln!(w, "attributefield[{i}].timestamp {}", f.timestamp)?;
    }

    let summary_fields: Vec<_> = schema.summary_fields().collect();
    writeln!(w, "summaryfield[{}]", summary_fields.len())?;
    for (i, f) in summary_fields.iter().enumerate() {
        writeln!(w, "summaryfield[{i}].name {}", f.name)?;
        writeln!(w, "summaryfield[{i}].datatype {}", data_type_to_str(f.data_type))?;
        writeln!(w, "summaryfield[{i}].timestamp {}", f.timestamp)?;
    }

    let field_sets: Vec<_> = schema.field_sets().collect();
    writeln!(w, "fieldset[{}]", field_sets.len())?;
    for (i, fs) in field_sets.iter().enumerate() {
        writeln!(w, "fieldset[{i}].name {}", fs.name)?;
        writeln!(w, "fieldset[{i}].field[{}]", fs.fields.len())?;
        for (j, field_name) in fs.fields.iter().enumerate() {
            writeln!(w, "fieldset[{i}].field[{j}].name {field_name}")?;
        }
    }
    Ok(())
}

/// Loads a schema from `path`. Returns `None` on I/O failure. Unknown
/// keys and unparsable enum values are ignored rather than rejected, so
/// a file written by a newer version of this format still loads here.
pub fn load(path: &Path) -> Option<Schema> {
    let text = fs::read_to_string(path).ok()?;
    Some(parse(&text))
}

pub fn parse(text: &str) -> Schema {
    let mut index_raw: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();
    let mut attribute_raw: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();
    let mut summary_raw: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();
    let mut fieldset_raw: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();
    let mut fieldset_members: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(char::is_whitespace) else { continue };
        let value = value.trim();

        if let Some((idx, attr)) = parse_indexed(key, "indexfield") {
            index_raw.entry(idx).or_default().insert(attr, value.to_string());
        } else if let Some((idx, attr)) = parse_indexed(key, "attributefield") {
            attribute_raw.entry(idx).or_default().insert(attr, value.to_string());
        } else if let Some((idx, attr)) = parse_indexed(key, "summaryfield") {
            summary_raw.entry(idx).or_default().insert(attr, value.to_string());
        } else if let Some((fs_idx, rest)) = parse_indexed(key, "fieldset") {
            if rest == "name" {
                fieldset_raw.entry(fs_idx).or_default().insert("name".to_string(), value.to_string());
            } else if let Some((field_idx, field_attr)) = parse_indexed(&rest, "field") {
                if field_attr == "name" {
                    fieldset_members.entry(fs_idx).or_default().insert(field_idx, value.to_string());
                }
            }
            // "fieldset[i].field[M]" (the count line) and any other
            // unrecognized key under a fieldset entry are silently
            // ignored: the member count is derived from how many
            // `.field[j].name` entries were actually seen.
        }
        // any other top-level key (e.g. "importedattributefields[N]", a
        // RAM-only key never written by `save`) is silently ignored.
    }

    let mut schema = Schema::new();
    for (_, raw) in index_raw {
        let field = IndexField {
            name: raw.get("name").cloned().unwrap_or_default(),
            data_type: raw.get("datatype").and_then(|s| data_type_from_str(s)).unwrap_or(DataType::String),
            collection_type: raw
                .get("collectiontype")
                .and_then(|s| collection_type_from_str(s))
                .unwrap_or(CollectionType::Single),
            prefix: raw.get("prefix").map(|s| s == "true").unwrap_or(false),
            phrases: raw.get("phrases").map(|s| s == "true").unwrap_or(false),
            positions: raw.get("positions").map(|s| s == "true").unwrap_or(false),
            average_element_len: raw.get("averageelementlen").and_then(|s| s.parse().ok()).unwrap_or(0),
            timestamp: raw.get("timestamp").and_then(|s| s.parse().ok()).unwrap_or(0),
        };
        if !field.name.is_empty() {
            let _ = schema.add_index_field(field);
        }
    }
    for (_, raw) in attribute_raw {
        let field = AttributeField {
            name: raw.get("name").cloned().unwrap_or_default(),
            data_type: raw.get("datatype").and_then(|s| data_type_from_str(s)).unwrap_or(DataType::String),
            collection_type: raw
                .get("collectiontype")
                .and_then(|s| collection_type_from_str(s))
                .unwrap_or(CollectionType::Single),
            timestamp: raw.get("timestamp").and_then(|s| s.parse().ok()).unwrap_or(0),
        };
        if !field.name.is_empty() {
            let _ = schema.add_attribute_field(field);
        }
    }
    for (_, raw) in summary_raw {
        let field = SummaryField {
            name: raw.get("name").cloned().unwrap_or_default(),
            data_type: raw.get("datatype").and_then(|s| data_type_from_str(s)).unwrap_or(DataType::String),
            timestamp: raw.get("timestamp").and_then(|s| s.parse().ok()).unwrap_or(0),
        };
        if !field.name.is_empty() {
            let _ = schema.add_summary_field(field);
        }
    }
    for (idx, raw) in fieldset_raw {
        let name = raw.get("name").cloned().unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let fields = fieldset_members.remove(&idx).unwrap_or_default().into_values().collect();
        let _ = schema.add_field_set(FieldSet { name, fields, timestamp: 0 });
    }
    schema
}

/// Splits a key like `indexfield[3].name` into `(3, "name")` when the key
/// starts with `prefix[`; returns `None` (silently ignored) for anything
/// else, including the bare count line `indexfield[3]`.
fn parse_indexed(key: &str, prefix: &str) -> Option<(usize, String)> {
    let rest = key.strip_prefix(prefix)?;
    let rest = rest.strip_prefix('[')?;
    let (idx_str, rest) = rest.split_once(']')?;
    let idx: usize = idx_str.parse().ok()?;
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some((idx, rest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::{AttributeField, CollectionType, DataType, FieldSet, IndexField};

    fn sample() -> Schema {
        let mut s = Schema::new();
        s.add_index_field(IndexField::new("ia", DataType::String, CollectionType::Single)).unwrap();
        s.add_attribute_field(AttributeField::new("aa", DataType::Int32, CollectionType::Single)).unwrap();
        s.add_attribute_field(AttributeField::new("aaa", DataType::Int32, CollectionType::Array)).unwrap();
        s.add_attribute_field(AttributeField::new("aaw", DataType::Int32, CollectionType::WeightedSet)).unwrap();
        s.add_field_set(FieldSet::new("default", vec!["ia".into()])).unwrap();
        s
    }

    #[test]
    fn round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s");
        let original = sample();
        assert!(save(&original, &path));
        let loaded = load(&path).expect("load should succeed");
        assert_eq!(loaded, original);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let text = "indexfield[1]\nindexfield[0].name ia\nindexfield[0].datatype STRING\nindexfield[0].collectiontype SINGLE\nimportedattributefields[2]\nimportedattributefields[0].name bogus\n";
        let schema = parse(text);
        assert!(schema.get_index_field("ia").is_some());
        assert_eq!(schema.attribute_fields().count(), 0);
    }

    #[test]
    fn malformed_enum_falls_back_to_default() {
        let text = "indexfield[1]\nindexfield[0].name ia\nindexfield[0].datatype NOT_A_TYPE\n";
        let schema = parse(text);
        let f = schema.get_index_field("ia").unwrap();
        assert_eq!(f.data_type, DataType::String);
    }

    #[test]
    fn load_missing_file_returns_none() {
        assert!(load(Path::new("/nonexistent/path/for/schema/io/test")).is_none());
    }
}
