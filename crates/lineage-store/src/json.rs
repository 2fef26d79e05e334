//! Projection between nested JSON documents and flat property maps.
//!
//! Object members become [`Segment::Property`] segments (or
//! [`Segment::Key`] for the empty member name) and array slots become
//! [`Segment::Index`] segments. Scalars and empty containers are leaves.

use crate::error::{Result, StoreError};
use lineage_core::{Path, Segment};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Longest array [`to_json`] will materialize. Paths indexing past it are
/// rejected instead of allocating the holes.
pub const MAX_ARRAY_LEN: usize = 1 << 20;

/// Build a nested document from a flat property map.
///
/// Paths are applied in order, so a deeper path replaces a scalar written
/// at one of its prefixes. Array holes are filled with `null`.
pub fn to_json(properties: &BTreeMap<Path, Value>) -> Result<Value> {
    let mut document = Value::Null;
    for (path, value) in properties {
        let mut cursor = &mut document;
        for segment in path.segments() {
            cursor = match segment {
                Segment::Property(name) | Segment::Key(name) => member(cursor, name),
                Segment::Index(index) => match usize::try_from(*index) {
                    Ok(index) if index < MAX_ARRAY_LEN => slot(cursor, index),
                    _ => {
                        return Err(StoreError::Serialization(format!(
                            "index {index} in {path} exceeds the array limit of {MAX_ARRAY_LEN}"
                        )))
                    }
                },
            };
        }
        *cursor = value.clone();
    }
    Ok(document)
}

fn member<'a>(cursor: &'a mut Value, name: &str) -> &'a mut Value {
    if !cursor.is_object() {
        *cursor = Value::Object(Map::new());
    }
    &mut cursor[name]
}

fn slot(cursor: &mut Value, index: usize) -> &mut Value {
    match &mut *cursor {
        Value::Array(items) => {
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
        }
        _ => *cursor = Value::Array(vec![Value::Null; index + 1]),
    }
    &mut cursor[index]
}

/// Flatten a nested document into its leaf properties.
///
/// A top-level `null` is the empty document.
pub fn flatten_json(document: &Value) -> BTreeMap<Path, Value> {
    let mut properties = BTreeMap::new();
    if !document.is_null() {
        flatten_into(Path::root(), document, &mut properties);
    }
    properties
}

fn flatten_into(path: Path, value: &Value, out: &mut BTreeMap<Path, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (name, member) in map {
                let child = if name.is_empty() {
                    path.key(name.as_str())
                } else {
                    path.property(name.as_str())
                };
                flatten_into(child, member, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(path.index(index as u64), item, out);
            }
        }
        leaf => {
            out.insert(path, leaf.clone());
        }
    }
}

/// Changeset that turns the flattened `previous` document into `next`.
///
/// Changed or new leaves are written; leaves missing from `next` are
/// tombstoned.
pub fn changeset_from_json(previous: &Value, next: &Value) -> BTreeMap<Path, Option<Value>> {
    let before = flatten_json(previous);
    let after = flatten_json(next);

    let mut changeset: BTreeMap<Path, Option<Value>> = before
        .keys()
        .filter(|path| !after.contains_key(*path))
        .map(|path| (path.clone(), None))
        .collect();
    for (path, value) in after {
        if before.get(&path) != Some(&value) {
            changeset.insert(path, Some(value));
        }
    }
    changeset
}
