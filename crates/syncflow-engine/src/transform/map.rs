//! Field mapping.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::value::resolve_path;

/// Target field to source path. Output fields follow insertion order.
pub type FieldMapping = IndexMap<String, String>;

/// Build new object(s) whose target fields are read from source paths.
///
/// Missing source paths leave the target field out.
pub fn map(data: &Value, mapping: &FieldMapping) -> Value {
    match data {
        Value::Array(items) => Value::Array(items.iter().map(|item| map_one(item, mapping)).collect()),
        other => map_one(other, mapping),
    }
}

fn map_one(item: &Value, mapping: &FieldMapping) -> Value {
    let mut out = Map::new();
    for (target, source) in mapping {
        if let Some(value) = resolve_path(item, source) {
            out.insert(target.clone(), value.clone());
        }
    }
    Value::Object(out)
}
