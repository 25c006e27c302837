//! Key-path helpers over JSON values.
//!
//! Paths are slices of object keys. All writers take the value by ownership
//! and return the updated value; callers that need the old value keep a clone.

use serde_json::{Map, Value};

/// Read the value at `path`. An empty path returns `value` itself.
pub fn get_in<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| current.as_object()?.get(*key))
}

/// Write `new` at `path`, creating intermediate objects as needed.
///
/// A non-object found along the path is replaced by an object. An empty path
/// returns `value` unchanged.
pub fn set_in(value: Value, path: &[&str], new: Value) -> Value {
    let Some((first, rest)) = path.split_first() else {
        return value;
    };

    let mut map = into_object(value);
    let child = if rest.is_empty() {
        new
    } else {
        let current = map.remove(*first).unwrap_or(Value::Null);
        set_in(current, rest, new)
    };
    map.insert((*first).to_string(), child);
    Value::Object(map)
}

/// Deep-merge `overlay` onto `base`.
///
/// Objects merge key by key, recursively. Any other overlay value replaces the
/// base value, except `null`, which keeps the base.
pub fn merge_deep(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            let mut merged = b.clone();
            for (key, value) in o {
                let next = match merged.get(key) {
                    Some(existing) => merge_deep(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, Value::Null) => base.clone(),
        (_, other) => other.clone(),
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
