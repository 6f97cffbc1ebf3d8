//! Nested JSON flattening.
//!
//! Converts an arbitrarily nested JSON value into a single-level map whose
//! keys encode the path to each leaf: `.` separates path segments and
//! sequence elements are addressed by zero-based index, so
//! `{"a": {"b": 1, "c": [2, 3]}}` flattens to
//! `{"a.b": 1, "a.c.0": 2, "a.c.1": 3}`.
//!
//! Mapping keys are escaped before joining (`\` → `\\`, `.` → `\.`) so a key
//! that itself contains the separator cannot collide with a genuinely nested
//! path. Empty objects and arrays contribute no keys at all — they are lost
//! in the flat form. A bare top-level scalar ends up under the empty key.

use serde_json::Value;
use std::collections::BTreeMap;

/// Flat path → leaf value mapping. Ordered for deterministic serialization.
pub type FlatMap = BTreeMap<String, Value>;

/// Flattens `value` into a single-level map of path-encoded keys to leaf
/// scalars. Deterministic: equal inputs always produce equal maps.
pub fn flatten_value(value: &Value) -> FlatMap {
    let mut out = FlatMap::new();
    walk(value, String::new(), &mut out);
    out
}

fn walk(value: &Value, path: String, out: &mut FlatMap) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk(child, join(&path, &escape_segment(key)), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk(child, join(&path, &index.to_string()), out);
            }
        }
        leaf => {
            out.insert(path, leaf.clone());
        }
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

/// Escapes separator and escape characters inside a single mapping key so
/// that flattened paths remain unambiguous.
fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '.' => out.push_str("\\."),
            other => out.push(other),
        }
    }
    out
}
