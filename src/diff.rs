//! Flat diff computation between two JSON values.
//!
//! Both inputs are flattened with the convention from [`crate::flatten`] and
//! compared leaf-to-leaf by path, so nested structures never require
//! structural equality at intermediate levels. The result has three
//! categories: paths only in the new value (`added`), paths only in the old
//! value (`removed`), and paths present in both with differing values
//! (`changed`, carrying the old/new pair).
//!
//! Equality is strict JSON value equality and therefore type-sensitive:
//! numeric `1` and string `"1"` are different values and show up under
//! `changed`. Equal leaves appear in no category. The diff is a pure
//! function of its two inputs — it carries no history.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::flatten::flatten_value;

/// Old/new value pair for a changed path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub old: Value,
    pub new: Value,
}

/// Structured description of the delta between two JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatDiff {
    pub added: BTreeMap<String, Value>,
    pub removed: BTreeMap<String, Value>,
    pub changed: BTreeMap<String, ValueChange>,
}

impl FlatDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Computes the flat diff from `old` to `new`.
pub fn compute_diff(old: &Value, new: &Value) -> FlatDiff {
    let old_flat = flatten_value(old);
    let new_flat = flatten_value(new);

    let mut diff = FlatDiff::default();

    for (path, old_value) in &old_flat {
        match new_flat.get(path) {
            None => {
                diff.removed.insert(path.clone(), old_value.clone());
            }
            Some(new_value) if new_value != old_value => {
                diff.changed.insert(
                    path.clone(),
                    ValueChange {
                        old: old_value.clone(),
                        new: new_value.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }

    for (path, new_value) in &new_flat {
        if !old_flat.contains_key(path) {
            diff.added.insert(path.clone(), new_value.clone());
        }
    }

    diff
}
